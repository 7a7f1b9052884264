use std::collections::HashMap;

use crate::model::{LatestStatus, ResolvedStatus, StatusCounts, ValidatedStatus};

/// Group validated status events by message identifier, keeping feed order
/// within each group.
pub fn group_by_message(statuses: &[ValidatedStatus]) -> HashMap<&str, Vec<&ValidatedStatus>> {
    let mut groups: HashMap<&str, Vec<&ValidatedStatus>> = HashMap::new();
    for status in statuses {
        groups.entry(status.message_id.as_str()).or_default().push(status);
    }
    groups
}

/// Reduce one message's status events to a single resolved status.
///
/// The latest event wins. Equal timestamps fall back to lifecycle
/// precedence (`deleted > failed > read > delivered > sent`), then to the
/// error detail, so the outcome never depends on input order.
/// No events resolves to [`LatestStatus::Unknown`].
pub fn resolve(statuses: &[&ValidatedStatus]) -> ResolvedStatus {
    let Some(winner) = statuses
        .iter()
        .max_by(|a, b| {
            a.at.cmp(&b.at)
                .then_with(|| a.status.cmp(&b.status))
                .then_with(|| a.error_detail.cmp(&b.error_detail))
        })
    else {
        return ResolvedStatus::unknown();
    };

    let mut counts = StatusCounts::default();
    for s in statuses {
        counts.record(s.status);
    }

    ResolvedStatus {
        status: LatestStatus::Known(winner.status),
        at: Some(winner.at),
        error_detail: winner.error_detail.clone(),
        first_at: statuses.iter().map(|s| s.at).min(),
        event_count: statuses.len(),
        counts,
    }
}
