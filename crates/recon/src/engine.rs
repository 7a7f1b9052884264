use tracing::{debug, info, info_span, warn};

use crate::config::ReconConfig;
use crate::duplicates::{find_duplicates, group_pairs};
use crate::error::ReconError;
use crate::model::{ReconInput, ReconMeta, ReconResult, ValidationOutcome};
use crate::quality::summarize;
use crate::resolve::group_by_message;
use crate::unify::{orphan_statuses, unify};
use crate::validate::{validate_messages, validate_statuses};

/// Run one reconciliation pass: validate both feeds, resolve and unify
/// statuses, detect duplicates, then build the quality report.
///
/// The config is checked before any record is touched. Per-record problems
/// never fail the run; they end up in `rejections` and the report.
pub fn run(config: &ReconConfig, input: &ReconInput) -> Result<ReconResult, ReconError> {
    config.validate()?;

    let span = info_span!("recon", config = %config.name);
    let _guard = span.enter();

    info!(
        messages = input.messages.len(),
        statuses = input.statuses.len(),
        "starting reconciliation"
    );

    let outcome = ValidationOutcome {
        messages: validate_messages(&input.messages, config),
        statuses: validate_statuses(&input.statuses, config),
    };
    let rejected = outcome.messages.rejected.len() + outcome.statuses.rejected.len();
    if rejected > 0 {
        warn!(
            messages = outcome.messages.rejected.len(),
            statuses = outcome.statuses.rejected.len(),
            "records failed validation and were excluded"
        );
    }

    let grouped = group_by_message(&outcome.statuses.valid);
    let unified = unify(&outcome.messages.valid, &grouped);

    let orphans = orphan_statuses(&outcome.messages.valid, &grouped);
    if !orphans.is_empty() {
        let sample: Vec<&str> = orphans.iter().take(5).map(|s| s.message_id.as_str()).collect();
        debug!(count = orphans.len(), ?sample, "status events reference unknown messages");
    }
    info!(unified = unified.len(), "unified messages");

    let duplicates = find_duplicates(&unified, &config.duplicates);
    let duplicate_groups = group_pairs(&duplicates);
    info!(
        pairs = duplicates.len(),
        groups = duplicate_groups.len(),
        window_secs = config.duplicates.window_secs,
        "duplicate detection complete"
    );

    let report = summarize(&outcome, &unified, &duplicates);
    info!(
        quality_score = report.quality_score,
        errors = report.has_errors(),
        "quality report built"
    );

    let ValidationOutcome { messages, statuses } = outcome;
    let mut rejections = messages.rejected;
    rejections.extend(statuses.rejected);

    Ok(ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            duplicate_window_secs: config.duplicates.window_secs,
        },
        unified,
        duplicates,
        duplicate_groups,
        rejections,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{parse_csv_feed, parse_json_feed};
    use crate::model::{DeliveryStatus, DuplicateConfidence, FeedKind, LatestStatus, RawRecord};

    fn message(id: &str, body: &str, sent_at: &str) -> RawRecord {
        RawRecord::new()
            .with("id", id)
            .with("sender", "A")
            .with("recipient", "B")
            .with("body", body)
            .with("sent_at", sent_at)
    }

    #[test]
    fn invalid_config_fails_before_records() {
        let mut config = ReconConfig::default();
        config.duplicates.window_secs = -1;
        let err = run(&config, &ReconInput::default()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn empty_run() {
        let result = run(&ReconConfig::default(), &ReconInput::default()).unwrap();
        assert!(result.unified.is_empty());
        assert!(result.duplicates.is_empty());
        assert_eq!(result.report.quality_score, 1.0);
        assert_eq!(result.meta.duplicate_window_secs, 120);
    }

    #[test]
    fn exact_duplicate_end_to_end() {
        let mut config = ReconConfig::default();
        config.duplicates.window_secs = 60;
        let input = ReconInput {
            messages: vec![
                message("m1", "Hi", "2026-01-15T10:00:00Z"),
                message("m2", "Hi", "2026-01-15T10:00:30Z"),
            ],
            statuses: vec![],
        };
        let result = run(&config, &input).unwrap();
        assert_eq!(result.duplicates.len(), 1);
        let pair = &result.duplicates[0];
        assert_eq!((pair.first_id.as_str(), pair.second_id.as_str()), ("m1", "m2"));
        assert_eq!(pair.confidence, DuplicateConfidence::Exact);
        assert_eq!(result.duplicate_groups.len(), 1);
    }

    #[test]
    fn status_resolution_end_to_end() {
        let messages = parse_csv_feed(
            FeedKind::Messages,
            "id,sender,recipient,body,sent_at\nm1,A,B,Hi,2026-01-15T10:00:00Z\n",
        )
        .unwrap();
        let statuses = parse_json_feed(
            FeedKind::Statuses,
            r#"[
                {"message_id": "m1", "status": "sent", "timestamp": "2026-01-15T10:00:00Z"},
                {"message_id": "m1", "status": "delivered", "timestamp": "2026-01-15T10:00:05Z"}
            ]"#,
        )
        .unwrap();
        let result = run(&ReconConfig::default(), &ReconInput { messages, statuses }).unwrap();
        assert_eq!(result.unified.len(), 1);
        let m1 = &result.unified[0];
        assert_eq!(m1.latest_status, LatestStatus::Known(DeliveryStatus::Delivered));
        assert_eq!(m1.status_history_count, 2);
    }

    #[test]
    fn rejected_message_is_excluded_and_counted() {
        let input = ReconInput {
            messages: vec![
                message("m1", "Hi", "2026-01-15T10:00:00Z"),
                RawRecord::new().with("id", "m2").with("body", "Hey"),
            ],
            statuses: vec![],
        };
        let result = run(&ReconConfig::default(), &input).unwrap();
        assert_eq!(result.unified.len(), 1);
        assert_eq!(result.unified[0].id, "m1");
        assert_eq!(result.rejections.len(), 1);
        assert_eq!(result.rejections[0].record_id.as_deref(), Some("m2"));
        assert_eq!(
            result.report.violation_counts.get("missing_field:sent_at"),
            Some(&1)
        );
    }

    #[test]
    fn result_serializes() {
        let input = ReconInput {
            messages: vec![message("m1", "Hi", "2026-01-15T10:00:00Z")],
            statuses: vec![],
        };
        let result = run(&ReconConfig::default(), &input).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["unified"][0]["latest_status"], "unknown");
        assert_eq!(json["report"]["quality_score"], 1.0);
        assert_eq!(json["meta"]["config_name"], "courier");
    }
}
