use std::collections::HashMap;

use crate::model::{UnifiedMessage, ValidatedMessage, ValidatedStatus};
use crate::resolve::resolve;

/// Join validated messages with their resolved status, one row per message,
/// in the order the messages were received.
///
/// Identifiers are assumed unique; `validate_messages` already rejects
/// repeats.
pub fn unify(
    messages: &[ValidatedMessage],
    statuses_by_message: &HashMap<&str, Vec<&ValidatedStatus>>,
) -> Vec<UnifiedMessage> {
    messages
        .iter()
        .map(|msg| {
            let events = statuses_by_message
                .get(msg.id.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let resolved = resolve(events);

            let mut warnings: Vec<String> = msg.warnings.iter().map(|v| v.code.clone()).collect();
            for event in events {
                for w in &event.warnings {
                    if !warnings.contains(&w.code) {
                        warnings.push(w.code.clone());
                    }
                }
            }

            UnifiedMessage {
                id: msg.id.clone(),
                sender: msg.sender.clone(),
                recipient: msg.recipient.clone(),
                body: msg.body.clone(),
                sent_at: msg.sent_at,
                attributes: msg.attributes,
                latest_status: resolved.status,
                latest_status_at: resolved.at,
                latest_error_detail: resolved.error_detail,
                first_status_at: resolved.first_at,
                status_history_count: resolved.event_count,
                status_counts: resolved.counts,
                metadata: msg.metadata.clone(),
                warnings,
            }
        })
        .collect()
}

/// Valid status events whose message identifier matched no validated message.
pub fn orphan_statuses<'a>(
    messages: &[ValidatedMessage],
    statuses_by_message: &HashMap<&'a str, Vec<&'a ValidatedStatus>>,
) -> Vec<&'a ValidatedStatus> {
    let known: std::collections::HashSet<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    let mut orphans: Vec<&ValidatedStatus> = statuses_by_message
        .iter()
        .filter(|(id, _)| !known.contains(*id))
        .flat_map(|(_, events)| events.iter().copied())
        .collect();
    orphans.sort_by_key(|s| s.row);
    orphans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeliveryStatus, LatestStatus, MessageAttributes};
    use crate::resolve::group_by_message;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn msg(id: &str) -> ValidatedMessage {
        ValidatedMessage {
            row: 0,
            id: id.into(),
            sender: Some("A".into()),
            recipient: Some("B".into()),
            body: Some("Hi".into()),
            sent_at: t0(),
            attributes: MessageAttributes::default(),
            metadata: BTreeMap::new(),
            warnings: vec![],
        }
    }

    fn status(message_id: &str, status: DeliveryStatus, offset_secs: i64, row: usize) -> ValidatedStatus {
        ValidatedStatus {
            row,
            message_id: message_id.into(),
            status,
            at: t0() + Duration::seconds(offset_secs),
            error_detail: None,
            warnings: vec![],
        }
    }

    #[test]
    fn sent_then_delivered() {
        let messages = vec![msg("m1")];
        let statuses = vec![
            status("m1", DeliveryStatus::Sent, 0, 1),
            status("m1", DeliveryStatus::Delivered, 5, 2),
        ];
        let grouped = group_by_message(&statuses);
        let unified = unify(&messages, &grouped);
        assert_eq!(unified.len(), 1);
        assert_eq!(unified[0].latest_status, LatestStatus::Known(DeliveryStatus::Delivered));
        assert_eq!(unified[0].latest_status_at, Some(t0() + Duration::seconds(5)));
        assert_eq!(unified[0].status_history_count, 2);
        assert_eq!(unified[0].status_counts.sent, 1);
    }

    #[test]
    fn message_without_status_is_unknown() {
        let messages = vec![msg("m1")];
        let unified = unify(&messages, &HashMap::new());
        assert_eq!(unified[0].latest_status, LatestStatus::Unknown);
        assert_eq!(unified[0].latest_status_at, None);
        assert_eq!(unified[0].status_history_count, 0);
    }

    #[test]
    fn output_follows_message_order() {
        let messages = vec![msg("m3"), msg("m1"), msg("m2")];
        let unified = unify(&messages, &HashMap::new());
        let ids: Vec<&str> = unified.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m1", "m2"]);
    }

    #[test]
    fn orphans_are_statuses_without_message() {
        let messages = vec![msg("m1")];
        let statuses = vec![
            status("m1", DeliveryStatus::Sent, 0, 1),
            status("ghost", DeliveryStatus::Sent, 0, 2),
            status("ghost", DeliveryStatus::Read, 1, 3),
        ];
        let grouped = group_by_message(&statuses);
        let orphans = orphan_statuses(&messages, &grouped);
        assert_eq!(orphans.len(), 2);
        assert_eq!(orphans[0].row, 2);
    }
}
