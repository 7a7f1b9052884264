use std::collections::{BTreeMap, HashSet};

use crate::duplicates::group_pairs;
use crate::model::{
    DuplicateCandidatePair, DuplicateConfidence, FeedStats, FeedValidation, QualityCheck,
    QualityReport, Rejection, Severity, UnifiedMessage, ValidationOutcome, Violation,
    ViolationKind,
};

/// Aggregate validation failures, unified rows and duplicate pairs into the
/// run's quality report. Pure.
///
/// `quality_score = (valid_records - records_in_exact_duplicates) / total_records`,
/// clamped to [0, 1]; an empty run scores 1.0.
pub fn summarize(
    validation: &ValidationOutcome,
    unified: &[UnifiedMessage],
    pairs: &[DuplicateCandidatePair],
) -> QualityReport {
    let messages = feed_stats(&validation.messages);
    let statuses = feed_stats(&validation.statuses);

    let rejections = || {
        validation
            .messages
            .rejected
            .iter()
            .chain(validation.statuses.rejected.iter())
    };

    let mut violation_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut warning_counts: BTreeMap<String, usize> = BTreeMap::new();
    for r in rejections() {
        for v in &r.violations {
            let counts = if v.is_hard() {
                &mut violation_counts
            } else {
                &mut warning_counts
            };
            *counts.entry(v.code.clone()).or_insert(0) += 1;
        }
    }
    let valid_warnings = validation
        .messages
        .valid
        .iter()
        .flat_map(|m| m.warnings.iter())
        .chain(validation.statuses.valid.iter().flat_map(|s| s.warnings.iter()));
    for v in valid_warnings {
        *warning_counts.entry(v.code.clone()).or_insert(0) += 1;
    }

    let mut duplicate_confidence_counts: BTreeMap<String, usize> = BTreeMap::new();
    for pair in pairs {
        *duplicate_confidence_counts
            .entry(pair.confidence.to_string())
            .or_insert(0) += 1;
    }
    let duplicate_groups = group_pairs(pairs).len();

    let exact_ids: HashSet<&str> = pairs
        .iter()
        .filter(|p| p.confidence == DuplicateConfidence::Exact)
        .flat_map(|p| [p.first_id.as_str(), p.second_id.as_str()])
        .collect();
    let records_in_exact_duplicates = exact_ids.len();

    let messages_without_status = unified
        .iter()
        .filter(|u| u.status_history_count == 0)
        .count();
    let attached: usize = unified.iter().map(|u| u.status_history_count).sum();
    let orphan_statuses = statuses.valid.saturating_sub(attached);

    let total_records = messages.total + statuses.total;
    let quality_score = if total_records == 0 {
        1.0
    } else {
        let valid = (messages.valid + statuses.valid) as f64;
        ((valid - records_in_exact_duplicates as f64) / total_records as f64).clamp(0.0, 1.0)
    };

    let missing_required = rejections()
        .filter(|r| has_kind(r, ViolationKind::MissingField))
        .count();
    let invalid_statuses = validation
        .statuses
        .rejected
        .iter()
        .filter(|r| has_kind(r, ViolationKind::InvalidEnum))
        .count();
    let duplicate_ids = violation_counts.get("duplicate_id:id").copied().unwrap_or(0);
    let future_timestamps: usize = warning_counts
        .iter()
        .filter(|(code, _)| code.starts_with(ViolationKind::FutureTimestamp.prefix()))
        .map(|(_, n)| n)
        .sum();

    let checks = vec![
        check("total_messages", messages.total, "Total messages processed", Severity::Info),
        check("total_statuses", statuses.total, "Total status records processed", Severity::Info),
        check(
            "missing_required_fields",
            missing_required,
            "Records missing required fields",
            error_if_any(missing_required),
        ),
        check(
            "invalid_statuses",
            invalid_statuses,
            "Status records with invalid values",
            error_if_any(invalid_statuses),
        ),
        check(
            "duplicate_identifiers",
            duplicate_ids,
            "Message rows repeating an earlier identifier",
            error_if_any(duplicate_ids),
        ),
        check(
            "messages_without_status",
            messages_without_status,
            "Valid messages with no status events",
            warning_if_any(messages_without_status),
        ),
        check(
            "orphan_statuses",
            orphan_statuses,
            "Valid status events referencing no valid message",
            warning_if_any(orphan_statuses),
        ),
        check(
            "future_timestamps",
            future_timestamps,
            "Timestamps later than the reference time",
            warning_if_any(future_timestamps),
        ),
        check(
            "duplicate_pairs",
            pairs.len(),
            "Candidate duplicate message pairs",
            warning_if_any(pairs.len()),
        ),
    ];

    QualityReport {
        messages,
        statuses,
        violation_counts,
        warning_counts,
        duplicate_pairs: pairs.len(),
        duplicate_confidence_counts,
        duplicate_groups,
        records_in_exact_duplicates,
        messages_without_status,
        orphan_statuses,
        quality_score,
        checks,
    }
}

fn feed_stats<T>(feed: &FeedValidation<T>) -> FeedStats {
    FeedStats {
        total: feed.total,
        valid: feed.valid.len(),
        invalid: feed.rejected.len(),
    }
}

fn has_kind(r: &Rejection, kind: ViolationKind) -> bool {
    r.hard_violations().any(|v: &Violation| v.kind == kind)
}

fn check(name: &str, value: usize, description: &str, severity: Severity) -> QualityCheck {
    QualityCheck {
        check_name: name.into(),
        value,
        description: description.into(),
        severity,
    }
}

fn error_if_any(n: usize) -> Severity {
    if n > 0 {
        Severity::Error
    } else {
        Severity::Info
    }
}

fn warning_if_any(n: usize) -> Severity {
    if n > 0 {
        Severity::Warning
    } else {
        Severity::Info
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
