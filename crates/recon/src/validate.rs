//! Record validation.
//!
//! Each logical field runs through a fixed, ordered list of pure rules.
//! Every rule either yields the coerced value or a named [`Violation`];
//! a record collects all of its violations rather than stopping at the
//! first one, so the quality report sees every broken field.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, trace};

use crate::config::ReconConfig;
use crate::model::{
    AuthorType, DeliveryStatus, Direction, FeedKind, FeedValidation, FieldValue, MessageAttributes,
    MessageType, RawRecord, Rejection, ValidatedMessage, ValidatedStatus, ValidationResult,
    Violation, ViolationKind,
};

// ---------------------------------------------------------------------------
// Timestamp formats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum TimestampFormat {
    Rfc3339,
    /// Explicit offset, e.g. `2026-01-15 10:00:00+00`.
    Offset(&'static str),
    /// No offset; read as UTC.
    Naive(&'static str),
    /// Date only; midnight UTC.
    Date(&'static str),
    /// All-digit text, read as unix seconds like a numeric JSON value.
    UnixSeconds,
}

/// Tried in order; the first format that parses wins.
const TIMESTAMP_FORMATS: &[TimestampFormat] = &[
    TimestampFormat::Rfc3339,
    TimestampFormat::Offset("%Y-%m-%d %H:%M:%S%.f%#z"),
    TimestampFormat::Naive("%Y-%m-%dT%H:%M:%S%.f"),
    TimestampFormat::Naive("%Y-%m-%d %H:%M:%S%.f"),
    TimestampFormat::Naive("%m/%d/%Y %H:%M:%S"),
    TimestampFormat::Date("%Y-%m-%d"),
    TimestampFormat::UnixSeconds,
];

impl TimestampFormat {
    fn parse(&self, s: &str) -> Option<DateTime<Utc>> {
        match self {
            Self::Rfc3339 => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Offset(fmt) => DateTime::parse_from_str(s, fmt)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Naive(fmt) => NaiveDateTime::parse_from_str(s, fmt)
                .ok()
                .map(|naive| naive.and_utc()),
            Self::Date(fmt) => NaiveDate::parse_from_str(s, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc()),
            Self::UnixSeconds => {
                if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                s.parse::<i64>()
                    .ok()
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            }
        }
    }
}

/// Parse a timestamp string with the known formats.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    TIMESTAMP_FORMATS.iter().find_map(|fmt| fmt.parse(s))
}

// ---------------------------------------------------------------------------
// Field rules
// ---------------------------------------------------------------------------

type RuleResult<T> = Result<T, Violation>;

fn required_text(value: Option<&FieldValue>, field: &str) -> RuleResult<String> {
    match value {
        Some(FieldValue::Bool(_)) => Err(Violation::new(ViolationKind::InvalidType, field)),
        Some(v) => v
            .as_text()
            .ok_or_else(|| Violation::new(ViolationKind::MissingField, field)),
        None => Err(Violation::new(ViolationKind::MissingField, field)),
    }
}

fn optional_text(value: Option<&FieldValue>) -> Option<String> {
    value.and_then(FieldValue::as_text)
}

fn timestamp(value: Option<&FieldValue>, field: &str) -> RuleResult<DateTime<Utc>> {
    let invalid = || Violation::new(ViolationKind::InvalidTimestamp, field);
    match value {
        None => Err(Violation::new(ViolationKind::MissingField, field)),
        Some(v) if v.is_blank() => Err(Violation::new(ViolationKind::MissingField, field)),
        Some(FieldValue::Bool(_)) => Err(Violation::new(ViolationKind::InvalidType, field)),
        // Numeric values are unix seconds.
        Some(FieldValue::Int(secs)) => Utc.timestamp_opt(*secs, 0).single().ok_or_else(invalid),
        Some(FieldValue::Float(secs)) => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round() as u32;
            Utc.timestamp_opt(whole as i64, nanos.min(999_999_999))
                .single()
                .ok_or_else(invalid)
        }
        Some(FieldValue::Text(s)) => parse_timestamp(s).ok_or_else(invalid),
        Some(FieldValue::Null) => Err(Violation::new(ViolationKind::MissingField, field)),
    }
}

fn status_value(
    value: Option<&FieldValue>,
    field: &str,
    config: &ReconConfig,
) -> RuleResult<DeliveryStatus> {
    let text = required_text(value, field)?;
    text.parse::<DeliveryStatus>()
        .ok()
        .filter(|status| config.is_accepted(*status))
        .ok_or_else(|| Violation::new(ViolationKind::InvalidEnum, field))
}

/// Optional member of a closed vocabulary. Blank passes as `None`.
fn categorical<T: FromStr>(value: Option<&FieldValue>, field: &str) -> RuleResult<Option<T>> {
    if let Some(FieldValue::Bool(_)) = value {
        return Err(Violation::new(ViolationKind::InvalidType, field));
    }
    match optional_text(value) {
        None => Ok(None),
        Some(text) => text
            .parse::<T>()
            .map(Some)
            .map_err(|_| Violation::new(ViolationKind::InvalidEnum, field)),
    }
}

fn not_in_future(
    ts: &DateTime<Utc>,
    field: &str,
    config: &ReconConfig,
) -> Option<Violation> {
    match config.validation.reference_time {
        Some(reference) if *ts > reference => {
            Some(Violation::new(ViolationKind::FutureTimestamp, field))
        }
        _ => None,
    }
}

/// Unwrap a rule result, parking the violation on failure.
fn check<T>(result: RuleResult<T>, violations: &mut Vec<Violation>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(violation) => {
            violations.push(violation);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Record validators
// ---------------------------------------------------------------------------

/// Validate one raw record of the given feed kind. Pure.
pub fn validate(record: &RawRecord, kind: FeedKind, config: &ReconConfig) -> ValidationResult {
    match kind {
        FeedKind::Messages => match validate_message(0, record, config) {
            Ok(msg) => ValidationResult::Message(msg),
            Err(r) => ValidationResult::Rejected(r),
        },
        FeedKind::Statuses => match validate_status(0, record, config) {
            Ok(status) => ValidationResult::Status(status),
            Err(r) => ValidationResult::Rejected(r),
        },
    }
}

fn validate_message(
    row: usize,
    record: &RawRecord,
    config: &ReconConfig,
) -> Result<ValidatedMessage, Rejection> {
    let cols = &config.messages.columns;
    let mut violations = Vec::new();

    let id = check(required_text(record.get(&cols.id), "id"), &mut violations);
    let sender = optional_text(record.get(&cols.sender));
    let recipient = optional_text(record.get(&cols.recipient));
    let body = optional_text(record.get(&cols.body));
    let sent_at = check(timestamp(record.get(&cols.sent_at), "sent_at"), &mut violations);
    let attributes = MessageAttributes {
        direction: check(
            categorical::<Direction>(record.get(&cols.direction), "direction"),
            &mut violations,
        )
        .flatten(),
        message_type: check(
            categorical::<MessageType>(record.get(&cols.message_type), "message_type"),
            &mut violations,
        )
        .flatten(),
        author_type: check(
            categorical::<AuthorType>(record.get(&cols.author_type), "author_type"),
            &mut violations,
        )
        .flatten(),
    };

    if let Some(ref ts) = sent_at {
        violations.extend(not_in_future(ts, "sent_at", config));
    }

    match (id, sent_at) {
        (Some(id), Some(sent_at)) if !violations.iter().any(Violation::is_hard) => {
            let mapped = cols.mapped();
            let metadata: BTreeMap<String, String> = record
                .iter()
                .filter(|(col, _)| !mapped.contains(&col.as_str()))
                .filter_map(|(col, v)| v.as_text().map(|text| (col.clone(), text)))
                .collect();
            Ok(ValidatedMessage {
                row,
                id,
                sender,
                recipient,
                body,
                sent_at,
                attributes,
                metadata,
                warnings: violations,
            })
        }
        _ => Err(rejection(
            FeedKind::Messages,
            row,
            record.get(&cols.id).and_then(FieldValue::as_text),
            violations,
            record,
        )),
    }
}

fn validate_status(
    row: usize,
    record: &RawRecord,
    config: &ReconConfig,
) -> Result<ValidatedStatus, Rejection> {
    let cols = &config.statuses.columns;
    let mut violations = Vec::new();

    let message_id = check(
        required_text(record.get(&cols.message_id), "message_id"),
        &mut violations,
    );
    let status = check(
        status_value(record.get(&cols.status), "status", config),
        &mut violations,
    );
    let at = check(timestamp(record.get(&cols.timestamp), "timestamp"), &mut violations);
    let error_detail = optional_text(record.get(&cols.error_detail));

    if let Some(ref ts) = at {
        violations.extend(not_in_future(ts, "timestamp", config));
    }

    match (message_id, status, at) {
        (Some(message_id), Some(status), Some(at))
            if !violations.iter().any(Violation::is_hard) =>
        {
            Ok(ValidatedStatus {
                row,
                message_id,
                status,
                at,
                error_detail,
                warnings: violations,
            })
        }
        _ => Err(rejection(
            FeedKind::Statuses,
            row,
            record.get(&cols.message_id).and_then(FieldValue::as_text),
            violations,
            record,
        )),
    }
}

fn rejection(
    feed: FeedKind,
    row: usize,
    record_id: Option<String>,
    violations: Vec<Violation>,
    record: &RawRecord,
) -> Rejection {
    Rejection {
        feed,
        row,
        record_id,
        violations,
        fields: record.clone(),
    }
}

// ---------------------------------------------------------------------------
// Feed validators
// ---------------------------------------------------------------------------

/// Validate the message feed. Rows are 1-based.
///
/// Every row with a non-blank identifier claims it, valid or not; any later
/// row repeating it gets `duplicate_id:id` as its first violation and is
/// rejected.
pub fn validate_messages(
    records: &[RawRecord],
    config: &ReconConfig,
) -> FeedValidation<ValidatedMessage> {
    let mut out = FeedValidation {
        total: records.len(),
        ..FeedValidation::default()
    };
    let id_column = config.messages.columns.id.as_str();
    let mut seen: HashSet<String> = HashSet::new();

    for (i, record) in records.iter().enumerate() {
        let row = i + 1;
        let repeated = record
            .get(id_column)
            .and_then(FieldValue::as_text)
            .is_some_and(|id| !seen.insert(id));

        let result = validate_message(row, record, config);
        if repeated {
            let mut r = match result {
                Ok(msg) => rejection(FeedKind::Messages, row, Some(msg.id), msg.warnings, record),
                Err(r) => r,
            };
            r.violations.insert(0, Violation::new(ViolationKind::DuplicateId, "id"));
            trace!(row, codes = ?codes(&r), "duplicate message identifier");
            out.rejected.push(r);
            continue;
        }

        match result {
            Ok(msg) => out.valid.push(msg),
            Err(r) => {
                trace!(row, codes = ?codes(&r), "message rejected");
                out.rejected.push(r);
            }
        }
    }

    debug!(
        total = out.total,
        valid = out.valid.len(),
        rejected = out.rejected.len(),
        "validated message feed"
    );
    out
}

/// Validate the status feed. Rows are 1-based.
pub fn validate_statuses(
    records: &[RawRecord],
    config: &ReconConfig,
) -> FeedValidation<ValidatedStatus> {
    let mut out = FeedValidation {
        total: records.len(),
        ..FeedValidation::default()
    };

    for (i, record) in records.iter().enumerate() {
        let row = i + 1;
        match validate_status(row, record, config) {
            Ok(status) => out.valid.push(status),
            Err(r) => {
                trace!(row, codes = ?codes(&r), "status rejected");
                out.rejected.push(r);
            }
        }
    }

    debug!(
        total = out.total,
        valid = out.valid.len(),
        rejected = out.rejected.len(),
        "validated status feed"
    );
    out
}

fn codes(r: &Rejection) -> Vec<&str> {
    r.violations.iter().map(|v| v.code.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
