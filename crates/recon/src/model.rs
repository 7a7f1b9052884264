use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A primitive cell value as handed over by a feed adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Textual form of the value, or `None` when it is null or blank.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) if !f.is_finite() => None,
            Self::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_text().is_none()
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// One raw row from a feed: a flat mapping of column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }
}

impl FromIterator<(String, FieldValue)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Messages,
    Statuses,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Messages => write!(f, "messages"),
            Self::Statuses => write!(f, "statuses"),
        }
    }
}

/// Both feeds for one run, in the order the adapters delivered them.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub messages: Vec<RawRecord>,
    pub statuses: Vec<RawRecord>,
}

// ---------------------------------------------------------------------------
// Status values
// ---------------------------------------------------------------------------

/// Delivery lifecycle state. Variant order is the tie-break precedence:
/// on equal timestamps the greater variant wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
    Failed,
    Deleted,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        Self::Sent,
        Self::Delivered,
        Self::Read,
        Self::Failed,
        Self::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    /// Exact, lowercase match only. Unknown values are rejected, not mapped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown status '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Message attributes
// ---------------------------------------------------------------------------

/// Closed vocabularies for optional message columns. Values match exactly;
/// anything else is `invalid_enum:<field>`.
macro_rules! closed_enum {
    ($(#[$meta:meta])* $name:ident, $what:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| format!(concat!("unknown ", $what, " '{}'"), s))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

closed_enum!(
    /// Whether the message was received or sent by the account.
    Direction, "direction" {
        Inbound => "inbound",
        Outbound => "outbound",
    }
);

closed_enum!(
    MessageType, "message type" {
        Text => "text",
        Interactive => "interactive",
        Button => "button",
        Image => "image",
        Document => "document",
        Audio => "audio",
        Hsm => "hsm",
        Template => "template",
        Video => "video",
        Voice => "voice",
        Sticker => "sticker",
        Contacts => "contacts",
        Reaction => "reaction",
    }
);

closed_enum!(
    /// Who authored the message. Upper-case in exports.
    AuthorType, "author type" {
        Owner => "OWNER",
        User => "USER",
        Stack => "STACK",
        Automator => "AUTOMATOR",
        Operator => "OPERATOR",
        System => "SYSTEM",
    }
);

/// Optional categorical columns of a message. Blank or absent values stay
/// `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MessageAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_type: Option<AuthorType>,
}

/// Resolved status of a message; `Unknown` when no events matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatestStatus {
    Unknown,
    Known(DeliveryStatus),
}

impl LatestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Known(status) => status.as_str(),
        }
    }
}

impl fmt::Display for LatestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LatestStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Per-status event tallies for one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub sent: usize,
    pub delivered: usize,
    pub read: usize,
    pub failed: usize,
    pub deleted: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: DeliveryStatus) {
        *self.slot(status) += 1;
    }

    pub fn get(&self, status: DeliveryStatus) -> usize {
        match status {
            DeliveryStatus::Sent => self.sent,
            DeliveryStatus::Delivered => self.delivered,
            DeliveryStatus::Read => self.read,
            DeliveryStatus::Failed => self.failed,
            DeliveryStatus::Deleted => self.deleted,
        }
    }

    pub fn total(&self) -> usize {
        DeliveryStatus::ALL.into_iter().map(|status| self.get(status)).sum()
    }

    fn slot(&mut self, status: DeliveryStatus) -> &mut usize {
        match status {
            DeliveryStatus::Sent => &mut self.sent,
            DeliveryStatus::Delivered => &mut self.delivered,
            DeliveryStatus::Read => &mut self.read,
            DeliveryStatus::Failed => &mut self.failed,
            DeliveryStatus::Deleted => &mut self.deleted,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MissingField,
    InvalidType,
    InvalidTimestamp,
    InvalidEnum,
    DuplicateId,
    FutureTimestamp,
}

impl ViolationKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::InvalidType => "invalid_type",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::InvalidEnum => "invalid_enum",
            Self::DuplicateId => "duplicate_id",
            Self::FutureTimestamp => "future_timestamp",
        }
    }

    /// Soft kinds are reported but do not exclude the record.
    pub fn severity(&self) -> Severity {
        match self {
            Self::FutureTimestamp => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// A named rule violation, e.g. `missing_field:sent_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub code: String,
    pub kind: ViolationKind,
    pub field: String,
    pub severity: Severity,
}

impl Violation {
    pub fn new(kind: ViolationKind, field: &str) -> Self {
        Self {
            code: format!("{}:{field}", kind.prefix()),
            kind,
            field: field.to_string(),
            severity: kind.severity(),
        }
    }

    pub fn is_hard(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedMessage {
    pub row: usize,
    pub id: String,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub body: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub attributes: MessageAttributes,
    pub metadata: BTreeMap<String, String>,
    pub warnings: Vec<Violation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedStatus {
    pub row: usize,
    pub message_id: String,
    pub status: DeliveryStatus,
    pub at: DateTime<Utc>,
    pub error_detail: Option<String>,
    pub warnings: Vec<Violation>,
}

/// A record that failed at least one hard rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub feed: FeedKind,
    pub row: usize,
    pub record_id: Option<String>,
    pub violations: Vec<Violation>,
    pub fields: RawRecord,
}

impl Rejection {
    pub fn hard_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_hard())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Message(ValidatedMessage),
    Status(ValidatedStatus),
    Rejected(Rejection),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    /// Every violation attached to the record, hard or soft.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Message(m) => &m.warnings,
            Self::Status(s) => &s.warnings,
            Self::Rejected(r) => &r.violations,
        }
    }
}

/// Validation output for one feed.
#[derive(Debug, Clone)]
pub struct FeedValidation<T> {
    pub total: usize,
    pub valid: Vec<T>,
    pub rejected: Vec<Rejection>,
}

impl<T> Default for FeedValidation<T> {
    fn default() -> Self {
        Self {
            total: 0,
            valid: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// Validation output for both feeds of a run.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub messages: FeedValidation<ValidatedMessage>,
    pub statuses: FeedValidation<ValidatedStatus>,
}

// ---------------------------------------------------------------------------
// Resolution + unification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedStatus {
    pub status: LatestStatus,
    pub at: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
    pub first_at: Option<DateTime<Utc>>,
    pub event_count: usize,
    pub counts: StatusCounts,
}

impl ResolvedStatus {
    pub fn unknown() -> Self {
        Self {
            status: LatestStatus::Unknown,
            at: None,
            error_detail: None,
            first_at: None,
            event_count: 0,
            counts: StatusCounts::default(),
        }
    }
}

/// One reconciled row per distinct validated message identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedMessage {
    pub id: String,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub body: Option<String>,
    pub sent_at: DateTime<Utc>,
    #[serde(flatten)]
    pub attributes: MessageAttributes,
    pub latest_status: LatestStatus,
    pub latest_status_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_error_detail: Option<String>,
    pub first_status_at: Option<DateTime<Utc>>,
    pub status_history_count: usize,
    pub status_counts: StatusCounts,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Duplicates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateBasis {
    ExactContent,
    Fuzzy,
}

/// Ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateConfidence {
    Possible,
    Likely,
    Exact,
}

impl fmt::Display for DuplicateConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Possible => write!(f, "possible"),
            Self::Likely => write!(f, "likely"),
            Self::Exact => write!(f, "exact"),
        }
    }
}

/// Unordered pair; `first_id < second_id` always holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateCandidatePair {
    pub first_id: String,
    pub second_id: String,
    pub basis: DuplicateBasis,
    pub confidence: DuplicateConfidence,
    pub similarity: f64,
    pub time_delta_secs: i64,
}

/// Connected component of candidate pairs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub group_id: String,
    pub message_ids: Vec<String>,
    pub confidence: DuplicateConfidence,
    pub pair_count: usize,
}

// ---------------------------------------------------------------------------
// Quality report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityCheck {
    pub check_name: String,
    pub value: usize,
    pub description: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedStats {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub messages: FeedStats,
    pub statuses: FeedStats,
    pub violation_counts: BTreeMap<String, usize>,
    pub warning_counts: BTreeMap<String, usize>,
    pub duplicate_pairs: usize,
    pub duplicate_confidence_counts: BTreeMap<String, usize>,
    pub duplicate_groups: usize,
    pub records_in_exact_duplicates: usize,
    pub messages_without_status: usize,
    pub orphan_statuses: usize,
    pub quality_score: f64,
    pub checks: Vec<QualityCheck>,
}

impl QualityReport {
    pub fn total_records(&self) -> usize {
        self.messages.total + self.statuses.total
    }

    pub fn has_errors(&self) -> bool {
        self.checks.iter().any(|c| c.severity == Severity::Error)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub duplicate_window_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub unified: Vec<UnifiedMessage>,
    pub duplicates: Vec<DuplicateCandidatePair>,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub rejections: Vec<Rejection>,
    pub report: QualityReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_precedence_follows_lifecycle() {
        assert!(DeliveryStatus::Deleted > DeliveryStatus::Failed);
        assert!(DeliveryStatus::Failed > DeliveryStatus::Read);
        assert!(DeliveryStatus::Read > DeliveryStatus::Delivered);
        assert!(DeliveryStatus::Delivered > DeliveryStatus::Sent);
    }

    #[test]
    fn status_parse_is_strict() {
        assert_eq!("read".parse::<DeliveryStatus>(), Ok(DeliveryStatus::Read));
        assert!("READ".parse::<DeliveryStatus>().is_err());
        assert!("seen".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn field_value_text_forms() {
        assert_eq!(FieldValue::Int(42).as_text().as_deref(), Some("42"));
        assert_eq!(FieldValue::Float(7.0).as_text().as_deref(), Some("7"));
        assert_eq!(FieldValue::from("  hi ").as_text().as_deref(), Some("hi"));
        assert!(FieldValue::from("   ").is_blank());
        assert!(FieldValue::Null.is_blank());
        assert!(FieldValue::Float(f64::NAN).is_blank());
    }

    #[test]
    fn violation_code_uses_logical_field() {
        let v = Violation::new(ViolationKind::MissingField, "sent_at");
        assert_eq!(v.code, "missing_field:sent_at");
        assert!(v.is_hard());
        assert!(!Violation::new(ViolationKind::FutureTimestamp, "sent_at").is_hard());
    }

    #[test]
    fn latest_status_serializes_as_plain_string() {
        let json = serde_json::to_string(&LatestStatus::Known(DeliveryStatus::Read)).unwrap();
        assert_eq!(json, "\"read\"");
        let json = serde_json::to_string(&LatestStatus::Unknown).unwrap();
        assert_eq!(json, "\"unknown\"");
    }

    #[test]
    fn closed_vocabularies_match_exactly() {
        assert_eq!("inbound".parse::<Direction>(), Ok(Direction::Inbound));
        assert!("Inbound".parse::<Direction>().is_err());
        assert_eq!("hsm".parse::<MessageType>(), Ok(MessageType::Hsm));
        assert_eq!("SYSTEM".parse::<AuthorType>(), Ok(AuthorType::System));
        assert!("system".parse::<AuthorType>().is_err());
        assert_eq!(MessageType::ALL.len(), 13);
    }

    #[test]
    fn status_counts_total_sums_every_status() {
        let mut counts = StatusCounts::default();
        for status in [DeliveryStatus::Sent, DeliveryStatus::Read, DeliveryStatus::Read] {
            counts.record(status);
        }
        assert_eq!(counts.get(DeliveryStatus::Read), 2);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn attributes_flatten_into_unified_rows() {
        let attributes = MessageAttributes {
            author_type: Some(AuthorType::User),
            ..MessageAttributes::default()
        };
        let json = serde_json::to_value(attributes).unwrap();
        assert_eq!(json, serde_json::json!({"author_type": "USER"}));
    }
}
