use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::ReconError;
use crate::model::DeliveryStatus;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub messages: MessageFeedConfig,
    #[serde(default)]
    pub statuses: StatusFeedConfig,
    #[serde(default)]
    pub duplicates: DuplicateConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub inputs: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_name() -> String {
    "courier".into()
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            messages: MessageFeedConfig::default(),
            statuses: StatusFeedConfig::default(),
            duplicates: DuplicateConfig::default(),
            validation: ValidationConfig::default(),
            inputs: InputConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Feeds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageFeedConfig {
    #[serde(default)]
    pub columns: MessageColumns,
}

/// Source column name for each logical message field.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MessageColumns {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub sent_at: String,
    /// Optional categorical columns; blank or absent values are allowed.
    pub direction: String,
    pub message_type: String,
    pub author_type: String,
}

impl Default for MessageColumns {
    fn default() -> Self {
        Self {
            id: "id".into(),
            sender: "sender".into(),
            recipient: "recipient".into(),
            body: "body".into(),
            sent_at: "sent_at".into(),
            direction: "direction".into(),
            message_type: "message_type".into(),
            author_type: "author_type".into(),
        }
    }
}

impl MessageColumns {
    pub fn mapped(&self) -> [&str; 8] {
        [
            &self.id,
            &self.sender,
            &self.recipient,
            &self.body,
            &self.sent_at,
            &self.direction,
            &self.message_type,
            &self.author_type,
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusFeedConfig {
    #[serde(default)]
    pub columns: StatusColumns,
    /// Status values accepted by validation. Anything else is `invalid_enum`.
    #[serde(default = "default_accepted")]
    pub accepted: Vec<DeliveryStatus>,
}

fn default_accepted() -> Vec<DeliveryStatus> {
    DeliveryStatus::ALL.to_vec()
}

impl Default for StatusFeedConfig {
    fn default() -> Self {
        Self {
            columns: StatusColumns::default(),
            accepted: default_accepted(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusColumns {
    pub message_id: String,
    pub status: String,
    pub timestamp: String,
    pub error_detail: String,
}

impl Default for StatusColumns {
    fn default() -> Self {
        Self {
            message_id: "message_id".into(),
            status: "status".into(),
            timestamp: "timestamp".into(),
            error_detail: "error_detail".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Duplicates
// ---------------------------------------------------------------------------

/// Upper bound that keeps `Duration::seconds` in range.
const MAX_WINDOW_SECS: i64 = i64::MAX / 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DuplicateConfig {
    /// Maximum distance between two `sent_at` values, inclusive.
    pub window_secs: i64,
    /// Body similarity at or above which a sender/recipient match is `likely`.
    pub likely_threshold: f64,
    /// Body similarity at or above which a sender/recipient match is `possible`.
    pub possible_threshold: f64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            window_secs: 120,
            likely_threshold: 0.9,
            possible_threshold: 0.6,
        }
    }
}

impl DuplicateConfig {
    /// The window as a duration. Out-of-range values are clamped to
    /// `[0, MAX_WINDOW_SECS]` so an unvalidated config cannot panic here.
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs.clamp(0, MAX_WINDOW_SECS))
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.window_secs < 0 {
            return Err(ReconError::ConfigValidation(format!(
                "duplicates.window_secs must not be negative, got {}",
                self.window_secs
            )));
        }
        if self.window_secs > MAX_WINDOW_SECS {
            return Err(ReconError::ConfigValidation(format!(
                "duplicates.window_secs must not exceed {MAX_WINDOW_SECS}, got {}",
                self.window_secs
            )));
        }
        for (name, value) in [
            ("likely_threshold", self.likely_threshold),
            ("possible_threshold", self.possible_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ReconError::ConfigValidation(format!(
                    "duplicates.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.possible_threshold > self.likely_threshold {
            return Err(ReconError::ConfigValidation(format!(
                "duplicates.possible_threshold ({}) exceeds likely_threshold ({})",
                self.possible_threshold, self.likely_threshold
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation, inputs, output, logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    /// Timestamps after this instant raise `future_timestamp` warnings.
    pub reference_time: Option<DateTime<Utc>>,
}

/// Feed locations, resolved by the CLI relative to the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    pub messages: Option<String>,
    pub statuses: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: "output".into() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        self.duplicates.validate()?;

        if self.statuses.accepted.is_empty() {
            return Err(ReconError::ConfigValidation(
                "statuses.accepted must list at least one status".into(),
            ));
        }

        // Two logical fields reading the same column would silently alias.
        let message_cols = self.messages.columns.mapped();
        for (i, col) in message_cols.iter().enumerate() {
            if col.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "messages.columns entries must not be empty".into(),
                ));
            }
            if message_cols[..i].contains(col) {
                return Err(ReconError::ConfigValidation(format!(
                    "messages.columns maps column '{col}' more than once"
                )));
            }
        }

        let sc = &self.statuses.columns;
        let status_cols = [&sc.message_id, &sc.status, &sc.timestamp, &sc.error_detail];
        for (i, col) in status_cols.iter().enumerate() {
            if col.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "statuses.columns entries must not be empty".into(),
                ));
            }
            if status_cols[..i].contains(col) {
                return Err(ReconError::ConfigValidation(format!(
                    "statuses.columns maps column '{col}' more than once"
                )));
            }
        }

        Ok(())
    }

    pub fn is_accepted(&self, status: DeliveryStatus) -> bool {
        self.statuses.accepted.contains(&status)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
name = "whatsapp-daily"

[messages.columns]
id        = "uuid"
sender    = "masked_author"
recipient = "masked_addressees"
body      = "content"
sent_at   = "inserted_at"

[statuses]
accepted = ["sent", "delivered", "read", "failed"]

[statuses.columns]
message_id   = "message_uuid"
status       = "status"
timestamp    = "timestamp"
error_detail = "errors"

[duplicates]
window_secs        = 60
likely_threshold   = 0.85
possible_threshold = 0.5

[validation]
reference_time = "2026-01-31T00:00:00Z"

[inputs]
messages = "messages.csv"
statuses = "statuses.csv"
"#;

    #[test]
    fn parse_full_config() {
        let config = ReconConfig::from_toml(FULL).unwrap();
        assert_eq!(config.name, "whatsapp-daily");
        assert_eq!(config.messages.columns.id, "uuid");
        assert_eq!(config.statuses.columns.message_id, "message_uuid");
        assert_eq!(config.statuses.accepted.len(), 4);
        assert!(!config.is_accepted(DeliveryStatus::Deleted));
        assert_eq!(config.duplicates.window_secs, 60);
        assert!(config.validation.reference_time.is_some());
        assert_eq!(config.inputs.messages.as_deref(), Some("messages.csv"));
        assert_eq!(config.output.dir, "output");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = ReconConfig::from_toml("").unwrap();
        assert_eq!(config.name, "courier");
        assert_eq!(config.messages.columns.sent_at, "sent_at");
        assert_eq!(config.statuses.accepted, DeliveryStatus::ALL.to_vec());
        assert_eq!(config.duplicates.window_secs, 120);
        assert!(config.validation.reference_time.is_none());
    }

    #[test]
    fn partial_columns_keep_other_defaults() {
        let config = ReconConfig::from_toml(
            r#"
[messages.columns]
id = "uuid"
"#,
        )
        .unwrap();
        assert_eq!(config.messages.columns.id, "uuid");
        assert_eq!(config.messages.columns.body, "body");
    }

    #[test]
    fn reject_negative_window() {
        let err = ReconConfig::from_toml("[duplicates]\nwindow_secs = -5\n").unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("must not be negative"));
    }

    #[test]
    fn reject_threshold_out_of_range() {
        let err = ReconConfig::from_toml("[duplicates]\nlikely_threshold = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("likely_threshold"));
    }

    #[test]
    fn reject_inverted_thresholds() {
        let err = ReconConfig::from_toml(
            "[duplicates]\nlikely_threshold = 0.4\npossible_threshold = 0.7\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn reject_unknown_status_value() {
        let err = ReconConfig::from_toml("[statuses]\naccepted = [\"seen\"]\n").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn reject_empty_accepted() {
        let err = ReconConfig::from_toml("[statuses]\naccepted = []\n").unwrap_err();
        assert!(err.to_string().contains("at least one status"));
    }

    #[test]
    fn reject_aliased_columns() {
        let err = ReconConfig::from_toml(
            r#"
[messages.columns]
sender = "addr"
recipient = "addr"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("'addr'"));
    }

    #[test]
    fn reject_unknown_keys() {
        let err = ReconConfig::from_toml("[duplicates]\nwindow = 60\n").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ReconConfig::default().validate().is_ok());
    }

    #[test]
    fn window_clamps_out_of_range_values() {
        let huge = DuplicateConfig {
            window_secs: i64::MAX,
            ..DuplicateConfig::default()
        };
        assert!(huge.validate().is_err());
        assert_eq!(huge.window(), Duration::seconds(MAX_WINDOW_SECS));

        let negative = DuplicateConfig {
            window_secs: -30,
            ..DuplicateConfig::default()
        };
        assert_eq!(negative.window(), Duration::zero());
    }

    #[test]
    fn categorical_columns_default_to_logical_names() {
        let config = ReconConfig::from_toml("[messages.columns]\nauthor_type = \"author\"\n").unwrap();
        assert_eq!(config.messages.columns.direction, "direction");
        assert_eq!(config.messages.columns.author_type, "author");
    }
}
