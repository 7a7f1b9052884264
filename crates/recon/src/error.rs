use thiserror::Error;

use crate::model::FeedKind;

/// Run-level failures. Record-level problems never show up here; they are
/// carried as [`crate::model::Violation`] values instead.
#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (negative window, bad threshold, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// An input feed is not a well-formed collection of flat records.
    #[error("{feed} feed is malformed: {reason}")]
    Structural { feed: FeedKind, reason: String },
}

impl ReconError {
    pub fn structural(feed: FeedKind, reason: impl Into<String>) -> Self {
        Self::Structural {
            feed,
            reason: reason.into(),
        }
    }

    /// True for errors raised before any record was looked at.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::ConfigParse(_) | Self::ConfigValidation(_))
    }
}
