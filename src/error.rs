//! Error types for grid aggregation runs.

use thiserror::Error;

/// Errors surfaced by configuration, normalization and the storage collaborators.
///
/// Validation happens before the first row is classified; once classification
/// starts every row is processed unconditionally.
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// Corner ordering or coordinate range violated.
    #[error("Invalid boundary: {reason}")]
    InvalidBoundary { reason: String },

    /// A configuration value is out of range or malformed.
    #[error("Invalid configuration `{field}`: {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },

    /// No rows left after upstream filtering. Terminal, but not a failure.
    #[error("Nothing to aggregate: no event rows")]
    EmptyInput,

    #[error("Report ID {0} was not found for reuse")]
    ReportNotFound(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "toml")]
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

impl AggregatorError {
    pub(crate) fn boundary(reason: impl Into<String>) -> Self {
        Self::InvalidBoundary {
            reason: reason.into(),
        }
    }

    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            reason: reason.into(),
        }
    }

    /// True for the "nothing to aggregate" outcome.
    pub fn is_empty_input(&self) -> bool {
        matches!(self, Self::EmptyInput)
    }

    /// True for errors raised while validating configuration or the boundary.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidBoundary { .. } | Self::InvalidConfiguration { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
