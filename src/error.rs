//! Error types for the recategorization and aggregation pipeline.

use std::io;

use thiserror::Error;

/// Errors raised by the library.
#[derive(Debug, Error)]
pub enum DashError {
    /// A category rule expression failed to parse.
    #[error("rule '{rule}' is malformed ({message}): {text}")]
    RuleSyntax {
        rule: String,
        text: String,
        message: String,
    },

    /// Input data violates an assumed invariant.
    #[error("data consistency error: {message}{}", format_ids(.ids))]
    DataConsistency { message: String, ids: Vec<String> },

    /// A value column cannot be summed.
    #[error("column '{column}' holds a non-numeric value: '{value}'")]
    TypeConsistency { column: String, value: String },

    /// A rule references a tag that never occurs in the data.
    #[error("rule '{rule}' references unknown tag '{tag}'")]
    UnknownTag { rule: String, tag: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, DashError>;

impl DashError {
    /// Shorthand for a consistency error without offending ids.
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::DataConsistency {
            message: message.into(),
            ids: Vec::new(),
        }
    }

    /// Shorthand for a consistency error listing the offending ids.
    pub fn consistency_with_ids(message: impl Into<String>, ids: Vec<String>) -> Self {
        Self::DataConsistency {
            message: message.into(),
            ids,
        }
    }

    /// Error raised when a required column is absent.
    pub fn missing_column(column: &str) -> Self {
        Self::consistency(format!("required column '{}' is missing", column))
    }
}

fn format_ids(ids: &[String]) -> String {
    const SHOWN: usize = 10;

    if ids.is_empty() {
        return String::new();
    }

    let mut listed = ids
        .iter()
        .take(SHOWN)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if ids.len() > SHOWN {
        listed.push_str(&format!(", ... ({} total)", ids.len()));
    }
    format!(" (ids: {})", listed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistency_message_lists_ids() {
        let err = DashError::consistency_with_ids(
            "duplicate tag",
            vec!["7".to_string(), "9".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "data consistency error: duplicate tag (ids: 7, 9)"
        );
    }

    #[test]
    fn test_consistency_message_truncates_long_id_lists() {
        let ids = (0..25).map(|i| i.to_string()).collect();
        let message = DashError::consistency_with_ids("bad", ids).to_string();
        assert!(message.contains("(25 total)"));
        assert!(!message.contains("24"));
    }

    #[test]
    fn test_missing_column() {
        let err = DashError::missing_column("Year");
        assert!(err.to_string().contains("'Year'"));
    }
}
