//! Error type shared by every pipeline stage.
//!
//! Only conditions that abort a stage live here. Per-line skips, interval
//! statuses and sentinel results are data, not errors.

use thiserror::Error;

/// Errors raised by the power pipeline.
#[derive(Debug, Error)]
pub enum PowerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A raw-sample line matched the sample layout but a field is not a number.
    #[error("line {line}: cannot parse {field} from '{value}'")]
    NumberFormat {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("invalid raw power header: {reason}")]
    Header { reason: String },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PowerError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub(crate) fn header(reason: impl Into<String>) -> Self {
        Self::Header {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, PowerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_format_message_names_line_and_value() {
        let e = PowerError::NumberFormat {
            line: 7,
            field: "current",
            value: "1.2.3".to_string(),
        };
        assert_eq!(e.to_string(), "line 7: cannot parse current from '1.2.3'");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: PowerError = io.into();
        assert!(matches!(e, PowerError::Io(_)));
    }
}
