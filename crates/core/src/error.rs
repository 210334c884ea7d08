// crates/core/src/error.rs
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Errors raised when a request or stored value does not describe a valid task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("subject must not be empty")]
    EmptySubject,

    #[error("owner must not be empty")]
    EmptyOwner,

    #[error("targetCount must be at least 1, got {0}")]
    EmptyRange(i64),

    #[error("startOffset must not be negative, got {0}")]
    NegativeOffset(i64),

    #[error("requested range overflows the item id space")]
    RangeOverflow,

    #[error("unknown task kind: {0}")]
    UnknownKind(String),

    #[error("unknown task status: {0}")]
    UnknownStatus(String),
}

/// Coarse failure taxonomy shared by executor, controller and monitors.
///
/// Emitted as the `error_class` field on tracing events so the four kinds
/// of failure can be told apart in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network, timeout, rate limit: retried, then isolated to one item.
    Transient,
    /// Quota exhausted, validation: aborts the whole task.
    Terminal,
    /// Stale rows, concurrent creates, lost compare-and-swap, trailing writes.
    Coordination,
    /// A monitor's client went away.
    Transport,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Terminal => "terminal",
            Self::Coordination => "coordination",
            Self::Transport => "transport",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyRange(0);
        assert_eq!(err.to_string(), "targetCount must be at least 1, got 0");

        let err = ValidationError::UnknownKind("poems".to_string());
        assert!(err.to_string().contains("poems"));
    }

    #[test]
    fn test_error_class_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorClass::Coordination).unwrap();
        assert_eq!(json, "\"coordination\"");
        assert_eq!(ErrorClass::Transport.to_string(), "transport");
    }
}
