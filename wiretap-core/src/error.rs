//! Error types for debugger operations

use std::time::Duration;
use thiserror::Error;

/// Main error type for the debugger engine
#[derive(Debug, Error)]
pub enum DebuggerError {
    /// Control payload is missing a field or carries an unusable value
    #[error("Malformed rule: {reason}")]
    MalformedRule { reason: String },

    /// URL pattern failed to compile
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The control connection refused an outbound message
    #[error("Transport send failed: {0}")]
    TransportSend(String),

    /// A mandated sleep was cut short
    #[error("Interrupted while delaying call")]
    Interrupted,

    /// A timed wait on a reply slot elapsed
    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DebuggerError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRule {
            reason: reason.into(),
        }
    }

    /// Whether this error came from an unusable control payload
    pub fn is_malformed_rule(&self) -> bool {
        matches!(
            self,
            Self::MalformedRule { .. } | Self::InvalidPattern { .. } | Self::Serialization(_)
        )
    }
}
