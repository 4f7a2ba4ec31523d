//! Error types for verdant-core.
//!
//! # Propagation policy
//!
//! | Error | Handling |
//! |-------|----------|
//! | [`Error::Transport`] | Retried internally with backoff; surfaced as a terminal alert only after the retry budget is exhausted |
//! | [`Error::CommandRejected`] | Surfaced to the caller synchronously, no retry |
//! | [`Error::Timeout`] | Command ack window or connect watchdog; surfaced once, no automatic retry |
//! | [`Error::NotConnected`] | Dispatch precondition failure, no network call is made |
//! | [`Error::UnknownDevice`] | Registry lookup miss, configuration problem |
//! | [`Error::InvalidConfig`] | Fix configuration and restart |
//!
//! Malformed telemetry is deliberately absent from this taxonomy: the
//! normalizer substitutes documented defaults instead of failing the
//! record. Nothing in the core is fatal to the process: exhausting
//! reconnection attempts parks the connection in a terminal `Failed`
//! state awaiting an explicit caller-triggered retry.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the Verdant client core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error
/// variants in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport-level failure (handshake, request or session error).
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation attempted while not connected to the backend.
    #[error("not connected to backend")]
    NotConnected,

    /// The backend refused to queue a command.
    #[error("command rejected: {reason}")]
    CommandRejected {
        /// Reason reported by the backend.
        reason: String,
    },

    /// Operation timed out.
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Device identifier not present in the registry.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// Plant name not bound to any registered device.
    #[error("unknown plant: {0}")]
    UnknownPlant(String),

    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a transport error from any displayable source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a command rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::CommandRejected {
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using verdant-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::transport("socket closed");
        assert_eq!(err.to_string(), "transport error: socket closed");

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "not connected to backend");

        let err = Error::rejected("pump busy");
        assert_eq!(err.to_string(), "command rejected: pump busy");

        let err = Error::timeout("connect", Duration::from_secs(20));
        assert!(err.to_string().contains("connect"));
        assert!(err.to_string().contains("20s"));

        let err = Error::UnknownDevice("planter-x".to_string());
        assert!(err.to_string().contains("planter-x"));
    }
}
