//! Top-level error types for the solar telemetry publisher
//!
//! Each layer owns its own error enum (`ConfigError`, `MqttError`); this module
//! gathers them into the error surfaced at the process boundary.

use crate::config::ConfigError;
use crate::transport::mqtt::MqttError;
use thiserror::Error;

/// Main error type for publisher operations
#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] MqttError),

    #[error("Reconnect exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PublisherError {
    /// Create reconnect exhausted error
    pub fn reconnect_exhausted(attempts: u32) -> Self {
        Self::ReconnectExhausted { attempts }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type for publisher operations
pub type PublisherResult<T> = Result<T, PublisherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_exhausted_constructor() {
        let error = PublisherError::reconnect_exhausted(12);
        assert!(matches!(
            error,
            PublisherError::ReconnectExhausted { attempts: 12 }
        ));
        assert_eq!(error.to_string(), "Reconnect exhausted after 12 attempts");
    }

    #[test]
    fn test_internal_constructor() {
        let error = PublisherError::internal("unexpected state");
        assert_eq!(error.to_string(), "Internal error: unexpected state");
    }

    #[test]
    fn test_config_error_conversion() {
        let error: PublisherError = ConfigError::InvalidConfig("bad".to_string()).into();
        assert!(matches!(error, PublisherError::Config(_)));
    }

    #[test]
    fn test_connection_error_conversion() {
        let error: PublisherError = MqttError::ConnectTimeout { timeout_secs: 10 }.into();
        assert!(matches!(error, PublisherError::Connection(_)));
    }
}
