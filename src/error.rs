//! Error types for the hub client

use thiserror::Error;

/// Errors that can occur when using the hub client
#[derive(Error, Debug)]
pub enum HubError {
    /// Bad address or options, detected before any connection exists
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection to the hub failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The hub refused the protocol handshake
    #[error("Handshake rejected: {0}")]
    Handshake(String),

    /// Transport-level failure (stream reset, write error, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Not currently connected to the hub
    #[error("Not connected")]
    NotConnected,

    /// The transport dropped before the hub answered
    #[error("Connection lost before a response arrived")]
    ConnectionLost,

    /// The call was cancelled by a local disconnect
    #[error("Cancelled")]
    Cancelled,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// The hub reported a fault for an awaited invocation
    #[error("Invocation failed: {0}")]
    Invocation(String),

    /// Failed to serialize/deserialize a payload
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation is not supported by this client
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
}

impl HubError {
    /// Whether a connection attempt that failed with this error may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HubError::Connection(_) | HubError::Transport(_) | HubError::Timeout
        )
    }
}

/// Result type for hub operations
pub type Result<T> = std::result::Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_configuration() {
        let err = HubError::Configuration("relative URL without a base".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: relative URL without a base"
        );
    }

    #[test]
    fn test_error_display_connection() {
        let err = HubError::Connection("failed to connect".to_string());
        assert_eq!(err.to_string(), "Connection error: failed to connect");
    }

    #[test]
    fn test_error_display_handshake() {
        let err = HubError::Handshake("unsupported protocol".to_string());
        assert_eq!(err.to_string(), "Handshake rejected: unsupported protocol");
    }

    #[test]
    fn test_error_display_invocation() {
        let err = HubError::Invocation("method not found".to_string());
        assert_eq!(err.to_string(), "Invocation failed: method not found");
    }

    #[test]
    fn test_error_display_not_implemented() {
        let err = HubError::NotImplemented("SendToAll");
        assert_eq!(err.to_string(), "Not implemented: SendToAll");
    }

    #[test]
    fn test_error_display_unit_variants() {
        assert_eq!(HubError::NotConnected.to_string(), "Not connected");
        assert_eq!(HubError::Cancelled.to_string(), "Cancelled");
        assert_eq!(HubError::Timeout.to_string(), "Operation timed out");
        assert_eq!(
            HubError::ConnectionLost.to_string(),
            "Connection lost before a response arrived"
        );
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<String>("not valid json").unwrap_err();
        let err: HubError = json_err.into();
        assert!(matches!(err, HubError::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error:"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(HubError::Connection("refused".into()).is_retryable());
        assert!(HubError::Transport("reset".into()).is_retryable());
        assert!(HubError::Timeout.is_retryable());

        assert!(!HubError::Handshake("bad version".into()).is_retryable());
        assert!(!HubError::Configuration("bad url".into()).is_retryable());
        assert!(!HubError::Cancelled.is_retryable());
    }
}
