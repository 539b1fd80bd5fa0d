//! Error types for AgentDesk
//!
//! This module defines the error taxonomy shared by the session core,
//! the streaming channel and the REST clients, using `thiserror` for
//! ergonomic error handling.

use thiserror::Error;

/// Main error type for AgentDesk operations
///
/// Session-level failures are split by how the caller must react:
/// configuration and validation errors leave the session untouched,
/// channel errors move the session into its failed phase.
#[derive(Error, Debug)]
pub enum AgentDeskError {
    /// Unknown agent identifier or invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport or backend failure reported by the streaming channel
    #[error("Channel error: {0}")]
    Channel(String),

    /// Input rejected before anything was sent (file type, empty choice)
    #[error("Validation error: {0}")]
    Validation(String),

    /// REST service answered with a failure
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code returned by the service
        status: u16,
        /// Human-readable message taken from the response
        message: String,
    },

    /// An exchange is already submitting or streaming
    #[error("An exchange is already in flight for this session")]
    SessionBusy,

    /// Free-text submission while the backend waits for a choice
    #[error("A selection is pending; resolve it before sending new input")]
    SelectionPending,

    /// Selection resolution requested with nothing pending
    #[error("There is no pending selection to resolve")]
    NoPendingSelection,

    /// Cancellation requested with no exchange in flight
    #[error("Nothing to cancel: no exchange is in flight")]
    NotCancellable,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias for AgentDesk operations
///
/// Uses `anyhow::Error` so call sites can attach context; the typed
/// [`AgentDeskError`] is recovered with `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

/// Returns the typed error behind an `anyhow::Error`, if there is one.
pub fn kind_of(err: &anyhow::Error) -> Option<&AgentDeskError> {
    err.downcast_ref::<AgentDeskError>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let error = AgentDeskError::Configuration("unknown agent 'ghost'".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: unknown agent 'ghost'"
        );
    }

    #[test]
    fn test_channel_error_display() {
        let error = AgentDeskError::Channel("connection reset".to_string());
        assert_eq!(error.to_string(), "Channel error: connection reset");
    }

    #[test]
    fn test_api_error_display() {
        let error = AgentDeskError::Api {
            status: 400,
            message: "Only .srt files are allowed".to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("HTTP 400"));
        assert!(s.contains("Only .srt files are allowed"));
    }

    #[test]
    fn test_kind_of_recovers_typed_error() {
        let err: anyhow::Error = AgentDeskError::SessionBusy.into();
        assert!(matches!(kind_of(&err), Some(AgentDeskError::SessionBusy)));
    }

    #[test]
    fn test_kind_of_returns_none_for_foreign_errors() {
        let err = anyhow::anyhow!("plain message");
        assert!(kind_of(&err).is_none());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: AgentDeskError = json_error.into();
        assert!(matches!(error, AgentDeskError::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AgentDeskError>();
    }
}
