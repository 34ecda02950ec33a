//! Error types for adapter operations

use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Main error type for the adapter
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Malformed or undersized message received from the bus
    #[error("Transport error: {0}")]
    Transport(String),

    /// The external ingester failed or produced no parsable result
    #[error("Load failure for version {version}: {reason}")]
    LoadFailure { version: u32, reason: String },

    /// The query endpoint never became reachable
    #[error("Query endpoint not reachable at {address} after {attempts} attempts")]
    EndpointStartTimeout { address: String, attempts: u32 },

    /// Malformed query text or the endpoint rejected the request
    #[error("Query execution failure: {0}")]
    QueryExecution(String),

    /// A task or command arrived outside of its allowed phase
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The declared task type is not one of the known kinds
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        AdapterError::QueryExecution(err.to_string())
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::QueryExecution(format!("invalid result document: {}", err))
    }
}

impl AdapterError {
    /// Short name of the error kind, used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::Transport(_) => "transport",
            AdapterError::LoadFailure { .. } => "load_failure",
            AdapterError::EndpointStartTimeout { .. } => "endpoint_start_timeout",
            AdapterError::QueryExecution(_) => "query_execution",
            AdapterError::ProtocolViolation(_) => "protocol_violation",
            AdapterError::UnknownTaskType(_) => "unknown_task_type",
            AdapterError::Config(_) => "config",
            AdapterError::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AdapterError::LoadFailure { version: 3, reason: "exit status 1".to_string() };
        assert_eq!(err.to_string(), "Load failure for version 3: exit status 1");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AdapterError = io.into();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_timeout_message_names_address() {
        let err = AdapterError::EndpointStartTimeout {
            address: "127.0.0.1:3000".to_string(),
            attempts: 100,
        };
        assert!(err.to_string().contains("127.0.0.1:3000"));
        assert!(err.to_string().contains("100"));
    }
}
