//! Error types for keyword-scout
//!
//! Library errors are structured with thiserror. Most failure modes in the
//! planner degrade to a conservative default instead of surfacing here; the
//! variants below cover what actually crosses a function boundary.

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for keyword-scout operations
#[derive(Error, Debug)]
pub enum ScoutError {
    /// Persisted counters, weights or checkpoints could not be read or written
    #[error("State store unavailable: {0}")]
    StoreUnavailable(String),

    /// A query could not be rendered within platform limits
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for keyword-scout operations
pub type Result<T> = std::result::Result<T, ScoutError>;

impl From<anyhow::Error> for ScoutError {
    fn from(err: anyhow::Error) -> Self {
        ScoutError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScoutError::StoreUnavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "State store unavailable: connection refused");
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not a number");
        assert!(json_err.is_err());

        let scout_err: ScoutError = json_err.unwrap_err().into();
        assert!(matches!(scout_err, ScoutError::Serialization(_)));
    }

    #[test]
    fn test_config_error_wraps() {
        let err: ScoutError = ConfigError::ValidationError("bad margin".to_string()).into();
        assert!(err.to_string().contains("bad margin"));
    }
}
