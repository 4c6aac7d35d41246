//! Error types for markly.

use thiserror::Error;

/// Result type alias using markly's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for markly operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Job state does not allow the requested operation
    #[error("Job error: {0}")]
    Job(String),

    /// Website analysis failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("job 7".to_string());
        assert_eq!(err.to_string(), "Not found: job 7");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("concurrency must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid input: concurrency must be at least 1"
        );
    }

    #[test]
    fn test_error_display_job() {
        let err = Error::Job("job already finished, cannot pause".to_string());
        assert_eq!(err.to_string(), "Job error: job already finished, cannot pause");
    }

    #[test]
    fn test_error_display_inference() {
        let err = Error::Inference("quota exceeded".to_string());
        assert_eq!(err.to_string(), "Inference error: quota exceeded");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_sqlx_error() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::Database(_)));
        assert!(err.to_string().starts_with("Database error:"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
