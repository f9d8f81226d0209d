//! Error types for petmatch.

use thiserror::Error;

/// Result type alias using petmatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for petmatch operations.
///
/// The first five variants form the ingestion/matching taxonomy. Whether one of
/// them is fatal depends on where it happens: an embedding failure aborts a
/// search but only degrades an ingestion.
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected before any I/O (no images, malformed field, bad status).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Every image upload of a submission failed.
    #[error("Image storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The core record write failed.
    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    /// The embedding service failed or returned an unusable payload.
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// The candidate index query failed.
    #[error("Index query failed: {0}")]
    IndexQueryFailed(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record not found
    #[error("Record not found: {0}")]
    RecordNotFound(uuid::Uuid),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// An external call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Message suitable for showing to the person who made the request.
    ///
    /// Save failures and analysis failures read differently, and neither is
    /// ever worded like an empty search result.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidInput(msg) => msg.clone(),
            Error::StorageUnavailable(_) | Error::PersistenceFailed(_) => {
                "Could not save your report. Please try again.".to_string()
            }
            Error::EmbeddingFailed(_) | Error::IndexQueryFailed(_) => {
                "Could not analyze your photo, try again.".to_string()
            }
            Error::NotFound(msg) => msg.clone(),
            Error::RecordNotFound(id) => format!("Record {} not found", id),
            _ => "Internal server error".to_string(),
        }
    }
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
    use uuid::Uuid;

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("at least one image is required".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid input: at least one image is required"
        );
    }

    #[test]
    fn test_error_display_storage_unavailable() {
        let err = Error::StorageUnavailable("3 of 3 uploads failed".to_string());
        assert_eq!(
            err.to_string(),
            "Image storage unavailable: 3 of 3 uploads failed"
        );
    }

    #[test]
    fn test_error_display_record_not_found() {
        let id = Uuid::nil();
        let err = Error::RecordNotFound(id);
        assert_eq!(err.to_string(), format!("Record not found: {}", id));
    }

    #[test]
    fn test_user_message_separates_save_and_analysis_failures() {
        let save = Error::PersistenceFailed("connection reset".into()).user_message();
        let analyze = Error::EmbeddingFailed("502".into()).user_message();
        assert!(save.contains("save"));
        assert!(analyze.contains("analyze"));
        assert_ne!(save, analyze);
    }

    #[test]
    fn test_user_message_hides_internal_details() {
        let err = Error::Internal("stack overflow in worker 3".into());
        assert_eq!(err.user_message(), "Internal server error");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
