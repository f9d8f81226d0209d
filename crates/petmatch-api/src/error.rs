//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Error returned by every handler. Serialized as `{"error": message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<petmatch_core::Error> for ApiError {
    fn from(err: petmatch_core::Error) -> Self {
        use petmatch_core::Error;

        let message = err.user_message();
        match &err {
            Error::InvalidInput(_) => ApiError::BadRequest(message),
            Error::NotFound(_) | Error::RecordNotFound(_) => ApiError::NotFound(message),
            Error::StorageUnavailable(_) => {
                tracing::error!(error = %err, "Image storage unavailable");
                ApiError::ServiceUnavailable(message)
            }
            Error::EmbeddingFailed(_) | Error::IndexQueryFailed(_) => {
                tracing::error!(error = %err, "Photo analysis failed");
                ApiError::BadGateway(message)
            }
            _ => {
                tracing::error!(error = %err, "Request failed");
                ApiError::Internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
