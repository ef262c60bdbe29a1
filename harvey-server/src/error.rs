//! Top-level HTTP error mapping: request
//! validation failures are 4xx, everything else defaults to 5xx.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use harvey_blob::BlobError;
use harvey_types::RequestError;

/// Error body shape every non-2xx response uses.
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

/// Errors an HTTP handler can fail with.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body failed validation or schema matching.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A blob lookup/store operation failed.
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// Something internal went wrong that isn't the caller's fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Request(_) => StatusCode::BAD_REQUEST,
            ApiError::Blob(BlobError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Blob(BlobError::TooLarge { .. }) | ApiError::Blob(BlobError::UnsupportedMimeType(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Blob(BlobError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
