//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ocr::AcquisitionError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Acquisition(AcquisitionError::Io(e)) => {
                tracing::error!("Document unreadable: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "processing failed".to_string(),
                )
            }
            AppError::Acquisition(e) => {
                tracing::warn!("Text acquisition failed: {}", e);
                (StatusCode::UNPROCESSABLE_ENTITY, "missing_capability", e.to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "processing failed".to_string(),
                )
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "processing failed".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message, kind })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::BadRequest("no file provided".into()), StatusCode::BAD_REQUEST),
            (
                AppError::Acquisition(AcquisitionError::MissingCapability("install tesseract".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AppError::Acquisition(AcquisitionError::EmptyText), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
