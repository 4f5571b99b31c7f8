// dermasense/core/api/src/error.rs

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::types::response::ErrorBody;

/// Errors surfaced to API clients.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("File must be an image")]
    NotAnImage,

    #[error("Unable to decode image")]
    UndecodableImage,

    #[error("Missing upload field '{0}'")]
    MissingField(&'static str),

    #[error("Malformed upload: {0}")]
    Multipart(String),

    #[error("Upload too large")]
    PayloadTooLarge,

    #[error("Inference failed")]
    Inference(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotAnImage | ApiError::UndecodableImage | ApiError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::Multipart(e.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
