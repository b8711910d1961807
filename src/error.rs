// Error types surfaced by the prediction pipeline
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failures that reach the HTTP client.
///
/// An unreachable or non-image `image_url` is not an error: the fetcher reports
/// it as [`crate::fetch::FetchOutcome::Unavailable`] and the request continues
/// in text-only mode.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request body was well-formed JSON but failed validation.
    #[error("{0}")]
    Validation(String),

    #[error("tokenization failed: {0}")]
    Tokenization(String),

    /// Shape mismatches and numerical errors from the model.
    #[error("{0}")]
    Inference(#[from] candle::Error),

    /// The blocking worker running inference panicked or was cancelled.
    #[error("inference worker failed: {0}")]
    Worker(String),
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorDetail {
            detail: self.to_string(),
        })
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(value: tokio::task::JoinError) -> Self {
        ServiceError::Worker(value.to_string())
    }
}
