//! Error types for the application
//!
//! Protocol failures (`NegotiationError`) stay a distinct variant so callers
//! can tell an illegal action apart from infrastructure trouble.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::negotiation::NegotiationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Negotiation(e) => {
                let status = match e {
                    NegotiationError::SelfAction => StatusCode::FORBIDDEN,
                    NegotiationError::InvalidTerms(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    NegotiationError::AlreadyInitiated
                    | NegotiationError::NotActionable(_)
                    | NegotiationError::ThreadClosed(_)
                    | NegotiationError::Conflict => StatusCode::CONFLICT,
                };
                (status, e.to_string())
            }
            AppError::NotFound(e) => (StatusCode::NOT_FOUND, e.clone()),
            AppError::BadRequest(e) => (StatusCode::BAD_REQUEST, e.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.clone())
            }
        };

        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
