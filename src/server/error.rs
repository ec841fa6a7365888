//! HTTP error taxonomy.
//!
//! Every handler error is converted here into a uniform
//! `{"success": false, "error": "..."}` body; no error crosses the HTTP
//! boundary unshaped. Internal errors are logged server-side and reach the
//! client as a generic message.

use crate::book_access::BookAccessError;
use crate::user::AuthFlowError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Permission(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Permission(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref err) = self {
            error!("Internal error serving request: {:#}", err);
        }
        let body = json!({
            "success": false,
            "error": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<AuthFlowError> for ApiError {
    fn from(err: AuthFlowError) -> Self {
        match err {
            AuthFlowError::Validation(message) => ApiError::Validation(message),
            AuthFlowError::InvalidCredentials => {
                ApiError::Auth("Invalid email or password".to_string())
            }
            AuthFlowError::Internal(err) => ApiError::Internal(err),
        }
    }
}

impl From<BookAccessError> for ApiError {
    fn from(err: BookAccessError) -> Self {
        match err {
            BookAccessError::UnknownUser => ApiError::Auth("Unknown user".to_string()),
            BookAccessError::UnknownBook => ApiError::NotFound("Unknown book".to_string()),
            BookAccessError::NotEntitled => {
                ApiError::Permission("You do not have access to this book".to_string())
            }
            BookAccessError::Internal(err) => ApiError::Internal(err),
        }
    }
}
