//! Webhook error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::lifecycle::LifecycleError;

/// Webhook error type.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("missing or invalid signature")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("order {0} not found")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebhookError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebhookError::NotFound(_) => StatusCode::NOT_FOUND,
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LifecycleError> for WebhookError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(id) => WebhookError::NotFound(id),
            LifecycleError::Validation(e) => WebhookError::BadRequest(e.to_string()),
            other => WebhookError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal details stay in the logs.
        let body = match self {
            WebhookError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        (status, body).into_response()
    }
}
