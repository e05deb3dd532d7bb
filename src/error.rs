//! The Coordinator's error taxonomy.
//!
//! Every fallible operation returns a [`CoordinatorError`] variant. Variants
//! map 1:1 onto the kinds in the upload contract and carry their own HTTP
//! status code via [`IntoResponse`], so handlers never hand-pick a status.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown session")]
    NotFound,

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("scheduler overloaded, retry after {retry_after_secs}s")]
    Overloaded { retry_after_secs: u64 },

    #[error("storage exhausted")]
    Exhausted,

    #[error("write timed out")]
    Timeout,

    #[error("storage I/O failure: {0}")]
    IOFailure(String),

    #[error("session was cancelled")]
    Cancelled,

    #[error("conflicting declared fields: {0}")]
    Conflict(String),
}

impl CoordinatorError {
    /// The stable, machine-readable kind string surfaced to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorError::BadRequest(_) => "BadRequest",
            CoordinatorError::NotFound => "NotFound",
            CoordinatorError::RateLimited { .. } => "RateLimited",
            CoordinatorError::Overloaded { .. } => "Overloaded",
            CoordinatorError::Exhausted => "Exhausted",
            CoordinatorError::Timeout => "Timeout",
            CoordinatorError::IOFailure(_) => "IOFailure",
            CoordinatorError::Cancelled => "Cancelled",
            CoordinatorError::Conflict(_) => "Conflict",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            CoordinatorError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::NotFound => StatusCode::NOT_FOUND,
            CoordinatorError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            CoordinatorError::Overloaded { .. } => StatusCode::TOO_MANY_REQUESTS,
            CoordinatorError::Exhausted => StatusCode::INSUFFICIENT_STORAGE,
            CoordinatorError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            CoordinatorError::IOFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoordinatorError::Cancelled => StatusCode::CONFLICT,
            CoordinatorError::Conflict(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            CoordinatorError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            CoordinatorError::Overloaded { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self.retry_after_secs();

        tracing::warn!(kind = self.kind(), error = %self, "request failed");

        let body = Json(ErrorBody {
            ok: false,
            error: ErrorDetail {
                kind: self.kind(),
                message: self.to_string(),
            },
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
