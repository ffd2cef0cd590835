//! Client-facing error taxonomy.
//!
//! Every failure in the request pipeline ends up as a [`RelayError`], which
//! renders as an [`ErrorEnvelope`] with a fixed status code. CORS headers are
//! attached by the outer layers in `http::cors`, so they are present on every
//! error response as well.

use std::time::Duration;

use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::upstream::UpstreamError;

/// Prefix on every human-readable failure message.
pub const FAILURE_MARKER: &str = "❌";

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    AuthError,
    QuotaExceeded,
    UpstreamError,
    TimeoutError,
    MethodNotAllowed,
    PayloadTooLarge,
    InternalError,
}

/// JSON body of every failed response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub text: String,
    #[serde(rename = "error")]
    pub kind: ErrorKind,
}

/// Relay error types.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The request body could not be turned into a chat request.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The caller presented no credentials at all.
    #[error("Access denied: {0}")]
    Unauthorized(String),

    /// The caller presented credentials that matched nothing.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Daily request limit reached.
    #[error("{0}")]
    QuotaExceeded(String),

    /// The upstream answered with an error or could not be reached.
    #[error("AI service temporarily unavailable: {message}")]
    Upstream {
        status: Option<StatusCode>,
        message: String,
    },

    /// The upstream did not answer before the deadline.
    #[error("AI service did not respond within {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Unsupported request method: {0} (allowed: GET, POST, OPTIONS)")]
    MethodNotAllowed(Method),

    /// Request body over the configured limit, in bytes.
    #[error("Request body exceeds the {0} byte limit")]
    PayloadTooLarge(usize),

    /// Anything else. The detail is logged, never sent.
    #[error("Internal server error")]
    Internal(String),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Validation(_) => ErrorKind::ValidationError,
            RelayError::Unauthorized(_) | RelayError::Forbidden(_) => ErrorKind::AuthError,
            RelayError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            RelayError::Upstream { .. } => ErrorKind::UpstreamError,
            RelayError::Timeout(_) => ErrorKind::TimeoutError,
            RelayError::MethodNotAllowed(_) => ErrorKind::MethodNotAllowed,
            RelayError::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            RelayError::Internal(_) => ErrorKind::InternalError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RelayError::Forbidden(_) => StatusCode::FORBIDDEN,
            RelayError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            RelayError::Upstream { status, .. } => status
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            RelayError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            RelayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            text: format!("{} {}", FAILURE_MARKER, self),
            kind: self.kind(),
        }
    }

    /// The envelope used when a request body is not a usable chat payload.
    pub fn missing_message() -> Self {
        RelayError::Validation("missing required field 'message'".into())
    }
}

impl From<UpstreamError> for RelayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::MissingCredential => {
                RelayError::Internal("upstream credential is not configured".into())
            }
            UpstreamError::Timeout(after) => RelayError::Timeout(after),
            UpstreamError::Status { status, .. } => RelayError::Upstream {
                status: Some(status),
                message: err.to_string(),
            },
            UpstreamError::Transport(ref source) => {
                tracing::warn!(error = %source, "Upstream unreachable");
                RelayError::Upstream {
                    status: None,
                    message: "could not reach the AI service".into(),
                }
            }
            UpstreamError::Decode(_) => RelayError::Upstream {
                status: None,
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            RelayError::Internal(detail) => {
                tracing::error!(detail = %detail, "Request failed with internal error");
            }
            RelayError::Upstream { .. } | RelayError::Timeout(_) => {
                tracing::warn!(status = %status, error = %self, "Upstream failure");
            }
            _ => {
                tracing::debug!(status = %status, error = %self, "Request rejected");
            }
        }
        (status, Json(self.envelope())).into_response()
    }
}
