//! # Error Types
//!
//! Three layers of errors, each converted exactly once on the way out:
//!
//! - [`UpstreamError`] - produced by the upstream client (transport, HTTP status,
//!   payload contract).
//! - [`StreamError`] - produced by the stream translator while reading a
//!   streamed completion.
//! - [`ServiceError`] - what handlers return. The orchestrator wraps upstream and
//!   stream failures into [`ServiceError::Upstream`], and the HTTP layer maps each
//!   variant onto a status code.

#[cfg(feature = "server")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
#[cfg(feature = "server")]
use serde_json::json;
use thiserror::Error;

/// Failures talking to the upstream completions endpoint.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Network-level failure: timeout, refused connection, DNS, reset mid-body.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// The upstream answered with an error status.
    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The upstream answered 200 but the payload is not the expected shape.
    #[error("upstream protocol error: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Transport(format!("request timed out: {}", err))
        } else if err.is_connect() {
            UpstreamError::Transport(format!("connection failed: {}", err))
        } else if let Some(status) = err.status() {
            UpstreamError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            UpstreamError::Protocol(format!("undecodable response body: {}", err))
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// Failures while translating a streamed completion.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A transport failure that cut the stream short.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The connection closed before the `[DONE]` sentinel arrived.
    #[error("upstream stream ended without [DONE] after {fragments} fragment(s)")]
    AbnormalTermination { fragments: usize },

    /// One undecodable event line. Logged and skipped, never returned by the translator.
    #[error("malformed stream line ({reason}): {line}")]
    MalformedLine { line: String, reason: String },
}

/// # Service Error
///
/// The single error type handlers return. Every variant carries the detail string
/// that ends up in the `{"detail": ...}` response body.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing or empty required input (model, messages, input) or an unknown id.
    #[error("{0}")]
    NotFound(String),

    /// Request body could not be parsed or violates a parameter bound.
    #[error("{0}")]
    Unprocessable(String),

    /// The resource already exists.
    #[error("{0}")]
    Conflict(String),

    /// Any upstream or stream failure, re-wrapped once by the orchestrator.
    #[error("{detail}")]
    Upstream { detail: String },

    /// Failure inside the gateway itself (embedding backend, body framing).
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

impl From<UpstreamError> for ServiceError {
    fn from(err: UpstreamError) -> Self {
        ServiceError::Upstream {
            detail: err.to_string(),
        }
    }
}

impl From<StreamError> for ServiceError {
    fn from(err: StreamError) -> Self {
        ServiceError::Upstream {
            detail: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(format!("JSON error: {}", err))
    }
}

#[cfg(feature = "server")]
impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Conflict(_) => StatusCode::BAD_REQUEST,
            ServiceError::Upstream { .. } | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(feature = "server")]
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), detail = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), detail = %self, "request rejected");
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
