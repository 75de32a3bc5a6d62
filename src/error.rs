//! Error types for the tenant gateway

use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type alias for the tenant gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Tenant gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Service-account key file missing or unparseable (startup-only, fatal)
    #[error("Key load error: {0}")]
    KeyLoad(String),

    /// Key material malformed or unusable under RS256 (startup-only, fatal)
    #[error("Key import error: {0}")]
    KeyImport(String),

    /// Token signing failed
    #[error("Signing error: {0}")]
    Signing(jsonwebtoken::errors::Error),

    /// Upstream connection failed
    #[error("Upstream connect error: {0}")]
    ProxyConnect(String),

    /// Upstream did not answer within its deadline
    #[error("Upstream timeout: {0}")]
    ProxyTimeout(String),

    /// Handler error carrying its own response status
    #[error("{message}")]
    Request {
        /// Status the boundary translates this error to
        status: StatusCode,
        /// Message surfaced as the response body
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a request error with an explicit response status
    pub fn request(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Request {
            status,
            message: message.into(),
        }
    }

    /// HTTP status this error translates to at the gateway boundary
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ProxyConnect(_) => StatusCode::BAD_GATEWAY,
            Self::ProxyTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Request { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The single error-translation point: every per-request error becomes a
/// response here. The body carries the error's message text — existing
/// callers depend on that contract (see DESIGN.md).
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!(status = %status, error = %self, "Request failed");
        (status, self.to_string()).into_response()
    }
}
