//! Error types for the registrar client.

use reqwest::StatusCode;
use thiserror::Error;

/// Client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The registrar rejected the request as malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A registration with the same ID already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No registration with the given ID.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other unexpected status.
    #[error("({status}) {message}")]
    Status { status: u16, message: String },

    /// The request could not be built from the arguments.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The endpoint is not a usable base URL.
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Maps an error response to the matching variant.
    #[must_use]
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::BAD_REQUEST => Self::BadRequest(message),
            StatusCode::CONFLICT => Self::Conflict(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            other => Self::Status {
                status: other.as_u16(),
                message,
            },
        }
    }

    /// Returns true if the registration does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
