//! Error types.
//!
//! Two families, split by *when* they happen:
//!
//! - [`Error`] — setup and infrastructure failures: a bad socket address, a
//!   route that cannot be registered, a listener that cannot bind. These are
//!   returned to whoever builds the [`Router`](crate::Router) or starts the
//!   [`Server`](crate::Server).
//! - [`HandlerError`] — request-time failures raised by handlers and
//!   middlewares. The dispatcher translates them into a JSON error response.

use std::borrow::Cow;

use http::StatusCode;

use crate::method::Method;

/// Setup-time and infrastructure errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("unknown HTTP method `{0}`")]
    UnknownMethod(String),

    /// The method parses but is not one routes may be registered for.
    #[error("HTTP method {0} cannot be routed (allowed: GET, POST, PUT, DELETE, PATCH, OPTIONS)")]
    UnsupportedMethod(Method),

    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern {
        pattern: String,
        reason: Cow<'static, str>,
    },
}

/// A failure raised by a handler or middleware.
///
/// `Statused` errors carry the exact status to send back; everything else is
/// `Generic` and becomes `500 Internal Server Error`. Either way the client
/// sees only `{"Error": "<message>"}`.
///
/// ```rust
/// use vireo::{HandlerError, StatusCode};
///
/// let err = HandlerError::with_status(StatusCode::UNAUTHORIZED, "missing token");
/// assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
///
/// let err = HandlerError::new("database unreachable");
/// assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Generic(String),

    #[error("{message}")]
    Statused { status: StatusCode, message: String },
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Generic(message.into())
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Statused { status, message: message.into() }
    }

    /// The status this error is written with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Generic(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Statused { status, .. } => *status,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Generic(message) | Self::Statused { message, .. } => message,
        }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Generic(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Generic(format!("json: {e}"))
    }
}
