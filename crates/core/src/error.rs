//! Domain API error model.

use thiserror::Error;

use crate::render::JsonRender;

/// Result type used by handler code that fails with domain API errors.
pub type ApiResult<T> = Result<T, ApiError>;

/// Message used when an error is raised without a usable message.
pub const UNKNOWN_ERROR_MESSAGE: &str = "unknown error";

/// Domain-level API error.
///
/// Raised by handler code for expected, recoverable failures. The exception
/// router always turns it into a `{"code", "message"}` JSON envelope; it never
/// propagates past the router.
///
/// `code` is an application code. When it happens to be a valid HTTP status
/// the rendered response uses it as the status as well.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("api error {code}: {message}")]
pub struct ApiError {
    code: i64,
    message: String,
}

impl ApiError {
    /// Build an error; a blank message falls back to [`UNKNOWN_ERROR_MESSAGE`].
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            UNKNOWN_ERROR_MESSAGE.to_string()
        } else {
            message
        };
        Self { code, message }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(400, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(401, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(403, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(404, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(409, msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(422, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(500, msg)
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The JSON envelope this error is rendered as.
    pub fn render(&self) -> JsonRender {
        JsonRender::new(self.code, self.message.clone())
    }
}

impl From<ApiError> for JsonRender {
    fn from(err: ApiError) -> Self {
        JsonRender::new(err.code, err.message)
    }
}
