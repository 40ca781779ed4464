//! JSON-renderable wrapper: the `{"code", "message"}` envelope.

use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// Structured payload destined to become a JSON response body.
///
/// Constructed fresh for every error translation; also usable directly as a
/// handler return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JsonRender {
    code: i64,
    message: String,
}

impl ValueObject for JsonRender {}

impl JsonRender {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The envelope as a JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code,
            "message": self.message,
        })
    }

    /// Serialized body bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        // A struct of an integer and a string always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// `code` as a final HTTP status, when it can be one.
    ///
    /// Informational (1xx) codes cannot end a response and yield `None`.
    pub fn http_status(&self) -> Option<u16> {
        u16::try_from(self.code)
            .ok()
            .filter(|code| (200..=599).contains(code))
    }
}
