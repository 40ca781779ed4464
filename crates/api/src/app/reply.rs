//! Handler return values and the response normalizer.
//!
//! A handler returns a [`Reply`]: either a [`HandlerReturn`] or a
//! [`HandlerError`]. `HandlerReturn` is the tagged form of every shape a
//! handler may give back: a bare body, `(body, status)`, `(body, headers)`,
//! `(body, status, headers)`, a canonical [`ApiResponse`], or a foreign axum
//! [`Response`]. [`make_response`] turns it into exactly one canonical response.

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use restkit_core::JsonRender;

use crate::app::errors::HandlerError;
use crate::app::response::{ApiResponse, Headers, Payload, Status, StatusLine};
use crate::middleware::Deferred;

/// What every restkit handler returns.
pub type Reply = Result<HandlerReturn, HandlerError>;

/// The handler returned nothing.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("view function did not return a response")]
pub struct MissingResponse;

/// The body position of a handler return value.
#[derive(Debug)]
pub enum ReturnValue {
    Payload(Payload),
    Response(ApiResponse),
    /// A response built by something other than restkit.
    Foreign(Response),
}

/// The second position of a tuple return: a status, or headers given in
/// place of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOrHeaders {
    Status(Status),
    Headers(Headers),
}

/// Values usable in the body position.
pub trait IntoReturnValue {
    /// `None` is the absence sentinel.
    fn into_return_value(self) -> Option<ReturnValue>;
}

/// Values usable in the second tuple position.
pub trait IntoStatusOrHeaders {
    fn into_status_or_headers(self) -> Option<StatusOrHeaders>;
}

/// Values usable in the third tuple position.
pub trait IntoHeaders {
    fn into_headers(self) -> Option<Headers>;
}

macro_rules! payload_return_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoReturnValue for $ty {
                fn into_return_value(self) -> Option<ReturnValue> {
                    Some(ReturnValue::Payload(Payload::from(self)))
                }
            }
        )*
    };
}

payload_return_value!(JsonRender, String, &str, Bytes, Vec<u8>, serde_json::Value);

impl IntoReturnValue for Payload {
    fn into_return_value(self) -> Option<ReturnValue> {
        Some(ReturnValue::Payload(self))
    }
}

impl IntoReturnValue for ApiResponse {
    fn into_return_value(self) -> Option<ReturnValue> {
        Some(ReturnValue::Response(self))
    }
}

impl IntoReturnValue for Response {
    fn into_return_value(self) -> Option<ReturnValue> {
        Some(ReturnValue::Foreign(self))
    }
}

impl IntoReturnValue for ReturnValue {
    fn into_return_value(self) -> Option<ReturnValue> {
        Some(self)
    }
}

impl<T: IntoReturnValue> IntoReturnValue for Option<T> {
    fn into_return_value(self) -> Option<ReturnValue> {
        self.and_then(IntoReturnValue::into_return_value)
    }
}

macro_rules! status_or_headers {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl IntoStatusOrHeaders for $ty {
                fn into_status_or_headers(self) -> Option<StatusOrHeaders> {
                    Some(StatusOrHeaders::$variant(self.into()))
                }
            }
        )*
    };
}

status_or_headers!(
    Status => Status,
    StatusCode => Status,
    StatusLine => Status,
    Headers => Headers,
    HeaderMap => Headers,
);

impl<const N: usize> IntoStatusOrHeaders for [(HeaderName, HeaderValue); N] {
    fn into_status_or_headers(self) -> Option<StatusOrHeaders> {
        Some(StatusOrHeaders::Headers(self.into()))
    }
}

impl IntoStatusOrHeaders for StatusOrHeaders {
    fn into_status_or_headers(self) -> Option<StatusOrHeaders> {
        Some(self)
    }
}

impl<T: IntoStatusOrHeaders> IntoStatusOrHeaders for Option<T> {
    fn into_status_or_headers(self) -> Option<StatusOrHeaders> {
        self.and_then(IntoStatusOrHeaders::into_status_or_headers)
    }
}

impl IntoHeaders for Headers {
    fn into_headers(self) -> Option<Headers> {
        Some(self)
    }
}

impl IntoHeaders for HeaderMap {
    fn into_headers(self) -> Option<Headers> {
        Some(self.into())
    }
}

impl<const N: usize> IntoHeaders for [(HeaderName, HeaderValue); N] {
    fn into_headers(self) -> Option<Headers> {
        Some(self.into())
    }
}

impl<T: IntoHeaders> IntoHeaders for Option<T> {
    fn into_headers(self) -> Option<Headers> {
        self.and_then(IntoHeaders::into_headers)
    }
}

/// A handler's return value, positionally: `(body, status_or_headers, headers)`.
#[derive(Debug, Default)]
pub struct HandlerReturn {
    value: Option<ReturnValue>,
    status_or_headers: Option<StatusOrHeaders>,
    headers: Option<Headers>,
}

impl HandlerReturn {
    /// The absence sentinel: normalizing it fails with [`MissingResponse`].
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(value: impl IntoReturnValue) -> Self {
        Self {
            value: value.into_return_value(),
            ..Self::default()
        }
    }

    /// Fill the second position.
    pub fn with_status(mut self, status: impl IntoStatusOrHeaders) -> Self {
        self.status_or_headers = status.into_status_or_headers();
        self
    }

    /// Fill the third position.
    pub fn with_headers(mut self, headers: impl IntoHeaders) -> Self {
        self.headers = headers.into_headers();
        self
    }

    pub fn is_missing(&self) -> bool {
        self.value.is_none()
    }
}

macro_rules! handler_return_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for HandlerReturn {
                fn from(value: $ty) -> Self {
                    HandlerReturn::new(value)
                }
            }
        )*
    };
}

handler_return_from!(
    JsonRender,
    String,
    &str,
    Bytes,
    Vec<u8>,
    serde_json::Value,
    Payload,
    ApiResponse,
    Response,
    ReturnValue,
);

impl<T: IntoReturnValue> From<Option<T>> for HandlerReturn {
    fn from(value: Option<T>) -> Self {
        HandlerReturn::new(value)
    }
}

impl<B: IntoReturnValue> From<(B,)> for HandlerReturn {
    fn from((body,): (B,)) -> Self {
        HandlerReturn::new(body)
    }
}

impl<B, S> From<(B, S)> for HandlerReturn
where
    B: IntoReturnValue,
    S: IntoStatusOrHeaders,
{
    fn from((body, status_or_headers): (B, S)) -> Self {
        HandlerReturn::new(body).with_status(status_or_headers)
    }
}

impl<B, S, H> From<(B, S, H)> for HandlerReturn
where
    B: IntoReturnValue,
    S: IntoStatusOrHeaders,
    H: IntoHeaders,
{
    fn from((body, status_or_headers, headers): (B, S, H)) -> Self {
        HandlerReturn::new(body)
            .with_status(status_or_headers)
            .with_headers(headers)
    }
}

impl IntoResponse for HandlerReturn {
    fn into_response(self) -> Response {
        Deferred::respond(Ok(self))
    }
}

/// Convert any accepted handler return shape into one canonical response.
///
/// Status and headers given positionally are applied after the body has been
/// turned into a response, so they always win over body-driven defaults.
pub fn make_response(rv: HandlerReturn) -> Result<ApiResponse, MissingResponse> {
    let HandlerReturn {
        value,
        status_or_headers,
        headers,
    } = rv;

    let value = value.ok_or(MissingResponse)?;

    // Headers in the second position displace both the status and the third.
    let (mut status, mut headers) = match status_or_headers {
        Some(StatusOrHeaders::Headers(h)) => (None, Some(h)),
        Some(StatusOrHeaders::Status(s)) => (Some(s), headers),
        None => (None, headers),
    };

    let mut response = match value {
        ReturnValue::Response(response) => response,
        ReturnValue::Payload(payload) => ApiResponse::with_parts(payload, headers.take(), status.take()),
        ReturnValue::Foreign(response) => ApiResponse::force_type(response),
    };

    if let Some(status) = status {
        response.set_status(status);
    }
    if let Some(headers) = headers.filter(|h| !h.is_empty()) {
        response.extend_headers(headers);
    }

    Ok(response)
}
