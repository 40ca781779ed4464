//! The canonical response object and the status/header values that can
//! override it.

use std::fmt;
use std::str::FromStr;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::ext::ReasonPhrase;
use thiserror::Error;

use restkit_core::JsonRender;

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
const CONTENT_TYPE_BYTES: &str = "application/octet-stream";

/// A status string that could not be turned into a status line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid status line: {0:?}")]
pub struct InvalidStatus(pub String);

/// A header name or value that is not valid on the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid header {name:?}: {value:?}")]
pub struct InvalidHeader {
    pub name: String,
    pub value: String,
}

/// A status code plus an optional custom reason phrase.
///
/// Parsing follows the usual status-string rules: `"201"` is code 201 with
/// its canonical reason, `"418 I'm a teapot"` is code 418 with a custom one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    code: StatusCode,
    reason: Option<String>,
}

impl StatusLine {
    pub fn parse(line: &str) -> Result<Self, InvalidStatus> {
        let line = line.trim();
        let (code, reason) = match line.split_once(char::is_whitespace) {
            Some((code, reason)) => (code, Some(reason.trim())),
            None => (line, None),
        };

        let code = code
            .parse::<u16>()
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| InvalidStatus(line.to_string()))?;

        let reason = reason.filter(|r| !r.is_empty());
        if let Some(reason) = reason {
            // Reason phrases are HTAB / SP / VCHAR / obs-text.
            let valid = reason
                .bytes()
                .all(|b| b == b'\t' || b == b' ' || (0x21..=0x7e).contains(&b) || b >= 0x80);
            if !valid {
                return Err(InvalidStatus(line.to_string()));
            }
        }

        Ok(Self {
            code,
            reason: reason.map(str::to_string),
        })
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// The custom reason phrase, if one was given.
    pub fn custom_reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// The reason phrase that will go on the wire.
    pub fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .or_else(|| self.code.canonical_reason())
            .unwrap_or("")
    }
}

impl FromStr for StatusLine {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code.as_u16(), self.reason())
    }
}

/// An explicit status override: a bare code, or a full status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Code(StatusCode),
    Line(StatusLine),
}

impl From<StatusCode> for Status {
    fn from(code: StatusCode) -> Self {
        Status::Code(code)
    }
}

impl From<StatusLine> for Status {
    fn from(line: StatusLine) -> Self {
        Status::Line(line)
    }
}

impl TryFrom<u16> for Status {
    type Error = InvalidStatus;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        StatusCode::from_u16(code)
            .map(Status::Code)
            .map_err(|_| InvalidStatus(code.to_string()))
    }
}

impl TryFrom<&str> for Status {
    type Error = InvalidStatus;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        StatusLine::parse(line).map(Status::Line)
    }
}

/// Ordered header pairs. Duplicate names are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(HeaderName, HeaderValue)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.0.push((name, value));
    }

    /// Add a pair from strings (builder style).
    pub fn with(mut self, name: &str, value: &str) -> Result<Self, InvalidHeader> {
        let (name, value) = parse_pair(name, value)?;
        self.push(name, value);
        Ok(self)
    }

    /// Build from string pairs, failing on the first invalid one.
    pub fn try_from_pairs<I, K, V>(pairs: I) -> Result<Self, InvalidHeader>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        pairs
            .into_iter()
            .map(|(k, v)| parse_pair(k.as_ref(), v.as_ref()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.0.iter().map(|(k, v)| (k, v))
    }
}

fn parse_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), InvalidHeader> {
    let invalid = || InvalidHeader {
        name: name.to_string(),
        value: value.to_string(),
    };
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
    let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
    Ok((header_name, header_value))
}

impl FromIterator<(HeaderName, HeaderValue)> for Headers {
    fn from_iter<T: IntoIterator<Item = (HeaderName, HeaderValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Headers {
    type Item = (HeaderName, HeaderValue);
    type IntoIter = std::vec::IntoIter<(HeaderName, HeaderValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<const N: usize> From<[(HeaderName, HeaderValue); N]> for Headers {
    fn from(pairs: [(HeaderName, HeaderValue); N]) -> Self {
        Self(pairs.into())
    }
}

impl From<HeaderMap> for Headers {
    fn from(map: HeaderMap) -> Self {
        let mut headers = Headers::new();
        let mut current: Option<HeaderName> = None;
        // `None` names repeat the previous name.
        for (name, value) in map {
            if let Some(name) = name {
                current = Some(name);
            }
            if let Some(name) = &current {
                headers.push(name.clone(), value);
            }
        }
        headers
    }
}

/// A body that the canonical response can be constructed from directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Render(JsonRender),
    Text(String),
    Bytes(Bytes),
    /// Ordered sequences and key/value mappings. Scalars are accepted too;
    /// `null` is sent as the JSON body `null`, it never means "no value".
    Json(serde_json::Value),
}

impl Payload {
    fn content_type(&self) -> &'static str {
        match self {
            Payload::Render(_) | Payload::Json(_) => CONTENT_TYPE_JSON,
            Payload::Text(_) => CONTENT_TYPE_TEXT,
            Payload::Bytes(_) => CONTENT_TYPE_BYTES,
        }
    }

    fn default_status(&self) -> StatusCode {
        match self {
            Payload::Render(render) => render
                .http_status()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::OK),
            _ => StatusCode::OK,
        }
    }

    fn into_bytes(self) -> Bytes {
        match self {
            Payload::Render(render) => Bytes::from(render.to_vec()),
            Payload::Text(text) => Bytes::from(text),
            Payload::Bytes(bytes) => bytes,
            // `Value` maps only have string keys, so this cannot fail.
            Payload::Json(value) => Bytes::from(serde_json::to_vec(&value).unwrap_or_default()),
        }
    }
}

impl From<JsonRender> for Payload {
    fn from(render: JsonRender) -> Self {
        Payload::Render(render)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(bytes))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

/// Body of the canonical response.
#[derive(Debug)]
pub enum ResponseBody {
    /// Fully materialized bytes.
    Full(Bytes),
    /// Opaque body adopted from a foreign response; never reinterpreted.
    Streaming(Body),
}

/// The canonical response object: every handler outcome converges to one.
#[derive(Debug)]
pub struct ApiResponse {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    body: ResponseBody,
}

impl ApiResponse {
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self::with_parts(payload.into(), None, None)
    }

    /// Construct from a payload with constructor-level headers and status.
    ///
    /// The supplied headers form the initial header set; a default
    /// `content-type` is added only when they do not carry one.
    pub fn with_parts(payload: Payload, headers: Option<Headers>, status: Option<Status>) -> Self {
        let content_type = payload.content_type();
        let default_status = payload.default_status();

        let mut header_map = HeaderMap::new();
        for (name, value) in headers.unwrap_or_default() {
            header_map.append(name, value);
        }
        if !header_map.contains_key(header::CONTENT_TYPE) {
            header_map.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }

        let mut response = Self {
            status: default_status,
            reason: None,
            headers: header_map,
            body: ResponseBody::Full(payload.into_bytes()),
        };
        if let Some(status) = status {
            response.set_status(status);
        }
        response
    }

    /// Adopt a response produced elsewhere without touching its content.
    pub fn force_type(response: Response) -> Self {
        let (mut parts, body) = response.into_parts();
        let reason = parts
            .extensions
            .remove::<ReasonPhrase>()
            .and_then(|phrase| std::str::from_utf8(phrase.as_bytes()).ok().map(str::to_string));

        Self {
            status: parts.status,
            reason,
            headers: parts.headers,
            body: ResponseBody::Streaming(body),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The custom reason phrase, if one was set through a status line.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// `"<code> <reason>"` as it goes on the wire.
    pub fn status_line(&self) -> String {
        let reason = self
            .reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("");
        format!("{} {}", self.status.as_u16(), reason)
    }

    pub fn set_status(&mut self, status: Status) {
        match status {
            Status::Code(code) => self.set_status_code(code),
            Status::Line(line) => self.set_status_line(line),
        }
    }

    /// Set the numeric code; any custom reason phrase is dropped.
    pub fn set_status_code(&mut self, code: StatusCode) {
        self.status = code;
        self.reason = None;
    }

    pub fn set_status_line(&mut self, line: StatusLine) {
        self.status = line.code;
        self.reason = line.reason;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Append headers, keeping every header already present.
    pub fn extend_headers(&mut self, headers: Headers) {
        for (name, value) in headers {
            self.headers.append(name, value);
        }
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Body bytes, when the body is materialized.
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Full(bytes) => Some(bytes),
            ResponseBody::Streaming(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        self.bytes().and_then(|b| serde_json::from_slice(b).ok())
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            ResponseBody::Full(bytes) => Body::from(bytes),
            ResponseBody::Streaming(body) => body,
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Some(reason) = self.reason {
            if let Ok(phrase) = ReasonPhrase::try_from(reason.into_bytes()) {
                response.extensions_mut().insert(phrase);
            }
        }
        response
    }
}
