//! Exception routing: how errors escaping a handler become responses.
//!
//! API errors and (untrapped) HTTP exceptions become a `{"code", "message"}`
//! JSON envelope. Everything else is offered to the registered error
//! handlers and, if none claims it, handed back unchanged for the host's
//! default handling.

use std::any::type_name;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use restkit_core::{ApiError, AppConfig, JsonRender};

use crate::app::reply::HandlerReturn;
use crate::app::response::ApiResponse;
use crate::middleware::Deferred;

/// Framework-level HTTP exception: a status plus an optional description.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub struct HttpException {
    status: StatusCode,
    description: Option<String>,
}

impl HttpException {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.trim().is_empty()).then_some(description);
        self
    }

    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED)
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED)
    }

    pub fn gone() -> Self {
        Self::new(StatusCode::GONE)
    }

    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Canonical name of the status, e.g. `"Not Found"`.
    pub fn name(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("Unknown Error")
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The description, or the status name when there is none.
    pub fn message(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| self.name())
    }

    pub fn render(&self) -> JsonRender {
        JsonRender::new(i64::from(self.code()), self.message())
    }
}

impl fmt::Display for HttpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.code(), self.name(), self.message())
    }
}

impl From<JsonRejection> for HttpException {
    fn from(rejection: JsonRejection) -> Self {
        HttpException::new(rejection.status()).with_description(rejection.body_text())
    }
}

impl From<PathRejection> for HttpException {
    fn from(rejection: PathRejection) -> Self {
        HttpException::new(rejection.status()).with_description(rejection.body_text())
    }
}

/// Anything a handler can fail with.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Http(#[from] HttpException),

    /// Not an API or HTTP error; offered to registered handlers, then propagated.
    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn other(err: impl Into<anyhow::Error>) -> Self {
        HandlerError::Unhandled(err.into())
    }
}

impl From<JsonRejection> for HandlerError {
    fn from(rejection: JsonRejection) -> Self {
        HandlerError::Http(rejection.into())
    }
}

impl From<PathRejection> for HandlerError {
    fn from(rejection: PathRejection) -> Self {
        HandlerError::Http(rejection.into())
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        Deferred::respond(Err(self))
    }
}

type TypedHandler = Arc<dyn Fn(&(dyn StdError + 'static)) -> Option<HandlerReturn> + Send + Sync>;
type CodeHandler = Arc<dyn Fn(&HttpException) -> HandlerReturn + Send + Sync>;

/// Registered error handlers.
#[derive(Clone, Default)]
pub struct ErrorHandlers {
    by_code: HashMap<StatusCode, CodeHandler>,
    by_type: Vec<(&'static str, TypedHandler)>,
}

impl ErrorHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle errors of type `E`, wherever they appear in an error's source chain.
    pub fn register<E, R, F>(&mut self, handler: F)
    where
        E: StdError + 'static,
        R: Into<HandlerReturn>,
        F: Fn(&E) -> R + Send + Sync + 'static,
    {
        let typed: TypedHandler = Arc::new(move |err: &(dyn StdError + 'static)| {
            err.downcast_ref::<E>().map(|e| handler(e).into())
        });
        self.by_type.push((type_name::<E>(), typed));
    }

    /// Handle HTTP exceptions with the given status.
    pub fn register_code<R, F>(&mut self, status: StatusCode, handler: F)
    where
        R: Into<HandlerReturn>,
        F: Fn(&HttpException) -> R + Send + Sync + 'static,
    {
        self.by_code
            .insert(status, Arc::new(move |e: &HttpException| handler(e).into()));
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty() && self.by_type.is_empty()
    }

    /// Find and run the handler for `err`, most specific match first.
    ///
    /// HTTP exceptions try their status code before their type. Other errors
    /// walk the source chain from the outermost error inwards; within one
    /// link, handlers are tried in registration order.
    pub fn find(&self, err: &HandlerError) -> Option<HandlerReturn> {
        match err {
            HandlerError::Http(e) => self
                .by_code
                .get(&e.status())
                .map(|handler| handler(e))
                .or_else(|| self.find_typed(e)),
            HandlerError::Api(e) => self.find_typed(e),
            HandlerError::Unhandled(e) => e.chain().find_map(|cause| self.find_typed(cause)),
        }
    }

    fn find_typed(&self, err: &(dyn StdError + 'static)) -> Option<HandlerReturn> {
        self.by_type.iter().find_map(|(name, handler)| {
            let rv = handler(err)?;
            tracing::debug!(handler = %name, "error claimed by registered handler");
            Some(rv)
        })
    }
}

impl fmt::Debug for ErrorHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<u16> = self.by_code.keys().map(StatusCode::as_u16).collect();
        codes.sort_unstable();
        let types: Vec<&str> = self.by_type.iter().map(|(name, _)| *name).collect();
        f.debug_struct("ErrorHandlers")
            .field("by_code", &codes)
            .field("by_type", &types)
            .finish()
    }
}

/// Decides what becomes of an error that escaped a handler.
#[derive(Debug, Clone)]
pub struct ExceptionRouter {
    trap_http_exceptions: bool,
    trap_bad_request_errors: bool,
    handlers: ErrorHandlers,
}

impl ExceptionRouter {
    pub fn new(config: &AppConfig, handlers: ErrorHandlers) -> Self {
        Self {
            trap_http_exceptions: config.trap_http_exceptions,
            trap_bad_request_errors: config.traps_bad_request_errors(),
            handlers,
        }
    }

    pub fn handlers(&self) -> &ErrorHandlers {
        &self.handlers
    }

    /// Whether `e` should propagate instead of being rendered.
    pub fn trap_http_exception(&self, e: &HttpException) -> bool {
        self.trap_http_exceptions || (self.trap_bad_request_errors && e.status() == StatusCode::BAD_REQUEST)
    }

    /// Wrap an error envelope in the canonical response.
    pub fn handle_api_exception(render: JsonRender) -> ApiResponse {
        ApiResponse::new(render)
    }

    /// Route an error; `Err` hands back the very same error for the host.
    pub fn handle_user_exception(&self, err: HandlerError) -> Result<HandlerReturn, HandlerError> {
        match err {
            HandlerError::Api(e) => {
                tracing::debug!(code = e.code(), message = e.message(), "api error rendered");
                Ok(Self::handle_api_exception(e.render()).into())
            }
            HandlerError::Http(e) if !self.trap_http_exception(&e) => {
                tracing::debug!(code = e.code(), "http exception rendered");
                Ok(Self::handle_api_exception(e.render()).into())
            }
            err => match self.handlers.find(&err) {
                Some(rv) => Ok(rv),
                None => Err(err),
            },
        }
    }
}

/// Host-level handling for errors nobody claimed. Never a JSON envelope.
///
/// A trapped HTTP exception keeps its own status and is answered as plain
/// text; everything else is an opaque 500.
pub fn host_default_response(err: HandlerError) -> Response {
    match err {
        HandlerError::Http(e) => {
            tracing::warn!(code = e.code(), "http exception propagated");
            (e.status(), e.to_string()).into_response()
        }
        err => {
            tracing::error!(error = ?err, "unhandled error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

/// Small helper wrapper: a JSON envelope with an explicit response status.
pub fn json_error(status: StatusCode, code: i64, message: impl Into<String>) -> HandlerReturn {
    (JsonRender::new(code, message), status).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::reply::make_response;
    use serde_json::json;

    #[derive(Debug, Error)]
    #[error("write conflict on {0}")]
    struct WriteConflict(String);

    #[derive(Debug, Error)]
    #[error("storage failed")]
    struct StorageFailed(#[source] WriteConflict);

    fn exception_router(config: AppConfig, handlers: ErrorHandlers) -> ExceptionRouter {
        ExceptionRouter::new(&config, handlers)
    }

    fn rendered(rv: HandlerReturn) -> ApiResponse {
        make_response(rv).unwrap()
    }

    #[test]
    fn api_error_becomes_exact_envelope() {
        let router = exception_router(AppConfig::default(), ErrorHandlers::new());
        let rv = router
            .handle_user_exception(ApiError::not_found("not found").into())
            .unwrap();
        let response = rendered(rv);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.json(), Some(json!({"code": 404, "message": "not found"})));
    }

    #[test]
    fn api_error_is_rendered_even_when_trapping() {
        let router = exception_router(AppConfig::default().with_trap_http_exceptions(true), ErrorHandlers::new());
        assert!(router.handle_user_exception(ApiError::forbidden("no").into()).is_ok());
    }

    #[test]
    fn http_exception_becomes_envelope_when_not_trapped() {
        let router = exception_router(AppConfig::default(), ErrorHandlers::new());
        let rv = router
            .handle_user_exception(HttpException::internal_server_error().into())
            .unwrap();
        let response = rendered(rv);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.json(),
            Some(json!({"code": 500, "message": "Internal Server Error"}))
        );
    }

    #[test]
    fn http_exception_propagates_when_trapped() {
        let router = exception_router(AppConfig::default().with_trap_http_exceptions(true), ErrorHandlers::new());
        let err = router
            .handle_user_exception(HttpException::forbidden().with_description("keep out").into())
            .unwrap_err();
        match err {
            HandlerError::Http(e) => {
                assert_eq!(e.status(), StatusCode::FORBIDDEN);
                assert_eq!(e.message(), "keep out");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn bad_request_trapping_is_separate() {
        let router = exception_router(
            AppConfig::default().with_trap_bad_request_errors(Some(true)),
            ErrorHandlers::new(),
        );
        assert!(router.trap_http_exception(&HttpException::bad_request()));
        assert!(!router.trap_http_exception(&HttpException::not_found()));

        let debug = exception_router(AppConfig::default().with_debug(true), ErrorHandlers::new());
        assert!(debug.trap_http_exception(&HttpException::bad_request()));
    }

    #[test]
    fn code_handler_claims_trapped_exception() {
        let mut handlers = ErrorHandlers::new();
        handlers.register_code(StatusCode::GONE, |e: &HttpException| {
            (format!("custom {}", e.code()), StatusCode::GONE)
        });
        let router = exception_router(AppConfig::default().with_trap_http_exceptions(true), handlers);

        let response = rendered(router.handle_user_exception(HttpException::gone().into()).unwrap());
        assert_eq!(response.status(), StatusCode::GONE);
        assert_eq!(response.text(), Some("custom 410"));

        assert!(router.handle_user_exception(HttpException::not_found().into()).is_err());
    }

    #[test]
    fn typed_handler_claims_unhandled_error() {
        let mut handlers = ErrorHandlers::new();
        handlers.register(|e: &WriteConflict| json_error(StatusCode::CONFLICT, 409, e.to_string()));
        let router = exception_router(AppConfig::default(), handlers);

        let rv = router
            .handle_user_exception(HandlerError::other(WriteConflict("item 7".into())))
            .unwrap();
        let response = rendered(rv);
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.json(),
            Some(json!({"code": 409, "message": "write conflict on item 7"}))
        );
    }

    #[test]
    fn source_chain_is_searched_outermost_first() {
        let mut handlers = ErrorHandlers::new();
        handlers.register(|_: &WriteConflict| "inner");
        handlers.register(|_: &StorageFailed| "outer");
        let router = exception_router(AppConfig::default(), handlers);

        let err = HandlerError::other(StorageFailed(WriteConflict("x".into())));
        let response = rendered(router.handle_user_exception(err).unwrap());
        assert_eq!(response.text(), Some("outer"));

        let mut handlers = ErrorHandlers::new();
        handlers.register(|_: &WriteConflict| "inner");
        let router = router_with(handlers);
        let err = HandlerError::other(StorageFailed(WriteConflict("x".into())));
        let response = rendered(router.handle_user_exception(err).unwrap());
        assert_eq!(response.text(), Some("inner"));
    }

    fn router_with(handlers: ErrorHandlers) -> ExceptionRouter {
        exception_router(AppConfig::default(), handlers)
    }

    #[test]
    fn unclaimed_error_is_returned_unchanged() {
        let router = router_with(ErrorHandlers::new());
        let original = anyhow::Error::new(WriteConflict("row 1".into())).context("saving order");
        let original_ptr = format!("{:p}", original.root_cause());

        let err = router.handle_user_exception(original.into()).unwrap_err();
        let HandlerError::Unhandled(err) = err else {
            panic!("error class changed");
        };
        assert_eq!(err.to_string(), "saving order");
        assert_eq!(format!("{:p}", err.root_cause()), original_ptr);
        assert!(err.downcast_ref::<WriteConflict>().is_some());
    }

    #[tokio::test]
    async fn json_rejection_maps_to_http_exception() {
        use axum::extract::FromRequest;

        let req = axum::http::Request::builder()
            .uri("/")
            .body(axum::body::Body::from("{}"))
            .unwrap();
        let rejection = axum::Json::<serde_json::Value>::from_request(req, &())
            .await
            .unwrap_err();
        let e = HttpException::from(rejection);
        assert_eq!(e.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(e.description().is_some());
    }

    #[test]
    fn http_exception_message_defaults_to_name() {
        let e = HttpException::not_found().with_description("  ");
        assert_eq!(e.message(), "Not Found");
        assert_eq!(e.to_string(), "404 Not Found: Not Found");
        assert_eq!(e.render(), JsonRender::new(404, "Not Found"));
    }

    #[tokio::test]
    async fn host_default_is_plain_text() {
        let response = host_default_response(HandlerError::other(anyhow::anyhow!("boom")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Internal Server Error");

        let response = host_default_response(HttpException::forbidden().into());
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"403 Forbidden: Forbidden");
    }
}
