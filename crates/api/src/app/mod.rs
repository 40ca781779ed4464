//! Application object: response normalization and exception routing wired
//! into an Axum router.
//!
//! This folder is structured like:
//! - `response.rs`: the canonical response and status/header override values
//! - `reply.rs`: handler return shapes + the response normalizer
//! - `errors.rs`: error types + the exception router
//! - `routes.rs`: the demo routes served by the binary

use std::error::Error as StdError;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::ServiceBuilder;

use restkit_core::AppConfig;

use crate::middleware;

pub mod errors;
pub mod reply;
pub mod response;
pub mod routes;

pub use errors::{host_default_response, ErrorHandlers, ExceptionRouter, HandlerError, HttpException};
pub use reply::{make_response, HandlerReturn, MissingResponse, Reply, ReturnValue, StatusOrHeaders};
pub use response::{ApiResponse, Headers, Payload, ResponseBody, Status, StatusLine};

/// The application: immutable configuration plus the exception router.
#[derive(Debug, Clone)]
pub struct RestApp {
    config: AppConfig,
    router: ExceptionRouter,
}

/// Collects error handlers before the application is frozen.
#[derive(Debug)]
pub struct RestAppBuilder {
    config: AppConfig,
    handlers: ErrorHandlers,
}

impl RestAppBuilder {
    /// Register a handler for errors of type `E`.
    pub fn errorhandler<E, R, F>(mut self, handler: F) -> Self
    where
        E: StdError + 'static,
        R: Into<HandlerReturn>,
        F: Fn(&E) -> R + Send + Sync + 'static,
    {
        self.handlers.register(handler);
        self
    }

    /// Register a handler for HTTP exceptions with the given status.
    pub fn errorhandler_code<R, F>(mut self, status: StatusCode, handler: F) -> Self
    where
        R: Into<HandlerReturn>,
        F: Fn(&HttpException) -> R + Send + Sync + 'static,
    {
        self.handlers.register_code(status, handler);
        self
    }

    pub fn build(self) -> RestApp {
        let router = ExceptionRouter::new(&self.config, self.handlers);
        RestApp {
            config: self.config,
            router,
        }
    }
}

impl RestApp {
    pub fn new(config: AppConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: AppConfig) -> RestAppBuilder {
        RestAppBuilder {
            config,
            handlers: ErrorHandlers::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn exception_router(&self) -> &ExceptionRouter {
        &self.router
    }

    /// Normalize a handler's return value.
    pub fn make_response(&self, rv: HandlerReturn) -> Result<ApiResponse, MissingResponse> {
        make_response(rv)
    }

    /// Route an error that escaped a handler.
    pub fn handle_user_exception(&self, err: HandlerError) -> Result<HandlerReturn, HandlerError> {
        self.router.handle_user_exception(err)
    }

    /// Turn a handler outcome into the response sent to the client.
    ///
    /// Errors claimed by the router go through the same normalizer as
    /// regular return values; unclaimed ones get the host default.
    pub fn dispatch(&self, reply: Reply) -> Response {
        let rv = match reply.or_else(|err| self.handle_user_exception(err)) {
            Ok(rv) => rv,
            Err(err) => return host_default_response(err),
        };

        match self.make_response(rv) {
            Ok(response) => response.into_response(),
            // Logged once, by the host default.
            Err(missing) => host_default_response(HandlerError::other(missing)),
        }
    }

    /// Install the interception layers on `routes`.
    ///
    /// Unknown paths raise `404 Not Found` through the exception router.
    pub fn into_router(self, routes: Router) -> Router {
        let app = Arc::new(self);

        routes.fallback(not_found).layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_context_middleware))
                .layer(axum::middleware::from_fn_with_state(app, middleware::api_middleware)),
        )
    }
}

async fn not_found() -> HandlerError {
    HttpException::not_found().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use restkit_core::ApiError;
    use serde_json::json;

    async fn body_of(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn dispatch_normalizes_ok_values() {
        let app = RestApp::new(AppConfig::default());
        let response = app.dispatch(Ok(("hello", StatusCode::CREATED).into()));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_of(response).await, b"hello");
    }

    #[tokio::test]
    async fn dispatch_renders_api_errors() {
        let app = RestApp::new(AppConfig::default());
        let response = app.dispatch(Err(ApiError::not_found("not found").into()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body: serde_json::Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(body, json!({"code": 404, "message": "not found"}));
    }

    #[tokio::test]
    async fn dispatch_answers_missing_with_500() {
        let app = RestApp::new(AppConfig::default());
        let response = app.dispatch(Ok(HandlerReturn::none()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await, b"Internal Server Error");
    }

    #[tokio::test]
    async fn dispatch_normalizes_handler_results() {
        let app = RestApp::builder(AppConfig::default())
            .errorhandler(|e: &std::io::Error| (e.to_string(), StatusCode::SERVICE_UNAVAILABLE))
            .build();
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk away");
        let response = app.dispatch(Err(HandlerError::other(err)));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_of(response).await, b"disk away");
    }

    #[test]
    fn builder_keeps_config() {
        let config = AppConfig::default().with_database("other.db");
        let app = RestApp::new(config.clone());
        assert_eq!(app.config(), &config);
        assert!(app.exception_router().handlers().is_empty());
    }
}
