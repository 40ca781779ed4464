use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use crate::app::reply::Reply;
use crate::app::{HttpException, RestApp};
use crate::context::RequestContext;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// A handler outcome parked in the response extensions until
/// [`api_middleware`] picks it up.
#[derive(Clone)]
pub(crate) struct Deferred(Arc<Mutex<Option<Reply>>>);

impl Deferred {
    /// Placeholder response carrying `reply`.
    ///
    /// Without the middleware installed the placeholder is sent as is: a bare
    /// 500, never a half-normalized body.
    pub(crate) fn respond(reply: Reply) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response
            .extensions_mut()
            .insert(Deferred(Arc::new(Mutex::new(Some(reply)))));
        response
    }

    fn take(self) -> Option<Reply> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Response and exception interception for every restkit handler.
///
/// A bare `405` from the router is raised as an [`HttpException`] so it
/// reaches the exception router like any other. Other responses that do not
/// come from a restkit handler pass through untouched.
pub async fn api_middleware(State(app): State<Arc<RestApp>>, req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;

    let deferred = response.extensions_mut().remove::<Deferred>();
    match deferred.and_then(Deferred::take) {
        Some(reply) => app.dispatch(reply),
        None if response.status() == StatusCode::METHOD_NOT_ALLOWED => {
            method_not_allowed(&app, &response)
        }
        None => response,
    }
}

fn method_not_allowed(app: &RestApp, rejected: &Response) -> Response {
    let mut response = app.dispatch(Err(HttpException::method_not_allowed().into()));
    if let Some(allow) = rejected.headers().get(header::ALLOW) {
        response
            .headers_mut()
            .entry(header::ALLOW)
            .or_insert_with(|| allow.clone());
    }
    response
}

/// Attach a [`RequestContext`] and run the request inside its span.
pub async fn request_context_middleware(mut req: Request, next: Next) -> Response {
    let ctx = RequestContext::new();
    req.extensions_mut().insert(ctx);

    let span = tracing::info_span!(
        "request",
        request_id = %ctx.request_id(),
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut response = next.run(req).instrument(span.clone()).await;

    if let Ok(value) = HeaderValue::from_str(&ctx.request_id().to_string()) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }

    span.in_scope(|| {
        tracing::info!(status = response.status().as_u16(), "request completed");
    });

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::reply::HandlerReturn;
    use restkit_core::AppConfig;

    #[test]
    fn placeholder_is_a_bare_500() {
        let response = Deferred::respond(Ok(HandlerReturn::from("x")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<Deferred>().is_some());
    }

    #[test]
    fn slot_is_taken_once() {
        let mut response = Deferred::respond(Ok(HandlerReturn::from("x")));
        let slot = response.extensions_mut().remove::<Deferred>().unwrap();
        let copy = slot.clone();
        assert!(slot.take().is_some());
        assert!(copy.take().is_none());
    }

    #[test]
    fn router_405_goes_through_exception_router() {
        let app = RestApp::new(AppConfig::default());
        let rejected = (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "GET,HEAD")]).into_response();

        let response = method_not_allowed(&app, &rejected);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[header::ALLOW], "GET,HEAD");
    }

    #[test]
    fn router_405_without_allow_header() {
        let app = RestApp::new(AppConfig::default().with_trap_http_exceptions(true));
        let response = method_not_allowed(&app, &StatusCode::METHOD_NOT_ALLOWED.into_response());
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers().get(header::ALLOW).is_none());
    }
}
