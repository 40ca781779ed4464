//! Demo routes: one endpoint per handler return shape and error kind.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path,
    },
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use thiserror::Error;

use restkit_core::{ApiError, AppConfig, JsonRender};

use super::errors::{json_error, HandlerError, HttpException};
use super::reply::{HandlerReturn, Reply};
use super::response::{Headers, StatusLine};
use super::RestApp;

/// A storage write lost a race; claimed by a registered error handler.
#[derive(Debug, Error)]
#[error("write conflict on {0}")]
pub struct WriteConflict(pub String);

fn x_test() -> Headers {
    Headers::from([(HeaderName::from_static("x-test"), HeaderValue::from_static("1"))])
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/hello", get(hello))
        .route("/data", get(data))
        .route("/teapot", get(teapot))
        .route("/bytes", get(bytes))
        .route("/legacy", get(legacy))
        .route("/items/:id", get(item))
        .route("/forbidden", get(forbidden))
        .route("/gone", get(gone))
        .route("/conflict", get(conflict))
        .route("/boom", get(boom))
        .route("/nothing", get(nothing))
        .route("/working", get(working))
        .route("/echo", post(echo))
}

/// Build the full demo application (public entrypoint used by `main.rs`).
pub fn build_app(config: AppConfig) -> Router {
    RestApp::builder(config)
        .errorhandler(|e: &WriteConflict| json_error(StatusCode::CONFLICT, 409, e.to_string()))
        .errorhandler_code(StatusCode::GONE, |e: &HttpException| {
            (JsonRender::new(i64::from(e.code()), "moved on"), StatusCode::GONE)
        })
        .build()
        .into_router(router())
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn hello() -> Reply {
    Ok(("hello", StatusCode::CREATED, x_test()).into())
}

pub async fn data() -> Reply {
    Ok((json!({"a": 1}), x_test()).into())
}

pub async fn teapot() -> Reply {
    let line = StatusLine::parse("418 I'm a teapot").map_err(HandlerError::other)?;
    Ok(("short and stout", line).into())
}

pub async fn bytes() -> Reply {
    Ok(vec![0xde_u8, 0xad, 0xbe, 0xef].into())
}

pub async fn legacy() -> Reply {
    let foreign = (StatusCode::ACCEPTED, [("x-legacy", "1")], "legacy").into_response();
    Ok((foreign, None::<StatusCode>, x_test()).into())
}

pub async fn item(id: Result<Path<u64>, PathRejection>) -> Reply {
    let Path(id) = id?;
    if id != 1 {
        return Err(ApiError::not_found("not found").into());
    }
    Ok(json!({"id": id, "name": "widget"}).into())
}

pub async fn forbidden() -> Reply {
    Err(HttpException::forbidden().into())
}

pub async fn gone() -> Reply {
    Err(HttpException::gone().into())
}

pub async fn conflict() -> Reply {
    Err(HandlerError::other(WriteConflict("item 1".to_string())))
}

pub async fn boom() -> Reply {
    Err(anyhow::anyhow!("storage exploded").into())
}

pub async fn working() -> Reply {
    Err(ApiError::new(102, "still working").into())
}

pub async fn nothing() -> Reply {
    Ok(HandlerReturn::none())
}

pub async fn echo(payload: Result<Json<serde_json::Value>, JsonRejection>) -> Reply {
    let Json(value) = payload?;
    Ok(value.into())
}
