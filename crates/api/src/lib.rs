//! HTTP API layer: canonical responses and exception-to-JSON translation for
//! Axum handlers.

pub mod app;
pub mod context;
pub mod middleware;

pub use app::{ApiResponse, HandlerError, HandlerReturn, HttpException, Reply, RestApp};
