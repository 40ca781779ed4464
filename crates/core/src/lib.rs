//! `restkit-core` — framework-independent building blocks.
//!
//! This crate holds the **domain-side** types of the API layer: the domain
//! error raised by handlers, the JSON envelope it renders as, and the
//! immutable application configuration. Nothing here knows about HTTP framing.

pub mod config;
pub mod error;
pub mod render;
pub mod value_object;

pub use config::{AppConfig, ConfigError, ConfigResult, DatabaseConfig, StorageEngine};
pub use error::{ApiError, ApiResult};
pub use render::JsonRender;
pub use value_object::ValueObject;
