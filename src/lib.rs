//! Tiny Healthcheck - a non-blocking health check endpoint
//!
//! Runs a small HTTP server as a background Tokio task next to the host
//! application. Requests to one configured path are answered by a pluggable
//! `HealthEvaluator`; every other path gets `404 Not Found`.

pub mod config;
pub mod error;
pub mod evaluator;
pub mod http;
pub mod logging;
pub mod middleware;

pub use config::{AppConfig, ConfigError, ServerConfig};
pub use error::HealthServerError;
pub use evaluator::{
    from_fn, EvaluatorError, FnEvaluator, HealthEvaluator, HealthReport, StaticHealth,
};
pub use crate::http::HealthServer;
