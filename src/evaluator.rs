//! Health evaluator seam.
//!
//! The server never decides whether the process is healthy. It asks a
//! `HealthEvaluator` and passes the returned `HealthReport` through verbatim.
//! Evaluators must be safe to call from many requests at once.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::response::{IntoResponse, Response};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;

use crate::config::{INTERNAL_ERROR_BODY, NOT_FOUND_BODY};

/// Status and body produced by one health evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    status: StatusCode,
    body: Bytes,
}

impl HealthReport {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Build a report from a raw integer status.
    pub fn from_u16(status: u16, body: impl Into<Bytes>) -> Result<Self, EvaluatorError> {
        let status = StatusCode::from_u16(status).map_err(|_| EvaluatorError::InvalidStatus(status))?;
        Ok(Self::new(status, body))
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn unavailable(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, body)
    }

    pub(crate) fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, NOT_FOUND_BODY)
    }

    pub(crate) fn internal_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

impl IntoResponse for HealthReport {
    fn into_response(self) -> Response {
        let content_type = if std::str::from_utf8(&self.body).is_ok() {
            HeaderValue::from_static("text/plain; charset=utf-8")
        } else {
            HeaderValue::from_static("application/octet-stream")
        };

        (self.status, [(CONTENT_TYPE, content_type)], self.body).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("Health evaluation failed: {0}")]
    Failed(String),

    #[error("Invalid HTTP status code: {0}")]
    InvalidStatus(u16),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Anything that can answer "is this process healthy?".
#[async_trait]
pub trait HealthEvaluator: Send + Sync {
    async fn evaluate(&self) -> Result<HealthReport, EvaluatorError>;
}

#[async_trait]
impl<T: HealthEvaluator + ?Sized> HealthEvaluator for Arc<T> {
    async fn evaluate(&self) -> Result<HealthReport, EvaluatorError> {
        (**self).evaluate().await
    }
}

/// Evaluator that always returns the same report.
#[derive(Debug, Clone)]
pub struct StaticHealth {
    report: HealthReport,
}

impl StaticHealth {
    pub fn new(report: HealthReport) -> Self {
        Self { report }
    }
}

#[async_trait]
impl HealthEvaluator for StaticHealth {
    async fn evaluate(&self) -> Result<HealthReport, EvaluatorError> {
        Ok(self.report.clone())
    }
}

/// Adapter turning an async closure into a `HealthEvaluator`.
pub struct FnEvaluator<F> {
    f: F,
}

impl<F> fmt::Debug for FnEvaluator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnEvaluator").finish_non_exhaustive()
    }
}

/// Wrap an async closure as an evaluator.
///
/// ```
/// use tiny_healthcheck::{from_fn, HealthReport};
///
/// let evaluator = from_fn(|| async { Ok(HealthReport::ok("OK")) });
/// # let _ = evaluator;
/// ```
pub fn from_fn<F, Fut>(f: F) -> FnEvaluator<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<HealthReport, EvaluatorError>> + Send + 'static,
{
    FnEvaluator { f }
}

#[async_trait]
impl<F, Fut> HealthEvaluator for FnEvaluator<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<HealthReport, EvaluatorError>> + Send + 'static,
{
    async fn evaluate(&self) -> Result<HealthReport, EvaluatorError> {
        (self.f)().await
    }
}
