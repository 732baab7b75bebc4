//! Per-request dispatch.
//!
//! There is exactly one recognised path. Any method on that path (after trailing
//! slashes are trimmed) is answered by the evaluator; everything else gets the
//! fixed 404. Evaluator errors and panics stop here and become a 500.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::State;
use axum::http::Uri;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Router};
use futures::FutureExt;
use http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{normalize_path, CACHE_CONTROL_HEALTH};
use crate::evaluator::{HealthEvaluator, HealthReport};
use crate::middleware::{request_id_layer, RequestId};

pub(crate) struct Dispatcher {
    /// Configured path, already normalized
    path: String,
    evaluator: Arc<dyn HealthEvaluator>,
}

impl Dispatcher {
    pub(crate) fn new(path: &str, evaluator: Arc<dyn HealthEvaluator>) -> Self {
        Self {
            path: normalize_path(path).to_string(),
            evaluator,
        }
    }

    /// `request_id` is attached to failure logs when the request came through
    /// the HTTP stack.
    pub(crate) async fn dispatch(
        &self,
        request_path: &str,
        request_id: Option<RequestId>,
    ) -> HealthReport {
        if normalize_path(request_path) != self.path {
            tracing::debug!(path = %request_path, "No route for path");
            return HealthReport::not_found();
        }

        match AssertUnwindSafe(self.evaluator.evaluate())
            .catch_unwind()
            .await
        {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::error!(
                    request_id = request_id.map(tracing::field::display),
                    error = %e,
                    "Health evaluator failed"
                );
                HealthReport::internal_error()
            }
            Err(panic) => {
                tracing::error!(
                    request_id = request_id.map(tracing::field::display),
                    panic = %panic_message(panic.as_ref()),
                    "Health evaluator panicked"
                );
                HealthReport::internal_error()
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

async fn handle(
    State(dispatcher): State<Arc<Dispatcher>>,
    request_id: Option<Extension<RequestId>>,
    uri: Uri,
) -> Response {
    let request_id = request_id.map(|Extension(id)| id);
    dispatcher.dispatch(uri.path(), request_id).await.into_response()
}

/// Build the router: a single fallback handler, no per-path routes.
pub(crate) fn create_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .fallback(handle)
        .with_state(dispatcher)
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_HEALTH),
        ))
        .layer(middleware::from_fn(request_id_layer))
}
