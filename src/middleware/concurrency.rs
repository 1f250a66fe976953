//! Adaptive concurrency admission.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use futures_util::future::{self, FutureExt};

use crate::admission::ConcurrencyGovernor;
use crate::middleware::{reject, HttpHandler, Middleware};
use crate::observability::metrics;

/// Rejects with `503 Service Unavailable` when the governor's ceiling is reached.
///
/// Admitted requests hold a permit until the downstream future completes or is
/// dropped; its latency then feeds the governor.
#[derive(Debug, Clone)]
pub struct ConcurrencyMiddleware {
    governor: Arc<ConcurrencyGovernor>,
}

impl ConcurrencyMiddleware {
    pub fn new(governor: Arc<ConcurrencyGovernor>) -> Self {
        Self { governor }
    }
}

impl Middleware<Request<Body>, Response> for ConcurrencyMiddleware {
    fn wrap(&self, next: HttpHandler) -> HttpHandler {
        let governor = self.governor.clone();
        Arc::new(move |request: Request<Body>| {
            let Some(permit) = governor.try_acquire_permit() else {
                tracing::debug!(
                    limit = governor.limit(),
                    path = %request.uri().path(),
                    "Concurrency limit reached"
                );
                metrics::record_rejection("concurrency");
                return future::ready(reject(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service Unavailable - Too Busy",
                ))
                .boxed();
            };

            let response = next(request);
            async move {
                let _permit = permit;
                response.await
            }
            .boxed()
        })
    }
}
