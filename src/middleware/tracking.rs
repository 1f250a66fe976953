//! Request accounting for the telemetry collector.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use futures_util::future::FutureExt;

use crate::middleware::{HttpHandler, Middleware};
use crate::observability::metrics;
use crate::telemetry::collector::ActiveRequestGuard;
use crate::telemetry::TelemetryCollector;

/// Keeps the in-flight gauge and request counters current.
///
/// Responses with a status of 400 or above count as errors, and so do
/// requests abandoned before a response was produced.
#[derive(Debug, Clone)]
pub struct TrackingMiddleware {
    collector: Arc<TelemetryCollector>,
}

impl TrackingMiddleware {
    pub fn new(collector: Arc<TelemetryCollector>) -> Self {
        Self { collector }
    }
}

/// Records exactly one outcome per request.
///
/// A future dropped before completion (timeout, client disconnect) is
/// counted as an error when the guard goes out of scope.
struct RequestOutcome {
    collector: Arc<TelemetryCollector>,
    start: Instant,
    completed: bool,
    _active: ActiveRequestGuard,
}

impl RequestOutcome {
    fn begin(collector: &Arc<TelemetryCollector>) -> Self {
        Self {
            collector: collector.clone(),
            start: Instant::now(),
            completed: false,
            _active: collector.track_active(),
        }
    }

    fn complete(mut self, status: StatusCode) {
        self.completed = true;
        let elapsed = self.start.elapsed();
        self.collector.record_request(elapsed, status.as_u16() >= 400);
        metrics::record_request(status.as_u16(), elapsed);
    }
}

impl Drop for RequestOutcome {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let elapsed = self.start.elapsed();
        tracing::debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            "Request dropped before completion"
        );
        self.collector.record_request(elapsed, true);
        metrics::record_cancelled(elapsed);
    }
}

impl Middleware<Request<Body>, Response> for TrackingMiddleware {
    fn wrap(&self, next: HttpHandler) -> HttpHandler {
        let collector = self.collector.clone();
        Arc::new(move |request: Request<Body>| {
            let outcome = RequestOutcome::begin(&collector);
            let response = next(request);

            async move {
                let response = response.await;
                outcome.complete(response.status());
                response
            }
            .boxed()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{handler_fn, layer, Chain};
    use crate::telemetry::HealthThresholds;
    use axum::response::IntoResponse;
    use std::time::Duration;

    #[tokio::test]
    async fn test_counts_successes_and_errors() {
        let collector = Arc::new(TelemetryCollector::new(HealthThresholds::default()));
        let chain = Chain::new([layer(TrackingMiddleware::new(collector.clone()))]);
        let handler = chain.then(handler_fn(|req: Request<Body>| async move {
            if req.uri().path() == "/fail" {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            } else {
                StatusCode::OK.into_response()
            }
        }));

        for path in ["/", "/", "/fail"] {
            let req = Request::builder().uri(path).body(Body::empty()).unwrap();
            handler(req).await;
        }

        assert_eq!(collector.active_requests(), 0);
        let snap = collector
            .rollup_at(Instant::now() + Duration::from_secs(1))
            .unwrap();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.success_count, 2);
        assert_eq!(snap.error_count, 1);
    }

    #[tokio::test]
    async fn test_abandoned_request_counts_as_error() {
        let collector = Arc::new(TelemetryCollector::new(HealthThresholds::default()));
        let chain = Chain::new([layer(TrackingMiddleware::new(collector.clone()))]);
        let handler = chain.then(handler_fn(|_req: Request<Body>| async {
            std::future::pending::<Response>().await
        }));

        let pending = handler(Request::new(Body::empty()));
        assert_eq!(collector.active_requests(), 1);
        assert_eq!(collector.total_requests(), 0);
        drop(pending);

        assert_eq!(collector.active_requests(), 0);
        let snap = collector
            .rollup_at(Instant::now() + Duration::from_secs(1))
            .unwrap();
        assert_eq!(snap.total_requests, 1);
        assert_eq!(snap.error_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_request_counts_as_error() {
        let collector = Arc::new(TelemetryCollector::new(HealthThresholds::default()));
        let chain = Chain::new([layer(TrackingMiddleware::new(collector.clone()))]);
        let handler = chain.then(handler_fn(|_req: Request<Body>| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            StatusCode::OK.into_response()
        }));

        let result =
            tokio::time::timeout(Duration::from_secs(1), handler(Request::new(Body::empty()))).await;
        assert!(result.is_err());

        assert_eq!(collector.total_requests(), 1);
        assert_eq!(collector.active_requests(), 0);
    }
}
