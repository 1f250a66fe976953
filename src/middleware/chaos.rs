//! Chaos injection driven by the anomaly detector's smoothed chaos level.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use futures_util::future::FutureExt;
use rand::Rng;

use crate::middleware::{reject, HttpHandler, Middleware};
use crate::observability::metrics;
use crate::telemetry::AnomalyDetector;

/// Delays each request by `chaos` milliseconds and fails it with
/// probability `chaos / 2` percent. A chaos level of zero is a pass-through.
#[derive(Debug, Clone)]
pub struct ChaosMiddleware {
    anomaly: Arc<AnomalyDetector>,
}

impl ChaosMiddleware {
    pub fn new(anomaly: Arc<AnomalyDetector>) -> Self {
        Self { anomaly }
    }
}

impl Middleware<Request<Body>, Response> for ChaosMiddleware {
    fn wrap(&self, next: HttpHandler) -> HttpHandler {
        let anomaly = self.anomaly.clone();
        Arc::new(move |request: Request<Body>| {
            let chaos = anomaly.stats().chaos_factor;
            if chaos <= 0.0 {
                return next(request);
            }

            let delay = Duration::from_millis(chaos as u64);
            let fail = rand::thread_rng().gen_range(0.0..100.0) < chaos / 2.0;
            let next = next.clone();

            async move {
                tokio::time::sleep(delay).await;
                if fail {
                    tracing::debug!(chaos, "Injected failure");
                    metrics::record_rejection("chaos");
                    return reject(StatusCode::SERVICE_UNAVAILABLE, "Chaos Injection");
                }
                next(request).await
            }
            .boxed()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnomalyConfig;
    use crate::middleware::{handler_fn, layer, Chain};
    use axum::response::IntoResponse;

    fn setup(target: f64) -> (Arc<AnomalyDetector>, HttpHandler) {
        let anomaly = Arc::new(AnomalyDetector::new(&AnomalyConfig::default()));
        anomaly.set_chaos(target);
        // Let the smoothed factor reach the target.
        for _ in 0..200 {
            anomaly.update(1.0, 0.0);
        }
        let chain = Chain::new([layer(ChaosMiddleware::new(anomaly.clone()))]);
        let handler = chain.then(handler_fn(|_req: Request<Body>| async { "ok".into_response() }));
        (anomaly, handler)
    }

    #[tokio::test]
    async fn test_zero_chaos_passes_through() {
        let (_anomaly, handler) = setup(0.0);
        let res = handler(Request::new(Body::empty())).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_chaos_delays_and_fails() {
        let (anomaly, handler) = setup(250.0);
        assert_eq!(anomaly.stats().chaos_factor, 250.0);

        let start = tokio::time::Instant::now();
        let res = handler(Request::new(Body::empty())).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
        // 250 / 2 = 125% failure probability.
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
