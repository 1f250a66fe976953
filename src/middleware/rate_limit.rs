//! Global token-bucket throttling.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use futures_util::future::{self, FutureExt};

use crate::admission::RateLimiter;
use crate::middleware::{reject, HttpHandler, Middleware};
use crate::observability::metrics;

/// Rejects with `429 Too Many Requests` when the bucket is empty.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Middleware<Request<Body>, Response> for RateLimitMiddleware {
    fn wrap(&self, next: HttpHandler) -> HttpHandler {
        let limiter = self.limiter.clone();
        Arc::new(move |request: Request<Body>| {
            if limiter.allow() {
                return next(request);
            }

            tracing::debug!(path = %request.uri().path(), "Rate limit exceeded");
            metrics::record_rejection("rate_limit");
            future::ready(reject(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests")).boxed()
        })
    }
}
