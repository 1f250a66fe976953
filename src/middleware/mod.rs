//! Request-path middleware.
//!
//! # Data Flow
//! ```text
//! Incoming request (default order, outermost first):
//!     → cors.rs (preflight answered here)
//!     → request_id.rs (x-request-id + tracing span)
//!     → tracking.rs (in-flight gauge, request counters)
//!     → chaos.rs (injected latency / failures)
//!     → concurrency.rs (adaptive ceiling, 503 on denial)
//!     → rate_limit.rs (token bucket, 429 on denial)
//!     → terminal handler
//! ```
//!
//! # Design Decisions
//! - chain.rs is transport-agnostic; the HTTP layers fix `Req`/`Res` to axum types
//! - Composition happens once at startup, not per request
//! - No layer holds a lock while awaiting the next one

pub mod chain;
pub mod chaos;
pub mod concurrency;
pub mod cors;
pub mod rate_limit;
pub mod request_id;
pub mod tracking;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

pub use chain::{handler_fn, layer, Chain, Handler, Middleware};
pub use chaos::ChaosMiddleware;
pub use concurrency::ConcurrencyMiddleware;
pub use cors::CorsMiddleware;
pub use rate_limit::RateLimitMiddleware;
pub use request_id::{RequestIdMiddleware, X_REQUEST_ID};
pub use tracking::TrackingMiddleware;

/// Handler over axum requests.
pub type HttpHandler = Handler<Request<Body>, Response>;

/// Type-erased HTTP middleware.
pub type HttpMiddleware = Arc<dyn Middleware<Request<Body>, Response>>;

/// Chain of HTTP middlewares.
pub type HttpChain = Chain<Request<Body>, Response>;

/// Plain-text rejection used when a layer short-circuits.
pub(crate) fn reject(status: StatusCode, message: &'static str) -> Response {
    (status, message).into_response()
}
