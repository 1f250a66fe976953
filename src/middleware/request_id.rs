//! Request correlation IDs.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::response::Response;
use futures_util::future::FutureExt;
use tracing::Instrument;
use uuid::Uuid;

use crate::middleware::{HttpHandler, Middleware};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Reuses an incoming `x-request-id` or assigns a UUID v4, echoes it on the
/// response and runs everything beneath it inside a `request` span.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdMiddleware;

impl Middleware<Request<Body>, Response> for RequestIdMiddleware {
    fn wrap(&self, next: HttpHandler) -> HttpHandler {
        Arc::new(move |mut request: Request<Body>| {
            let value = request
                .headers()
                .get(&X_REQUEST_ID)
                .cloned()
                .unwrap_or_else(|| {
                    HeaderValue::from_str(&Uuid::new_v4().to_string())
                        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
                });
            request.headers_mut().insert(X_REQUEST_ID, value.clone());

            let span = tracing::info_span!(
                "request",
                request_id = value.to_str().unwrap_or("invalid"),
                method = %request.method(),
                path = %request.uri().path(),
            );
            let response = span.in_scope(|| next(request));

            async move {
                let mut response = response.await;
                response.headers_mut().insert(X_REQUEST_ID, value);
                response
            }
            .instrument(span)
            .boxed()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{handler_fn, layer, Chain};
    use axum::response::IntoResponse;

    fn handler() -> HttpHandler {
        Chain::new([layer(RequestIdMiddleware)]).then(handler_fn(|req: Request<Body>| async move {
            let seen = req
                .headers()
                .get(&X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            seen.into_response()
        }))
    }

    #[tokio::test]
    async fn test_generates_id_when_missing() {
        let res = handler()(Request::new(Body::empty())).await;
        let id = res.headers()[&X_REQUEST_ID].to_str().unwrap().to_string();
        assert!(Uuid::parse_str(&id).is_ok());

        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(body, id.as_bytes());
    }

    #[tokio::test]
    async fn test_propagates_incoming_id() {
        let req = Request::builder()
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let res = handler()(req).await;
        assert_eq!(res.headers()[&X_REQUEST_ID], "abc-123");
    }
}
