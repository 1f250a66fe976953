//! Cross-Origin Resource Sharing headers.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::{self, FutureExt};

use crate::config::CorsConfig;
use crate::error::Error;
use crate::middleware::{HttpHandler, Middleware};

/// Adds `Access-Control-Allow-*` headers and answers preflight requests with `204`.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    headers: Arc<[(HeaderName, HeaderValue)]>,
}

impl CorsMiddleware {
    pub fn new(config: &CorsConfig) -> Result<Self, Error> {
        let headers = [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "allow_origin", config.allow_origin.clone()),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "allow_methods", config.allow_methods.clone()),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "allow_headers", config.allow_headers.clone()),
            (header::ACCESS_CONTROL_MAX_AGE, "max_age_secs", config.max_age_secs.to_string()),
        ]
        .into_iter()
        .map(|(name, field, value)| {
            HeaderValue::from_str(&value)
                .map(|v| (name, v))
                .map_err(|_| Error::InvalidHeader { name: field, value })
        })
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            headers: headers.into(),
        })
    }
}

fn apply(headers: &[(HeaderName, HeaderValue)], response: &mut Response) {
    let target = response.headers_mut();
    for (name, value) in headers {
        target.insert(name.clone(), value.clone());
    }
}

impl Middleware<Request<Body>, Response> for CorsMiddleware {
    fn wrap(&self, next: HttpHandler) -> HttpHandler {
        let headers = self.headers.clone();
        Arc::new(move |request: Request<Body>| {
            if request.method() == Method::OPTIONS {
                let mut response = StatusCode::NO_CONTENT.into_response();
                apply(&headers, &mut response);
                return future::ready(response).boxed();
            }

            let headers = headers.clone();
            let response = next(request);
            async move {
                let mut response = response.await;
                apply(&headers, &mut response);
                response
            }
            .boxed()
        })
    }
}
