//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the admission components from configuration
//! - Compose the guarded middleware chain around the terminal handler
//! - Mount the admin API and the guarded fallback on one Axum router
//! - Run the telemetry heartbeat alongside the listener
//! - Shut both down on the broadcast signal

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admission::{ConcurrencyGovernor, RateLimiter};
use crate::config::GuardConfig;
use crate::error::Error;
use crate::http::admin;
use crate::lifecycle::Shutdown;
use crate::middleware::{
    handler_fn, layer, ChaosMiddleware, ConcurrencyMiddleware, CorsMiddleware, HttpChain,
    HttpHandler, HttpMiddleware, RateLimitMiddleware, RequestIdMiddleware, TrackingMiddleware,
};
use crate::telemetry::{
    AnomalyDetector, HealthStatus, HealthThresholds, Heartbeat, SystemSnapshot, TelemetryCollector,
    TemporalHistory,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<TelemetryCollector>,
    pub anomaly: Arc<AnomalyDetector>,
    pub history: Arc<TemporalHistory<SystemSnapshot>>,
    pub heartbeat: Arc<Heartbeat>,
    pub governor: Option<Arc<ConcurrencyGovernor>>,
    pub limiter: Option<Arc<RateLimiter>>,
    pub admin_key: Option<Arc<str>>,
}

impl AppState {
    /// Construct every component named in `config`.
    pub fn from_config(config: &GuardConfig) -> Result<Self, Error> {
        let collector = Arc::new(TelemetryCollector::new(HealthThresholds::from(
            &config.telemetry,
        )));
        let anomaly = Arc::new(AnomalyDetector::new(&config.anomaly));
        let history = Arc::new(TemporalHistory::new(config.telemetry.history_capacity)?);

        let governor = if config.concurrency.enabled {
            Some(Arc::new(ConcurrencyGovernor::new(
                config.concurrency.min_limit,
                config.concurrency.max_limit,
                config.concurrency.target_latency(),
            )?))
        } else {
            None
        };

        let limiter = if config.rate_limit.enabled {
            Some(Arc::new(RateLimiter::new(
                config.rate_limit.requests_per_second,
                config.rate_limit.burst_size,
            )?))
        } else {
            None
        };

        let mut heartbeat = Heartbeat::new(
            collector.clone(),
            anomaly.clone(),
            history.clone(),
            config.telemetry.rollup_interval(),
        );
        if let Some(governor) = &governor {
            heartbeat = heartbeat.with_governor(governor.clone());
        }

        Ok(Self {
            collector,
            anomaly,
            history,
            heartbeat: Arc::new(heartbeat),
            governor,
            limiter,
            admin_key: config.admin.api_key.as_deref().map(Arc::from),
        })
    }

    /// Middlewares in request order, outermost first.
    pub fn chain(&self, config: &GuardConfig) -> Result<HttpChain, Error> {
        let mut layers: Vec<HttpMiddleware> = Vec::new();

        if config.cors.enabled {
            layers.push(layer(CorsMiddleware::new(&config.cors)?));
        }
        layers.push(layer(RequestIdMiddleware));
        layers.push(layer(TrackingMiddleware::new(self.collector.clone())));
        if config.chaos.enabled {
            layers.push(layer(ChaosMiddleware::new(self.anomaly.clone())));
        }
        if let Some(governor) = &self.governor {
            layers.push(layer(ConcurrencyMiddleware::new(governor.clone())));
        }
        if let Some(limiter) = &self.limiter {
            layers.push(layer(RateLimitMiddleware::new(limiter.clone())));
        }

        Ok(HttpChain::new(layers))
    }
}

/// HTTP server hosting the guarded handler.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: GuardConfig,
}

impl HttpServer {
    /// Create a server whose guarded chain ends in the default welcome handler.
    pub fn new(config: GuardConfig) -> Result<Self, Error> {
        let state = AppState::from_config(&config)?;
        let terminal = welcome_handler(state.heartbeat.clone());
        Self::with_handler(config, state, terminal)
    }

    /// Create a server whose guarded chain ends in `handler`.
    pub fn with_handler(
        config: GuardConfig,
        state: AppState,
        handler: HttpHandler,
    ) -> Result<Self, Error> {
        let guarded = state.chain(&config)?.then(handler);
        let router = Self::build_router(&config, state.clone(), guarded);
        Ok(Self {
            router,
            state,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GuardConfig, state: AppState, guarded: HttpHandler) -> Router {
        Router::new()
            .merge(admin::router(state))
            .fallback(move |request: Request<Body>| guarded(request))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    /// The assembled router, for driving requests without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            rate_limit = self.state.limiter.is_some(),
            concurrency = self.state.governor.is_some(),
            "HTTP server starting"
        );

        let heartbeat = tokio::spawn(self.state.heartbeat.clone().run(shutdown.subscribe()));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        if let Err(e) = heartbeat.await {
            tracing::error!(error = %e, "Telemetry heartbeat task failed");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[derive(Serialize)]
struct Welcome {
    message: &'static str,
    path: String,
    rps: f64,
    health: HealthStatus,
}

/// Terminal handler answering with current load figures.
pub fn welcome_handler(heartbeat: Arc<Heartbeat>) -> HttpHandler {
    handler_fn(move |request: Request<Body>| {
        let latest = heartbeat.latest();
        let body = Welcome {
            message: "Welcome to the guarded service",
            path: request.uri().path().to_string(),
            rps: latest.metrics.requests_per_second,
            health: latest.metrics.health_status,
        };
        async move { Json(body).into_response() }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[test]
    fn test_chain_follows_config() {
        let config = GuardConfig::default();
        let state = AppState::from_config(&config).unwrap();
        assert_eq!(state.chain(&config).unwrap().len(), 6);

        let mut minimal = GuardConfig::default();
        minimal.cors.enabled = false;
        minimal.chaos.enabled = false;
        minimal.rate_limit.enabled = false;
        minimal.concurrency.enabled = false;
        let state = AppState::from_config(&minimal).unwrap();
        assert!(state.governor.is_none());
        assert_eq!(state.chain(&minimal).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_components_are_refused() {
        let mut config = GuardConfig::default();
        config.telemetry.history_capacity = 0;
        assert!(matches!(
            HttpServer::new(config),
            Err(Error::InvalidHistoryCapacity)
        ));
    }

    #[tokio::test]
    async fn test_fallback_reaches_welcome_handler() {
        let server = HttpServer::new(GuardConfig::default()).unwrap();
        let res = server
            .router()
            .oneshot(Request::get("/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["path"], "/anything");
        assert_eq!(json["health"], "HEALTHY");
        assert_eq!(server.state().collector.total_requests(), 1);
    }
}
