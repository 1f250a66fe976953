//! Admin API.
//!
//! Mounted beside the guarded fallback, so operators can still inspect and
//! steer the service while it is shedding load.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::telemetry::{HealthStatus, SystemSnapshot, TemporalSnapshot};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/history", get(get_history))
        .route("/admin/chaos", get(get_chaos).post(set_chaos))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

/// Rejects requests without `Authorization: Bearer <api_key>` when a key is configured.
async fn require_api_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(key) = state.admin_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    if presented == Some(key) {
        Ok(next.run(request).await)
    } else {
        tracing::debug!("Admin request rejected: missing or wrong API key");
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub health: HealthStatus,
    pub uptime_seconds: f64,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let latest = state.heartbeat.latest();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        health: latest.metrics.health_status,
        uptime_seconds: latest.metrics.uptime_seconds,
    })
}

#[derive(Debug, Serialize)]
pub struct ConcurrencyStats {
    pub limit: usize,
    pub inflight: usize,
    pub min_limit: usize,
    pub max_limit: usize,
}

#[derive(Debug, Serialize)]
pub struct RateLimitStats {
    pub requests_per_second: f64,
    pub burst_size: f64,
    pub available: f64,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    #[serde(flatten)]
    pub snapshot: SystemSnapshot,
    pub concurrency: Option<ConcurrencyStats>,
    pub rate_limit: Option<RateLimitStats>,
}

/// Latest heartbeat snapshot plus live admission state.
pub async fn get_stats(State(state): State<AppState>) -> Json<Stats> {
    let concurrency = state.governor.as_ref().map(|g| ConcurrencyStats {
        limit: g.limit(),
        inflight: g.inflight(),
        min_limit: g.min_limit(),
        max_limit: g.max_limit(),
    });
    let rate_limit = state.limiter.as_ref().map(|l| RateLimitStats {
        requests_per_second: l.rate(),
        burst_size: l.capacity(),
        available: l.available(),
    });

    Json(Stats {
        snapshot: *state.heartbeat.latest(),
        concurrency,
        rate_limit,
    })
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// Recorded snapshots, oldest first.
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<TemporalSnapshot<SystemSnapshot>>> {
    let history = match params.limit {
        Some(limit) => state.history.recent(limit),
        None => state.history.history(),
    };
    Json(history)
}

#[derive(Debug, Serialize)]
pub struct ChaosState {
    pub target: f64,
    pub current: f64,
}

#[derive(Debug, Deserialize)]
pub struct ChaosRequest {
    pub target: f64,
}

pub async fn get_chaos(State(state): State<AppState>) -> Json<ChaosState> {
    Json(ChaosState {
        target: state.anomaly.target_chaos(),
        current: state.anomaly.stats().chaos_factor,
    })
}

/// Set the chaos target. The applied level moves toward it on each heartbeat.
pub async fn set_chaos(
    State(state): State<AppState>,
    Json(request): Json<ChaosRequest>,
) -> Json<ChaosState> {
    state.anomaly.set_chaos(request.target);
    let target = state.anomaly.target_chaos();
    tracing::info!(requested = request.target, target, "Chaos target updated");
    get_chaos(State(state)).await
}
