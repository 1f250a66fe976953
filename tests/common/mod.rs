//! Shared utilities for integration tests.

use std::net::SocketAddr;

use admission_guard::config::GuardConfig;
use admission_guard::{HttpServer, Shutdown};
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Defaults with chaos off and no exporter, so responses are deterministic.
pub fn quiet_config() -> GuardConfig {
    let mut config = GuardConfig::default();
    config.chaos.enabled = false;
    config.observability.metrics_enabled = false;
    config
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Serve `server` on an ephemeral port.
#[allow(dead_code)]
pub async fn spawn_server(
    server: HttpServer,
    shutdown: Shutdown,
) -> (SocketAddr, JoinHandle<std::io::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(server.run(listener, shutdown));
    (addr, handle)
}
