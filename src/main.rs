//! admission-guard server.
//!
//! ```text
//!     Client Request
//!     ──▶ TraceLayer ─▶ TimeoutLayer ─┬─▶ /admin/*  (status, stats, history, chaos)
//!                                     │
//!                                     └─▶ CORS ─▶ request id ─▶ tracking ─▶ chaos
//!                                         ─▶ concurrency governor ─▶ rate limiter ─▶ handler
//!
//!     Heartbeat (every rollup interval)
//!     collector rollup ─▶ anomaly detector ─▶ temporal history ─▶ gauges
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use admission_guard::config::{load_config, GuardConfig};
use admission_guard::lifecycle::{signals, Shutdown};
use admission_guard::observability::{logging, metrics};
use admission_guard::HttpServer;

#[derive(Parser)]
#[command(name = "admission-guard")]
#[command(about = "Adaptive admission control in front of an HTTP handler", long_about = None)]
struct Args {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "admission-guard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        requests_per_second = config.rate_limit.requests_per_second,
        burst_size = config.rate_limit.burst_size,
        min_limit = config.concurrency.min_limit,
        max_limit = config.concurrency.max_limit,
        target_latency_ms = config.concurrency.target_latency_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
