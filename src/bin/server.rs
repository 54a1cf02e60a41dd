//! fuzzmon HTTP Server
//!
//! This binary wires the exporter together: it registers the campaign
//! directories given on the command line, runs the watcher in the
//! background, and serves the metric registry over HTTP.
//!
//! # Endpoints
//!
//! - `GET /metrics` - Prometheus text exposition of all campaign series
//! - `GET /health` - Health check
//!
//! # Configuration
//!
//! The server reads configuration from:
//! 1. Command-line flags (highest precedence)
//! 2. `FUZZMON_CONFIG` environment variable (path to TOML file)
//! 3. `./fuzzmon.toml` in current directory
//! 4. Default configuration
//!
//! # Example
//!
//! ```bash
//! # Watch two campaigns, scanning every 30 seconds
//! ./server -- /data/fuzz1 /data/fuzz2
//!
//! # Faster scans on a custom port
//! ./server --scan-delay 5 --listen-addr 0.0.0.0:9101 -- /data/fuzz1
//!
//! # Scrape
//! curl http://localhost:2112/metrics
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use fuzzmon::{
    FuzzerWatcher, MetricRegistry, ServiceManager, Target, WatcherConfig,
    EXPOSITION_CONTENT_TYPE,
};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{error, info};

// =============================================================================
// Command Line
// =============================================================================

/// Prometheus exporter for AFL fuzzing campaigns
#[derive(Parser)]
#[command(
    name = "fuzzmon",
    version,
    about = "Prometheus exporter for AFL fuzzing campaigns",
    long_about = "Polls fuzzer_stats files from campaign output directories and \
                  serves the parsed fields as labeled Prometheus gauges."
)]
struct Cli {
    /// Seconds to sleep between scans of the campaign directories.
    #[arg(long, value_name = "SECS")]
    scan_delay: Option<u64>,

    /// Upper bound on a single status-file read, in milliseconds.
    #[arg(long, value_name = "MS")]
    read_timeout_ms: Option<u64>,

    /// Address to serve the metrics endpoint on.
    #[arg(long, value_name = "ADDR")]
    listen_addr: Option<String>,

    /// Campaign output directories to watch, after `--`.
    #[arg(required = true, last = true, value_name = "DIR")]
    directories: Vec<PathBuf>,
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Server configuration loaded from TOML, overridden by CLI flags
#[derive(Debug, Clone, Deserialize)]
struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_listen_addr")]
    listen_addr: String,

    /// Seconds between poll cycles
    #[serde(default = "default_scan_delay_secs")]
    scan_delay_secs: u64,

    /// Per-target status-file read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    read_timeout_ms: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:2112".to_string()
}

fn default_scan_delay_secs() -> u64 {
    30
}

fn default_read_timeout_ms() -> u64 {
    5_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            scan_delay_secs: default_scan_delay_secs(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl ServerConfig {
    fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            poll_interval: Duration::from_secs(self.scan_delay_secs),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }
}

/// Load configuration from file or environment
fn load_config() -> ServerConfig {
    // Check environment variable first
    if let Ok(path) = std::env::var("FUZZMON_CONFIG") {
        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!(path = %path, "Loaded configuration from file");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to parse config file, using defaults");
                }
            },
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Failed to read config file, using defaults");
            }
        }
    }

    // Check default config file
    if let Ok(content) = std::fs::read_to_string("fuzzmon.toml") {
        if let Ok(config) = toml::from_str(&content) {
            info!("Loaded configuration from fuzzmon.toml");
            return config;
        }
    }

    ServerConfig::default()
}

// =============================================================================
// Application State
// =============================================================================

/// Shared application state
struct AppState {
    registry: Arc<MetricRegistry>,
}

/// Health response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

// =============================================================================
// API Handlers
// =============================================================================

/// Health check endpoint
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.registry.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Build the router with all endpoints
fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fuzzmon=info".parse()?)
                .add_directive("server=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration, CLI flags win
    let mut config = load_config();
    if let Some(secs) = cli.scan_delay {
        config.scan_delay_secs = secs;
    }
    if let Some(ms) = cli.read_timeout_ms {
        config.read_timeout_ms = ms;
    }
    if let Some(addr) = cli.listen_addr {
        config.listen_addr = addr;
    }

    info!("fuzzmon starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Scan delay: {}s", config.scan_delay_secs);

    // Register targets
    let targets: Vec<Target> = cli.directories.iter().map(Target::from_directory).collect();
    for target in &targets {
        info!(target = %target, "Watching campaign directory");
    }

    // Build the registry and the watcher
    let registry = MetricRegistry::shared()?;
    let watcher = Arc::new(FuzzerWatcher::new(
        config.watcher_config(),
        targets,
        registry.clone(),
    ));

    let manager = ServiceManager::new();
    manager.register(watcher);
    manager.start_all();

    // Build router
    let state = Arc::new(AppState { registry });
    let app = build_router(state);

    // Parse listen address
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Starting HTTP server on {}", addr);

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the watcher before exiting
    manager.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
