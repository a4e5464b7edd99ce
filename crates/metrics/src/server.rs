//! Metrics HTTP server
//!
//! Serves `/metrics` (Prometheus text), `/health` and `/ready` (JSON).
//! The listen address follows the daemon's `--http` flag: `":9000"`
//! binds every interface, a full `host:port` binds one.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::registry::MetricsRegistry;
use crate::MetricsError;

#[cfg(test)]
#[path = "server_test.rs"]
mod tests;

/// Parse a `--http` style listen address. `":9000"` means all
/// interfaces on port 9000.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, MetricsError> {
    let full = if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    };
    full.parse().map_err(|e| MetricsError::Address {
        addr: addr.to_string(),
        reason: format!("{e}"),
    })
}

/// HTTP endpoint exposing the shared registry.
pub struct MetricsServer {
    registry: MetricsRegistry,
    addr: SocketAddr,
}

#[derive(Clone)]
struct AppState {
    registry: MetricsRegistry,
    started_at: Instant,
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

#[derive(Serialize)]
struct ReadyStatus {
    ready: bool,
}

impl MetricsServer {
    pub fn new(registry: MetricsRegistry, addr: SocketAddr) -> Self {
        Self { registry, addr }
    }

    /// Bind the listener and spawn the serve loop; the task exits on
    /// cancellation.
    pub async fn spawn(self, cancel: CancellationToken) -> Result<JoinHandle<()>, MetricsError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| MetricsError::Bind {
                addr: self.addr,
                source,
            })?;
        let local = listener.local_addr().map_err(|source| MetricsError::Bind {
            addr: self.addr,
            source,
        })?;

        let state = AppState {
            registry: self.registry,
            started_at: Instant::now(),
        };
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .with_state(state);

        tracing::info!(addr = %local, "http endpoint listening");

        Ok(tokio::spawn(async move {
            let shutdown = async move { cancel.cancelled().await };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "http endpoint failed");
            }
        }))
    }
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

async fn ready_handler() -> impl IntoResponse {
    Json(ReadyStatus { ready: true })
}
