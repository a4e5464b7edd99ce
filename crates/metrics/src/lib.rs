//! Sluice - Metrics
//!
//! A process-wide Prometheus registry plus the HTTP server that
//! exposes it: `/metrics` in Prometheus text format, `/health` and
//! `/ready` as JSON probes. Pipelines register their instruments into
//! the shared registry at construction time.

mod registry;
mod server;

pub use registry::MetricsRegistry;
pub use server::{parse_listen_addr, MetricsServer};

use thiserror::Error;

/// Errors from the metrics subsystem.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid listen address {addr:?}: {reason}")]
    Address { addr: String, reason: String },

    #[error("can't bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics encoding failed: {0}")]
    Encoding(String),
}
