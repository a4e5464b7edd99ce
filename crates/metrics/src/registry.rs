//! Shared Prometheus registry
//!
//! Thread-safe wrapper around `prometheus_client::Registry`. Writers
//! (pipeline construction) register instruments; the HTTP handler
//! encodes the whole registry per scrape.

use std::sync::Arc;

use parking_lot::RwLock;
use prometheus_client::registry::Registry;

use crate::MetricsError;

/// Process-wide metric registry, cheap to clone.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl MetricsRegistry {
    /// Create a registry with the `sluice` prefix.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Registry::with_prefix("sluice"))),
        }
    }

    /// Run `f` with mutable access to the underlying registry.
    /// Components use this to register their instruments.
    pub fn with<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Drop every registered family. Pipeline restarts re-register
    /// their instruments into the same shared registry.
    pub fn reset(&self) {
        *self.inner.write() = Registry::with_prefix("sluice");
    }

    /// Encode every registered family in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let registry = self.inner.read();
        let mut out = String::new();
        prometheus_client::encoding::text::encode(&mut out, &registry)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        Ok(out)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish()
    }
}
