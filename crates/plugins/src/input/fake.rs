//! Fake input - in-process test and benchmark source
//!
//! Feeds payloads handed to it by the caller straight into the
//! pipeline and records every commit callback, so tests can await a
//! full drain instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use sluice_plugin::{Ingest, InputParams, InputPlugin, PluginConfig, PluginError};

#[cfg(test)]
#[path = "fake_test.rs"]
mod tests;

/// One recorded commit callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub source_id: u64,
    pub source_name: String,
    pub offset: i64,
}

/// In-process input. `feed` pushes a record; `wait_committed` blocks
/// until the pipeline acknowledged a number of offsets.
#[derive(Default)]
pub struct FakeInput {
    ingress: RwLock<Option<Arc<dyn Ingest>>>,
    commits: Mutex<Vec<Commit>>,
    committed: AtomicU64,
    notify: Notify,
}

impl FakeInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one record into the pipeline. Returns the event sequence
    /// number (0 when the record was dropped at admission or the
    /// input is not started).
    pub async fn feed(&self, source_id: u64, source_name: &str, offset: i64, data: &[u8]) -> u64 {
        let ingress = self.ingress.read().clone();
        match ingress {
            Some(ingress) => ingress.ingest(source_id, source_name, offset, data).await,
            None => 0,
        }
    }

    /// Commits received so far, in callback order.
    pub fn commits(&self) -> Vec<Commit> {
        self.commits.lock().clone()
    }

    /// Offsets committed for one (source id, source name) pair.
    pub fn committed_offsets(&self, source_id: u64, source_name: &str) -> Vec<i64> {
        self.commits
            .lock()
            .iter()
            .filter(|c| c.source_id == source_id && c.source_name == source_name)
            .map(|c| c.offset)
            .collect()
    }

    #[inline]
    pub fn committed_count(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    /// Suspend until at least `count` commits arrived.
    pub async fn wait_committed(&self, count: u64) {
        loop {
            let notified = self.notify.notified();
            if self.committed.load(Ordering::SeqCst) >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl InputPlugin for FakeInput {
    async fn start(&self, _config: &PluginConfig, params: InputParams) -> Result<(), PluginError> {
        tracing::debug!(pipeline = %params.pipeline, "fake input started");
        *self.ingress.write() = Some(params.ingress);
        Ok(())
    }

    fn commit(&self, source_id: u64, source_name: &str, offset: i64) {
        self.commits.lock().push(Commit {
            source_id,
            source_name: source_name.to_string(),
            offset,
        });
        self.committed.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn stop(&self) {
        *self.ingress.write() = None;
    }
}
