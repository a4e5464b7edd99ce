//! Commit fan-in
//!
//! Acknowledgements from batcher workers (and from drop paths inside
//! the chain) converge here: the stream advances its committed cursor,
//! every offset that became contiguous is delivered to the input in
//! order, and the event object returns to the pool.

use std::sync::Arc;

use parking_lot::RwLock;

use sluice_event::{Event, EventPool};
use sluice_plugin::InputPlugin;

use crate::metrics::PipelineMetrics;
use crate::stream_pool::StreamPool;

/// Shared commit sink used by processors and batcher workers.
pub(crate) struct CommitFanIn {
    pool: Arc<EventPool>,
    streams: Arc<StreamPool>,
    metrics: PipelineMetrics,
    input: RwLock<Option<Arc<dyn InputPlugin>>>,
}

impl CommitFanIn {
    pub(crate) fn new(
        pool: Arc<EventPool>,
        streams: Arc<StreamPool>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            pool,
            streams,
            metrics,
            input: RwLock::new(None),
        }
    }

    /// Wire the input that receives the acknowledgements.
    pub(crate) fn set_input(&self, input: Arc<dyn InputPlugin>) {
        *self.input.write() = Some(input);
    }

    /// Drop the input reference once the pipeline released it.
    pub(crate) fn clear_input(&self) {
        *self.input.write() = None;
    }

    /// Acknowledge a delivered event and recycle it.
    pub(crate) fn commit(&self, event: Box<Event>) {
        let drained = self
            .streams
            .ack(event.source_id(), event.source_name(), event.offset());
        self.deliver(event.source_id(), event.source_name(), &drained);
        self.pool.release(event);
    }

    /// Acknowledge an event removed inside the chain (collapse,
    /// discard, dead-letter). Same commit path, the event just never
    /// reached the output.
    pub(crate) fn commit_removed(&self, event: Box<Event>) {
        self.commit(event);
    }

    /// Acknowledge an event whose object was lost to a panicking
    /// action: the stream still advances and the pool gets a fresh
    /// slot back.
    pub(crate) fn ack_lost(&self, source_id: u64, source_name: &str, offset: i64) {
        let drained = self.streams.ack(source_id, source_name, offset);
        self.deliver(source_id, source_name, &drained);
        self.pool.replenish();
    }

    /// Return an event to the pool without acknowledging it. Used when
    /// delivery was aborted by cancellation: the input will replay the
    /// offset after restart.
    pub(crate) fn release_uncommitted(&self, event: Box<Event>) {
        self.pool.release(event);
    }

    fn deliver(&self, source_id: u64, source_name: &str, offsets: &[i64]) {
        if offsets.is_empty() {
            return;
        }
        let input = self.input.read();
        if let Some(input) = input.as_ref() {
            for &offset in offsets {
                input.commit(source_id, source_name, offset);
                self.metrics.events_committed.inc();
            }
        } else {
            // Commits raced the input teardown; the offsets will be
            // replayed by the input on restart.
            tracing::debug!(
                source_id,
                source_name,
                count = offsets.len(),
                "commits dropped, input already detached"
            );
        }
    }
}
