//! StreamPool - stream registry and ready queue
//!
//! Streams are created lazily on first push and live for the
//! pipeline's lifetime (their count is bounded by source cardinality).
//! The ready queue is FIFO across streams so one loud stream cannot
//! starve the others: a stream that still has events after a processor
//! turn goes back to the tail.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use sluice_event::Event;

use crate::stream::Stream;

#[cfg(test)]
#[path = "stream_pool_test.rs"]
mod tests;

/// Registry of streams plus the FIFO ready queue feeding processors.
pub struct StreamPool {
    inner: Mutex<PoolInner>,
    ready_notify: Notify,
}

#[derive(Default)]
struct PoolInner {
    /// source id -> source name -> stream
    streams: HashMap<u64, HashMap<Arc<str>, Arc<Stream>>>,
    ready: std::collections::VecDeque<Arc<Stream>>,
    total: usize,
}

impl StreamPool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            ready_notify: Notify::new(),
        }
    }

    /// Look up or lazily create the stream for (source id, name).
    pub fn get_or_create(&self, source_id: u64, name: &str) -> Arc<Stream> {
        let mut inner = self.inner.lock();
        let by_name = inner.streams.entry(source_id).or_default();
        if let Some(stream) = by_name.get(name) {
            return Arc::clone(stream);
        }
        let name: Arc<str> = Arc::from(name);
        let stream = Arc::new(Stream::new(source_id, Arc::clone(&name)));
        by_name.insert(name, Arc::clone(&stream));
        inner.total += 1;
        tracing::debug!(source_id, stream = %stream.name(), "stream created");
        stream
    }

    /// Route an event to its stream, waking a processor if the stream
    /// just became ready. Returns the interned stream name so the
    /// caller can retag the event without another allocation.
    pub fn push(&self, mut event: Box<Event>) {
        let stream = self.get_or_create(event.source_id(), event.source_name());
        event.set_source_name(Arc::clone(stream.name()));
        if stream.push(event) {
            self.enqueue_ready(stream);
        }
    }

    /// Acknowledge an offset; returns the offsets that became
    /// deliverable to the input, in order.
    pub fn ack(&self, source_id: u64, name: &str, offset: i64) -> Vec<i64> {
        let stream = {
            let inner = self.inner.lock();
            inner
                .streams
                .get(&source_id)
                .and_then(|by_name| by_name.get(name))
                .cloned()
        };
        match stream {
            Some(stream) => stream.ack(offset),
            None => {
                // An ack for a stream that never pushed is a bug
                // upstream, not worth dying for.
                tracing::error!(source_id, name, offset, "ack for unknown stream");
                Vec::new()
            }
        }
    }

    /// Take the next ready stream, suspending until one shows up.
    /// The returned stream is attached to the caller.
    pub async fn next_ready(&self) -> Arc<Stream> {
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(stream) = inner.ready.pop_front() {
                    if !inner.ready.is_empty() {
                        // More work queued: keep the wake chain going
                        // for the other waiting processors.
                        self.ready_notify.notify_one();
                    }
                    stream.attach();
                    return stream;
                }
            }
            self.ready_notify.notified().await;
        }
    }

    /// Return a stream after one processor turn: back to the ready
    /// tail if it still has events, detached otherwise.
    pub fn release(&self, stream: Arc<Stream>) {
        if stream.detach() {
            self.enqueue_ready(stream);
        }
    }

    fn enqueue_ready(&self, stream: Arc<Stream>) {
        self.inner.lock().ready.push_back(stream);
        self.ready_notify.notify_one();
    }

    /// Number of streams created so far.
    pub fn stream_count(&self) -> usize {
        self.inner.lock().total
    }

    /// Events queued across all streams.
    pub fn total_queued(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .streams
            .values()
            .flat_map(|by_name| by_name.values())
            .map(|s| s.queued_len())
            .sum()
    }

    /// Offsets admitted but not yet delivered across all streams.
    pub fn total_inflight(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .streams
            .values()
            .flat_map(|by_name| by_name.values())
            .map(|s| s.inflight_len())
            .sum()
    }

    /// True when every stream is empty and fully committed.
    pub fn is_drained(&self) -> bool {
        let inner = self.inner.lock();
        inner
            .streams
            .values()
            .flat_map(|by_name| by_name.values())
            .all(|s| s.is_drained())
    }
}

impl Default for StreamPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StreamPool")
            .field("streams", &inner.total)
            .field("ready", &inner.ready.len())
            .finish()
    }
}
