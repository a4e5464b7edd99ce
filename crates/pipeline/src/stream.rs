//! Stream - ordered event queue of one (source, name) pair
//!
//! A stream serializes everything that must stay ordered: events are
//! pushed at the tail, processed from the head by at most one attached
//! processor, and their offsets are acknowledged back to the input in
//! push order. Acks that arrive out of order (parallel batch workers)
//! wait in a small set until the gap in front of them closes.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use sluice_event::Event;

#[cfg(test)]
#[path = "stream_test.rs"]
mod tests;

/// FIFO of events sharing (source id, source name).
///
/// # Cursors
///
/// - `tail`: offset of the last pushed event.
/// - `head`: offset of the last event handed to a processor.
/// - `committed`: highest offset delivered to the input; never
///   overtakes `head`, which never overtakes `tail`.
pub struct Stream {
    source_id: u64,
    name: Arc<str>,
    inner: Mutex<StreamInner>,
}

#[derive(Default)]
struct StreamInner {
    queue: VecDeque<Box<Event>>,
    /// Offsets admitted and not yet delivered to the input, in push
    /// order.
    inflight: VecDeque<i64>,
    /// Acknowledged offsets still blocked by a gap in front of them.
    /// Bounded by batch size x output workers.
    acked: BTreeSet<i64>,
    committed: i64,
    head: i64,
    tail: i64,
    attached: bool,
    queued: bool,
}

impl Stream {
    pub(crate) fn new(source_id: u64, name: Arc<str>) -> Self {
        Self {
            source_id,
            name,
            inner: Mutex::new(StreamInner::default()),
        }
    }

    #[inline]
    pub fn source_id(&self) -> u64 {
        self.source_id
    }

    #[inline]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Append an event. Returns true when the stream has to be put on
    /// the ready queue (it has work and nobody owns it yet).
    pub(crate) fn push(&self, event: Box<Event>) -> bool {
        let mut inner = self.inner.lock();
        inner.tail = event.offset();
        inner.inflight.push_back(event.offset());
        inner.queue.push_back(event);
        if !inner.attached && !inner.queued {
            inner.queued = true;
            true
        } else {
            false
        }
    }

    /// Called by the stream pool when a processor takes the stream.
    pub(crate) fn attach(&self) {
        let mut inner = self.inner.lock();
        inner.queued = false;
        inner.attached = true;
    }

    /// Take the head event. Only the attached processor calls this.
    pub(crate) fn pop_head(&self) -> Option<Box<Event>> {
        let mut inner = self.inner.lock();
        let event = inner.queue.pop_front()?;
        inner.head = event.offset();
        Some(event)
    }

    /// Detach from the finished processor. Returns true when the
    /// stream still has events and must be re-enqueued at the ready
    /// tail.
    pub(crate) fn detach(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.attached = false;
        if !inner.queue.is_empty() && !inner.queued {
            inner.queued = true;
            true
        } else {
            false
        }
    }

    /// Acknowledge one offset. Returns the offsets (in order) that
    /// became deliverable to the input, i.e. the contiguous prefix
    /// this ack completed.
    pub(crate) fn ack(&self, offset: i64) -> Vec<i64> {
        let mut inner = self.inner.lock();
        inner.acked.insert(offset);
        let mut drained = Vec::new();
        while let Some(&front) = inner.inflight.front() {
            if !inner.acked.remove(&front) {
                break;
            }
            inner.inflight.pop_front();
            inner.committed = front;
            drained.push(front);
        }
        drained
    }

    /// Highest offset delivered to the input.
    pub fn committed(&self) -> i64 {
        self.inner.lock().committed
    }

    /// Events waiting to be processed.
    pub fn queued_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Offsets admitted but not yet delivered to the input.
    pub fn inflight_len(&self) -> usize {
        self.inner.lock().inflight.len()
    }

    /// True when nothing is queued and every admitted offset was
    /// delivered.
    pub fn is_drained(&self) -> bool {
        let inner = self.inner.lock();
        inner.queue.is_empty() && inner.inflight.is_empty()
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Stream")
            .field("source_id", &self.source_id)
            .field("name", &self.name)
            .field("queued", &inner.queue.len())
            .field("inflight", &inner.inflight.len())
            .field("committed", &inner.committed)
            .field("head", &inner.head)
            .field("tail", &inner.tail)
            .finish()
    }
}
