//! Batcher - groups processed events for the output
//!
//! One assembler task closes batches on three triggers (event count,
//! payload bytes, flush timeout since the first event) and pushes them
//! into a bounded ring. P worker tasks pull closed batches, call the
//! output, retry per policy, and feed per-event commits back through
//! the commit fan-in. A full ring blocks the assembler, which blocks
//! the processors, which blocks the input: backpressure propagates the
//! whole way up.
//!
//! # Batch life cycle
//!
//! `open -> closed -> in-flight -> committed`, or on send failure
//! `in-flight -> failed -> in-flight` (retry) until the attempt budget
//! runs out and the fail policy decides: `fatal` stops the pipeline,
//! `drop` acknowledges and counts, `park` keeps retrying.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossfire::{AsyncRx, MAsyncRx, MAsyncTx};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sluice_event::Event;
use sluice_plugin::{FailPolicy, OutputPlugin};

use crate::commit::CommitFanIn;
use crate::metrics::PipelineMetrics;

#[cfg(test)]
#[path = "batcher_test.rs"]
mod tests;

/// Ceiling for the exponential retry backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Resolved batching options of one output.
#[derive(Debug, Clone)]
pub struct BatcherOptions {
    /// Parallel send workers.
    pub workers: usize,
    /// Close a batch at this many events.
    pub size_count: usize,
    /// Close a batch at this many payload bytes (0 = off).
    pub size_bytes: usize,
    /// Close a non-empty batch this long after its first event.
    pub flush_timeout: Duration,
    /// Send attempts before the fail policy applies.
    pub retry_attempts: u32,
    /// Initial backoff between attempts; doubles up to 5s.
    pub retry_backoff: Duration,
    /// What to do when the attempts run out.
    pub fail_policy: FailPolicy,
}

impl Default for BatcherOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            size_count: 256,
            size_bytes: 0,
            flush_timeout: Duration::from_millis(200),
            retry_attempts: 10,
            retry_backoff: Duration::from_millis(50),
            fail_policy: FailPolicy::Park,
        }
    }
}

/// Batch delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Open,
    Closed,
    InFlight,
    Committed,
    Failed,
    Poisoned,
}

/// A group of events bound to one output send.
pub struct Batch {
    seq: u64,
    events: Vec<Box<Event>>,
    bytes: usize,
    opened_at: Instant,
    state: BatchState,
}

impl Batch {
    fn new(seq: u64, capacity: usize) -> Self {
        Self {
            seq,
            events: Vec::with_capacity(capacity),
            bytes: 0,
            opened_at: Instant::now(),
            state: BatchState::Open,
        }
    }

    fn add(&mut self, event: Box<Event>) {
        debug_assert_eq!(self.state, BatchState::Open);
        self.bytes += event.size();
        self.events.push(event);
    }

    fn is_full(&self, options: &BatcherOptions) -> bool {
        self.events.len() >= options.size_count
            || (options.size_bytes > 0 && self.bytes >= options.size_bytes)
    }

    fn close(&mut self) {
        debug_assert_eq!(self.state, BatchState::Open);
        self.state = BatchState::Closed;
    }

    fn begin_send(&mut self) {
        debug_assert!(matches!(
            self.state,
            BatchState::Closed | BatchState::Failed
        ));
        self.state = BatchState::InFlight;
    }

    fn mark_failed(&mut self) {
        debug_assert_eq!(self.state, BatchState::InFlight);
        self.state = BatchState::Failed;
    }

    fn mark_committed(&mut self) {
        debug_assert_eq!(self.state, BatchState::InFlight);
        self.state = BatchState::Committed;
    }

    fn mark_poisoned(&mut self) {
        self.state = BatchState::Poisoned;
    }

    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    #[inline]
    pub fn state(&self) -> BatchState {
        self.state
    }

    #[inline]
    pub fn events(&self) -> &[Box<Event>] {
        &self.events
    }

    fn take_events(&mut self) -> Vec<Box<Event>> {
        std::mem::take(&mut self.events)
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("seq", &self.seq)
            .field("events", &self.events.len())
            .field("bytes", &self.bytes)
            .field("state", &self.state)
            .finish()
    }
}

/// The batching stage of one pipeline.
pub(crate) struct Batcher {
    pipeline: String,
    options: BatcherOptions,
    output: Arc<dyn OutputPlugin>,
    commits: Arc<CommitFanIn>,
    metrics: PipelineMetrics,
    cancel: CancellationToken,
    /// Cancelled when a fatal delivery failure stops the pipeline.
    failed: CancellationToken,
}

impl Batcher {
    pub(crate) fn new(
        pipeline: String,
        options: BatcherOptions,
        output: Arc<dyn OutputPlugin>,
        commits: Arc<CommitFanIn>,
        metrics: PipelineMetrics,
        cancel: CancellationToken,
        failed: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            options,
            output,
            commits,
            metrics,
            cancel,
            failed,
        }
    }

    /// Spawn the assembler and the send workers. The batcher drains
    /// and exits once `event_rx` closes (all processor senders gone).
    pub(crate) fn spawn(self: Arc<Self>, event_rx: AsyncRx<Box<Event>>) -> Vec<JoinHandle<()>> {
        let workers = self.options.workers.max(1);
        let (ring_tx, ring_rx) = crossfire::mpmc::bounded_async::<Batch>(workers * 2);

        let mut tasks = Vec::with_capacity(workers + 1);
        tasks.push(tokio::spawn(
            Arc::clone(&self).run_assembler(event_rx, ring_tx),
        ));
        for id in 0..workers {
            tasks.push(tokio::spawn(Arc::clone(&self).run_worker(id, ring_rx.clone())));
        }
        tasks
    }

    async fn run_assembler(self: Arc<Self>, event_rx: AsyncRx<Box<Event>>, ring_tx: MAsyncTx<Batch>) {
        let mut seq = 0u64;
        let mut input_open = true;

        while input_open {
            // Wait for the first event of the next batch.
            let first = tokio::select! {
                r = event_rx.recv() => match r {
                    Ok(event) => event,
                    Err(_) => break,
                },
                _ = self.cancel.cancelled() => break,
            };

            seq += 1;
            let mut batch = Batch::new(seq, self.options.size_count.min(4096));
            batch.add(first);
            let deadline = tokio::time::Instant::now() + self.options.flush_timeout;

            while !batch.is_full(&self.options) {
                tokio::select! {
                    r = event_rx.recv() => match r {
                        Ok(event) => batch.add(event),
                        Err(_) => {
                            input_open = false;
                            break;
                        }
                    },
                    _ = tokio::time::sleep_until(deadline) => break,
                    _ = self.cancel.cancelled() => {
                        input_open = false;
                        break;
                    }
                }
            }

            batch.close();
            self.metrics.batch_size.observe(batch.len() as f64);
            if let Err(mut e) = ring_tx.send(batch).await {
                // Workers already gone (hard cancel); nothing left to
                // deliver the events, release them for replay.
                self.release_batch_events(e.0.take_events());
                break;
            }
        }

        tracing::debug!(pipeline = %self.pipeline, batches = seq, "batch assembler finished");
        // ring_tx drops here; workers drain the ring and exit.
    }

    async fn run_worker(self: Arc<Self>, id: usize, ring_rx: MAsyncRx<Batch>) {
        while let Ok(mut batch) = ring_rx.recv().await {
            self.send_batch(&mut batch).await;
        }
        tracing::debug!(pipeline = %self.pipeline, worker = id, "batch worker finished");
    }

    /// Drive one batch to a terminal state.
    async fn send_batch(&self, batch: &mut Batch) {
        let mut attempt: u32 = 0;
        let mut backoff = self.options.retry_backoff;

        loop {
            batch.begin_send();

            let outcome = tokio::select! {
                r = self.output.out(batch.events()) => Some(r),
                _ = self.cancel.cancelled() => None,
            };
            // A send aborted by cancellation counts as failed: the
            // events go back to the pool unacknowledged and the input
            // replays them after restart.
            let Some(result) = outcome else {
                batch.mark_failed();
                self.release_batch_events(batch.take_events());
                return;
            };

            match result {
                Ok(()) => {
                    batch.mark_committed();
                    self.metrics.batches_sent.inc();
                    self.metrics
                        .batch_flush_latency
                        .observe(batch.opened_at.elapsed().as_secs_f64());
                    for event in batch.take_events() {
                        self.commits.commit(event);
                    }
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    batch.mark_failed();
                    self.metrics.batches_failed.inc();
                    tracing::warn!(
                        pipeline = %self.pipeline,
                        batch = batch.seq(),
                        attempt,
                        error = %e,
                        "batch delivery failed"
                    );

                    if attempt >= self.options.retry_attempts.max(1) {
                        match self.options.fail_policy {
                            FailPolicy::Fatal => {
                                batch.mark_poisoned();
                                tracing::error!(
                                    pipeline = %self.pipeline,
                                    batch = batch.seq(),
                                    attempts = attempt,
                                    "batch poisoned, stopping pipeline"
                                );
                                self.release_batch_events(batch.take_events());
                                self.failed.cancel();
                                return;
                            }
                            FailPolicy::Drop => {
                                batch.mark_poisoned();
                                let dropped = batch.len() as u64;
                                tracing::error!(
                                    pipeline = %self.pipeline,
                                    batch = batch.seq(),
                                    events = dropped,
                                    "batch poisoned, dropping per policy"
                                );
                                self.metrics.events_dropped.inc_by(dropped);
                                // Acknowledge anyway so the input
                                // moves past the poisoned range.
                                for event in batch.take_events() {
                                    self.commits.commit(event);
                                }
                                return;
                            }
                            FailPolicy::Park => {
                                // Retry forever; only shutdown stops a
                                // parked batch.
                                attempt = 0;
                            }
                        }
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.cancel.cancelled() => {
                            self.release_batch_events(batch.take_events());
                            return;
                        }
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    fn release_batch_events(&self, events: Vec<Box<Event>>) {
        let count = events.len() as u64;
        if count == 0 {
            return;
        }
        for event in events {
            self.commits.release_uncommitted(event);
        }
        self.metrics.events_dropped.inc_by(count);
    }
}
