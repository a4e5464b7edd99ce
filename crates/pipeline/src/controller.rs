//! Pipeline controller
//!
//! Owns every moving part of one pipeline: the event pool, the stream
//! layer, the processor pool, the batcher, the admission filters and
//! the plugins. Start order is outputs first, input last; stop order
//! is the reverse, draining in-flight work before workers are joined.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::MAsyncTx;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use sluice_event::{Decoder, Event, EventPool, FieldSelector};
use sluice_plugin::{
    ActionParams, Ingest, InputParams, InputPlugin, OutputParams, OutputPlugin, PluginRegistry,
};

use crate::antispam::{Antispam, AntispamDecision};
use crate::batcher::{Batcher, BatcherOptions};
use crate::commit::CommitFanIn;
use crate::error::{PipelineError, Result};
use crate::limiter::RateLimiter;
use crate::metrics::PipelineMetrics;
use crate::processor::{ActionSpec, Processor};
use crate::ratelog::DropTracker;
use crate::stream_pool::StreamPool;

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;

/// Resolved engine settings of one pipeline (expressions already
/// evaluated, durations parsed).
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Event pool size: the bound on concurrently live events.
    pub capacity: usize,
    /// Processor worker count.
    pub workers: usize,
    /// Expected payload size, used to pre-size buffers.
    pub avg_event_size: usize,
    /// Reject payloads larger than this (0 = unlimited).
    pub max_event_size: usize,
    /// Selector of the tree field that overrides the source name.
    pub stream_field: String,
    /// Per-source events per maintenance window (0 = off).
    pub antispam_threshold: u64,
    /// Payload decoder.
    pub decoder: Decoder,
    /// Discard undecodable payloads instead of wrapping them.
    pub strict_decoding: bool,
    /// Stats/eviction tick interval.
    pub maintenance_interval: Duration,
    /// Per-event action deadline.
    pub event_timeout: Duration,
    /// Admission limit in bytes/sec (0 = unlimited).
    pub rate_limit_bytes: u64,
    /// Output batching options.
    pub batcher: BatcherOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            capacity: sluice_event::DEFAULT_CAPACITY,
            workers: 4,
            avg_event_size: sluice_event::DEFAULT_AVG_EVENT_SIZE,
            max_event_size: 0,
            stream_field: "stream".to_string(),
            antispam_threshold: 0,
            decoder: Decoder::Auto,
            strict_decoding: false,
            maintenance_interval: Duration::from_secs(5),
            event_timeout: Duration::from_secs(30),
            rate_limit_bytes: 0,
            batcher: BatcherOptions::default(),
        }
    }
}

/// One pipeline: input -> actions -> output, plus the engine between.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    options: PipelineOptions,
    stream_field: Option<FieldSelector>,
    pool: Arc<EventPool>,
    streams: Arc<StreamPool>,
    metrics: PipelineMetrics,
    commits: Arc<CommitFanIn>,
    antispam: Antispam,
    limiter: RateLimiter,
    antispam_drops: DropTracker,
    oversize_drops: DropTracker,
    seq: AtomicU64,
    /// Root token: batcher, maintenance, hard aborts.
    cancel: CancellationToken,
    /// Child token that only stops the processor pool.
    proc_cancel: CancellationToken,
    /// Cancelled when delivery failed fatally.
    failed: CancellationToken,
    started: AtomicBool,
    stopping: AtomicBool,
    state: Mutex<MutableState>,
}

#[derive(Default)]
struct MutableState {
    input: Option<(Arc<dyn InputPlugin>, Value)>,
    output: Option<(Arc<dyn OutputPlugin>, Value)>,
    specs: Vec<ActionSpec>,
    event_tx: Option<MAsyncTx<Box<Event>>>,
    processor_tasks: Vec<JoinHandle<()>>,
    batcher_tasks: Vec<JoinHandle<()>>,
    maintenance_task: Option<JoinHandle<()>>,
}

impl Pipeline {
    pub fn new(name: &str, options: PipelineOptions) -> Self {
        let pool = Arc::new(EventPool::new(options.capacity));
        let streams = Arc::new(StreamPool::new());
        let metrics = PipelineMetrics::new();
        let commits = Arc::new(CommitFanIn::new(
            Arc::clone(&pool),
            Arc::clone(&streams),
            metrics.clone(),
        ));
        let stream_field = match options.stream_field.as_str() {
            "" => None,
            s => Some(FieldSelector::parse(s)),
        };
        let cancel = CancellationToken::new();

        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                antispam: Antispam::new(options.antispam_threshold),
                limiter: RateLimiter::new(options.rate_limit_bytes),
                antispam_drops: DropTracker::new("antispam"),
                oversize_drops: DropTracker::new("oversized"),
                stream_field,
                pool,
                streams,
                metrics,
                commits,
                options,
                seq: AtomicU64::new(0),
                proc_cancel: cancel.child_token(),
                cancel,
                failed: CancellationToken::new(),
                started: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                state: Mutex::new(MutableState::default()),
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register this pipeline's metrics under its label.
    pub fn register_metrics(&self, registry: &mut prometheus_client::registry::Registry) {
        self.inner.metrics.register(registry, &self.inner.name);
    }

    pub fn set_input(&self, plugin: Arc<dyn InputPlugin>, config: Value) {
        self.inner.state.lock().input = Some((plugin, config));
    }

    pub fn set_output(&self, plugin: Arc<dyn OutputPlugin>, config: Value) {
        self.inner.state.lock().output = Some((plugin, config));
    }

    pub fn set_actions(&self, specs: Vec<ActionSpec>) {
        self.inner.state.lock().specs = specs;
    }

    /// Handle the input uses to push records in.
    pub fn ingress(&self) -> Arc<dyn Ingest> {
        Arc::clone(&self.inner) as Arc<dyn Ingest>
    }

    #[inline]
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.inner.metrics
    }

    /// Free slots in the event pool.
    pub fn pool_free(&self) -> usize {
        self.inner.pool.free_count()
    }

    pub fn stream_count(&self) -> usize {
        self.inner.streams.stream_count()
    }

    /// True when every stream is empty and fully committed.
    pub fn is_drained(&self) -> bool {
        self.inner.streams.is_drained()
    }

    /// Cancelled when the output gave up fatally; the daemon watches
    /// this to turn a pipeline failure into a process exit.
    pub fn failed_token(&self) -> CancellationToken {
        self.inner.failed.clone()
    }

    pub fn is_failed(&self) -> bool {
        self.inner.failed.is_cancelled()
    }

    /// Start the pipeline: output and engine first, input last.
    pub async fn start(&self, registry: &PluginRegistry) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::AlreadyStarted);
        }

        let (input, input_config, output, output_config, specs) = {
            let state = self.inner.state.lock();
            let (input, input_config) = state.input.clone().ok_or(PipelineError::NoInput)?;
            let (output, output_config) = state.output.clone().ok_or(PipelineError::NoOutput)?;
            (input, input_config, output, output_config, state.specs.clone())
        };
        let specs = Arc::new(specs);

        tracing::info!(
            pipeline = %self.inner.name,
            capacity = self.inner.options.capacity,
            workers = self.inner.options.workers,
            actions = specs.len(),
            decoder = %self.inner.options.decoder,
            avg_event_size = self.inner.options.avg_event_size,
            "starting pipeline"
        );

        output
            .start(
                &output_config,
                OutputParams {
                    pipeline: self.inner.name.clone(),
                },
            )
            .await?;

        // Events accepted for output flow through this channel into
        // the batcher; its bound doubles as the Add backpressure.
        let (event_tx, event_rx) =
            crossfire::mpsc::bounded_async::<Box<Event>>(self.inner.options.capacity);

        let batcher = Arc::new(Batcher::new(
            self.inner.name.clone(),
            self.inner.options.batcher.clone(),
            Arc::clone(&output),
            Arc::clone(&self.inner.commits),
            self.inner.metrics.clone(),
            self.inner.cancel.clone(),
            self.inner.failed.clone(),
        ));
        let batcher_tasks = batcher.spawn(event_rx);

        let mut processor_tasks = Vec::with_capacity(self.inner.options.workers);
        for id in 0..self.inner.options.workers.max(1) {
            let mut actions = Vec::with_capacity(specs.len());
            for (index, spec) in specs.iter().enumerate() {
                let mut action = registry.create_action(&spec.name)?;
                action.start(
                    &spec.config,
                    &ActionParams {
                        pipeline: self.inner.name.clone(),
                        index,
                    },
                )?;
                actions.push(action);
            }
            let processor = Processor {
                id,
                pipeline: self.inner.name.clone(),
                specs: Arc::clone(&specs),
                actions,
                streams: Arc::clone(&self.inner.streams),
                commits: Arc::clone(&self.inner.commits),
                out_tx: event_tx.clone(),
                metrics: self.inner.metrics.clone(),
                cancel: self.inner.proc_cancel.clone(),
                event_timeout: self.inner.options.event_timeout,
            };
            processor_tasks.push(tokio::spawn(processor.run()));
        }

        let maintenance_task = tokio::spawn(run_maintenance(Arc::clone(&self.inner)));

        // Commits may start flowing the moment the input produces.
        self.inner.commits.set_input(Arc::clone(&input));
        input
            .start(
                &input_config,
                InputParams {
                    pipeline: self.inner.name.clone(),
                    ingress: self.ingress(),
                },
            )
            .await?;

        {
            let mut state = self.inner.state.lock();
            state.event_tx = Some(event_tx);
            state.processor_tasks = processor_tasks;
            state.batcher_tasks = batcher_tasks;
            state.maintenance_task = Some(maintenance_task);
        }

        tracing::info!(pipeline = %self.inner.name, "pipeline started");
        Ok(())
    }

    /// Graceful stop: stop the input, drain streams and batches, flush
    /// commits, then join workers within `deadline`. Idempotent: a
    /// second call is a no-op.
    pub async fn stop(&self, deadline: Duration) -> Result<()> {
        if !self.inner.started.load(Ordering::SeqCst)
            || self.inner.stopping.swap(true, Ordering::SeqCst)
        {
            return Ok(());
        }
        let deadline_at = Instant::now() + deadline;
        tracing::info!(pipeline = %self.inner.name, "stopping pipeline");

        let (input, output, event_tx, processor_tasks, batcher_tasks, maintenance_task) = {
            let mut state = self.inner.state.lock();
            (
                state.input.take().map(|(p, _)| p),
                state.output.take().map(|(p, _)| p),
                state.event_tx.take(),
                std::mem::take(&mut state.processor_tasks),
                std::mem::take(&mut state.batcher_tasks),
                state.maintenance_task.take(),
            )
        };

        // 1. Stop accepting input; the plugin flushes its offsets.
        if let Some(input) = &input {
            if tokio::time::timeout_at(deadline_at, input.stop())
                .await
                .is_err()
            {
                tracing::warn!(pipeline = %self.inner.name, "input did not stop in time");
            }
        }
        // Wake anything still blocked in acquire.
        self.inner.pool.close();

        // 2. Let processors drain every stream queue.
        let drained = wait_until(deadline_at, || self.inner.streams.total_queued() == 0).await;
        if !drained {
            tracing::warn!(
                pipeline = %self.inner.name,
                queued = self.inner.streams.total_queued(),
                "streams not drained within deadline"
            );
        }

        // 3. Processors have no more work: stop and join them.
        self.inner.proc_cancel.cancel();
        let abandoned_processors = join_all(processor_tasks, deadline_at).await;

        // 4. Close the batcher input; it flushes the open batch, the
        //    workers drain the ring and push the final commits.
        drop(event_tx);
        let abandoned_batchers = join_all(batcher_tasks, deadline_at).await;

        // 5. Commits should all have reached the input by now.
        let committed = wait_until(deadline_at, || self.inner.streams.is_drained()).await;
        if !committed {
            tracing::warn!(
                pipeline = %self.inner.name,
                inflight = self.inner.streams.total_inflight(),
                "uncommitted offsets remain; the input will replay them"
            );
        }

        self.inner.commits.clear_input();
        if let Some(output) = &output {
            if tokio::time::timeout_at(deadline_at, output.stop())
                .await
                .is_err()
            {
                tracing::warn!(pipeline = %self.inner.name, "output did not stop in time");
            }
        }

        // 6. Tear down the rest.
        self.inner.cancel.cancel();
        if let Some(task) = maintenance_task {
            task.abort();
            let _ = task.await;
        }

        let abandoned = abandoned_processors + abandoned_batchers;
        if abandoned > 0 {
            tracing::warn!(
                pipeline = %self.inner.name,
                abandoned,
                "workers abandoned after the grace period"
            );
        }

        // Give cancelled workers a moment to hand their events back
        // before taking the final inventory.
        wait_until(Instant::now() + Duration::from_millis(100), || {
            self.inner.pool.is_full()
        })
        .await;

        // Events that never made it back are dropped, and say so.
        let missing = self
            .inner
            .options
            .capacity
            .saturating_sub(self.inner.pool.free_count());
        if missing > 0 {
            self.inner.metrics.events_dropped.inc_by(missing as u64);
            tracing::warn!(
                pipeline = %self.inner.name,
                events = missing,
                "events dropped during stop"
            );
        }

        tracing::info!(pipeline = %self.inner.name, "pipeline stopped");
        if self.inner.failed.is_cancelled() {
            Err(PipelineError::Failed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Ingest for Inner {
    async fn ingest(&self, source_id: u64, source_name: &str, offset: i64, data: &[u8]) -> u64 {
        if self.stopping.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return 0;
        }

        // Admission drops are counted but never acknowledged: the
        // record has no resolved stream yet (the stream-field retag
        // needs the decoded tree), so there is no consistent stream to
        // commit its offset on. The input replays unacknowledged
        // offsets after a restart and the filters drop them again.
        let size = data.len();
        if self.options.max_event_size > 0 && size > self.options.max_event_size {
            self.metrics.events_dropped.inc();
            self.oversize_drops.record(&self.name, size as u64);
            return 0;
        }

        match self.antispam.allow(source_id) {
            AntispamDecision::Allowed => {}
            decision => {
                if decision == AntispamDecision::RejectedFirst {
                    tracing::warn!(
                        pipeline = %self.name,
                        source_id,
                        threshold = self.options.antispam_threshold,
                        "source exceeded the antispam threshold, dropping its surplus"
                    );
                }
                self.metrics.antispam_dropped.inc();
                self.antispam_drops.record(&self.name, size as u64);
                return 0;
            }
        }

        self.limiter.admit(size).await;

        // Primary backpressure point: suspends while the pool is
        // saturated, returns None only when the pipeline shuts down.
        let Some(mut event) = self.pool.acquire().await else {
            return 0;
        };

        let root = match self.options.decoder.decode(data) {
            Ok(root) => root,
            Err(e) => {
                self.metrics.decode_failures.inc();
                if self.options.strict_decoding {
                    tracing::debug!(
                        pipeline = %self.name,
                        source_id,
                        offset,
                        error = %e,
                        "undecodable payload discarded (strict mode)"
                    );
                    self.metrics.events_dropped.inc();
                    self.pool.release(event);
                    return 0;
                }
                event.set_decode_failed(true);
                Decoder::wrap_raw(data)
            }
        };

        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        event.assign(seq, source_id, Arc::from(source_name), offset, size);
        event.set_root(root);

        // The stream field retargets the event to a named stream
        // within its source.
        if let Some(selector) = &self.stream_field {
            let tagged = event
                .get_path(selector)
                .and_then(Value::as_str)
                .map(str::to_owned);
            if let Some(name) = tagged {
                event.set_source_name(Arc::from(name.as_str()));
            }
        }

        self.metrics.events_in.inc();
        self.streams.push(event);
        seq
    }
}

/// Periodic stats, gauge refresh and antispam window roll.
async fn run_maintenance(inner: Arc<Inner>) {
    let period = inner.options.maintenance_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last = inner.metrics.snapshot();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = inner.cancel.cancelled() => break,
        }

        inner.antispam.maintenance(period);
        inner.metrics.pool_free.set(inner.pool.free_count() as i64);
        inner
            .metrics
            .streams_active
            .set(inner.streams.stream_count() as i64);

        let now = inner.metrics.snapshot();
        let delta = now.diff(&last);
        last = now;
        tracing::info!(
            pipeline = %inner.name,
            interval = ?period,
            events_in = delta.events_in,
            committed = delta.events_committed,
            discarded = delta.events_discarded,
            dead_lettered = delta.events_dead_lettered,
            antispam = delta.antispam_dropped,
            batches = delta.batches_sent,
            pool_free = inner.pool.free_count(),
            streams = inner.streams.stream_count(),
            "pipeline stats"
        );
    }
}

/// Poll `check` until it holds or the deadline passes.
async fn wait_until(deadline_at: Instant, check: impl Fn() -> bool) -> bool {
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline_at {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Join tasks until the deadline; returns how many were abandoned.
async fn join_all(tasks: Vec<JoinHandle<()>>, deadline_at: Instant) -> usize {
    let mut abandoned = 0;
    for task in tasks {
        match tokio::time::timeout_at(deadline_at, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "worker task panicked"),
            Err(_) => abandoned += 1,
        }
    }
    abandoned
}
