//! Pipeline metrics
//!
//! One `PipelineMetrics` per pipeline, registered under a
//! `pipeline="<name>"` label. Counters and gauges are `prometheus-client`
//! instruments (atomic underneath, cheap to clone); the maintenance
//! tick reads them back through [`PipelineMetrics::snapshot`] for its
//! interval stats log, and tests assert on the same snapshots.

use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// All instruments of one pipeline.
#[derive(Clone)]
pub struct PipelineMetrics {
    /// Events admitted into the pipeline.
    pub events_in: Counter,
    /// Offsets acknowledged to the input.
    pub events_committed: Counter,
    /// Events removed by a `discard` action result.
    pub events_discarded: Counter,
    /// Events dropped by the antispam filter.
    pub antispam_dropped: Counter,
    /// Events rejected for exceeding the size cap, or dropped by
    /// policy (batch drop, stop overrun).
    pub events_dropped: Counter,
    /// Events that panicked or overran the action deadline.
    pub events_dead_lettered: Counter,
    /// Payloads the decoder could not parse.
    pub decode_failures: Counter,
    /// Batches delivered by the output.
    pub batches_sent: Counter,
    /// Failed delivery attempts.
    pub batches_failed: Counter,
    /// Time one action call took.
    pub action_latency: Histogram,
    /// Events per delivered batch.
    pub batch_size: Histogram,
    /// Time from batch open to commit.
    pub batch_flush_latency: Histogram,
    /// Streams known to the pipeline.
    pub streams_active: Gauge,
    /// Free slots in the event pool.
    pub pool_free: Gauge,
}

impl PipelineMetrics {
    /// Create unregistered instruments (unit tests, benches).
    pub fn new() -> Self {
        Self {
            events_in: Counter::default(),
            events_committed: Counter::default(),
            events_discarded: Counter::default(),
            antispam_dropped: Counter::default(),
            events_dropped: Counter::default(),
            events_dead_lettered: Counter::default(),
            decode_failures: Counter::default(),
            batches_sent: Counter::default(),
            batches_failed: Counter::default(),
            action_latency: Histogram::new(exponential_buckets(0.000_01, 4.0, 10)),
            batch_size: Histogram::new(exponential_buckets(1.0, 4.0, 10)),
            batch_flush_latency: Histogram::new(exponential_buckets(0.001, 4.0, 10)),
            streams_active: Gauge::default(),
            pool_free: Gauge::default(),
        }
    }

    /// Register every instrument under `pipeline="<name>"`.
    pub fn register(&self, registry: &mut Registry, pipeline: &str) {
        let sub = registry.sub_registry_with_label((
            "pipeline".into(),
            pipeline.to_string().into(),
        ));

        sub.register("events_in", "Events admitted", self.events_in.clone());
        sub.register(
            "events_committed",
            "Offsets acknowledged to the input",
            self.events_committed.clone(),
        );
        sub.register(
            "events_discarded",
            "Events removed by discard actions",
            self.events_discarded.clone(),
        );
        sub.register(
            "antispam_dropped",
            "Events dropped by the antispam filter",
            self.antispam_dropped.clone(),
        );
        sub.register(
            "events_dropped",
            "Events dropped by size cap or delivery policy",
            self.events_dropped.clone(),
        );
        sub.register(
            "events_dead_lettered",
            "Events that failed inside the action chain",
            self.events_dead_lettered.clone(),
        );
        sub.register(
            "decode_failures",
            "Payloads the decoder could not parse",
            self.decode_failures.clone(),
        );
        sub.register(
            "batches_sent",
            "Batches delivered by the output",
            self.batches_sent.clone(),
        );
        sub.register(
            "batches_failed",
            "Failed delivery attempts",
            self.batches_failed.clone(),
        );
        sub.register(
            "action_latency_seconds",
            "Time one action call took",
            self.action_latency.clone(),
        );
        sub.register(
            "batch_size_events",
            "Events per delivered batch",
            self.batch_size.clone(),
        );
        sub.register(
            "batch_flush_seconds",
            "Time from batch open to commit",
            self.batch_flush_latency.clone(),
        );
        sub.register(
            "streams_active",
            "Streams known to the pipeline",
            self.streams_active.clone(),
        );
        sub.register(
            "event_pool_free",
            "Free slots in the event pool",
            self.pool_free.clone(),
        );
    }

    /// Point-in-time view of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_in: self.events_in.get(),
            events_committed: self.events_committed.get(),
            events_discarded: self.events_discarded.get(),
            antispam_dropped: self.antispam_dropped.get(),
            events_dropped: self.events_dropped.get(),
            events_dead_lettered: self.events_dead_lettered.get(),
            decode_failures: self.decode_failures.get(),
            batches_sent: self.batches_sent.get(),
            batches_failed: self.batches_failed.get(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.snapshot();
        f.debug_struct("PipelineMetrics")
            .field("events_in", &s.events_in)
            .field("events_committed", &s.events_committed)
            .finish()
    }
}

/// Point-in-time counter values; compared and diffed in tests and in
/// the maintenance stats log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub events_in: u64,
    pub events_committed: u64,
    pub events_discarded: u64,
    pub antispam_dropped: u64,
    pub events_dropped: u64,
    pub events_dead_lettered: u64,
    pub decode_failures: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
}

impl MetricsSnapshot {
    /// Interval delta against an earlier snapshot.
    pub fn diff(&self, previous: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            events_in: self.events_in.saturating_sub(previous.events_in),
            events_committed: self
                .events_committed
                .saturating_sub(previous.events_committed),
            events_discarded: self
                .events_discarded
                .saturating_sub(previous.events_discarded),
            antispam_dropped: self
                .antispam_dropped
                .saturating_sub(previous.antispam_dropped),
            events_dropped: self.events_dropped.saturating_sub(previous.events_dropped),
            events_dead_lettered: self
                .events_dead_lettered
                .saturating_sub(previous.events_dead_lettered),
            decode_failures: self.decode_failures.saturating_sub(previous.decode_failures),
            batches_sent: self.batches_sent.saturating_sub(previous.batches_sent),
            batches_failed: self.batches_failed.saturating_sub(previous.batches_failed),
        }
    }
}
