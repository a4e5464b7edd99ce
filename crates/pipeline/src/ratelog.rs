//! Rate-limited drop logging
//!
//! Admission drops (antispam, oversized payloads) can arrive at line
//! rate; logging each one would melt the log volume. The tracker
//! aggregates counts and emits one summary per interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const LOG_INTERVAL_MS: u64 = 1000;

/// Aggregates drop events and logs a summary at most once per second.
///
/// All operations use atomics and are safe for concurrent access.
pub(crate) struct DropTracker {
    what: &'static str,
    interval_drops: AtomicU64,
    interval_bytes: AtomicU64,
    last_log_ms: AtomicU64,
}

impl DropTracker {
    pub(crate) fn new(what: &'static str) -> Self {
        Self {
            what,
            interval_drops: AtomicU64::new(0),
            interval_bytes: AtomicU64::new(0),
            last_log_ms: AtomicU64::new(now_ms()),
        }
    }

    /// Record one drop; returns true if a summary log was emitted.
    pub(crate) fn record(&self, pipeline: &str, bytes: u64) -> bool {
        self.interval_drops.fetch_add(1, Ordering::Relaxed);
        self.interval_bytes.fetch_add(bytes, Ordering::Relaxed);

        let now = now_ms();
        let last = self.last_log_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < LOG_INTERVAL_MS {
            return false;
        }
        // Claim the log slot so concurrent callers don't double-log.
        if self
            .last_log_ms
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        let drops = self.interval_drops.swap(0, Ordering::Relaxed);
        let bytes = self.interval_bytes.swap(0, Ordering::Relaxed);
        if drops == 0 {
            return false;
        }

        tracing::warn!(
            pipeline = %pipeline,
            kind = self.what,
            dropped = drops,
            bytes = bytes,
            "events dropped in the last interval"
        );
        true
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> u64 {
        self.interval_drops.load(Ordering::Relaxed)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
