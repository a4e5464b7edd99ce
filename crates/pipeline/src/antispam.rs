//! Antispam - per-source drop filter
//!
//! Protects a pipeline from a runaway producer: each source id gets a
//! token bucket of `threshold` events per maintenance window. The
//! first rejection of a window is logged; the rest only count.
//! Long-idle buckets are evicted on the maintenance tick.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[cfg(test)]
#[path = "antispam_test.rs"]
mod tests;

/// Windows a source may stay idle before its bucket is evicted.
const IDLE_WINDOWS: u32 = 10;

/// Per-source event budget per maintenance window.
pub struct Antispam {
    threshold: u64,
    buckets: Mutex<HashMap<u64, Bucket>>,
}

struct Bucket {
    count: u64,
    logged: bool,
    last_seen: Instant,
}

impl Antispam {
    /// `threshold` 0 disables the filter entirely.
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.threshold > 0
    }

    /// Account one event for the source; false means drop it.
    /// Returns the decision plus whether this rejection should be
    /// logged (first one in the window).
    pub fn allow(&self, source_id: u64) -> AntispamDecision {
        if self.threshold == 0 {
            return AntispamDecision::Allowed;
        }

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(source_id).or_insert_with(|| Bucket {
            count: 0,
            logged: false,
            last_seen: Instant::now(),
        });
        bucket.count += 1;
        bucket.last_seen = Instant::now();

        if bucket.count <= self.threshold {
            AntispamDecision::Allowed
        } else if !bucket.logged {
            bucket.logged = true;
            AntispamDecision::RejectedFirst
        } else {
            AntispamDecision::Rejected
        }
    }

    /// Start a new window: reset counters, evict long-idle sources.
    /// Driven by the pipeline maintenance tick.
    pub fn maintenance(&self, window: Duration) {
        let idle_cutoff = window.saturating_mul(IDLE_WINDOWS);
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_seen) < idle_cutoff);
        for bucket in buckets.values_mut() {
            bucket.count = 0;
            bucket.logged = false;
        }
    }

    /// Sources currently tracked.
    pub fn tracked_sources(&self) -> usize {
        self.buckets.lock().len()
    }
}

/// Outcome of one antispam check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntispamDecision {
    Allowed,
    /// Over budget, and this is the window's first rejection.
    RejectedFirst,
    Rejected,
}

impl AntispamDecision {
    #[inline]
    pub fn is_allowed(self) -> bool {
        matches!(self, AntispamDecision::Allowed)
    }
}
