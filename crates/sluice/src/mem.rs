//! Memory limit helper
//!
//! `--mem-limit-ratio` derives a soft memory target from the cgroup
//! memory limit. The engine's real bound is the per-pipeline capacity;
//! the derived value is logged so operators can size capacity against
//! the container limit.

use std::path::Path;

use tracing::{info, warn};

const CGROUP_V2_LIMIT: &str = "/sys/fs/cgroup/memory.max";
const CGROUP_V1_LIMIT: &str = "/sys/fs/cgroup/memory/memory.limit_in_bytes";

/// Apply the ratio against the cgroup limit; returns the derived soft
/// limit in bytes. Ratio 0 disables the lookup entirely.
pub fn apply_mem_limit_ratio(ratio: f64) -> Option<u64> {
    if ratio <= 0.0 {
        return None;
    }

    let Some(limit) = cgroup_memory_limit() else {
        warn!("--mem-limit-ratio set but no cgroup memory limit found");
        return None;
    };

    let soft = (limit as f64 * ratio) as u64;
    info!(
        cgroup_limit = limit,
        ratio,
        soft_limit = soft,
        "derived soft memory limit"
    );
    Some(soft)
}

fn cgroup_memory_limit() -> Option<u64> {
    read_limit(Path::new(CGROUP_V2_LIMIT)).or_else(|| read_limit(Path::new(CGROUP_V1_LIMIT)))
}

fn read_limit(path: &Path) -> Option<u64> {
    let raw = std::fs::read_to_string(path).ok()?;
    let raw = raw.trim();
    if raw == "max" {
        return None;
    }
    raw.parse().ok()
}
