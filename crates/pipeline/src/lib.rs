//! Sluice - Pipeline engine
//!
//! The runtime between an input plugin and an output plugin:
//!
//! ```text
//! [Input] ──ingest──► EventPool ──► Stream (per source,name) ──► [Processors]
//!                                                                    │ action chain
//!                                                                    ▼
//! [Input] ◄──commit── CommitFanIn ◄── Batcher workers ◄── ring ◄── Batcher
//!                                                                    │
//!                                                                 [Output]
//! ```
//!
//! # Guarantees
//!
//! - Events on one stream are processed and committed in push order;
//!   streams advance independently of each other.
//! - At most `capacity` events are live; a saturated pool suspends the
//!   input (`ingest` awaits a free slot).
//! - Every admitted offset is acknowledged to the input exactly once,
//!   in per-stream offset order, whether the event was delivered,
//!   discarded or dead-lettered.
//! - Stop drains: on a clean stop every accepted event is either
//!   committed or counted as dropped.

mod antispam;
mod batcher;
mod commit;
mod controller;
mod error;
mod limiter;
mod matcher;
mod metrics;
mod processor;
mod ratelog;
mod stream;
mod stream_pool;

pub use antispam::{Antispam, AntispamDecision};
pub use batcher::{Batch, BatchState, BatcherOptions};
pub use controller::{Pipeline, PipelineOptions};
pub use error::{PipelineError, Result};
pub use limiter::RateLimiter;
pub use matcher::{Condition, Matcher, Needle};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use processor::ActionSpec;
pub use stream::Stream;
pub use stream_pool::StreamPool;

/// Default grace period a stopping pipeline gives its workers.
pub const DEFAULT_STOP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);
