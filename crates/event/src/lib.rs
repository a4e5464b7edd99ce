//! Sluice - Event layer
//!
//! The data types every other crate builds on: the [`Event`] record that
//! flows through a pipeline, the bounded [`EventPool`] it is allocated
//! from, payload [`Decoder`]s and the dotted [`FieldSelector`] grammar
//! used to address fields inside the parsed tree.
//!
//! # Design
//!
//! - **Bounded allocation**: every live event comes from an `EventPool`
//!   of fixed capacity; pool exhaustion is the pipeline's backpressure
//!   signal.
//! - **Owned trees**: an event owns its parsed `serde_json::Value` tree
//!   (insertion-ordered maps), so actions mutate in place without
//!   re-parsing.
//! - **Reset on release**: events are recycled, not dropped; `reset`
//!   clears all routing metadata and bumps the generation counter so
//!   stale references are detectable in debug builds.

mod decode;
mod event;
mod pool;
mod selector;

pub use decode::{DecodeError, Decoder};
pub use event::{Event, EventStage};
pub use pool::EventPool;
pub use selector::FieldSelector;

/// Default number of events a pipeline keeps in flight.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default expected payload size, used to pre-size decode buffers.
pub const DEFAULT_AVG_EVENT_SIZE: usize = 16 * 1024;
