//! Sluice - Plugin contracts
//!
//! The capability set the pipeline core consumes: inputs push records
//! in and receive commit callbacks, actions mutate events in place,
//! outputs deliver closed batches. Plugin bodies live in the
//! `sluice-plugins` crate (and out of tree); the core only sees these
//! traits.
//!
//! # Ownership
//!
//! Events move by value through the action surface: an action receives
//! the boxed event and returns it inside its [`ActionResult`], except
//! for `Hold`, which transfers ownership to the action until its
//! `stop` drains it.

mod error;
mod registry;

pub use error::PluginError;
pub use registry::PluginRegistry;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use sluice_event::Event;

/// Raw plugin options as decoded from the pipeline config section.
pub type PluginConfig = Value;

/// Handle an input uses to push records into its pipeline.
#[async_trait]
pub trait Ingest: Send + Sync {
    /// Admit one record. Suspends under backpressure; returns the
    /// sequence number assigned to the event, or 0 when the record was
    /// dropped at admission (size cap, antispam, decode failure in
    /// strict mode, shutdown). Dropped records are never acknowledged:
    /// the input replays their offsets after a restart and the filters
    /// drop them again.
    async fn ingest(&self, source_id: u64, source_name: &str, offset: i64, data: &[u8]) -> u64;
}

/// Startup parameters handed to an input plugin.
#[derive(Clone)]
pub struct InputParams {
    /// Owning pipeline name, for logging.
    pub pipeline: String,
    /// The pipeline's admission handle.
    pub ingress: Arc<dyn Ingest>,
}

/// Startup parameters handed to an action plugin instance.
#[derive(Debug, Clone)]
pub struct ActionParams {
    /// Owning pipeline name, for logging.
    pub pipeline: String,
    /// Position of this action in the chain.
    pub index: usize,
}

/// Startup parameters handed to an output plugin.
#[derive(Debug, Clone)]
pub struct OutputParams {
    /// Owning pipeline name, for logging.
    pub pipeline: String,
}

/// What an action decided to do with an event.
pub enum ActionResult {
    /// Advance to the next action.
    Pass(Box<Event>),
    /// Drop silently; the offset is still acknowledged to the input.
    Collapse(Box<Event>),
    /// Drop and count; the offset is still acknowledged to the input.
    Discard(Box<Event>),
    /// The action keeps the event in its internal state.
    Hold,
    /// Skip the remaining actions and go straight to the output.
    Break(Box<Event>),
}

impl std::fmt::Debug for ActionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionResult::Pass(_) => "Pass",
            ActionResult::Collapse(_) => "Collapse",
            ActionResult::Discard(_) => "Discard",
            ActionResult::Hold => "Hold",
            ActionResult::Break(_) => "Break",
        };
        f.write_str(name)
    }
}

/// How an action's conditions combine, and whether a rejection ends
/// the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// All conditions must hold; rejection skips just this action.
    #[default]
    And,
    /// Any condition may hold; rejection skips just this action.
    Or,
    /// Like `and`, but rejection terminates the chain.
    AndPrefix,
    /// Like `or`, but rejection terminates the chain.
    OrPrefix,
}

/// What the pipeline does with a batch the output could not deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailPolicy {
    /// Stop the pipeline with an error.
    Fatal,
    /// Acknowledge the batch anyway and count it as dropped.
    Drop,
    /// Keep retrying until delivery or shutdown.
    #[default]
    Park,
}

/// An input plugin: reads records from somewhere and pushes them into
/// the pipeline, acknowledging offsets as commits arrive.
#[async_trait]
pub trait InputPlugin: Send + Sync {
    /// Begin producing. The input owns its own tasks; it must stop
    /// pushing once `stop` is called.
    async fn start(&self, config: &PluginConfig, params: InputParams) -> Result<(), PluginError>;

    /// Offset acknowledgement, delivered in per-stream offset order.
    /// Called from batcher workers; must not block.
    fn commit(&self, source_id: u64, source_name: &str, offset: i64);

    /// Stop producing and flush offset state.
    async fn stop(&self);
}

/// An action plugin: one instance per processor worker, mutating
/// events in place as they walk the chain.
pub trait ActionPlugin: Send {
    /// Parse options and prepare per-worker state.
    fn start(&mut self, config: &PluginConfig, params: &ActionParams) -> Result<(), PluginError> {
        let _ = (config, params);
        Ok(())
    }

    /// Handle one event.
    fn apply(&mut self, event: Box<Event>) -> ActionResult;

    /// Drain internal state; any held events must be released here.
    fn stop(&mut self) -> Vec<Box<Event>> {
        Vec::new()
    }
}

/// An output plugin: delivers closed batches to a sink.
#[async_trait]
pub trait OutputPlugin: Send + Sync {
    /// Parse options and open connections/files.
    async fn start(&self, config: &PluginConfig, params: OutputParams) -> Result<(), PluginError>;

    /// Deliver one closed batch. An error is treated as transient and
    /// retried by the batcher per the pipeline's policy.
    async fn out(&self, events: &[Box<Event>]) -> Result<(), PluginError>;

    /// Flush and close the sink.
    async fn stop(&self);
}
