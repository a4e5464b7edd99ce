//! Processor - worker that walks the action chain
//!
//! W processor workers run concurrently. Each turn takes one ready
//! stream, pops its head event, walks the action chain from the
//! event's action index, and either hands the event to the batcher or
//! lets an action keep/remove it. The stream then goes back to the
//! ready tail if it still has events, so streams share workers fairly.
//!
//! Failures stay local: a panicking action dead-letters the event and
//! the stream moves past it; the pipeline never stops because one
//! event failed.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossfire::MAsyncTx;
use tokio_util::sync::CancellationToken;

use sluice_event::{Event, EventStage};
use sluice_plugin::{ActionPlugin, ActionResult};

use crate::commit::CommitFanIn;
use crate::matcher::Matcher;
use crate::metrics::PipelineMetrics;
use crate::stream_pool::StreamPool;

#[cfg(test)]
#[path = "processor_test.rs"]
mod tests;

/// Immutable descriptor of one chain entry, shared by all workers.
/// The per-worker plugin instances live in each [`Processor`].
#[derive(Debug, Clone)]
pub struct ActionSpec {
    /// Plugin type name, for logs and metrics.
    pub name: String,
    /// Compiled match rule.
    pub matcher: Matcher,
    /// Raw plugin options.
    pub config: serde_json::Value,
}

/// One worker of the processor pool.
pub(crate) struct Processor {
    pub(crate) id: usize,
    pub(crate) pipeline: String,
    pub(crate) specs: Arc<Vec<ActionSpec>>,
    /// This worker's own chain instances, index-aligned with `specs`.
    pub(crate) actions: Vec<Box<dyn ActionPlugin>>,
    pub(crate) streams: Arc<StreamPool>,
    pub(crate) commits: Arc<CommitFanIn>,
    pub(crate) out_tx: MAsyncTx<Box<Event>>,
    pub(crate) metrics: PipelineMetrics,
    pub(crate) cancel: CancellationToken,
    pub(crate) event_timeout: Duration,
}

/// What the chain decided for one event.
enum ChainOutcome {
    /// Forward to the output stage.
    Output(Box<Event>),
    /// An action took or removed the event.
    Consumed,
}

impl Processor {
    pub(crate) async fn run(mut self) {
        tracing::debug!(pipeline = %self.pipeline, worker = self.id, "processor started");

        loop {
            let stream = tokio::select! {
                stream = self.streams.next_ready() => stream,
                _ = self.cancel.cancelled() => break,
            };

            let Some(event) = stream.pop_head() else {
                self.streams.release(stream);
                continue;
            };

            match self.walk_chain(event) {
                ChainOutcome::Output(mut event) => {
                    event.set_stage(EventStage::Output);
                    // The stream stays attached until the hand-off
                    // completes; releasing earlier would let another
                    // worker race the next event into the output queue.
                    let send_error = self.out_tx.send(event).await.err();
                    self.streams.release(stream);
                    if let Some(e) = send_error {
                        // Batcher gone (hard stop): hand the event
                        // back unacknowledged and bail out.
                        self.commits.release_uncommitted(e.0);
                        break;
                    }
                }
                ChainOutcome::Consumed => {
                    // One event per turn; the stream rejoins the ready
                    // tail if it has more, so other streams get a
                    // worker in between.
                    self.streams.release(stream);
                }
            }
        }

        self.drain_actions();
        tracing::debug!(pipeline = %self.pipeline, worker = self.id, "processor finished");
    }

    /// Walk the chain from the event's current action index.
    fn walk_chain(&mut self, mut event: Box<Event>) -> ChainOutcome {
        event.set_stage(EventStage::Action);

        for index in event.action_index()..self.specs.len() {
            let matcher = &self.specs[index].matcher;
            if !matcher.matches(&event) {
                if matcher.terminates_chain() {
                    // Prefix mode rejection ends the chain; the event
                    // goes straight to the output.
                    break;
                }
                continue;
            }

            event.set_action_index(index);
            match self.apply_action(index, event) {
                ActionStep::Continue(e) => event = e,
                ActionStep::ToOutput(e) => {
                    event = e;
                    break;
                }
                ActionStep::Done => return ChainOutcome::Consumed,
            }
        }

        event.set_action_index(self.specs.len());
        ChainOutcome::Output(event)
    }

    /// Run one action with panic isolation and deadline accounting.
    fn apply_action(&mut self, index: usize, event: Box<Event>) -> ActionStep {
        // Identity survives the call even if the event object does not.
        let source_id = event.source_id();
        let source_name = Arc::clone(event.source_name());
        let offset = event.offset();

        let action = &mut self.actions[index];
        let started = Instant::now();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| action.apply(event)));
        let elapsed = started.elapsed();
        self.metrics.action_latency.observe(elapsed.as_secs_f64());

        let result = match result {
            Ok(result) => result,
            Err(_) => {
                // The unwind consumed the event; acknowledge the
                // offset so the stream moves past it and restore the
                // pool slot.
                tracing::error!(
                    pipeline = %self.pipeline,
                    action = %self.specs[index].name,
                    index,
                    offset,
                    "action panicked, event dead-lettered"
                );
                self.metrics.events_dead_lettered.inc();
                self.commits.ack_lost(source_id, &source_name, offset);
                return ActionStep::Done;
            }
        };

        if elapsed > self.event_timeout {
            tracing::error!(
                pipeline = %self.pipeline,
                action = %self.specs[index].name,
                index,
                elapsed_ms = elapsed.as_millis() as u64,
                "action exceeded the event deadline, event dead-lettered"
            );
            self.metrics.events_dead_lettered.inc();
            if let Some(event) = result.into_event() {
                self.commits.commit_removed(event);
            } else {
                // Hold result: the action owns the event now; its
                // offset is acknowledged when the action lets go.
            }
            return ActionStep::Done;
        }

        match result {
            ActionResult::Pass(e) => ActionStep::Continue(e),
            ActionResult::Collapse(e) => {
                self.commits.commit_removed(e);
                ActionStep::Done
            }
            ActionResult::Discard(e) => {
                self.metrics.events_discarded.inc();
                self.commits.commit_removed(e);
                ActionStep::Done
            }
            ActionResult::Hold => ActionStep::Done,
            ActionResult::Break(e) => ActionStep::ToOutput(e),
        }
    }

    /// Stop the chain instances and settle whatever they still hold.
    fn drain_actions(&mut self) {
        for (index, action) in self.actions.iter_mut().enumerate() {
            let held = action.stop();
            if held.is_empty() {
                continue;
            }
            tracing::debug!(
                pipeline = %self.pipeline,
                action = %self.specs[index].name,
                count = held.len(),
                "action released held events on stop"
            );
            for event in held {
                self.commits.commit_removed(event);
            }
        }
    }
}

/// Internal step outcome of one action application.
enum ActionStep {
    Continue(Box<Event>),
    ToOutput(Box<Event>),
    Done,
}

trait IntoEvent {
    fn into_event(self) -> Option<Box<Event>>;
}

impl IntoEvent for ActionResult {
    fn into_event(self) -> Option<Box<Event>> {
        match self {
            ActionResult::Pass(e)
            | ActionResult::Collapse(e)
            | ActionResult::Discard(e)
            | ActionResult::Break(e) => Some(e),
            ActionResult::Hold => None,
        }
    }
}
