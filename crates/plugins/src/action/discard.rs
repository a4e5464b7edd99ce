//! Discard action - drops every event it receives
//!
//! Pair it with match conditions to drop a slice of the traffic; the
//! dropped offsets are still acknowledged to the input.

use sluice_event::Event;
use sluice_plugin::{ActionPlugin, ActionResult};

pub struct DiscardAction;

impl ActionPlugin for DiscardAction {
    fn apply(&mut self, event: Box<Event>) -> ActionResult {
        ActionResult::Discard(event)
    }
}
