//! Event - the record flowing through a pipeline
//!
//! An `Event` carries the parsed payload tree plus the routing metadata
//! the pipeline needs: where it came from (source id + source name), the
//! input offset to acknowledge, and where it currently is in its life
//! cycle (stage + action index).

use std::sync::Arc;

use serde_json::Value;

use crate::selector::FieldSelector;

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;

/// Which part of the pipeline currently owns the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStage {
    /// Just decoded, waiting in a stream queue.
    Input,
    /// Being walked through the action chain by a processor.
    Action,
    /// Accepted for output, owned by the batcher.
    Output,
    /// Sitting in the pool's free list.
    Free,
}

/// One record flowing through a pipeline.
///
/// Events are pool-allocated and recycled; all fields are cleared by
/// [`Event::reset`] before the object returns to the free list. The
/// generation counter increments on every reset so references held past
/// a release can be detected (`debug_assert_generation`).
#[derive(Debug)]
pub struct Event {
    seq: u64,
    source_id: u64,
    source_name: Arc<str>,
    offset: i64,
    stage: EventStage,
    action_index: usize,
    size: usize,
    decode_failed: bool,
    generation: u64,
    root: Value,
}

impl Event {
    /// Create a blank event in the `Free` stage. Used by the pool only.
    pub(crate) fn blank() -> Self {
        Self {
            seq: 0,
            source_id: 0,
            source_name: Arc::from(""),
            offset: 0,
            stage: EventStage::Free,
            action_index: 0,
            size: 0,
            decode_failed: false,
            generation: 0,
            root: Value::Null,
        }
    }

    /// Fill in routing metadata after acquisition from the pool.
    pub fn assign(
        &mut self,
        seq: u64,
        source_id: u64,
        source_name: Arc<str>,
        offset: i64,
        size: usize,
    ) {
        self.seq = seq;
        self.source_id = source_id;
        self.source_name = source_name;
        self.offset = offset;
        self.size = size;
        self.stage = EventStage::Input;
    }

    /// Clear everything and bump the generation counter.
    pub fn reset(&mut self) {
        self.seq = 0;
        self.source_id = 0;
        self.source_name = Arc::from("");
        self.offset = 0;
        self.stage = EventStage::Free;
        self.action_index = 0;
        self.size = 0;
        self.decode_failed = false;
        self.root = Value::Null;
        self.generation = self.generation.wrapping_add(1);
    }

    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[inline]
    pub fn source_id(&self) -> u64 {
        self.source_id
    }

    #[inline]
    pub fn source_name(&self) -> &Arc<str> {
        &self.source_name
    }

    /// Retag the event with the stream name resolved from its tree.
    pub fn set_source_name(&mut self, name: Arc<str>) {
        self.source_name = name;
    }

    #[inline]
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Payload size in bytes as received from the input.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn stage(&self) -> EventStage {
        self.stage
    }

    pub fn set_stage(&mut self, stage: EventStage) {
        self.stage = stage;
    }

    /// Index of the next action to run; survives yields back to the
    /// stream so a chain resumes where it left off.
    #[inline]
    pub fn action_index(&self) -> usize {
        self.action_index
    }

    pub fn set_action_index(&mut self, index: usize) {
        self.action_index = index;
    }

    #[inline]
    pub fn decode_failed(&self) -> bool {
        self.decode_failed
    }

    pub fn set_decode_failed(&mut self, failed: bool) {
        self.decode_failed = failed;
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Assert that a generation stamp captured earlier is still live.
    /// Compiled out of release builds.
    #[inline]
    pub fn debug_assert_generation(&self, stamp: u64) {
        debug_assert_eq!(
            self.generation, stamp,
            "event reference outlived its release"
        );
    }

    /// The parsed payload tree.
    #[inline]
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Mutable access for actions that edit the tree in place.
    #[inline]
    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    pub fn set_root(&mut self, root: Value) {
        self.root = root;
    }

    /// Resolve a dotted selector against the tree.
    pub fn get_path(&self, selector: &FieldSelector) -> Option<&Value> {
        let mut node = &self.root;
        for part in selector.parts() {
            node = node.as_object()?.get(part)?;
        }
        Some(node)
    }

    /// Set a top-level field, creating the object root if the tree is
    /// not an object yet.
    pub fn set_field(&mut self, name: &str, value: Value) {
        if !self.root.is_object() {
            self.root = Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.root.as_object_mut() {
            map.insert(name.to_string(), value);
        }
    }

    /// Serialize the tree back to compact JSON.
    ///
    /// Field order is preserved from the decoded input, so an event that
    /// passed through an empty chain re-encodes to the canonical form of
    /// its input.
    pub fn encode(&self) -> String {
        self.root.to_string()
    }
}
