use async_trait::async_trait;

use sluice_event::Event;

use super::*;
use crate::{ActionResult, InputParams, OutputParams, PluginConfig};

struct NoopInput;

#[async_trait]
impl InputPlugin for NoopInput {
    async fn start(&self, _: &PluginConfig, _: InputParams) -> Result<(), PluginError> {
        Ok(())
    }
    fn commit(&self, _: u64, _: &str, _: i64) {}
    async fn stop(&self) {}
}

#[derive(Default)]
struct NoopAction {
    seen: u64,
}

impl ActionPlugin for NoopAction {
    fn apply(&mut self, event: Box<Event>) -> ActionResult {
        self.seen += 1;
        ActionResult::Pass(event)
    }
}

struct NoopOutput;

#[async_trait]
impl OutputPlugin for NoopOutput {
    async fn start(&self, _: &PluginConfig, _: OutputParams) -> Result<(), PluginError> {
        Ok(())
    }
    async fn out(&self, _: &[Box<Event>]) -> Result<(), PluginError> {
        Ok(())
    }
    async fn stop(&self) {}
}

fn registry() -> PluginRegistry {
    let mut r = PluginRegistry::new();
    r.register_input("noop", || std::sync::Arc::new(NoopInput));
    r.register_action("noop", || Box::<NoopAction>::default());
    r.register_output("noop", || std::sync::Arc::new(NoopOutput));
    r
}

#[test]
fn create_known_plugins() {
    let r = registry();
    assert!(r.create_input("noop").is_ok());
    assert!(r.create_action("noop").is_ok());
    assert!(r.create_output("noop").is_ok());
}

#[test]
fn unknown_type_is_an_error() {
    let r = registry();
    let err = r.create_output("elastic").err().unwrap();
    assert!(err.to_string().contains("unknown output plugin"));
    assert!(err.to_string().contains("elastic"));
}

#[test]
fn action_instances_are_independent() {
    let r = registry();
    let mut a = r.create_action("noop").unwrap();
    let _b = r.create_action("noop").unwrap();

    let pool = sluice_event::EventPool::new(1);
    let event = pool.try_acquire().unwrap();
    match a.apply(event) {
        ActionResult::Pass(_) => {}
        other => panic!("expected Pass, got {other:?}"),
    }
}

#[test]
fn known_types_are_sorted() {
    let mut r = registry();
    r.register_action("mask", || Box::<NoopAction>::default());
    let (_, actions, _) = r.known_types();
    assert_eq!(actions, vec!["mask", "noop"]);
}
