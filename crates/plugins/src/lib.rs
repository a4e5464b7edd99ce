//! Sluice - Bundled plugins
//!
//! The plugin bodies that ship with the daemon, one module per plugin:
//!
//! - inputs: `fake` (in-process, drives tests and benchmarks)
//! - actions: `discard`, `mask`, `modify`, `keep_fields`
//! - outputs: `devnull`, `stdout`, `file`
//!
//! Everything implements the `sluice-plugin` contracts; the daemon
//! wires them up through [`default_registry`].

pub mod action;
pub mod input;
pub mod output;

use std::sync::Arc;

use sluice_plugin::PluginRegistry;

/// Registry with every bundled plugin type registered.
pub fn default_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();

    registry.register_input("fake", || Arc::new(input::fake::FakeInput::new()));

    registry.register_action("discard", || Box::new(action::discard::DiscardAction));
    registry.register_action("mask", || Box::<action::mask::MaskAction>::default());
    registry.register_action("modify", || Box::<action::modify::ModifyAction>::default());
    registry.register_action("keep_fields", || {
        Box::<action::keep_fields::KeepFieldsAction>::default()
    });

    registry.register_output("devnull", || Arc::new(output::devnull::DevNullOutput));
    registry.register_output("stdout", || Arc::new(output::stdout::StdoutOutput));
    registry.register_output("file", || Arc::new(output::file::FileOutput::new()));

    registry
}
