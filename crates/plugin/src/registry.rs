//! Plugin factory registry
//!
//! Maps config `type` names to constructors. Inputs and outputs are
//! shared with the controller (commit fan-in, batcher send), so their
//! factories produce `Arc`s; actions are instantiated once per
//! processor worker and stay exclusively owned.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{ActionPlugin, InputPlugin, OutputPlugin, PluginError};

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

type InputFactory = Arc<dyn Fn() -> Arc<dyn InputPlugin> + Send + Sync>;
type ActionFactory = Arc<dyn Fn() -> Box<dyn ActionPlugin> + Send + Sync>;
type OutputFactory = Arc<dyn Fn() -> Arc<dyn OutputPlugin> + Send + Sync>;

/// Registry of plugin constructors, populated once at startup.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    inputs: HashMap<String, InputFactory>,
    actions: HashMap<String, ActionFactory>,
    outputs: HashMap<String, OutputFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_input<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn InputPlugin> + Send + Sync + 'static,
    {
        self.inputs.insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_action<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn ActionPlugin> + Send + Sync + 'static,
    {
        self.actions.insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_output<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn OutputPlugin> + Send + Sync + 'static,
    {
        self.outputs.insert(name.to_string(), Arc::new(factory));
    }

    pub fn create_input(&self, name: &str) -> Result<Arc<dyn InputPlugin>, PluginError> {
        self.inputs
            .get(name)
            .map(|f| f())
            .ok_or_else(|| PluginError::Unknown {
                kind: "input",
                name: name.to_string(),
            })
    }

    pub fn create_action(&self, name: &str) -> Result<Box<dyn ActionPlugin>, PluginError> {
        self.actions
            .get(name)
            .map(|f| f())
            .ok_or_else(|| PluginError::Unknown {
                kind: "action",
                name: name.to_string(),
            })
    }

    pub fn create_output(&self, name: &str) -> Result<Arc<dyn OutputPlugin>, PluginError> {
        self.outputs
            .get(name)
            .map(|f| f())
            .ok_or_else(|| PluginError::Unknown {
                kind: "output",
                name: name.to_string(),
            })
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered type names, for startup logging.
    pub fn known_types(&self) -> (Vec<&str>, Vec<&str>, Vec<&str>) {
        let mut inputs: Vec<&str> = self.inputs.keys().map(String::as_str).collect();
        let mut actions: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        let mut outputs: Vec<&str> = self.outputs.keys().map(String::as_str).collect();
        inputs.sort_unstable();
        actions.sort_unstable();
        outputs.sort_unstable();
        (inputs, actions, outputs)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("inputs", &self.inputs.len())
            .field("actions", &self.actions.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}
