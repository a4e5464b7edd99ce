//! Modify action - sets fields on the event tree
//!
//! Every config option is a field assignment: the key names the
//! top-level field, the value is written as-is. Existing fields are
//! overwritten.

use serde_json::Value;

use sluice_event::Event;
use sluice_plugin::{ActionParams, ActionPlugin, ActionResult, PluginConfig, PluginError};

#[derive(Default)]
pub struct ModifyAction {
    fields: Vec<(String, Value)>,
}

impl ActionPlugin for ModifyAction {
    fn start(&mut self, config: &PluginConfig, _params: &ActionParams) -> Result<(), PluginError> {
        let Some(map) = config.as_object() else {
            return Err(PluginError::Config(
                "modify: options must be a field map".into(),
            ));
        };
        self.fields = map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(())
    }

    fn apply(&mut self, mut event: Box<Event>) -> ActionResult {
        for (name, value) in &self.fields {
            event.set_field(name, value.clone());
        }
        ActionResult::Pass(event)
    }
}
