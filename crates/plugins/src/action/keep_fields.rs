//! Keep-fields action - whitelists top-level fields
//!
//! Everything outside the configured field list is removed from the
//! event tree.

use serde::Deserialize;

use sluice_event::Event;
use sluice_plugin::{ActionParams, ActionPlugin, ActionResult, PluginConfig, PluginError};

#[derive(Debug, Clone, Deserialize)]
struct KeepFieldsConfig {
    fields: Vec<String>,
}

#[derive(Default)]
pub struct KeepFieldsAction {
    fields: Vec<String>,
}

impl ActionPlugin for KeepFieldsAction {
    fn start(&mut self, config: &PluginConfig, _params: &ActionParams) -> Result<(), PluginError> {
        let config: KeepFieldsConfig =
            serde_json::from_value(config.clone()).map_err(PluginError::config)?;
        if config.fields.is_empty() {
            return Err(PluginError::Config(
                "keep_fields: no fields configured".into(),
            ));
        }
        self.fields = config.fields;
        Ok(())
    }

    fn apply(&mut self, mut event: Box<Event>) -> ActionResult {
        if let Some(map) = event.root_mut().as_object_mut() {
            map.retain(|key, _| self.fields.iter().any(|f| f == key));
        }
        ActionResult::Pass(event)
    }
}
