//! Devnull output - acknowledges everything immediately
//!
//! The default sink for tests and benchmarks: delivery always
//! succeeds, so commits flow back at full speed.

use async_trait::async_trait;

use sluice_event::Event;
use sluice_plugin::{OutputParams, OutputPlugin, PluginConfig, PluginError};

pub struct DevNullOutput;

#[async_trait]
impl OutputPlugin for DevNullOutput {
    async fn start(&self, _config: &PluginConfig, params: OutputParams) -> Result<(), PluginError> {
        tracing::debug!(pipeline = %params.pipeline, "devnull output started");
        Ok(())
    }

    async fn out(&self, _events: &[Box<Event>]) -> Result<(), PluginError> {
        Ok(())
    }

    async fn stop(&self) {}
}
