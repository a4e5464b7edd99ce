//! Stdout output - writes events to the console
//!
//! One JSON line per event. Handy for debugging pipelines; not meant
//! for high throughput.

use std::io::Write;

use async_trait::async_trait;

use sluice_event::Event;
use sluice_plugin::{OutputParams, OutputPlugin, PluginConfig, PluginError};

pub struct StdoutOutput;

#[async_trait]
impl OutputPlugin for StdoutOutput {
    async fn start(&self, _config: &PluginConfig, _params: OutputParams) -> Result<(), PluginError> {
        Ok(())
    }

    async fn out(&self, events: &[Box<Event>]) -> Result<(), PluginError> {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        for event in events {
            writeln!(lock, "{}", event.encode())?;
        }
        lock.flush()?;
        Ok(())
    }

    async fn stop(&self) {}
}
