//! File output - appends events to a plain file
//!
//! One JSON line per event, written batch-at-a-time and flushed per
//! batch, so a delivered batch is on disk when its commits go out.

use serde::Deserialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use async_trait::async_trait;

use sluice_event::Event;
use sluice_plugin::{OutputParams, OutputPlugin, PluginConfig, PluginError};

#[cfg(test)]
#[path = "file_test.rs"]
mod tests;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileOutputConfig {
    /// Target file; parent directories are created on start.
    pub target_file: String,
}

impl Default for FileOutputConfig {
    fn default() -> Self {
        Self {
            target_file: "logs/sluice.log".to_string(),
        }
    }
}

#[derive(Default)]
pub struct FileOutput {
    file: Mutex<Option<tokio::fs::File>>,
}

impl FileOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutputPlugin for FileOutput {
    async fn start(&self, config: &PluginConfig, params: OutputParams) -> Result<(), PluginError> {
        let config: FileOutputConfig =
            serde_json::from_value(config.clone()).map_err(PluginError::config)?;

        if let Some(parent) = std::path::Path::new(&config.target_file).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.target_file)
            .await?;

        tracing::info!(
            pipeline = %params.pipeline,
            target = %config.target_file,
            "file output started"
        );
        *self.file.lock().await = Some(file);
        Ok(())
    }

    async fn out(&self, events: &[Box<Event>]) -> Result<(), PluginError> {
        let mut buffer = String::new();
        for event in events {
            buffer.push_str(&event.encode());
            buffer.push('\n');
        }

        let mut guard = self.file.lock().await;
        let Some(file) = guard.as_mut() else {
            return Err(PluginError::Other("file output not started".into()));
        };
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn stop(&self) {
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.sync_all().await {
                tracing::warn!(error = %e, "file output sync failed on stop");
            }
        }
        *guard = None;
    }
}
