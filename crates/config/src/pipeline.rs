//! Pipeline configuration schema
//!
//! One pipeline is `settings` + `input` + ordered `actions` + `output`.
//! Plugin-specific options stay as raw JSON maps; the plugin bodies
//! decode them at start. Integer settings that scale with the machine
//! accept expressions over `capacity` and `maxprocs`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use sluice_event::Decoder;
use sluice_plugin::{FailPolicy, MatchMode};

use crate::error::{ConfigError, Result};
use crate::expression::Expression;

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;

/// Full configuration of one pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub settings: PipelineSettings,

    pub input: PluginSection,

    #[serde(default)]
    pub actions: Vec<ActionConfig>,

    pub output: PluginSection,
}

impl PipelineConfig {
    /// Decode a pipeline from its config subtree.
    pub fn from_value(name: &str, value: Value) -> Result<Self> {
        let config: PipelineConfig =
            serde_json::from_value(value).map_err(|source| ConfigError::Decode {
                pipeline: name.to_string(),
                source,
            })?;
        config.validate(name)?;
        Ok(config)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.settings.capacity == 0 {
            return Err(ConfigError::Invalid(format!(
                "pipeline {name}: capacity must be positive"
            )));
        }
        if self.input.kind.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "pipeline {name}: input type is required"
            )));
        }
        if self.output.kind.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "pipeline {name}: output type is required"
            )));
        }
        for (i, action) in self.actions.iter().enumerate() {
            if action.kind.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "pipeline {name}: action #{i} has no type"
                )));
            }
        }
        // Expressions must at least resolve against defaults.
        let env = self.settings.expression_env(default_maxprocs());
        self.settings.workers_count.resolve(&env)?;
        OutputCommon::from_section(&self.output)?.resolve(&env)?;
        Ok(())
    }
}

/// Core engine settings of a pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Upper bound on concurrently live events (= event pool size).
    pub capacity: usize,

    /// Processor worker count; expression over `capacity`/`maxprocs`.
    pub workers_count: Expression,

    /// Expected payload size, used to pre-size decode buffers.
    pub avg_log_size: usize,

    /// Reject payloads larger than this many bytes (0 = unlimited).
    pub max_event_size: usize,

    /// Tree field whose value overrides the event's source-name tag.
    pub stream_field: String,

    /// Per-source events allowed per maintenance window (0 = off).
    pub antispam_threshold: u64,

    /// Payload decoder.
    pub decoder: Decoder,

    /// Discard undecodable payloads instead of wrapping them raw.
    pub strict_decoding: bool,

    /// Interval of the stats/eviction tick.
    #[serde(with = "humantime_serde")]
    pub maintenance_interval: Duration,

    /// Per-event action deadline before the event is dead-lettered.
    #[serde(with = "humantime_serde")]
    pub event_timeout: Duration,

    /// Global admission limit in bytes/sec (0 = unlimited).
    pub rate_limit_bytes: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            capacity: sluice_event::DEFAULT_CAPACITY,
            workers_count: Expression::new("maxprocs*4"),
            avg_log_size: sluice_event::DEFAULT_AVG_EVENT_SIZE,
            max_event_size: 0,
            stream_field: "stream".to_string(),
            antispam_threshold: 0,
            decoder: Decoder::Auto,
            strict_decoding: false,
            maintenance_interval: Duration::from_secs(5),
            event_timeout: Duration::from_secs(30),
            rate_limit_bytes: 0,
        }
    }
}

impl PipelineSettings {
    /// Variable bindings for expression settings.
    pub fn expression_env(&self, maxprocs: usize) -> [(&'static str, i64); 2] {
        [
            ("capacity", self.capacity as i64),
            ("maxprocs", maxprocs as i64),
        ]
    }
}

/// The runtime's available parallelism, the `maxprocs` expression
/// variable.
pub fn default_maxprocs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// An input or output section: a type name plus plugin options.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginSection {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub options: serde_json::Map<String, Value>,
}

impl PluginSection {
    /// Plugin options as one JSON object, for the plugin's own decode.
    pub fn options_value(&self) -> Value {
        Value::Object(self.options.clone())
    }
}

/// One entry of the action chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    #[serde(rename = "type")]
    pub kind: String,

    /// Field selector -> needle (literal or `/regexp/`).
    #[serde(default)]
    pub match_fields: BTreeMap<String, String>,

    #[serde(default)]
    pub match_mode: MatchMode,

    /// Invert the final match decision.
    #[serde(default)]
    pub match_invert: bool,

    #[serde(flatten)]
    pub options: serde_json::Map<String, Value>,
}

impl ActionConfig {
    /// Plugin options as one JSON object, for the plugin's own decode.
    pub fn options_value(&self) -> Value {
        Value::Object(self.options.clone())
    }
}

/// Batching options common to every output section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputCommon {
    /// Output worker count; expression over `capacity`/`maxprocs`.
    pub workers_count: Expression,

    /// Close a batch at this many events; expression.
    pub batch_size_count: Expression,

    /// Close a batch at this many payload bytes (0 = off).
    pub batch_size_bytes: usize,

    /// Close a non-empty batch this long after its first event.
    #[serde(with = "humantime_serde")]
    pub flush_timeout: Duration,

    /// Send attempts before the fail policy applies.
    pub retry_attempts: u32,

    /// Initial backoff between attempts; doubles up to a cap.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// What to do with a batch that exhausted its attempts.
    pub fail_policy: FailPolicy,
}

impl Default for OutputCommon {
    fn default() -> Self {
        Self {
            workers_count: Expression::new("maxprocs"),
            batch_size_count: Expression::new("capacity/4"),
            batch_size_bytes: 0,
            flush_timeout: Duration::from_millis(200),
            retry_attempts: 10,
            retry_backoff: Duration::from_millis(50),
            fail_policy: FailPolicy::Park,
        }
    }
}

impl OutputCommon {
    /// Extract the common batching options from an output section.
    /// Plugin-specific keys are ignored here and decoded by the plugin.
    pub fn from_section(section: &PluginSection) -> Result<Self> {
        serde_json::from_value(section.options_value()).map_err(|source| ConfigError::Decode {
            pipeline: section.kind.clone(),
            source,
        })
    }

    /// Resolve the expression fields; returns (workers, batch count).
    pub fn resolve(&self, env: &[(&str, i64)]) -> Result<(usize, usize)> {
        let workers = self.workers_count.resolve(env)?.max(1) as usize;
        let count = self.batch_size_count.resolve(env)?.max(1) as usize;
        Ok((workers, count))
    }
}
