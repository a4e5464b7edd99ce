//! Sluice Configuration
//!
//! YAML-based configuration: a `pipelines` map where each entry
//! describes one pipeline (settings, input, action chain, output).
//! The file is decoded into a JSON tree first so environment overrides
//! can be applied path-wise, then each pipeline subtree is decoded
//! into its typed schema.
//!
//! # Environment overrides
//!
//! Any variable prefixed `SLUICE_` overrides the corresponding config
//! path, underscore-separated and lowercased:
//!
//! ```text
//! SLUICE_PIPELINES_MAIN_SETTINGS_CAPACITY=2048
//! ```
//!
//! # Example
//!
//! ```yaml
//! pipelines:
//!   main:
//!     settings:
//!       capacity: 1024
//!       workers_count: "maxprocs*4"
//!     input:
//!       type: fake
//!     actions:
//!       - type: discard
//!         match_fields:
//!           should_drop: ok
//!         match_mode: or
//!     output:
//!       type: stdout
//! ```

mod error;
mod expression;
mod pipeline;

pub use error::{ConfigError, Result};
pub use expression::Expression;
pub use pipeline::{
    default_maxprocs, ActionConfig, OutputCommon, PipelineConfig, PipelineSettings, PluginSection,
};

use std::path::Path;
use std::str::FromStr;

use serde_json::Value;

/// Environment variables with this prefix override config paths.
pub const ENV_PREFIX: &str = "SLUICE_";

/// Top-level daemon configuration: named pipelines in file order.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub pipelines: Vec<(String, PipelineConfig)>,
}

impl Config {
    /// Load configuration from a YAML file, applying `SLUICE_*`
    /// environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "reading config");
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&contents)
    }

    fn parse(contents: &str) -> Result<Self> {
        let mut root: Value = serde_yaml::from_str(contents)?;
        apply_env_overrides(&mut root, std::env::vars());
        Self::from_tree(root)
    }

    /// Decode an already-assembled JSON tree. Used by `from_file` and
    /// by tests that bypass the environment.
    pub fn from_tree(root: Value) -> Result<Self> {
        let Some(entries) = root.get("pipelines").and_then(Value::as_object) else {
            return Err(ConfigError::Invalid(
                "no pipelines defined in config".to_string(),
            ));
        };
        if entries.is_empty() {
            return Err(ConfigError::Invalid(
                "no pipelines defined in config".to_string(),
            ));
        }

        let mut pipelines = Vec::with_capacity(entries.len());
        for (name, raw) in entries {
            let config = PipelineConfig::from_value(name, raw.clone())?;
            pipelines.push((name.clone(), config));
        }

        tracing::info!(count = pipelines.len(), "config parsed");
        Ok(Self { pipelines })
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Apply `SLUICE_*` environment overrides to the decoded config tree.
///
/// The variable name after the prefix is lowercased and split on `_`;
/// each segment walks one level into the tree, creating objects along
/// the way. Values parse as bool/int/float when they look like one,
/// otherwise they stay strings.
fn apply_env_overrides(root: &mut Value, vars: impl Iterator<Item = (String, String)>) {
    for (key, value) in vars {
        let Some(tail) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<String> = tail.to_lowercase().split('_').map(String::from).collect();
        if path.iter().any(String::is_empty) {
            tracing::warn!(var = %key, "ignoring malformed override variable");
            continue;
        }
        set_path(root, &path, coerce_scalar(&value));
        tracing::debug!(var = %key, "applied config override");
    }
}

fn set_path(root: &mut Value, path: &[String], value: Value) {
    let mut node = root;
    for segment in &path[..path.len() - 1] {
        if !node.is_object() {
            *node = Value::Object(serde_json::Map::new());
        }
        let Some(map) = node.as_object_mut() else {
            return;
        };
        node = map.entry(segment.clone()).or_insert(Value::Null);
    }
    if !node.is_object() {
        *node = Value::Object(serde_json::Map::new());
    }
    if let Some(map) = node.as_object_mut() {
        map.insert(path[path.len() - 1].clone(), value);
    }
}

fn coerce_scalar(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    Value::from(raw)
}

/// Compile a config regexp. Patterns are written `/.../`, mirroring
/// how they appear in match conditions and mask options.
pub fn compile_regex(pattern: &str) -> Result<regex::Regex> {
    let Some(inner) = pattern
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
    else {
        return Err(ConfigError::Regex {
            pattern: pattern.to_string(),
            reason: "should be surrounded by \"/\"".to_string(),
        });
    };
    if inner.is_empty() {
        return Err(ConfigError::Regex {
            pattern: pattern.to_string(),
            reason: "regexp is empty".to_string(),
        });
    }
    regex::Regex::new(inner).map_err(|e| ConfigError::Regex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// True when a needle is a `/.../` regexp rather than a literal.
pub fn is_regex_needle(needle: &str) -> bool {
    needle.len() >= 2 && needle.starts_with('/') && needle.ends_with('/')
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
pipelines:
  main:
    settings:
      capacity: 64
    input:
      type: fake
    actions:
      - type: discard
        match_fields:
          should_drop: ok
        match_mode: or
    output:
      type: devnull
      flush_timeout: 100ms
"#
    }

    #[test]
    fn parses_minimal_config() {
        let config = Config::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.pipelines.len(), 1);

        let (name, p) = &config.pipelines[0];
        assert_eq!(name, "main");
        assert_eq!(p.settings.capacity, 64);
        assert_eq!(p.input.kind, "fake");
        assert_eq!(p.actions.len(), 1);
        assert_eq!(p.output.kind, "devnull");
    }

    #[test]
    fn defaults_fill_missing_settings() {
        let config = Config::from_str(minimal_yaml()).unwrap();
        let (_, p) = &config.pipelines[0];
        assert_eq!(p.settings.stream_field, "stream");
        assert_eq!(p.settings.max_event_size, 0);
        assert_eq!(
            p.settings.maintenance_interval,
            std::time::Duration::from_secs(5)
        );
    }

    #[test]
    fn empty_config_is_rejected() {
        assert!(Config::from_str("pipelines: {}").is_err());
        assert!(Config::from_str("other: 1").is_err());
    }

    #[test]
    fn env_overrides_reach_into_pipelines() {
        let mut root = json!({
            "pipelines": {
                "main": {"settings": {"capacity": 64}}
            }
        });
        apply_env_overrides(
            &mut root,
            [(
                "SLUICE_PIPELINES_MAIN_SETTINGS_CAPACITY".to_string(),
                "128".to_string(),
            )]
            .into_iter(),
        );
        assert_eq!(root["pipelines"]["main"]["settings"]["capacity"], 128);
    }

    #[test]
    fn env_overrides_create_missing_levels() {
        let mut root = json!({});
        apply_env_overrides(
            &mut root,
            [("SLUICE_HTTP_ADDR".to_string(), ":9000".to_string())].into_iter(),
        );
        assert_eq!(root["http"]["addr"], ":9000");
    }

    #[test]
    fn env_values_coerce_scalars() {
        assert_eq!(coerce_scalar("true"), json!(true));
        assert_eq!(coerce_scalar("42"), json!(42));
        assert_eq!(coerce_scalar("0.5"), json!(0.5));
        assert_eq!(coerce_scalar("text"), json!("text"));
    }

    #[test]
    fn regex_needles_require_slashes() {
        assert!(compile_regex("/\\d+/").is_ok());
        assert!(compile_regex("\\d+").is_err());
        assert!(compile_regex("//").is_err());
        assert!(is_regex_needle("/x/"));
        assert!(!is_regex_needle("x"));
    }

    #[test]
    fn from_file_reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sluice.yaml");
        std::fs::write(&path, minimal_yaml()).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.pipelines.len(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
