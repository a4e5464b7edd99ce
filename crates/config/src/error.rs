//! Configuration error types

use thiserror::Error;

/// Errors produced while loading or validating configuration.
/// All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("can't parse config yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("pipeline {pipeline}: {source}")]
    Decode {
        pipeline: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid expression {expr:?}: {reason}")]
    Expression { expr: String, reason: String },

    #[error("invalid regexp {pattern:?}: {reason}")]
    Regex { pattern: String, reason: String },

    #[error("{0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
