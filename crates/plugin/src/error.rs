//! Plugin error type

use thiserror::Error;

/// Errors surfaced by plugin bodies to the core.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Options failed to parse or validate. Fatal at pipeline start.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Unknown plugin type requested from the registry.
    #[error("unknown {kind} plugin: {name}")]
    Unknown { kind: &'static str, name: String },

    /// I/O failure while delivering or flushing.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Anything else; treated as transient by the batcher.
    #[error("{0}")]
    Other(String),
}

impl PluginError {
    /// Shorthand for configuration errors from option parsing.
    pub fn config(err: impl std::fmt::Display) -> Self {
        Self::Config(err.to_string())
    }
}
