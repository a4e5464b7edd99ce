//! Pipeline error types

use thiserror::Error;

use sluice_plugin::PluginError;

/// Errors surfaced by the pipeline engine. Per-event failures are
/// counted and logged instead; these are start/stop level problems.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline already started")]
    AlreadyStarted,

    #[error("pipeline has no input plugin")]
    NoInput,

    #[error("pipeline has no output plugin")]
    NoOutput,

    #[error("invalid match condition on {field:?}: {reason}")]
    Matcher { field: String, reason: String },

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("output delivery gave up, pipeline marked failed")]
    Failed,
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
