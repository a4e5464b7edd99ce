//! Payload decoders
//!
//! Inputs hand the pipeline raw bytes; the pipeline's configured
//! decoder turns them into the event tree. `json` parses the payload,
//! `raw` wraps the line as `{"message": "<line>"}`, and `auto` resolves
//! to `json`.

use serde_json::{json, Value};
use thiserror::Error;

#[cfg(test)]
#[path = "decode_test.rs"]
mod tests;

/// Decode failure for a single payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-pipeline payload decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decoder {
    /// Resolves to `json`.
    #[default]
    Auto,
    Json,
    Raw,
}

impl Decoder {
    /// Decode a payload into an event tree.
    pub fn decode(self, data: &[u8]) -> Result<Value, DecodeError> {
        match self {
            Decoder::Auto | Decoder::Json => Ok(serde_json::from_slice(data)?),
            Decoder::Raw => Ok(Self::wrap_raw(data)),
        }
    }

    /// Wrap a payload as a raw message tree. Also the fallback shape
    /// for undecodable payloads in non-strict pipelines.
    pub fn wrap_raw(data: &[u8]) -> Value {
        let line = String::from_utf8_lossy(data);
        let line = line.strip_suffix('\n').unwrap_or(&line);
        json!({ "message": line })
    }
}

impl std::fmt::Display for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Decoder::Auto => "auto",
            Decoder::Json => "json",
            Decoder::Raw => "raw",
        };
        write!(f, "{name}")
    }
}
