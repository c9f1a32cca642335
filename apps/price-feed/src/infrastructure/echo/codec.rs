//! Echo Frame Codec
//!
//! Encodes and decodes [`WireMessage`] values to and from text frames.
//!
//! Decoding inspects the `type` field before parsing the payload so that
//! a missing or unknown discriminator is reported as such rather than as a
//! generic JSON error. Decode failures are never fatal: the connection
//! drops the frame and logs it.

use super::messages::{MessageKind, WireMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame has no string `type` field.
    #[error("missing message type")]
    MissingType,

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for echo frames.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into a [`WireMessage`].
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object, its `type` is
    /// missing or unknown, or the payload fields are absent or mis-shaped.
    pub fn decode(&self, text: &str) -> Result<WireMessage, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}...",
                trimmed.chars().take(50).collect::<String>()
            )));
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;

        let kind = match value.get("type") {
            Some(serde_json::Value::String(kind)) => MessageKind::from_wire(kind)
                .ok_or_else(|| CodecError::UnknownMessageType(kind.clone()))?,
            _ => return Err(CodecError::MissingType),
        };

        serde_json::from_value(value)
            .map_err(|e| CodecError::InvalidFormat(format!("{} frame: {e}", kind.as_str())))
    }

    /// Encode a [`WireMessage`] into a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, message: &WireMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }
}
