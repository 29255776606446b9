//! Codec for encoding and decoding realtime events.
//!
//! One event per websocket text frame, serialized as JSON.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::event::Event;

/// Maximum accepted frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode an event to a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails or the frame is too large.
pub fn encode(event: &Event) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(event)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

/// Decode an event from a JSON text frame.
///
/// Events without `channel`, `text` or `ts` decode successfully with those
/// fields defaulted; only malformed JSON is an error.
///
/// # Errors
///
/// Returns an error if the frame is too large or not a JSON event object.
pub fn decode(text: &str) -> Result<Event, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(serde_json::from_str(text)?)
}

/// Render a duration since the Unix epoch as `<seconds>.<micros>`.
#[must_use]
pub fn format_timestamp(since_epoch: Duration) -> String {
    format!(
        "{}.{:06}",
        since_epoch.as_secs(),
        since_epoch.subsec_micros()
    )
}

/// Current wall-clock time as an event timestamp.
#[must_use]
pub fn timestamp_now() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format_timestamp(now)
}
