//! Domain-specific error types for the farview pipeline.
//!
//! All fallible operations return `Result<T, FarviewError>`.
//! Failures are local by design: a capture or encode error costs one
//! frame, a clipboard error costs one reply, and nothing here can take
//! down the shared pipeline.

use thiserror::Error;

/// The canonical error type for the farview pipeline.
#[derive(Debug, Error)]
pub enum FarviewError {
    // ── Capture Errors ───────────────────────────────────────────
    /// The selected capture backend could not be constructed.
    #[error("capture backend unavailable: {0}")]
    CaptureUnavailable(String),

    /// A frame could not be acquired this tick (display busy,
    /// reconfiguration in progress, compositor timeout).
    #[error("capture failed: {0}")]
    Capture(String),

    /// A captured frame failed dimension or buffer validation.
    #[error("invalid frame: expected {expected} pixel bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },

    // ── Encoder Errors ───────────────────────────────────────────
    /// The encoder could not be constructed for the requested codec.
    #[error("encoder construction failed for {codec}: {reason}")]
    EncoderConstruction { codec: &'static str, reason: String },

    /// A single frame failed to encode.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The input frame does not match the encoder's output size.
    #[error("frame size mismatch: encoder expects {expected_w}x{expected_h}, got {actual_w}x{actual_h}")]
    FrameSizeMismatch {
        expected_w: u32,
        expected_h: u32,
        actual_w: u32,
        actual_h: u32,
    },

    // ── Control Plane Errors ─────────────────────────────────────
    /// A control message could not be parsed or was missing fields.
    #[error("malformed control message: {0}")]
    MalformedMessage(String),

    /// A control message named a type outside the catalog.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Input injection failed in the OS backend.
    #[error("input injection failed: {0}")]
    Input(String),

    /// Clipboard access failed in the OS backend.
    #[error("clipboard error: {0}")]
    Clipboard(String),

    // ── Infrastructure Errors ────────────────────────────────────
    /// An internal channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// The pipeline is not in the state the operation requires.
    #[error("pipeline not running")]
    NotRunning,

    /// The underlying I/O layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding of a wire message failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for FarviewError {
    fn from(s: String) -> Self {
        FarviewError::Other(s)
    }
}

impl From<&str> for FarviewError {
    fn from(s: &str) -> Self {
        FarviewError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for FarviewError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        FarviewError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = FarviewError::InvalidFrame {
            expected: 8294400,
            actual: 100,
        };
        assert!(e.to_string().contains("8294400"));

        let e = FarviewError::FrameSizeMismatch {
            expected_w: 1280,
            expected_h: 720,
            actual_w: 1920,
            actual_h: 1080,
        };
        assert!(e.to_string().contains("1280x720"));
        assert!(e.to_string().contains("1920x1080"));
    }

    #[test]
    fn from_string() {
        let e: FarviewError = "something broke".into();
        assert!(matches!(e, FarviewError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: FarviewError = io_err.into();
        assert!(matches!(e, FarviewError::Io(_)));
    }
}
