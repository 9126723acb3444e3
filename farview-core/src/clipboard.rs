//! Host clipboard bridge.
//!
//! Exchange with viewers is event-driven: the agent only touches the
//! clipboard when a `CLIPBOARD_GET` / `CLIPBOARD_SET` arrives. There
//! is deliberately no polling task — polling contends with OS
//! clipboard locks and steals focus on some hosts.

use arboard::Clipboard;
use tracing::debug;

use crate::error::FarviewError;

/// Read the host clipboard as text.
///
/// An empty clipboard reads as an empty string rather than an error,
/// so a `CLIPBOARD_GET` against a fresh session still gets its
/// `CLIPBOARD_UPDATE` reply.
pub fn read() -> Result<String, FarviewError> {
    let mut clipboard =
        Clipboard::new().map_err(|e| FarviewError::Clipboard(e.to_string()))?;
    match clipboard.get_text() {
        Ok(text) => {
            debug!(text_length = text.len(), "clipboard read");
            Ok(text)
        }
        Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
        Err(e) => Err(FarviewError::Clipboard(e.to_string())),
    }
}

/// Replace the host clipboard contents.
pub fn write(text: &str) -> Result<(), FarviewError> {
    let mut clipboard =
        Clipboard::new().map_err(|e| FarviewError::Clipboard(e.to_string()))?;
    clipboard
        .set_text(text.to_string())
        .map_err(|e| FarviewError::Clipboard(e.to_string()))?;
    debug!(text_length = text.len(), "clipboard written");
    Ok(())
}
