//! Portable CPU capture backend.
//!
//! Wraps `scrap`, which speaks DXGI on Windows, X11/SHM on Linux and
//! CGDisplayStream on macOS. Slower than the dedicated DXGI path but
//! available everywhere, so it is both the `auto` choice and the
//! downgrade target when a preferred backend cannot be built.
//!
//! The underlying capturer is not `Send` on X11; the grabber is
//! therefore created lazily on the capture thread — `new()` only
//! probes the display, `start()` builds the capturer.

use std::time::{Duration, Instant};

use scrap::{Capturer, Display};
use tracing::debug;

use crate::error::FarviewError;
use crate::frame::{bgra_to_rgba_frame, Frame};

use super::Grabber;

/// How long `frame()` retries while the compositor has nothing new.
const FRAME_WAIT: Duration = Duration::from_millis(100);

/// Poll interval while waiting for a fresh frame.
const FRAME_POLL: Duration = Duration::from_millis(5);

/// Probe the primary display and return its bounds.
pub fn probe_primary() -> Result<(u32, u32), FarviewError> {
    let display = Display::primary()
        .map_err(|e| FarviewError::CaptureUnavailable(format!("no primary display: {e}")))?;
    Ok((display.width() as u32, display.height() as u32))
}

/// scrap-backed grabber for the primary display.
pub struct PortableGrabber {
    capturer: Option<Capturer>,
    width: u32,
    height: u32,
}

impl PortableGrabber {
    /// Probe the primary display. The capturer itself is built in
    /// [`start`](Grabber::start).
    pub fn new() -> Result<Self, FarviewError> {
        let (width, height) = probe_primary()?;
        debug!(size = format!("{width}x{height}"), "portable grabber probed primary display");
        Ok(Self {
            capturer: None,
            width,
            height,
        })
    }
}

impl Grabber for PortableGrabber {
    fn start(&mut self) -> Result<(), FarviewError> {
        if self.capturer.is_some() {
            return Ok(());
        }
        let display = Display::primary()
            .map_err(|e| FarviewError::CaptureUnavailable(format!("no primary display: {e}")))?;
        self.width = display.width() as u32;
        self.height = display.height() as u32;
        let capturer = Capturer::new(display).map_err(|e| {
            FarviewError::CaptureUnavailable(format!("capturer construction failed: {e}"))
        })?;
        self.capturer = Some(capturer);
        Ok(())
    }

    fn frame(&mut self) -> Result<Frame, FarviewError> {
        let capturer = self
            .capturer
            .as_mut()
            .ok_or_else(|| FarviewError::Capture("grabber not started".into()))?;

        let width = self.width;
        let height = self.height;
        let deadline = Instant::now() + FRAME_WAIT;

        loop {
            match capturer.frame() {
                Ok(raw) => {
                    let stride = raw.len() / height as usize;
                    return bgra_to_rgba_frame(&raw, width, height, stride);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    // Compositor has nothing new yet.
                    if Instant::now() >= deadline {
                        return Err(FarviewError::Capture(
                            "no new frame within deadline".into(),
                        ));
                    }
                    std::thread::sleep(FRAME_POLL);
                }
                Err(e) => return Err(FarviewError::Capture(format!("capture failed: {e}"))),
            }
        }
    }

    fn stop(&mut self) -> Result<(), FarviewError> {
        self.capturer = None;
        Ok(())
    }

    fn bounds(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_running(&self) -> bool {
        self.capturer.is_some()
    }
}
