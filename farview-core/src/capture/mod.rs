//! Screen capture backends.
//!
//! Two backends are provided: DXGI Desktop Duplication (Windows, GPU
//! path) and a portable grabber built on `scrap`. Selection is by
//! config string, with automatic downgrade to the portable backend
//! when the preferred one cannot be constructed.
//!
//! Grabbers are not required to be `Send`; the supervisor constructs
//! the grabber on the capture thread itself and probes availability
//! beforehand with [`probe_screen`].

mod dxgi;
mod portable;

pub use dxgi::DxgiGrabber;
pub use portable::PortableGrabber;

use tracing::{info, warn};

use crate::error::FarviewError;
use crate::frame::Frame;

// ── Grabber ──────────────────────────────────────────────────────

/// A source of RGBA frames from the primary display.
///
/// `frame()` is synchronous and may fail transiently (display
/// reconfiguration, compositor timeout); the caller reuses the previous
/// frame or skips the tick. Returned frames are tightly packed RGBA
/// and pre-validated, but callers re-check (§ the frame invariant)
/// before encoding.
pub trait Grabber {
    /// Begin capturing. Idempotent for stateless backends.
    fn start(&mut self) -> Result<(), FarviewError>;

    /// Acquire the next frame.
    fn frame(&mut self) -> Result<Frame, FarviewError>;

    /// Stop capturing and release backend resources.
    fn stop(&mut self) -> Result<(), FarviewError>;

    /// The screen bounds this grabber captures, in pixels.
    fn bounds(&self) -> (u32, u32);

    /// Whether `start()` has been called without a matching `stop()`.
    fn is_running(&self) -> bool;
}

// ── CaptureMethod ────────────────────────────────────────────────

/// Capture backend selection, as spelled in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMethod {
    /// Pick the most compatible backend available.
    Auto,
    /// DirectX Desktop Duplication (Windows 8+).
    Dxgi,
    /// Windows Graphics Capture. Not implemented; downgraded.
    Wgc,
    /// Portable CPU capture (the config keeps the historical
    /// "robotgo" spelling for this slot).
    Portable,
}

impl CaptureMethod {
    /// Parse a configured method name; unknown names select `Auto`.
    pub fn parse(name: &str) -> Self {
        match name {
            "auto" => CaptureMethod::Auto,
            "dxgi" => CaptureMethod::Dxgi,
            "wgc" => CaptureMethod::Wgc,
            "robotgo" => CaptureMethod::Portable,
            other => {
                warn!(method = other, "unknown capture method, using auto");
                CaptureMethod::Auto
            }
        }
    }

    /// Canonical config spelling.
    pub const fn name(self) -> &'static str {
        match self {
            CaptureMethod::Auto => "auto",
            CaptureMethod::Dxgi => "dxgi",
            CaptureMethod::Wgc => "wgc",
            CaptureMethod::Portable => "robotgo",
        }
    }
}

// ── Selection ────────────────────────────────────────────────────

/// Check that some capture backend can see a display, without building
/// a full grabber. Returns the primary screen bounds.
///
/// The supervisor calls this from `start()` so that "no display at
/// all" refuses the start synchronously; the real grabber is then
/// constructed on the capture thread.
pub fn probe_screen() -> Result<(u32, u32), FarviewError> {
    portable::probe_primary()
}

/// Construct a grabber for `method`, downgrading to the portable
/// backend when the preferred backend fails.
pub fn create_grabber(method: CaptureMethod) -> Result<Box<dyn Grabber>, FarviewError> {
    match method {
        CaptureMethod::Dxgi => match DxgiGrabber::new() {
            Ok(g) => {
                info!("dxgi grabber created");
                Ok(Box::new(g))
            }
            Err(e) => {
                warn!(error = %e, "dxgi grabber unavailable, falling back to portable");
                Ok(Box::new(PortableGrabber::new()?))
            }
        },
        CaptureMethod::Wgc => {
            warn!("wgc capture not implemented, falling back to portable");
            Ok(Box::new(PortableGrabber::new()?))
        }
        CaptureMethod::Auto | CaptureMethod::Portable => {
            Ok(Box::new(PortableGrabber::new()?))
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
