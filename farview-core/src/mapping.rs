//! Capture-resolution ↔ screen-resolution coordinate transform.
//!
//! Viewers send mouse coordinates in the encoder's output coordinate
//! system, so the same client works against any host. The agent maps
//! them onto the real screen at the last instant, here. The mapping is
//! process-wide, read-mostly state: it is replaced atomically whenever
//! the encoder (re)reports its output size, and read on every mouse
//! event.
//!
//! The screen size is not a parameter of `update` — it comes from a
//! probe injected at construction (an OS query in production, a fixed
//! size in tests), so each update observes the display mode current at
//! that moment.

use std::sync::RwLock;

use serde_json::{json, Value};
use tracing::{info, warn};

/// Source of the current screen size in pixels.
///
/// Returns `None` when no display can be queried; the update is then
/// skipped and any previously installed mapping stays in effect.
pub type ScreenProbe = Box<dyn Fn() -> Option<(u32, u32)> + Send + Sync>;

/// One installed transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mapping {
    pub encoded_w: u32,
    pub encoded_h: u32,
    pub screen_w: u32,
    pub screen_h: u32,
    pub scale_x: f64,
    pub scale_y: f64,
}

/// Shared mapper; readers outnumber writers by orders of magnitude.
pub struct CoordinateMapper {
    inner: RwLock<Option<Mapping>>,
    probe: ScreenProbe,
}

impl CoordinateMapper {
    /// Uninitialized mapper (identity transform until first update)
    /// with the given screen-size probe.
    pub fn new(probe: ScreenProbe) -> Self {
        Self {
            inner: RwLock::new(None),
            probe,
        }
    }

    /// Mapper with a fixed screen size (tests, embedding without a
    /// display query).
    pub fn with_screen_size(screen_w: u32, screen_h: u32) -> Self {
        Self::new(Box::new(move || Some((screen_w, screen_h))))
    }

    /// Install a new transform from the encoder's output size and the
    /// screen size the probe reports right now.
    pub fn update(&self, encoded_w: u32, encoded_h: u32) {
        let Some((screen_w, screen_h)) = (self.probe)() else {
            warn!(
                encoded = format!("{encoded_w}x{encoded_h}"),
                "screen probe failed, keeping previous coordinate mapping"
            );
            return;
        };

        if encoded_w == 0 || encoded_h == 0 || screen_w == 0 || screen_h == 0 {
            warn!(
                encoded = format!("{encoded_w}x{encoded_h}"),
                screen = format!("{screen_w}x{screen_h}"),
                "refusing zero-sized coordinate mapping"
            );
            return;
        }

        let mapping = Mapping {
            encoded_w,
            encoded_h,
            screen_w,
            screen_h,
            scale_x: screen_w as f64 / encoded_w as f64,
            scale_y: screen_h as f64 / encoded_h as f64,
        };

        info!(
            encoded = format!("{encoded_w}x{encoded_h}"),
            screen = format!("{screen_w}x{screen_h}"),
            scale_x = mapping.scale_x,
            scale_y = mapping.scale_y,
            "coordinate mapping updated"
        );

        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Some(mapping);
    }

    /// Map encoded coordinates to screen coordinates.
    ///
    /// Uninitialized mappers pass coordinates through unchanged (with a
    /// warning) so input keeps working even before the first frame.
    pub fn transform(&self, x: i32, y: i32) -> (i32, i32) {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let Some(m) = *guard else {
            warn!("coordinate mapping not initialized, using raw coordinates");
            return (x, y);
        };

        let sx = (x as f64 * m.scale_x).round() as i64;
        let sy = (y as f64 * m.scale_y).round() as i64;
        let sx = sx.clamp(0, m.screen_w as i64 - 1) as i32;
        let sy = sy.clamp(0, m.screen_h as i64 - 1) as i32;
        (sx, sy)
    }

    /// Whether a transform has been installed.
    pub fn is_initialized(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// The current mapping, if any.
    pub fn current(&self) -> Option<Mapping> {
        *self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Status map for `COORDINATE_MAPPING_STATUS` replies and the HTTP
    /// status surface.
    pub fn status(&self) -> Value {
        match self.current() {
            Some(m) => json!({
                "encoded_resolution": format!("{}x{}", m.encoded_w, m.encoded_h),
                "screen_resolution": format!("{}x{}", m.screen_w, m.screen_h),
                "scale_x": m.scale_x,
                "scale_y": m.scale_y,
                "initialized": true,
            }),
            None => json!({
                "initialized": false,
                "message": "coordinate mapping not initialized",
            }),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
