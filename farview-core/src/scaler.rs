//! High-quality frame resampling.
//!
//! The encoder's output size is rounded to a codec-friendly
//! resolution, so captured frames often need a resize before encoding.
//! Catmull-Rom keeps text legible at remote-desktop scale factors.
//! Scaling never touches the coordinate mapping — that is owned by
//! [`crate::mapping`].

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::error::FarviewError;
use crate::frame::Frame;

/// Resample `frame` to `(target_w, target_h)`.
///
/// Returns the frame unchanged when the sizes already match.
pub fn scale_frame(frame: &Frame, target_w: u32, target_h: u32) -> Result<Frame, FarviewError> {
    if frame.width == target_w && frame.height == target_h {
        return Ok(frame.clone());
    }
    if target_w == 0 || target_h == 0 {
        return Err(FarviewError::InvalidFrame {
            expected: 0,
            actual: frame.data.len(),
        });
    }

    let src = RgbaImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(
        || FarviewError::InvalidFrame {
            expected: frame.expected_len(),
            actual: frame.data.len(),
        },
    )?;

    let scaled = imageops::resize(&src, target_w, target_h, FilterType::CatmullRom);
    Frame::new(target_w, target_h, scaled.into_raw())
}

// ── Tests ────────────────────────────────────────────────────────
