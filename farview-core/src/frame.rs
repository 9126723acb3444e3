//! Raster frame passed between pipeline stages.
//!
//! Unlike a GPU-mapped capture (which carries row padding), a [`Frame`]
//! is always tightly packed RGBA: `data.len() == 4 * width * height`.
//! Grabbers strip stride padding and reorder channels before a frame
//! ever reaches the scaler or an encoder.

use std::time::Instant;

use crate::error::FarviewError;

/// Bytes per pixel for the pipeline's fixed RGBA layout.
pub const BYTES_PER_PIXEL: usize = 4;

/// A tightly packed RGBA raster.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel data, exactly `4 * width * height` bytes.
    pub data: Vec<u8>,
    /// Monotonic capture timestamp.
    pub timestamp: Instant,
}

impl Frame {
    /// Construct a frame, validating dimensions and buffer length.
    ///
    /// Zero-area frames and buffers that do not match `4 * w * h` are
    /// rejected; callers treat that as a dropped frame.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FarviewError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if width == 0 || height == 0 {
            return Err(FarviewError::InvalidFrame {
                expected,
                actual: data.len(),
            });
        }
        if data.len() != expected {
            return Err(FarviewError::InvalidFrame {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
            timestamp: Instant::now(),
        })
    }

    /// Expected byte length for the frame's dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// Re-check the frame invariant (used after a grabber hands back a
    /// reused buffer).
    pub fn validate(&self) -> Result<(), FarviewError> {
        if self.width == 0 || self.height == 0 || self.data.len() != self.expected_len() {
            return Err(FarviewError::InvalidFrame {
                expected: self.expected_len(),
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Frame size as a `(width, height)` pair.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns the RGBA bytes of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        &self.data[offset..offset + BYTES_PER_PIXEL]
    }

    /// Sample up to `points` pixels along the diagonal and report
    /// whether all of them are near-black (R, G and B ≤ 10).
    ///
    /// Diagnostic only — a black desktop is legal, but a permanently
    /// black stream usually means the capture backend lost the display.
    pub fn looks_black(&self, points: u32) -> bool {
        if points == 0 {
            return false;
        }
        for i in 0..points {
            let x = (self.width * i) / points;
            let y = (self.height * i) / points;
            if x < self.width && y < self.height {
                let px = self.pixel(x, y);
                if px[0] > 10 || px[1] > 10 || px[2] > 10 {
                    return false;
                }
            }
        }
        true
    }
}

/// Convert a strided BGRA buffer (as produced by DXGI and scrap) into
/// a tightly packed RGBA [`Frame`].
///
/// `stride` is the source row pitch in bytes and may exceed
/// `4 * width` due to GPU row alignment.
pub fn bgra_to_rgba_frame(
    bgra: &[u8],
    width: u32,
    height: u32,
    stride: usize,
) -> Result<Frame, FarviewError> {
    let row_len = width as usize * BYTES_PER_PIXEL;
    if stride < row_len || bgra.len() < stride * height as usize {
        return Err(FarviewError::Capture(format!(
            "short capture buffer: {} bytes for {}x{} stride {}",
            bgra.len(),
            width,
            height,
            stride
        )));
    }

    let mut data = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let row = &bgra[y * stride..y * stride + row_len];
        for px in row.chunks_exact(BYTES_PER_PIXEL) {
            data.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
    }

    Frame::new(width, height, data)
}

// ── Tests ────────────────────────────────────────────────────────
