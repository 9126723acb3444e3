//! JPEG fallback encoder.
//!
//! Every JPEG packet is a complete image, so the whole stream is
//! intra-only and `is_keyframe` is always true. Used when H.264
//! construction fails or when configured explicitly.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder as LibJpegEncoder;
use image::RgbImage;
use tracing::debug;

use crate::encoder::{Codec, EncodedPacket, Encoder};
use crate::error::FarviewError;
use crate::frame::Frame;

/// Intra-only JPEG encoder.
pub struct JpegEncoder {
    size: (u32, u32),
    /// JPEG quality, 1..=100.
    quality: u8,
    sequence: u64,
    closed: bool,
}

impl JpegEncoder {
    /// Create an encoder producing `(width, height)` JPEG frames.
    pub fn new(width: u32, height: u32, quality: u8) -> Result<Self, FarviewError> {
        if !(1..=100).contains(&quality) {
            return Err(FarviewError::EncoderConstruction {
                codec: "jpeg",
                reason: format!("invalid quality: {quality} (must be 1-100)"),
            });
        }
        debug!(size = format!("{width}x{height}"), quality, "creating jpeg encoder");
        Ok(Self {
            size: (width, height),
            quality,
            sequence: 0,
            closed: false,
        })
    }
}

impl Encoder for JpegEncoder {
    fn encode(&mut self, frame: &Frame) -> Result<EncodedPacket, FarviewError> {
        if self.closed {
            return Err(FarviewError::Encode("encoder is closed".into()));
        }
        if frame.size() != self.size {
            return Err(FarviewError::FrameSizeMismatch {
                expected_w: self.size.0,
                expected_h: self.size.1,
                actual_w: frame.width,
                actual_h: frame.height,
            });
        }
        frame.validate()?;

        // JPEG carries no alpha; drop it before encoding.
        let mut rgb = Vec::with_capacity(frame.width as usize * frame.height as usize * 3);
        for px in frame.data.chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
        }
        let img = RgbImage::from_raw(frame.width, frame.height, rgb).ok_or_else(|| {
            FarviewError::Encode("rgb buffer did not match dimensions".into())
        })?;

        let mut buf = Cursor::new(Vec::new());
        let encoder = LibJpegEncoder::new_with_quality(&mut buf, self.quality);
        img.write_with_encoder(encoder)
            .map_err(|e| FarviewError::Encode(format!("jpeg encode failed: {e}")))?;

        self.sequence += 1;
        Ok(EncodedPacket {
            codec: Codec::Jpeg,
            is_keyframe: true,
            sequence: self.sequence,
            data: buf.into_inner(),
        })
    }

    fn force_keyframe(&mut self) {
        // Intra-only: every frame already is one.
    }

    fn output_size(&self) -> (u32, u32) {
        self.size
    }

    fn codec(&self) -> Codec {
        Codec::Jpeg
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

// ── Tests ────────────────────────────────────────────────────────
