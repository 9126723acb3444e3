//! Frame encoders: H.264 (primary) and JPEG (fallback).
//!
//! An encoder consumes tightly packed RGBA [`Frame`]s whose size equals
//! its [`output_size`](Encoder::output_size) and produces one
//! [`EncodedPacket`] per frame. The supervisor is responsible for
//! scaling frames to the output size before calling
//! [`encode`](Encoder::encode).

mod h264;
mod jpeg;

pub use h264::{find_best_size, H264Encoder, H264Options, H264_SUPPORTED_PROFILE};
pub use jpeg::JpegEncoder;

use tracing::warn;

use crate::error::FarviewError;
use crate::frame::Frame;

// ── Codec ────────────────────────────────────────────────────────

/// Codecs the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// H.264 Annex-B elementary stream, inter-frame.
    H264,
    /// One complete JPEG file per frame, intra-only.
    Jpeg,
}

impl Codec {
    /// Canonical lowercase name, as used in configuration files.
    pub const fn name(self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::Jpeg => "jpeg",
        }
    }

    /// Parse a configured codec name.
    ///
    /// `jpeg-turbo` rides the plain JPEG path and `vp8` is not built
    /// into this agent; both degrade with a warning, mirroring the
    /// unknown-codec handling of the configuration it replaces.
    pub fn parse(name: &str) -> Self {
        match name {
            "h264" => Codec::H264,
            "jpeg" => Codec::Jpeg,
            "jpeg-turbo" => {
                warn!("jpeg-turbo not built in, using jpeg");
                Codec::Jpeg
            }
            other => {
                warn!(codec = other, "unknown codec, using h264");
                Codec::H264
            }
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── EncodedPacket ────────────────────────────────────────────────

/// One encoded frame, tagged for the hub and the keyframe cache.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    /// Codec that produced the payload.
    pub codec: Codec,
    /// True iff the payload is self-decodable (H.264: contains an IDR;
    /// JPEG: always).
    pub is_keyframe: bool,
    /// Monotonically increasing per-encoder sequence number.
    pub sequence: u64,
    /// The elementary-stream bytes for exactly one frame.
    pub data: Vec<u8>,
}

// ── Encoder trait ────────────────────────────────────────────────

/// A stateful frame encoder.
///
/// Implementations are driven from the single capture thread; they do
/// not need to be thread-safe beyond `Send`.
pub trait Encoder: Send {
    /// Encode one frame. The frame's size must equal
    /// [`output_size`](Self::output_size).
    fn encode(&mut self, frame: &Frame) -> Result<EncodedPacket, FarviewError>;

    /// Request that the next encoded frame be self-decodable
    /// (SPS+PPS+IDR for H.264). No-op for intra-only codecs.
    fn force_keyframe(&mut self);

    /// The codec-rounded output dimensions. Stable for the encoder's
    /// lifetime.
    fn output_size(&self) -> (u32, u32);

    /// The codec this encoder produces.
    fn codec(&self) -> Codec;

    /// Release codec resources. Further `encode` calls error.
    fn close(&mut self);
}

// ── Factory ──────────────────────────────────────────────────────

/// Construct an encoder for `codec` targeting `(width, height)` at
/// `frame_rate` fps.
///
/// The caller handles fallback: when H.264 construction fails the
/// supervisor retries with [`Codec::Jpeg`].
pub fn create_encoder(
    codec: Codec,
    width: u32,
    height: u32,
    frame_rate: u32,
    opts: &EncoderOptions,
) -> Result<Box<dyn Encoder>, FarviewError> {
    if width == 0 || height == 0 {
        return Err(FarviewError::EncoderConstruction {
            codec: codec.name(),
            reason: format!("invalid size: {width}x{height}"),
        });
    }

    match codec {
        Codec::H264 => Ok(Box::new(H264Encoder::new(
            width,
            height,
            frame_rate,
            opts.h264.clone(),
        )?)),
        Codec::Jpeg => Ok(Box::new(JpegEncoder::new(
            width,
            height,
            opts.jpeg_quality,
        )?)),
    }
}

/// Codec tuning knobs carried from configuration.
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    pub h264: H264Options,
    /// JPEG quality, 1..=100.
    pub jpeg_quality: u8,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            h264: H264Options::default(),
            jpeg_quality: 80,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_parse_known_names() {
        assert_eq!(Codec::parse("h264"), Codec::H264);
        assert_eq!(Codec::parse("jpeg"), Codec::Jpeg);
        assert_eq!(Codec::parse("jpeg-turbo"), Codec::Jpeg);
    }

    #[test]
    fn codec_parse_unknown_defaults_to_h264() {
        assert_eq!(Codec::parse("av1"), Codec::H264);
        assert_eq!(Codec::parse(""), Codec::H264);
    }

    #[test]
    fn factory_rejects_zero_size() {
        let opts = EncoderOptions::default();
        assert!(create_encoder(Codec::Jpeg, 0, 720, 20, &opts).is_err());
        assert!(create_encoder(Codec::H264, 1280, 0, 20, &opts).is_err());
    }

    #[test]
    fn jpeg_factory_constructs() {
        let opts = EncoderOptions::default();
        let enc = create_encoder(Codec::Jpeg, 64, 48, 20, &opts).unwrap();
        assert_eq!(enc.codec(), Codec::Jpeg);
        assert_eq!(enc.output_size(), (64, 48));
    }
}
