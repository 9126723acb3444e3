//! H.264 software encoder backed by openh264.
//!
//! Produces an Annex-B elementary stream, one access unit per input
//! frame. The first frame after construction is an IDR with SPS+PPS;
//! [`force_keyframe`](crate::encoder::Encoder::force_keyframe) asks the
//! library for an IDR on the next frame via its explicit intra-frame
//! request. If an encode fails the encoder is rebuilt once with the
//! same parameters, which also yields a fresh SPS+PPS+IDR sequence.

use openh264::encoder::{Encoder as LibEncoder, EncoderConfig};
use openh264::formats::YUVBuffer;
use tracing::{debug, info, warn};

use crate::encoder::{Codec, EncodedPacket, Encoder};
use crate::error::FarviewError;
use crate::frame::Frame;
use crate::nal;

/// The only H.264 level this agent targets; its resolution table caps
/// the encoded size.
pub const H264_SUPPORTED_PROFILE: &str = "3.1";

/// Codec-friendly output sizes per supported profile, best first.
const PROFILE_31_SIZES: [(u32, u32); 4] =
    [(1920, 1080), (1280, 720), (720, 576), (720, 480)];

// ── Options ──────────────────────────────────────────────────────

/// H.264 tuning knobs from configuration.
///
/// `preset`, `tune` and `profile` are x264 vocabulary with no openh264
/// equivalent; they are kept so configs stay portable, and logged at
/// construction. `bitrate` is applied.
#[derive(Debug, Clone)]
pub struct H264Options {
    pub preset: String,
    pub tune: String,
    pub profile: String,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
}

impl Default for H264Options {
    fn default() -> Self {
        Self {
            preset: "fast".into(),
            tune: "zerolatency".into(),
            profile: "main".into(),
            bitrate: 20_000_000,
        }
    }
}

// ── Size selection ───────────────────────────────────────────────

/// Find the best codec-friendly size for `profile` given the capture
/// constraints.
///
/// An exact match wins. Otherwise the first strictly smaller size with
/// near-equal aspect ratio (difference < 1e-4) wins; failing that, the
/// size with the minimum aspect-ratio difference.
pub fn find_best_size(
    profile: &str,
    width: u32,
    height: u32,
) -> Result<(u32, u32), FarviewError> {
    let sizes: &[(u32, u32)] = match profile {
        "3.1" => &PROFILE_31_SIZES,
        other => {
            return Err(FarviewError::EncoderConstruction {
                codec: "h264",
                reason: format!("profile {other} not supported"),
            })
        }
    };

    let mut min_ratio_diff = f64::MAX;
    let mut min_ratio_size = sizes[0];

    for &(sw, sh) in sizes {
        if (sw, sh) == (width, height) {
            return Ok((sw, sh));
        }
        let lower_res = sw < width && sh < height;
        let h_ratio = width as f64 / sw as f64;
        let v_ratio = height as f64 / sh as f64;
        let ratio_diff = (h_ratio - v_ratio).abs();
        if lower_res && ratio_diff < 1e-4 {
            return Ok((sw, sh));
        }
        if ratio_diff < min_ratio_diff {
            min_ratio_diff = ratio_diff;
            min_ratio_size = (sw, sh);
        }
    }

    Ok(min_ratio_size)
}

// ── H264Encoder ──────────────────────────────────────────────────

/// Stateful H.264 encoder.
pub struct H264Encoder {
    encoder: Option<LibEncoder>,
    /// Codec-rounded output size; every input frame must match.
    real_size: (u32, u32),
    frame_rate: u32,
    options: H264Options,
    sequence: u64,
    force_keyframe: bool,
    /// Frame index of the last observed IDR, for diagnostics.
    last_idr: Option<u64>,
    /// Scratch RGB buffer reused across frames.
    rgb: Vec<u8>,
}

impl H264Encoder {
    /// Create an encoder targeting `(width, height)` rounded to the
    /// profile table, at `frame_rate` fps.
    pub fn new(
        width: u32,
        height: u32,
        frame_rate: u32,
        options: H264Options,
    ) -> Result<Self, FarviewError> {
        let frame_rate = if frame_rate == 0 { 20 } else { frame_rate };
        let real_size = find_best_size(H264_SUPPORTED_PROFILE, width, height)?;

        info!(
            requested = format!("{width}x{height}"),
            actual = format!("{}x{}", real_size.0, real_size.1),
            frame_rate,
            preset = %options.preset,
            tune = %options.tune,
            profile = %options.profile,
            bitrate = options.bitrate,
            "creating h264 encoder"
        );

        let encoder = Self::build(real_size, frame_rate, &options)?;

        Ok(Self {
            encoder: Some(encoder),
            real_size,
            frame_rate,
            options,
            sequence: 0,
            force_keyframe: false,
            last_idr: None,
            rgb: Vec::new(),
        })
    }

    fn build(
        size: (u32, u32),
        frame_rate: u32,
        options: &H264Options,
    ) -> Result<LibEncoder, FarviewError> {
        let config = EncoderConfig::new(size.0, size.1)
            .set_bitrate_bps(options.bitrate)
            .max_frame_rate(frame_rate as f32)
            .enable_skip_frame(false);

        LibEncoder::with_config(config).map_err(|e| FarviewError::EncoderConstruction {
            codec: "h264",
            reason: e.to_string(),
        })
    }

    /// Rebuild the library encoder with identical parameters.
    ///
    /// Used as the recovery path after an encode failure; the rebuilt
    /// encoder's first output is a full SPS+PPS+IDR sequence.
    fn rebuild(&mut self) -> Result<(), FarviewError> {
        warn!("rebuilding h264 encoder");
        self.encoder = Some(Self::build(self.real_size, self.frame_rate, &self.options)?);
        Ok(())
    }
}

impl Encoder for H264Encoder {
    fn encode(&mut self, frame: &Frame) -> Result<EncodedPacket, FarviewError> {
        if frame.size() != self.real_size {
            return Err(FarviewError::FrameSizeMismatch {
                expected_w: self.real_size.0,
                expected_h: self.real_size.1,
                actual_w: frame.width,
                actual_h: frame.height,
            });
        }
        frame.validate()?;

        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| FarviewError::Encode("encoder is closed".into()))?;

        if self.force_keyframe {
            unsafe {
                encoder.raw_api().force_intra_frame(true);
            }
            self.force_keyframe = false;
            debug!(frame = self.sequence + 1, "idr requested for next frame");
        }

        let pixels = frame.width as usize * frame.height as usize;
        self.rgb.clear();
        self.rgb.reserve(pixels * 3);
        for px in frame.data.chunks_exact(4) {
            self.rgb.extend_from_slice(&px[..3]);
        }
        let yuv = YUVBuffer::with_rgb(
            frame.width as usize,
            frame.height as usize,
            &self.rgb,
        );

        let encoded = encoder
            .encode(&yuv)
            .map(|bitstream| bitstream.to_vec())
            .map_err(|e| e.to_string());
        let payload = match encoded {
            Ok(payload) => payload,
            Err(reason) => {
                // One frame is lost; the rebuilt encoder restarts the
                // stream with a decodable prefix.
                self.rebuild()?;
                return Err(FarviewError::Encode(reason));
            }
        };

        if payload.is_empty() {
            return Err(FarviewError::Encode("encoder produced empty payload".into()));
        }

        self.sequence += 1;
        let is_keyframe = nal::contains_idr(&payload);
        if is_keyframe {
            match self.last_idr {
                Some(prev) => debug!(
                    frame = self.sequence,
                    since_last = self.sequence - prev,
                    bytes = payload.len(),
                    "idr frame"
                ),
                None => debug!(frame = self.sequence, bytes = payload.len(), "first idr frame"),
            }
            self.last_idr = Some(self.sequence);
        }

        Ok(EncodedPacket {
            codec: Codec::H264,
            is_keyframe,
            sequence: self.sequence,
            data: payload,
        })
    }

    fn force_keyframe(&mut self) {
        self.force_keyframe = true;
    }

    fn output_size(&self) -> (u32, u32) {
        self.real_size
    }

    fn codec(&self) -> Codec {
        Codec::H264
    }

    fn close(&mut self) {
        self.encoder = None;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins() {
        assert_eq!(find_best_size("3.1", 1280, 720).unwrap(), (1280, 720));
        assert_eq!(find_best_size("3.1", 1920, 1080).unwrap(), (1920, 1080));
    }

    #[test]
    fn larger_screen_rounds_to_same_aspect() {
        // 2560x1440 is 16:9; the largest smaller 16:9 entry wins.
        assert_eq!(find_best_size("3.1", 2560, 1440).unwrap(), (1920, 1080));
        assert_eq!(find_best_size("3.1", 3840, 2160).unwrap(), (1920, 1080));
    }

    #[test]
    fn odd_aspect_takes_minimum_ratio_difference() {
        // 1366x768: no smaller near-equal-aspect entry; 1920x1080 has
        // the smallest ratio difference in the table.
        assert_eq!(find_best_size("3.1", 1366, 768).unwrap(), (1920, 1080));
    }

    #[test]
    fn unsupported_profile_errors() {
        assert!(find_best_size("4.2", 1920, 1080).is_err());
    }
}
