//! Agent configuration.
//!
//! One JSON file on disk; a missing or malformed file falls back to
//! defaults so the agent always comes up. Only the sections the
//! streaming and control pipeline consume live here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use farview_core::{CaptureMethod, Codec, EncoderOptions, H264Options, StreamConfig};

/// Top-level configuration loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Config schema version.
    pub version: String,
    /// Process-level settings.
    pub agent: AgentSection,
    /// Screen capture settings.
    pub screen: ScreenSection,
    /// Encoder settings.
    pub encoder: EncoderSection,
    /// System-control gates.
    pub system: SystemSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Port for the HTTP/WebSocket server.
    pub http_port: u16,
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenSection {
    /// Capture backend: "auto", "dxgi", "wgc", "robotgo".
    pub capture_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSection {
    /// "h264", "jpeg", "jpeg-turbo", "vp8".
    pub default_codec: String,
    /// Target frames per second, 1..=60.
    pub frame_rate: u32,
    pub h264_preset: String,
    pub h264_tune: String,
    pub h264_profile: String,
    /// Advisory bitrate, bits/second.
    pub h264_bitrate: u32,
    /// JPEG quality, 1..=100.
    pub jpeg_quality: u8,
    pub debug: DebugSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSection {
    /// Directory for the raw H.264 dump.
    pub save_path: PathBuf,
    /// Dump length in seconds; 0 disables.
    pub save_video_duration: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSection {
    /// Whether `SYSTEM_REBOOT` may act at all.
    pub reboot_enabled: bool,
    /// Seconds between accepting a reboot and issuing it.
    pub reboot_delay: u32,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            version: "1.0.0".into(),
            agent: AgentSection::default(),
            screen: ScreenSection::default(),
            encoder: EncoderSection::default(),
            system: SystemSection::default(),
        }
    }
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            http_port: 50052,
            log_level: "info".into(),
        }
    }
}

impl Default for ScreenSection {
    fn default() -> Self {
        Self {
            capture_method: "auto".into(),
        }
    }
}

impl Default for EncoderSection {
    fn default() -> Self {
        Self {
            default_codec: "h264".into(),
            frame_rate: 20,
            h264_preset: "medium".into(),
            h264_tune: "zerolatency".into(),
            h264_profile: "baseline".into(),
            h264_bitrate: 20_000_000,
            jpeg_quality: 80,
            debug: DebugSection::default(),
        }
    }
}

impl Default for DebugSection {
    fn default() -> Self {
        Self {
            save_path: PathBuf::from("./debug"),
            save_video_duration: 0,
        }
    }
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            reboot_enabled: false,
            reboot_delay: 5,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl AgentConfig {
    /// Load configuration from a JSON file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Render the default configuration (for `--gen-config`).
    pub fn default_json() -> String {
        serde_json::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| "{}".into())
    }

    /// Convert the capture/encoder sections into a pipeline config.
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            capture_method: CaptureMethod::parse(&self.screen.capture_method),
            codec: Codec::parse(&self.encoder.default_codec),
            frame_rate: self.encoder.frame_rate.clamp(1, 60),
            encoder: EncoderOptions {
                h264: H264Options {
                    preset: self.encoder.h264_preset.clone(),
                    tune: self.encoder.h264_tune.clone(),
                    profile: self.encoder.h264_profile.clone(),
                    bitrate: self.encoder.h264_bitrate,
                },
                jpeg_quality: self.encoder.jpeg_quality.clamp(1, 100),
            },
            debug_save_path: self.encoder.debug.save_path.clone(),
            debug_save_duration: self.encoder.debug.save_video_duration,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = AgentConfig::default_json();
        assert!(text.contains("http_port"));
        assert!(text.contains("frame_rate"));
        assert!(text.contains("reboot_enabled"));
    }

    #[test]
    fn roundtrip_config() {
        let text = AgentConfig::default_json();
        let parsed: AgentConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.agent.http_port, 50052);
        assert_eq!(parsed.encoder.frame_rate, 20);
        assert!(!parsed.system.reboot_enabled);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: AgentConfig =
            serde_json::from_str(r#"{"encoder":{"frame_rate":30}}"#).unwrap();
        assert_eq!(parsed.encoder.frame_rate, 30);
        assert_eq!(parsed.encoder.default_codec, "h264");
        assert_eq!(parsed.agent.http_port, 50052);
    }

    #[test]
    fn to_stream_config_clamps() {
        let mut cfg = AgentConfig::default();
        cfg.encoder.frame_rate = 120;
        cfg.encoder.jpeg_quality = 0;
        let stream = cfg.to_stream_config();
        assert_eq!(stream.frame_rate, 60);
        assert_eq!(stream.encoder.jpeg_quality, 1);
    }

    #[test]
    fn codec_and_method_parse_through() {
        let mut cfg = AgentConfig::default();
        cfg.encoder.default_codec = "jpeg".into();
        cfg.screen.capture_method = "dxgi".into();
        let stream = cfg.to_stream_config();
        assert_eq!(stream.codec, Codec::Jpeg);
        assert_eq!(stream.capture_method, CaptureMethod::Dxgi);
    }

    #[test]
    fn load_missing_file_defaults() {
        let cfg = AgentConfig::load(Path::new("/nonexistent/farview.json"));
        assert_eq!(cfg.agent.http_port, 50052);
    }
}
