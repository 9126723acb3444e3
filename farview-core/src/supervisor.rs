//! Streaming supervisor — owns the capture → encode → broadcast loop.
//!
//! One supervisor exists per process; it is constructed in `main` and
//! handed (`Arc`) to the HTTP and WebSocket endpoints. The pipeline
//! runs at most once regardless of how many start requests overlap:
//!
//! ```text
//!             start()
//!   IDLE ─────────────▶ STARTING ────▶ RUNNING
//!    ▲                                    │
//!    │       stop()                       │
//!    └──────────── STOPPING ◀─────────────┘
//! ```
//!
//! The loop itself runs on a dedicated OS thread because the pacer
//! busy-spins the tail of each frame interval. Encoder creation is
//! deferred until the first frame with a subscriber present, so an
//! idle agent pays no codec setup.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::capture::{self, CaptureMethod, Grabber};
use crate::encoder::{self, Codec, Encoder, EncoderOptions};
use crate::error::FarviewError;
use crate::frame::Frame;
use crate::hub::Hub;
use crate::mapping::{CoordinateMapper, ScreenProbe};
use crate::pacer::{FramePacer, PacerStats};
use crate::recorder::DebugRecorder;
use crate::scaler::scale_frame;

/// Idle back-off while no subscriber is connected.
const IDLE_SLEEP: Duration = Duration::from_millis(100);

/// Placeholder mapping installed before the encoder reports its size.
const PLACEHOLDER_ENCODED: (u32, u32) = (1920, 1080);

/// Frames between periodic status log lines (~25 s at 20 fps).
const DIAG_INTERVAL: u64 = 500;

// ── Configuration ────────────────────────────────────────────────

/// Pipeline configuration, resolved from the agent's config file.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub capture_method: CaptureMethod,
    pub codec: Codec,
    /// Target frames per second, 1..=60.
    pub frame_rate: u32,
    pub encoder: EncoderOptions,
    /// Directory for the raw H.264 debug dump.
    pub debug_save_path: PathBuf,
    /// Debug dump length in seconds; 0 disables.
    pub debug_save_duration: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            capture_method: CaptureMethod::Auto,
            codec: Codec::H264,
            frame_rate: 20,
            encoder: EncoderOptions::default(),
            debug_save_path: PathBuf::from("./debug"),
            debug_save_duration: 0,
        }
    }
}

// ── State machine ────────────────────────────────────────────────

/// Lifecycle phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Starting,
    Running,
    Stopping,
}

// ── StreamSupervisor ─────────────────────────────────────────────

/// Process-wide owner of the capture pipeline.
pub struct StreamSupervisor {
    config: StreamConfig,
    hub: Hub,
    mapper: Arc<CoordinateMapper>,
    state: Arc<RwLock<PipelineState>>,
    cancel: Mutex<Option<CancellationToken>>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    keyframe_wanted: Arc<AtomicBool>,
    encoder_present: Arc<AtomicBool>,
    grabber_present: Arc<AtomicBool>,
    /// Last pacer snapshot from the capture loop; `None` while idle.
    pacer_stats: Arc<RwLock<Option<PacerStats>>>,
}

impl StreamSupervisor {
    /// Create the supervisor and its hub, querying the OS for the
    /// screen size on every mapping update. Must be called on the
    /// tokio runtime (the hub actor is spawned here).
    pub fn new(config: StreamConfig) -> Self {
        Self::with_screen_probe(config, Box::new(|| capture::probe_screen().ok()))
    }

    /// Create the supervisor with an explicit screen probe for the
    /// coordinate mapper (tests, hosts without a display query).
    pub fn with_screen_probe(config: StreamConfig, probe: ScreenProbe) -> Self {
        let keyframe_wanted = Arc::new(AtomicBool::new(false));
        let hub = Hub::spawn(Arc::clone(&keyframe_wanted));
        Self {
            config,
            hub,
            mapper: Arc::new(CoordinateMapper::new(probe)),
            state: Arc::new(RwLock::new(PipelineState::Idle)),
            cancel: Mutex::new(None),
            thread: Mutex::new(None),
            keyframe_wanted,
            encoder_present: Arc::new(AtomicBool::new(false)),
            grabber_present: Arc::new(AtomicBool::new(false)),
            pacer_stats: Arc::new(RwLock::new(None)),
        }
    }

    /// Start the pipeline. Idempotent: a second start while running
    /// returns Ok without touching anything.
    ///
    /// Fails only when no capture backend can see a display.
    pub fn start(&self) -> Result<(), FarviewError> {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            match *state {
                PipelineState::Running | PipelineState::Starting => {
                    info!("pipeline already running");
                    return Ok(());
                }
                PipelineState::Stopping => {
                    return Err(FarviewError::Other("pipeline is stopping".into()));
                }
                PipelineState::Idle => *state = PipelineState::Starting,
            }
        }

        // Refuse to start with no display at all; the grabber proper
        // is built on the capture thread.
        if let Err(e) = capture::probe_screen() {
            *self.state.write().unwrap_or_else(|e| e.into_inner()) = PipelineState::Idle;
            return Err(e);
        }

        // Placeholder mapping until the encoder reports its real size;
        // the mapper reads the screen size through its own probe.
        self.mapper
            .update(PLACEHOLDER_ENCODED.0, PLACEHOLDER_ENCODED.1);

        let cancel = CancellationToken::new();
        let handle = {
            let config = self.config.clone();
            let hub = self.hub.clone();
            let mapper = Arc::clone(&self.mapper);
            let state = Arc::clone(&self.state);
            let cancel = cancel.clone();
            let keyframe_wanted = Arc::clone(&self.keyframe_wanted);
            let encoder_present = Arc::clone(&self.encoder_present);
            let grabber_present = Arc::clone(&self.grabber_present);
            let pacer_stats = Arc::clone(&self.pacer_stats);

            std::thread::Builder::new()
                .name("farview-capture".into())
                .spawn(move || {
                    capture_loop(
                        config,
                        hub,
                        mapper,
                        cancel,
                        keyframe_wanted,
                        Arc::clone(&encoder_present),
                        Arc::clone(&grabber_present),
                        Arc::clone(&pacer_stats),
                    );
                    // Whatever ended the loop, the pipeline is down.
                    encoder_present.store(false, Ordering::SeqCst);
                    grabber_present.store(false, Ordering::SeqCst);
                    *pacer_stats.write().unwrap_or_else(|e| e.into_inner()) = None;
                    let mut state = state.write().unwrap_or_else(|e| e.into_inner());
                    if *state != PipelineState::Stopping {
                        warn!("capture loop exited on its own");
                        *state = PipelineState::Idle;
                    }
                })?
        };

        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(cancel);
        *self.thread.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = PipelineState::Running;
        info!(fps = self.config.frame_rate, codec = %self.config.codec, "pipeline started");
        Ok(())
    }

    /// Stop the pipeline and wait for the capture thread to exit.
    ///
    /// Blocks for up to a few frame intervals; call from a blocking
    /// context. A stop while idle is a no-op.
    pub fn stop(&self) -> Result<(), FarviewError> {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if *state != PipelineState::Running {
                info!("pipeline not running, nothing to stop");
                return Ok(());
            }
            *state = PipelineState::Stopping;
        }

        if let Some(cancel) = self.cancel.lock().unwrap_or_else(|e| e.into_inner()).take() {
            cancel.cancel();
        }
        if let Some(handle) = self.thread.lock().unwrap_or_else(|e| e.into_inner()).take() {
            if handle.join().is_err() {
                error!("capture thread panicked");
            }
        }

        // Grabber and encoder were released by the loop itself, after
        // it observed the cancellation.
        self.hub.disconnect_all();
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = PipelineState::Idle;
        info!("pipeline stopped");
        Ok(())
    }

    /// Whether the pipeline is currently RUNNING.
    pub fn is_running(&self) -> bool {
        *self.state.read().unwrap_or_else(|e| e.into_inner()) == PipelineState::Running
    }

    /// Number of connected viewers.
    pub fn client_count(&self) -> usize {
        self.hub.len()
    }

    /// The subscriber hub.
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// The process-wide coordinate mapper.
    pub fn mapper(&self) -> &Arc<CoordinateMapper> {
        &self.mapper
    }

    /// Stats map for the HTTP status surface.
    pub fn stats(&self) -> Value {
        let pacer = self
            .pacer_stats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .map(|p| p.to_json())
            .unwrap_or(Value::Null);
        json!({
            "running": self.is_running(),
            "client_count": self.client_count(),
            "encoder": self.encoder_present.load(Ordering::SeqCst),
            "grabber": self.grabber_present.load(Ordering::SeqCst),
            "pacer": pacer,
        })
    }
}

// ── Capture loop ─────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn capture_loop(
    config: StreamConfig,
    hub: Hub,
    mapper: Arc<CoordinateMapper>,
    cancel: CancellationToken,
    keyframe_wanted: Arc<AtomicBool>,
    encoder_present: Arc<AtomicBool>,
    grabber_present: Arc<AtomicBool>,
    pacer_stats: Arc<RwLock<Option<PacerStats>>>,
) {
    let mut grabber: Box<dyn Grabber> = match capture::create_grabber(config.capture_method) {
        Ok(g) => g,
        Err(e) => {
            error!(error = %e, "no capture backend available");
            return;
        }
    };
    if let Err(e) = grabber.start() {
        error!(error = %e, "capture backend failed to start");
        return;
    }
    grabber_present.store(true, Ordering::SeqCst);

    let mut pacer = FramePacer::new(config.frame_rate);
    let mut recorder = DebugRecorder::new(&config.debug_save_path, config.debug_save_duration);
    let mut encoder: Option<Box<dyn Encoder>> = None;
    let mut prev_frame: Option<Frame> = None;
    let mut frame_count: u64 = 0;

    info!(
        method = config.capture_method.name(),
        bounds = format!("{}x{}", grabber.bounds().0, grabber.bounds().1),
        "capture loop started"
    );

    while !cancel.is_cancelled() {
        pacer.wait();
        *pacer_stats.write().unwrap_or_else(|e| e.into_inner()) = Some(pacer.stats());

        // Nobody watching: don't burn CPU on capture or encode.
        if hub.is_empty() {
            std::thread::sleep(IDLE_SLEEP);
            continue;
        }

        // 1. Capture, reusing the previous frame on transient failure.
        match grabber.frame() {
            Ok(frame) => prev_frame = Some(frame),
            Err(e) => {
                if prev_frame.is_none() {
                    warn!(error = %e, "capture failed with no previous frame, skipping tick");
                    continue;
                }
                warn!(error = %e, "capture failed, reusing previous frame");
            }
        }
        let frame_valid = prev_frame
            .as_ref()
            .is_some_and(|f| f.validate().is_ok());
        if !frame_valid {
            if prev_frame.take().is_some() {
                warn!("dropping invalid frame");
            }
            continue;
        }
        let Some(frame) = prev_frame.as_ref() else {
            continue;
        };

        // 2. Lazy encoder creation, now that someone is watching.
        if encoder.is_none() {
            let (w, h) = grabber.bounds();
            let built = encoder::create_encoder(
                config.codec,
                w,
                h,
                config.frame_rate,
                &config.encoder,
            )
            .or_else(|e| {
                warn!(error = %e, "encoder construction failed, falling back to jpeg");
                encoder::create_encoder(Codec::Jpeg, w, h, config.frame_rate, &config.encoder)
            });

            match built {
                Ok(enc) => {
                    let (ow, oh) = enc.output_size();
                    mapper.update(ow, oh);
                    // The waiting subscribers need a decodable prefix.
                    keyframe_wanted.store(true, Ordering::SeqCst);
                    encoder_present.store(true, Ordering::SeqCst);
                    info!(codec = %enc.codec(), output = format!("{ow}x{oh}"), "encoder ready");
                    encoder = Some(enc);
                }
                Err(e) => {
                    // Keep trying on subsequent frames.
                    error!(error = %e, "no encoder available this tick");
                    continue;
                }
            }
        }
        let Some(enc) = encoder.as_mut() else {
            continue;
        };

        if keyframe_wanted.swap(false, Ordering::SeqCst) {
            enc.force_keyframe();
        }

        // 3. Scale when the capture size differs from the encoder's.
        let (tw, th) = enc.output_size();
        let scaled;
        let encode_input = if frame.size() != (tw, th) {
            match scale_frame(frame, tw, th) {
                Ok(f) => {
                    scaled = f;
                    &scaled
                }
                Err(e) => {
                    warn!(error = %e, "scale failed, dropping frame");
                    continue;
                }
            }
        } else {
            frame
        };

        // 4. Encode; a failed frame is dropped, the loop continues.
        let packet = match enc.encode(encode_input) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "encode failed, dropping frame");
                continue;
            }
        };
        frame_count += 1;

        // 5. Debug sink (raw H.264 only).
        if frame_count == 1 && recorder.enabled() {
            if let Err(e) = recorder.start() {
                warn!(error = %e, "debug recording failed to start");
            }
        }
        if packet.codec == Codec::H264 {
            let _ = recorder.write(&packet.data);
        }

        if frame_count % DIAG_INTERVAL == 0 {
            info!(
                frame = frame_count,
                size = format!("{}x{}", frame.width, frame.height),
                payload = packet.data.len(),
                nals = crate::nal::describe(&packet.data),
                black = frame.looks_black(20),
                viewers = hub.len(),
                "stream status"
            );
        }

        // 6. Cache update + fan-out happen inside the hub actor; this
        // send never blocks the loop.
        hub.broadcast(packet);
    }

    recorder.finish();
    if let Err(e) = grabber.stop() {
        warn!(error = %e, "grabber stop reported an error");
    }
    if let Some(mut enc) = encoder.take() {
        enc.close();
    }
    info!(frames = frame_count, "capture loop ended");
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_idle_with_empty_stats() {
        let sup = StreamSupervisor::new(StreamConfig::default());
        assert!(!sup.is_running());
        assert_eq!(sup.client_count(), 0);

        let stats = sup.stats();
        assert_eq!(stats["running"], false);
        assert_eq!(stats["client_count"], 0);
        assert_eq!(stats["encoder"], false);
        assert_eq!(stats["grabber"], false);
        // No capture loop yet, so no pacer snapshot either.
        assert!(stats["pacer"].is_null());
    }

    #[tokio::test]
    async fn stop_while_idle_is_a_noop() {
        let sup = StreamSupervisor::new(StreamConfig::default());
        sup.stop().unwrap();
        assert!(!sup.is_running());
    }

    #[tokio::test]
    async fn mapper_starts_uninitialized() {
        let sup = StreamSupervisor::new(StreamConfig::default());
        assert!(!sup.mapper().is_initialized());
        // Identity transform before the first start.
        assert_eq!(sup.mapper().transform(10, 10), (10, 10));
    }

    #[tokio::test]
    async fn injected_probe_feeds_mapping_updates() {
        let sup = StreamSupervisor::with_screen_probe(
            StreamConfig::default(),
            Box::new(|| Some((1920, 1080))),
        );
        sup.mapper().update(1280, 720);
        assert_eq!(sup.mapper().transform(640, 360), (960, 540));
    }

    #[test]
    fn default_config_matches_agent_defaults() {
        let cfg = StreamConfig::default();
        assert_eq!(cfg.frame_rate, 20);
        assert_eq!(cfg.codec, Codec::H264);
        assert_eq!(cfg.capture_method, CaptureMethod::Auto);
        assert_eq!(cfg.debug_save_duration, 0);
    }
}
