//! Hybrid sleep+spin frame-rate governor.
//!
//! OS sleep has worse-than-millisecond jitter on commodity hosts, so
//! the pacer sleeps only a fraction of the remaining wait and
//! busy-spins the tail. The result is low frame-time variance without
//! monopolizing a core for the whole interval.
//!
//! The pacer is stateful: the next target is computed from the last
//! frame timestamp, so a transient over-run does not drag subsequent
//! frames below the configured rate. `wait()` can return late, never
//! early.

use std::time::{Duration, Instant};

/// Waits spill into a pure spin below this threshold.
const SPIN_THRESHOLD: Duration = Duration::from_millis(1);

/// Above this remaining time, sleep a quarter of it; below, an eighth.
const LONG_WAIT: Duration = Duration::from_millis(30);

/// Frame-rate limiter for the capture loop.
pub struct FramePacer {
    /// Target frames per second.
    desired_fps: u32,
    /// Duration of one frame at the target rate.
    frame_time: Duration,
    /// Timestamp of the previous frame boundary.
    last_frame: Instant,
    /// Duration of the most recent sleep (zero if spin-only).
    last_sleep: Duration,
    /// Whether the last `wait()` slept at all.
    did_sleep: bool,
    /// Whether the last `wait()` spun at all.
    did_spin: bool,
}

impl FramePacer {
    /// Create a pacer targeting `desired_fps` frames per second.
    ///
    /// `desired_fps` is clamped to at least 1.
    pub fn new(desired_fps: u32) -> Self {
        let fps = desired_fps.max(1);
        Self {
            desired_fps: fps,
            frame_time: Duration::from_secs(1) / fps,
            last_frame: Instant::now(),
            last_sleep: Duration::ZERO,
            did_sleep: false,
            did_spin: false,
        }
    }

    /// Block until the next frame boundary.
    pub fn wait(&mut self) {
        self.did_sleep = false;
        self.did_spin = false;
        self.last_sleep = Duration::ZERO;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_frame);
        let remaining = self.frame_time.saturating_sub(elapsed);

        if remaining > SPIN_THRESHOLD {
            let sleep_for = if remaining > LONG_WAIT {
                remaining / 4
            } else {
                remaining / 8
            };
            self.last_sleep = sleep_for;
            std::thread::sleep(sleep_for);
            self.did_sleep = true;
        }

        let deadline = now + remaining;
        while Instant::now() < deadline {
            self.did_spin = true;
            std::hint::spin_loop();
        }

        self.last_frame = Instant::now();
    }

    /// Target frames per second.
    pub fn desired_fps(&self) -> u32 {
        self.desired_fps
    }

    /// Stats for the status endpoint.
    pub fn stats(&self) -> PacerStats {
        PacerStats {
            desired_fps: self.desired_fps,
            frame_time: self.frame_time,
            last_sleep: self.last_sleep,
            did_sleep: self.did_sleep,
            did_spin: self.did_spin,
        }
    }
}

/// Snapshot of the pacer's last iteration.
#[derive(Debug, Clone, Copy)]
pub struct PacerStats {
    pub desired_fps: u32,
    pub frame_time: Duration,
    pub last_sleep: Duration,
    pub did_sleep: bool,
    pub did_spin: bool,
}

impl PacerStats {
    /// Detail map for the stream-status surface.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "desired_fps": self.desired_fps,
            "frame_time_ns": self.frame_time.as_nanos() as u64,
            "last_sleep_ns": self.last_sleep.as_nanos() as u64,
            "did_sleep": self.did_sleep,
            "did_spin": self.did_spin,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
