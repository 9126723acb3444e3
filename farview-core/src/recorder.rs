//! Timed raw-H.264 debug sink.
//!
//! When enabled, the supervisor feeds every H.264 payload here; the
//! recorder writes a single `video_YYYYMMDD_HHMMSS.h264` file under
//! the configured directory and stops on its own once the configured
//! duration has elapsed. The dump is the raw Annex-B elementary stream
//! — the closing log line carries the ffmpeg invocation that wraps it
//! into an MP4.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::FarviewError;

/// Debug recorder for the raw encoder output.
pub struct DebugRecorder {
    save_path: PathBuf,
    duration: Duration,
    file: Option<File>,
    file_path: PathBuf,
    started: Option<Instant>,
}

impl DebugRecorder {
    /// Create a recorder writing into `save_path` for
    /// `duration_seconds`. A zero duration disables recording
    /// entirely.
    pub fn new(save_path: impl AsRef<Path>, duration_seconds: u32) -> Self {
        Self {
            save_path: save_path.as_ref().to_path_buf(),
            duration: Duration::from_secs(duration_seconds as u64),
            file: None,
            file_path: PathBuf::new(),
            started: None,
        }
    }

    /// Whether recording is configured at all.
    pub fn enabled(&self) -> bool {
        !self.duration.is_zero()
    }

    /// Whether a file is currently open.
    pub fn is_recording(&self) -> bool {
        self.file.is_some()
    }

    /// Open the dump file. Called once, on the first encoded frame.
    pub fn start(&mut self) -> Result<(), FarviewError> {
        if !self.enabled() || self.file.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.save_path)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.file_path = self.save_path.join(format!("video_{stamp}.h264"));
        self.file = Some(File::create(&self.file_path)?);
        self.started = Some(Instant::now());

        info!(
            file = %self.file_path.display(),
            duration_s = self.duration.as_secs(),
            "debug video recording started"
        );
        Ok(())
    }

    /// Append one encoded payload; closes the file once the configured
    /// duration has elapsed.
    pub fn write(&mut self, payload: &[u8]) -> Result<(), FarviewError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        if let Err(e) = file.write_all(payload) {
            warn!(error = %e, "debug video write failed, stopping recording");
            self.finish();
            return Err(e.into());
        }

        if self
            .started
            .is_some_and(|t| t.elapsed() >= self.duration)
        {
            self.finish();
        }
        Ok(())
    }

    /// Close the dump file and log the conversion hint.
    pub fn finish(&mut self) {
        if self.file.take().is_some() {
            let elapsed = self
                .started
                .take()
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0);
            info!(
                file = %self.file_path.display(),
                elapsed_s = format!("{elapsed:.1}"),
                "debug video recording finished; convert with: ffmpeg -framerate <fps> -i {} -c copy {}.mp4",
                self.file_path.display(),
                self.file_path.display()
            );
        }
    }
}

impl Drop for DebugRecorder {
    fn drop(&mut self) {
        self.finish();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_duration_disables_recording() {
        let dir = std::env::temp_dir().join("farview-recorder-disabled");
        let mut rec = DebugRecorder::new(&dir, 0);
        assert!(!rec.enabled());

        rec.start().unwrap();
        assert!(!rec.is_recording());
        rec.write(&[1, 2, 3]).unwrap();
        assert!(!dir.join("x").exists());
    }

    #[test]
    fn writes_payloads_until_duration_elapses() {
        let dir = std::env::temp_dir().join(format!(
            "farview-recorder-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);

        let mut rec = DebugRecorder::new(&dir, 3600);
        rec.start().unwrap();
        assert!(rec.is_recording());

        rec.write(&[0x00, 0x00, 0x00, 0x01, 0x65]).unwrap();
        rec.write(&[0x00, 0x00, 0x00, 0x01, 0x41]).unwrap();
        let path = rec.file_path.clone();
        rec.finish();
        assert!(!rec.is_recording());

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len(), 10);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn duration_elapse_closes_file() {
        let dir = std::env::temp_dir().join(format!(
            "farview-recorder-elapse-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);

        // 0 seconds is "disabled"; use 1 and backdate the start.
        let mut rec = DebugRecorder::new(&dir, 1);
        rec.start().unwrap();
        rec.started = Some(Instant::now() - Duration::from_secs(2));
        rec.write(&[1]).unwrap();
        assert!(!rec.is_recording());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
