use std::time::Duration;

use super::error::CollageError;

/// Configuration for a capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Recording auto-stops when this many seconds have elapsed (default: 30).
    pub max_duration_secs: f64,

    /// Cadence of elapsed-time updates while recording (default: 250ms).
    pub tick_interval: Duration,

    /// How long `stop()` waits for the device to deliver its final chunk (default: 2s).
    pub flush_timeout: Duration,

    /// MIME type attached to the finalized blob (default: `audio/wav`).
    pub mime_type: String,
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), CollageError> {
        if !(self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0) {
            return Err(CollageError::Configuration(
                "max duration must be positive".into(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(CollageError::Configuration("tick interval must be non-zero".into()));
        }
        if self.mime_type.trim().is_empty() {
            return Err(CollageError::Configuration("mime type is required".into()));
        }
        Ok(())
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs_f64(self.max_duration_secs)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 30.0,
            tick_interval: Duration::from_millis(250),
            flush_timeout: Duration::from_secs(2),
            mime_type: "audio/wav".into(),
        }
    }
}

/// Configuration for polling a processing task.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Delay between status requests (default: 2s).
    pub poll_interval: Duration,

    /// Status requests issued without a terminal answer before the task is
    /// failed with a timeout (default: 150, five minutes at the default interval).
    pub max_polls: u32,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), CollageError> {
        if self.poll_interval.is_zero() {
            return Err(CollageError::Configuration("poll interval must be non-zero".into()));
        }
        if self.max_polls == 0 {
            return Err(CollageError::Configuration("max polls must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_polls: 150,
        }
    }
}

/// What happens when the last track in a playback session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndBehavior {
    /// Stop playing and stay on the last track.
    #[default]
    Stop,
    /// Start over from the first track.
    LoopToStart,
}

/// Configuration for a playback session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    pub end_behavior: EndBehavior,

    /// Session volume in percent (default: 100).
    pub initial_volume: u8,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            end_behavior: EndBehavior::Stop,
            initial_volume: 100,
        }
    }
}

/// Configuration for a waveform view and its built-in renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformConfig {
    /// Number of peak bars computed per source (default: 64).
    pub bar_count: usize,

    /// Cadence of the playback clock while playing (default: 50ms).
    pub tick_interval: Duration,
}

impl WaveformConfig {
    pub fn validate(&self) -> Result<(), CollageError> {
        if self.bar_count == 0 {
            return Err(CollageError::Configuration("bar count must be at least 1".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(CollageError::Configuration("tick interval must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            bar_count: 64,
            tick_interval: Duration::from_millis(50),
        }
    }
}
