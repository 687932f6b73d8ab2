use async_trait::async_trait;

use crate::events::EventEmitter;
use crate::models::audio_models::SourceUrl;
use crate::models::error::CollageError;

/// Decoded overview of a source, available once a handle is ready.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformSummary {
    pub duration_secs: f64,
    /// One normalized level (0.0–1.0) per bar.
    pub peaks: Vec<f32>,
}

/// Notifications published by a waveform view.
///
/// Handles publish only `Progress` and `Finished`; the view publishes the rest.
#[derive(Debug, Clone, PartialEq)]
pub enum WaveformEvent {
    Ready(WaveformSummary),
    Play,
    Pause,
    Progress { position_secs: f64, duration_secs: f64 },
    Finished,
    DecodeFailed(String),
    TornDown,
}

/// A live rendering of one source with its own transport.
#[async_trait]
pub trait RenderHandle: Send {
    /// Resolves once the source has decoded. Failure leaves the handle unplayable.
    async fn ready(&mut self) -> Result<WaveformSummary, CollageError>;

    fn play(&mut self);

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    /// Move the playhead to `ratio` (0.0–1.0) of the total duration.
    fn seek_to(&mut self, ratio: f64);

    fn position_secs(&self) -> f64;

    fn duration_secs(&self) -> f64;

    /// Stop every loop and timer the handle owns. Must be idempotent.
    fn destroy(&mut self);
}

/// Creates render handles bound to a source.
pub trait WaveformRenderer: Send + Sync {
    type Handle: RenderHandle;

    /// Create a handle for `source`. Decoding continues asynchronously and
    /// completes through [`RenderHandle::ready`].
    fn create(&self, source: &SourceUrl, events: EventEmitter<WaveformEvent>) -> Self::Handle;
}
