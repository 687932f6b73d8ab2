use tokio::sync::mpsc;

use crate::models::audio_models::SourceUrl;
use crate::models::error::CollageError;

/// Media notifications from an underlying audio source.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Metadata loaded; duration is known.
    Loaded { duration_secs: f64 },
    TimeUpdate { time_secs: f64 },
    Ended,
    Error(String),
}

/// A player event tagged with the player it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEvent {
    pub(crate) generation: u64,
    pub event: PlayerEvent,
}

/// Handed to each player on creation; events it sends are routed back to the
/// owning playback session.
#[derive(Debug, Clone)]
pub struct PlayerEventSender {
    generation: u64,
    tx: mpsc::UnboundedSender<TrackEvent>,
}

impl PlayerEventSender {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<TrackEvent>) -> Self {
        Self { generation, tx }
    }

    /// Deliver an event. Returns false once the session has been torn down.
    pub fn send(&self, event: PlayerEvent) -> bool {
        self.tx
            .send(TrackEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// One underlying audio source producing sound for a single track.
pub trait TrackPlayer: Send {
    fn play(&mut self) -> Result<(), CollageError>;

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    fn seek(&mut self, time_secs: f64);

    fn current_time(&self) -> f64;

    /// Output gain in [0.0, 1.0].
    fn set_volume(&mut self, gain: f32);

    /// Stop output and free the source. Must be idempotent.
    fn release(&mut self);
}

/// Creates players for track sources.
pub trait PlayerBackend: Send + Sync {
    type Player: TrackPlayer;

    fn create_player(
        &self,
        source: &SourceUrl,
        events: PlayerEventSender,
    ) -> Result<Self::Player, CollageError>;
}
