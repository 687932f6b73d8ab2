use tokio::sync::mpsc;

use crate::events::EventEmitter;
use crate::models::audio_models::SourceUrl;
use crate::models::config::{EndBehavior, PlaybackConfig};
use crate::models::contribution::AudioMessage;
use crate::models::error::CollageError;
use crate::models::task::{ProcessingTask, TaskStatus};
use crate::traits::player::{PlayerBackend, PlayerEvent, PlayerEventSender, TrackEvent, TrackPlayer};

/// One playable entry in a [`PlaybackSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub source: SourceUrl,
    /// Zero until the player reports metadata, if no duration was known up front.
    pub duration_secs: f64,
    /// Per-track gain in [0.0, 1.0], multiplied with the session volume.
    pub gain: f32,
    pub trim_start: f64,
    pub trim_end: Option<f64>,
}

impl Track {
    pub fn new(id: impl Into<String>, source: SourceUrl) -> Self {
        Self {
            id: id.into(),
            source,
            duration_secs: 0.0,
            gain: 1.0,
            trim_start: 0.0,
            trim_end: None,
        }
    }
}

impl From<&AudioMessage> for Track {
    fn from(message: &AudioMessage) -> Self {
        Self {
            id: message.id.clone(),
            source: message.audio_reference.clone(),
            duration_secs: message.duration_secs,
            gain: message.gain(),
            trim_start: message.trim_start,
            trim_end: message.trim_end,
        }
    }
}

/// Notifications published by a [`PlaybackSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    TrackChanged { index: usize },
    Playing { index: usize },
    Paused { index: usize },
    TimeUpdate { index: usize, time_secs: f64 },
    TrackEnded { index: usize },
    /// The last track ended and playback stopped.
    Finished,
    VolumeChanged(u8),
    Error { index: usize, message: String },
}

struct ActivePlayer<P> {
    index: usize,
    generation: u64,
    player: P,
    /// Set once an end has been handled, so a repeated end notification is ignored.
    ended: bool,
}

/// Coordinates playback across an ordered track list so that at most one
/// source is ever producing sound.
///
/// Only one player exists at a time. Switching tracks pauses and releases the
/// current player before the next one is created. Player notifications arrive
/// over a channel tagged with the player's generation; anything from a
/// released player is dropped. Call [`pump`](Self::pump) or
/// [`process_next_event`](Self::process_next_event) to apply them.
pub struct PlaybackSession<B: PlayerBackend> {
    backend: B,
    tracks: Vec<Track>,
    config: PlaybackConfig,
    current_index: usize,
    active: Option<ActivePlayer<B::Player>>,
    volume: u8,
    generation: u64,
    tx: mpsc::UnboundedSender<TrackEvent>,
    rx: mpsc::UnboundedReceiver<TrackEvent>,
    events: EventEmitter<PlaybackEvent>,
    torn_down: bool,
}

impl<B: PlayerBackend> PlaybackSession<B> {
    pub fn new(backend: B, tracks: Vec<Track>, config: PlaybackConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let volume = config.initial_volume.min(100);
        Self {
            backend,
            tracks,
            config,
            current_index: 0,
            active: None,
            volume,
            generation: 0,
            tx,
            rx,
            events: EventEmitter::new(),
            torn_down: false,
        }
    }

    /// Session over the contributions of a collection, in order.
    pub fn from_messages(backend: B, messages: &[AudioMessage], config: PlaybackConfig) -> Self {
        Self::new(backend, messages.iter().map(Track::from).collect(), config)
    }

    /// Single-track session over the combined artifact of a completed task.
    pub fn from_artifact(backend: B, task: &ProcessingTask, config: PlaybackConfig) -> Result<Self, CollageError> {
        let artifact = match (&task.status, &task.artifact) {
            (TaskStatus::Completed, Some(url)) => url.clone(),
            _ => {
                return Err(CollageError::InvalidState(format!(
                    "task {} has no artifact to play",
                    task.task_id
                )))
            }
        };
        let track = Track::new(format!("{}-collage", task.collection_id), artifact);
        Ok(Self::new(backend, vec![track], config))
    }

    pub fn events(&self) -> &EventEmitter<PlaybackEvent> {
        &self.events
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_playing(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.player.is_playing())
    }

    pub fn current_time(&self) -> f64 {
        self.active.as_ref().map_or(0.0, |a| a.player.current_time())
    }

    /// Duration of the current track, as far as it is known.
    pub fn duration_secs(&self) -> f64 {
        self.tracks
            .get(self.current_index)
            .map_or(0.0, |t| t.duration_secs)
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Start (or resume) the track at `index`, pausing whatever else is playing first.
    pub fn play(&mut self, index: usize) -> Result<(), CollageError> {
        self.ensure_live()?;
        if index >= self.tracks.len() {
            return Err(CollageError::InvalidState(format!(
                "track {} is out of range ({} tracks)",
                index,
                self.tracks.len()
            )));
        }

        let resumable = self.active.as_ref().is_some_and(|a| a.index == index);
        if !resumable {
            self.switch_to(index)?;
        }
        self.start_active()
    }

    pub fn pause(&mut self) {
        if let Some(active) = self.active.as_mut() {
            if active.player.is_playing() {
                active.player.pause();
                self.events.emit(&PlaybackEvent::Paused { index: active.index });
            }
        }
    }

    /// Move to the following track. Keeps playing if playback was active.
    /// Returns false at the end of the list.
    pub fn next(&mut self) -> Result<bool, CollageError> {
        self.ensure_live()?;
        if self.current_index + 1 >= self.tracks.len() {
            return Ok(false);
        }
        self.step_to(self.current_index + 1)?;
        Ok(true)
    }

    /// Move to the preceding track. Returns false at the start of the list.
    pub fn previous(&mut self) -> Result<bool, CollageError> {
        self.ensure_live()?;
        if self.current_index == 0 || self.tracks.is_empty() {
            return Ok(false);
        }
        self.step_to(self.current_index - 1)?;
        Ok(true)
    }

    /// Reposition the current track, clamped to [0, duration].
    pub fn seek(&mut self, time_secs: f64) {
        let duration = self.duration_secs();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let time = if time_secs.is_nan() { 0.0 } else { time_secs.max(0.0) };
        let time = if duration > 0.0 { time.min(duration) } else { time };
        active.player.seek(time);
        active.ended = false;
    }

    /// Set the session volume in percent. Out-of-range values clamp and the
    /// value carries over to later tracks.
    pub fn set_volume(&mut self, percent: i32) {
        self.volume = percent.clamp(0, 100) as u8;
        if let Some(active) = self.active.as_mut() {
            let gain = effective_gain(self.volume, &self.tracks[active.index]);
            active.player.set_volume(gain);
        }
        self.events.emit(&PlaybackEvent::VolumeChanged(self.volume));
    }

    /// Apply every player notification that has already arrived.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next player notification and apply it.
    pub async fn process_next_event(&mut self) {
        if let Some(event) = self.rx.recv().await {
            self.handle_event(event);
        }
    }

    /// Release the active player and drop every listener. Later calls do nothing.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.release_active();
        while self.rx.try_recv().is_ok() {}
        self.events.clear();
    }

    fn ensure_live(&self) -> Result<(), CollageError> {
        if self.torn_down {
            return Err(CollageError::InvalidState("playback session was torn down".into()));
        }
        Ok(())
    }

    fn step_to(&mut self, index: usize) -> Result<(), CollageError> {
        let was_playing = self.is_playing();
        self.switch_to(index)?;
        if was_playing {
            self.start_active()?;
        }
        Ok(())
    }

    fn release_active(&mut self) {
        if let Some(mut previous) = self.active.take() {
            if previous.player.is_playing() {
                previous.player.pause();
                self.events.emit(&PlaybackEvent::Paused { index: previous.index });
            }
            previous.player.release();
        }
    }

    /// Replace the active player with a fresh, paused one for `index`.
    fn switch_to(&mut self, index: usize) -> Result<(), CollageError> {
        self.release_active();
        self.current_index = index;
        self.generation += 1;

        let track = &self.tracks[index];
        let sender = PlayerEventSender::new(self.generation, self.tx.clone());
        let mut player = match self.backend.create_player(&track.source, sender) {
            Ok(player) => player,
            Err(e) => {
                log::warn!("could not open track {} ({}): {}", index, track.source, e);
                self.events.emit(&PlaybackEvent::Error {
                    index,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        player.set_volume(effective_gain(self.volume, track));
        if track.trim_start > 0.0 {
            player.seek(track.trim_start);
        }
        log::debug!("track {} loaded from {}", index, track.source);

        self.active = Some(ActivePlayer {
            index,
            generation: self.generation,
            player,
            ended: false,
        });
        self.events.emit(&PlaybackEvent::TrackChanged { index });
        Ok(())
    }

    fn start_active(&mut self) -> Result<(), CollageError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        if active.player.is_playing() {
            return Ok(());
        }
        if active.ended {
            let track = &self.tracks[active.index];
            active.player.seek(track.trim_start);
            active.ended = false;
        }
        active.player.play()?;
        self.events.emit(&PlaybackEvent::Playing { index: active.index });
        Ok(())
    }

    fn handle_event(&mut self, event: TrackEvent) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if self.torn_down || event.generation != active.generation {
            log::debug!("dropping {:?} from a released player", event.event);
            return;
        }
        let index = active.index;

        match event.event {
            PlayerEvent::Loaded { duration_secs } => {
                self.tracks[index].duration_secs = duration_secs;
            }
            PlayerEvent::TimeUpdate { time_secs } => {
                self.events.emit(&PlaybackEvent::TimeUpdate { index, time_secs });
                let past_trim = self.tracks[index].trim_end.is_some_and(|end| time_secs >= end);
                if past_trim {
                    self.on_track_ended();
                }
            }
            PlayerEvent::Ended => self.on_track_ended(),
            PlayerEvent::Error(message) => {
                log::warn!("track {} failed: {}", index, message);
                active.player.pause();
                self.events.emit(&PlaybackEvent::Error { index, message });
            }
        }
    }

    fn on_track_ended(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.ended {
            return;
        }
        active.ended = true;
        active.player.pause();
        let index = active.index;
        self.events.emit(&PlaybackEvent::TrackEnded { index });

        let next = if index + 1 < self.tracks.len() {
            Some(index + 1)
        } else {
            match self.config.end_behavior {
                EndBehavior::Stop => None,
                EndBehavior::LoopToStart => Some(0),
            }
        };

        match next {
            Some(next) => {
                let resumed = if next == index {
                    self.start_active()
                } else {
                    self.switch_to(next).and_then(|_| self.start_active())
                };
                if let Err(e) = resumed {
                    log::warn!("auto-advance to track {} failed: {}", next, e);
                }
            }
            None => {
                log::debug!("reached the end of {} tracks", self.tracks.len());
                self.events.emit(&PlaybackEvent::Finished);
            }
        }
    }
}

impl<B: PlayerBackend> Drop for PlaybackSession<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn effective_gain(volume: u8, track: &Track) -> f32 {
    (f32::from(volume) / 100.0 * track.gain).clamp(0.0, 1.0)
}
