//! In-memory collaborators shared by the unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::events::EventEmitter;
use crate::models::audio_models::{ChunkEncoding, DeviceInfo, SourceUrl};
use crate::models::contribution::{sample_message, AudioMessage, Collection};
use crate::models::error::CollageError;
use crate::models::task::{StatusReport, TaskId};
use crate::traits::capture_device::{CaptureDevice, ChunkSender, DeviceEvent};
use crate::traits::player::{PlayerBackend, PlayerEventSender, TrackPlayer};
use crate::traits::renderer::{RenderHandle, WaveformEvent, WaveformRenderer, WaveformSummary};
use crate::traits::services::{
    CollectionService, ContributionStore, ContributionUpload, ProcessingService, ProgressCallback,
};

// ---------------------------------------------------------------------------
// Capture device
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DeviceState {
    sink: Option<ChunkSender>,
    deny: bool,
    open_error: Option<String>,
    on_close: Vec<Vec<u8>>,
    opens: usize,
    closes: usize,
}

/// Microphone stand-in. Tests push chunks by hand; `close` flushes whatever
/// was staged with `buffer_on_close` and then reports `Closed`.
pub(crate) struct FakeDevice {
    encoding: ChunkEncoding,
    state: Mutex<DeviceState>,
}

impl FakeDevice {
    pub(crate) fn container() -> Self {
        Self {
            encoding: ChunkEncoding::Container,
            state: Mutex::new(DeviceState::default()),
        }
    }

    pub(crate) fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            encoding: ChunkEncoding::Pcm16 {
                sample_rate,
                channels,
            },
            state: Mutex::new(DeviceState::default()),
        }
    }

    pub(crate) fn deny_access(&self) {
        self.state.lock().deny = true;
    }

    /// `open` fails with a capture error after access was granted.
    pub(crate) fn fail_open(&self, message: &str) {
        self.state.lock().open_error = Some(message.to_string());
    }

    pub(crate) fn push_chunk(&self, bytes: &[u8]) {
        if let Some(sink) = &self.state.lock().sink {
            let _ = sink.send(DeviceEvent::Chunk(bytes.to_vec()));
        }
    }

    pub(crate) fn buffer_on_close(&self, bytes: &[u8]) {
        self.state.lock().on_close.push(bytes.to_vec());
    }

    pub(crate) fn disconnect(&self, message: &str) {
        if let Some(sink) = self.state.lock().sink.take() {
            let _ = sink.send(DeviceEvent::Failed(message.to_string()));
        }
    }

    pub(crate) fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    pub(crate) fn close_count(&self) -> usize {
        self.state.lock().closes
    }
}

#[async_trait]
impl CaptureDevice for FakeDevice {
    async fn request_access(&self) -> Result<(), CollageError> {
        if self.state.lock().deny {
            return Err(CollageError::PermissionDenied("user declined".into()));
        }
        Ok(())
    }

    fn open(&self, sink: ChunkSender) -> Result<(), CollageError> {
        let mut s = self.state.lock();
        s.opens += 1;
        if let Some(message) = &s.open_error {
            return Err(CollageError::Capture(message.clone()));
        }
        s.sink = Some(sink);
        Ok(())
    }

    fn close(&self) -> Result<(), CollageError> {
        let mut s = self.state.lock();
        s.closes += 1;
        let pending = std::mem::take(&mut s.on_close);
        if let Some(sink) = s.sink.take() {
            for chunk in pending {
                let _ = sink.send(DeviceEvent::Chunk(chunk));
            }
            let _ = sink.send(DeviceEvent::Closed);
        }
        Ok(())
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            id: "fake-mic".into(),
            name: "Fake microphone".into(),
            is_default: true,
            encoding: self.encoding,
        }
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    calls: usize,
    progress: Vec<u8>,
    failure: Option<CollageError>,
}

#[derive(Default)]
pub(crate) struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    /// Progress values reported to the callback during each upload.
    pub(crate) fn script_progress(&self, values: Vec<u8>) {
        self.state.lock().progress = values;
    }

    pub(crate) fn fail_with(&self, error: CollageError) {
        self.state.lock().failure = Some(error);
    }

    pub(crate) fn calls(&self) -> usize {
        self.state.lock().calls
    }
}

#[async_trait]
impl ContributionStore for FakeStore {
    async fn store_contribution(
        &self,
        upload: &ContributionUpload,
        progress: ProgressCallback,
    ) -> Result<AudioMessage, CollageError> {
        let (calls, script, failure) = {
            let mut s = self.state.lock();
            s.calls += 1;
            (s.calls, s.progress.clone(), s.failure.clone())
        };
        for value in script {
            progress(value);
        }
        if let Some(e) = failure {
            return Err(e);
        }

        let id = format!("msg-{}", calls);
        Ok(AudioMessage {
            id: id.clone(),
            contributor_name: upload.metadata.name.clone(),
            contributor_email: upload.metadata.email.clone(),
            contributor_phone: upload.metadata.phone.clone(),
            audio_reference: SourceUrl::new(format!("/api/audio/{}", id)),
            duration_secs: upload.blob.duration_secs,
            volume_percent: 100,
            trim_start: 0.0,
            trim_end: None,
            created_at: Some(upload.blob.created_at),
        })
    }
}

pub(crate) struct FakeCollections {
    collection: Collection,
    delay: Option<Duration>,
}

impl FakeCollections {
    pub(crate) fn with_messages(id: &str, count: usize) -> Self {
        let messages = (0..count)
            .map(|i| sample_message(&format!("m{}", i), 5.0))
            .collect();
        Self {
            collection: Collection {
                id: id.to_string(),
                title: "Birthday tape".into(),
                description: None,
                messages,
            },
            delay: None,
        }
    }

    /// Every fetch waits `delay` before answering.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl CollectionService for FakeCollections {
    async fn fetch_collection(&self, collection_id: &str) -> Result<Collection, CollageError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if collection_id != self.collection.id {
            return Err(CollageError::NotFound(collection_id.to_string()));
        }
        Ok(self.collection.clone())
    }
}

struct ProcessingState {
    script: VecDeque<Result<StatusReport, CollageError>>,
    poll_times: Vec<Instant>,
    starts: usize,
    cancels: usize,
}

/// Answers status requests from a script. Once a single answer remains it is
/// repeated indefinitely.
pub(crate) struct FakeProcessing {
    origin: Instant,
    delay: Option<Duration>,
    state: Mutex<ProcessingState>,
}

impl FakeProcessing {
    pub(crate) fn scripted(answers: Vec<Result<StatusReport, CollageError>>) -> Self {
        Self {
            origin: Instant::now(),
            delay: None,
            state: Mutex::new(ProcessingState {
                script: answers.into(),
                poll_times: Vec::new(),
                starts: 0,
                cancels: 0,
            }),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn poll_count(&self) -> usize {
        self.state.lock().poll_times.len()
    }

    pub(crate) fn poll_offsets(&self) -> Vec<Duration> {
        self.state
            .lock()
            .poll_times
            .iter()
            .map(|t| t.duration_since(self.origin))
            .collect()
    }

    pub(crate) fn start_count(&self) -> usize {
        self.state.lock().starts
    }

    pub(crate) fn cancel_count(&self) -> usize {
        self.state.lock().cancels
    }
}

#[async_trait]
impl ProcessingService for FakeProcessing {
    async fn start_processing(&self, _collection_id: &str) -> Result<TaskId, CollageError> {
        let mut s = self.state.lock();
        s.starts += 1;
        Ok(TaskId::new(format!("task-{}", s.starts)))
    }

    async fn task_status(&self, _task_id: &TaskId) -> Result<StatusReport, CollageError> {
        let answer = {
            let mut s = self.state.lock();
            s.poll_times.push(Instant::now());
            if s.script.len() > 1 {
                s.script.pop_front()
            } else {
                s.script.front().cloned()
            }
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        answer.unwrap_or_else(|| Err(CollageError::NotFound("no scripted status".into())))
    }

    async fn cancel_task(&self, _task_id: &TaskId) -> Result<(), CollageError> {
        self.state.lock().cancels += 1;
        Ok(())
    }

    fn artifact_url(&self, collection_id: &str) -> SourceUrl {
        SourceUrl::new(format!("https://tapes.example/collections/{}/artifact", collection_id))
    }

    async fn fetch_artifact(&self, _collection_id: &str) -> Result<Vec<u8>, CollageError> {
        Ok(b"collage".to_vec())
    }
}

// ---------------------------------------------------------------------------
// Waveform renderer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RenderStats {
    created: usize,
    destroyed: usize,
    failing: HashSet<String>,
}

/// Read side of a [`FakeRenderer`], usable after the renderer moved into a view.
#[derive(Clone, Default)]
pub(crate) struct RenderTally(Arc<Mutex<RenderStats>>);

impl RenderTally {
    pub(crate) fn created(&self) -> usize {
        self.0.lock().created
    }

    pub(crate) fn destroyed(&self) -> usize {
        self.0.lock().destroyed
    }

    pub(crate) fn live(&self) -> usize {
        let s = self.0.lock();
        s.created - s.destroyed
    }
}

pub(crate) struct FakeRenderer {
    duration_secs: f64,
    tally: RenderTally,
}

impl FakeRenderer {
    pub(crate) fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            tally: RenderTally::default(),
        }
    }

    pub(crate) fn tally(&self) -> RenderTally {
        self.tally.clone()
    }

    /// Handles created for `source` fail to decode.
    pub(crate) fn fail_source(&self, source: &str) {
        self.tally.0.lock().failing.insert(source.to_string());
    }
}

pub(crate) struct FakeHandle {
    source: SourceUrl,
    duration_secs: f64,
    position_secs: f64,
    playing: bool,
    destroyed: bool,
    tally: RenderTally,
}

impl WaveformRenderer for FakeRenderer {
    type Handle = FakeHandle;

    fn create(&self, source: &SourceUrl, _events: EventEmitter<WaveformEvent>) -> FakeHandle {
        self.tally.0.lock().created += 1;
        FakeHandle {
            source: source.clone(),
            duration_secs: self.duration_secs,
            position_secs: 0.0,
            playing: false,
            destroyed: false,
            tally: self.tally.clone(),
        }
    }
}

#[async_trait]
impl RenderHandle for FakeHandle {
    async fn ready(&mut self) -> Result<WaveformSummary, CollageError> {
        if self.tally.0.lock().failing.contains(self.source.as_str()) {
            return Err(CollageError::Decode("corrupt source".into()));
        }
        Ok(WaveformSummary {
            duration_secs: self.duration_secs,
            peaks: vec![0.5; 8],
        })
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn seek_to(&mut self, ratio: f64) {
        self.position_secs = ratio * self.duration_secs;
    }

    fn position_secs(&self) -> f64 {
        self.position_secs
    }

    fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.playing = false;
            self.tally.0.lock().destroyed += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Player backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PlaybackLog {
    log: Vec<String>,
    senders: Vec<(String, PlayerEventSender)>,
    playing: usize,
    max_playing: usize,
    created: usize,
    released: usize,
    volumes: Vec<f32>,
}

/// Read side of a [`FakeBackend`].
#[derive(Clone, Default)]
pub(crate) struct PlaybackTally(Arc<Mutex<PlaybackLog>>);

impl PlaybackTally {
    pub(crate) fn log(&self) -> Vec<String> {
        self.0.lock().log.clone()
    }

    /// Event sender of the most recent player created for `name`.
    pub(crate) fn sender(&self, name: &str) -> PlayerEventSender {
        self.0
            .lock()
            .senders
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.clone())
            .expect("no player was created for that track")
    }

    pub(crate) fn playing(&self) -> usize {
        self.0.lock().playing
    }

    /// Most players ever playing at the same time.
    pub(crate) fn max_concurrent(&self) -> usize {
        self.0.lock().max_playing
    }

    pub(crate) fn created(&self) -> usize {
        self.0.lock().created
    }

    pub(crate) fn released(&self) -> usize {
        self.0.lock().released
    }

    pub(crate) fn last_volume(&self) -> Option<f32> {
        self.0.lock().volumes.last().copied()
    }
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    tally: PlaybackTally,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn tally(&self) -> PlaybackTally {
        self.tally.clone()
    }
}

/// Names a player after the last path segment of its source.
fn track_name(source: &SourceUrl) -> String {
    source
        .as_str()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

impl PlayerBackend for FakeBackend {
    type Player = FakePlayer;

    fn create_player(
        &self,
        source: &SourceUrl,
        events: PlayerEventSender,
    ) -> Result<FakePlayer, CollageError> {
        let name = track_name(source);
        let mut log = self.tally.0.lock();
        log.created += 1;
        log.log.push(format!("create {}", name));
        log.senders.push((name.clone(), events));
        Ok(FakePlayer {
            name,
            time_secs: 0.0,
            playing: false,
            released: false,
            tally: self.tally.clone(),
        })
    }
}

pub(crate) struct FakePlayer {
    name: String,
    time_secs: f64,
    playing: bool,
    released: bool,
    tally: PlaybackTally,
}

impl TrackPlayer for FakePlayer {
    fn play(&mut self) -> Result<(), CollageError> {
        if self.released {
            return Err(CollageError::InvalidState("player was released".into()));
        }
        if !self.playing {
            self.playing = true;
            let mut log = self.tally.0.lock();
            log.playing += 1;
            log.max_playing = log.max_playing.max(log.playing);
            log.log.push(format!("play {}", self.name));
        }
        Ok(())
    }

    fn pause(&mut self) {
        if self.playing {
            self.playing = false;
            let mut log = self.tally.0.lock();
            log.playing -= 1;
            log.log.push(format!("pause {}", self.name));
        }
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn seek(&mut self, time_secs: f64) {
        self.time_secs = time_secs;
    }

    fn current_time(&self) -> f64 {
        self.time_secs
    }

    fn set_volume(&mut self, gain: f32) {
        self.tally.0.lock().volumes.push(gain);
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        let mut log = self.tally.0.lock();
        if self.playing {
            self.playing = false;
            log.playing -= 1;
        }
        self.released = true;
        log.released += 1;
        log.log.push(format!("release {}", self.name));
    }
}
