use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::events::EventEmitter;
use crate::models::audio_models::{AudioBlob, ChunkEncoding, SourceUrl};
use crate::models::config::CaptureConfig;
use crate::models::error::CollageError;
use crate::models::state::CaptureState;
use crate::processing::wav_format;
use crate::storage::object_urls::ObjectUrls;
use crate::traits::capture_device::{CaptureDevice, DeviceEvent};

type StopReply = oneshot::Sender<Result<Arc<AudioBlob>, CollageError>>;

/// A capture device plus the exclusive-use flag shared by every session that records from it.
pub struct Microphone<D: CaptureDevice> {
    device: Arc<D>,
    held: Arc<AtomicBool>,
}

impl<D: CaptureDevice> Clone for Microphone<D> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
            held: Arc::clone(&self.held),
        }
    }
}

impl<D: CaptureDevice> Microphone<D> {
    pub fn new(device: D) -> Self {
        Self {
            device: Arc::new(device),
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Whether some session currently holds the device.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    fn try_acquire(&self) -> Result<DeviceLease, CollageError> {
        self.held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CollageError::DeviceBusy)?;
        Ok(DeviceLease {
            held: Arc::clone(&self.held),
        })
    }
}

/// Exclusive hold on a microphone. Dropping it frees the device for other sessions.
struct DeviceLease {
    held: Arc<AtomicBool>,
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.held.store(false, Ordering::SeqCst);
    }
}

/// Notifications published by a [`CaptureSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    StateChanged(CaptureState),
    Finalized { duration_secs: f64, url: SourceUrl },
    Failed(CollageError),
}

/// Internal mutable session state, protected by `parking_lot::Mutex`.
struct SessionState {
    state: CaptureState,
    blob: Option<Arc<AudioBlob>>,
    blob_url: Option<SourceUrl>,
    last_error: Option<CollageError>,
    lease: Option<DeviceLease>,
    stop_tx: Option<oneshot::Sender<StopReply>>,
    task: Option<JoinHandle<()>>,
    /// Bumped on every start and teardown so stale loops can tell they were superseded.
    generation: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            blob: None,
            blob_url: None,
            last_error: None,
            lease: None,
            stop_tx: None,
            task: None,
            generation: 0,
        }
    }
}

/// Owns the microphone lifecycle for one recorder: permission, chunk
/// accumulation, and finalizing into a playable blob.
///
/// ```text
/// [CaptureDevice] → DeviceEvent::Chunk → [recording loop] → stop / auto-stop
///                                                 ↓
///                                  AudioBlob → ObjectUrls (blob: URL)
/// ```
///
/// Manual `stop()` and the auto-stop at `max_duration_secs` share one
/// finalization path: close the device, drain until it reports `Closed`, then
/// assemble the blob.
pub struct CaptureSession<D: CaptureDevice> {
    mic: Microphone<D>,
    config: CaptureConfig,
    urls: ObjectUrls,
    shared: Arc<Mutex<SessionState>>,
    events: EventEmitter<CaptureEvent>,
}

impl<D: CaptureDevice> CaptureSession<D> {
    pub fn new(mic: Microphone<D>, config: CaptureConfig, urls: ObjectUrls) -> Result<Self, CollageError> {
        config.validate()?;
        Ok(Self {
            mic,
            config,
            urls,
            shared: Arc::new(Mutex::new(SessionState::new())),
            events: EventEmitter::new(),
        })
    }

    pub fn events(&self) -> &EventEmitter<CaptureEvent> {
        &self.events
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        self.shared.lock().state
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.state().duration().unwrap_or(0.0)
    }

    /// The finalized recording, present only while `Stopped`.
    pub fn blob(&self) -> Option<Arc<AudioBlob>> {
        self.shared.lock().blob.clone()
    }

    /// Temporary URL of the finalized recording, present only while `Stopped`.
    pub fn blob_url(&self) -> Option<SourceUrl> {
        self.shared.lock().blob_url.clone()
    }

    /// Error that sent the session back to `Idle` most recently.
    pub fn last_error(&self) -> Option<CollageError> {
        self.shared.lock().last_error.clone()
    }

    /// Request access and begin recording. Transitions: idle → requesting_permission → recording.
    pub async fn start(&self) -> Result<(), CollageError> {
        let generation = {
            let mut s = self.shared.lock();
            if !s.state.is_idle() {
                return Err(CollageError::InvalidState(format!(
                    "cannot start recording while {}",
                    s.state.name()
                )));
            }
            s.lease = Some(self.mic.try_acquire()?);
            s.generation += 1;
            s.last_error = None;
            s.state = CaptureState::RequestingPermission;
            s.generation
        };
        self.events
            .emit(&CaptureEvent::StateChanged(CaptureState::RequestingPermission));

        if let Err(e) = self.mic.device.request_access().await {
            let e = access_error(e);
            log::debug!("capture permission refused: {}", e);
            self.abandon_start(generation, e.clone());
            return Err(e);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        {
            let mut s = self.shared.lock();
            if s.generation != generation {
                return Err(CollageError::InvalidState(
                    "session was torn down while requesting permission".into(),
                ));
            }
            if let Err(e) = self.mic.device.open(tx) {
                drop(s);
                let e = access_error(e);
                log::debug!("capture device unavailable: {}", e);
                self.abandon_start(generation, e.clone());
                return Err(e);
            }
            s.stop_tx = Some(stop_tx);
            s.state = CaptureState::Recording { elapsed_secs: 0.0 };
        }
        self.events
            .emit(&CaptureEvent::StateChanged(CaptureState::Recording { elapsed_secs: 0.0 }));
        log::info!(
            "recording started on {} (max {:.1}s)",
            self.mic.device.device_info().name,
            self.config.max_duration_secs
        );

        let recording = RecordingLoop {
            device: Arc::clone(&self.mic.device),
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
            urls: self.urls.clone(),
            config: self.config.clone(),
            generation,
            started: Instant::now(),
        };
        let handle = tokio::spawn(recording.run(rx, stop_rx));

        let mut s = self.shared.lock();
        if s.generation == generation {
            s.task = Some(handle);
        } else {
            handle.abort();
        }
        Ok(())
    }

    /// Stop recording and finalize the blob. Transitions: recording → stopped.
    ///
    /// Resolves only after the device's final buffered chunk has been collected.
    pub async fn stop(&self) -> Result<Arc<AudioBlob>, CollageError> {
        let stop_tx = {
            let mut s = self.shared.lock();
            if !s.state.is_recording() {
                return Err(CollageError::InvalidState(format!(
                    "cannot stop while {}",
                    s.state.name()
                )));
            }
            s.stop_tx
                .take()
                .ok_or_else(|| CollageError::InvalidState("stop already requested".into()))?
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if stop_tx.send(reply_tx).is_err() {
            return self.finished_result();
        }
        match reply_rx.await {
            Ok(result) => result,
            // The loop finished on its own (auto-stop or device failure) first.
            Err(_) => self.finished_result(),
        }
    }

    /// Discard the finalized blob and revoke its URL. Transitions: stopped → idle.
    pub fn reset(&self) -> Result<(), CollageError> {
        {
            let mut s = self.shared.lock();
            if !s.state.is_stopped() {
                return Err(CollageError::InvalidState(format!(
                    "cannot reset while {}",
                    s.state.name()
                )));
            }
            if let Some(url) = s.blob_url.take() {
                self.urls.revoke(&url);
            }
            s.blob = None;
            s.state = CaptureState::Idle;
        }
        self.events.emit(&CaptureEvent::StateChanged(CaptureState::Idle));
        Ok(())
    }

    /// Release everything the session holds, whatever its state. Safe to call repeatedly.
    ///
    /// An in-progress recording is discarded without producing a blob.
    pub fn teardown(&self) {
        let was_idle = {
            let mut s = self.shared.lock();
            let was_idle = s.state.is_idle() && s.lease.is_none();
            s.generation += 1;
            if let Some(task) = s.task.take() {
                task.abort();
            }
            s.stop_tx = None;
            if s.state.is_recording() {
                if let Err(e) = self.mic.device.close() {
                    log::warn!("failed to close capture device on teardown: {}", e);
                }
            }
            s.lease = None;
            if let Some(url) = s.blob_url.take() {
                self.urls.revoke(&url);
            }
            s.blob = None;
            s.state = CaptureState::Idle;
            was_idle
        };
        if !was_idle {
            self.events.emit(&CaptureEvent::StateChanged(CaptureState::Idle));
        }
        self.events.clear();
    }

    fn abandon_start(&self, generation: u64, error: CollageError) {
        {
            let mut s = self.shared.lock();
            if s.generation != generation {
                return;
            }
            s.lease = None;
            s.state = CaptureState::Idle;
            s.last_error = Some(error);
        }
        self.events.emit(&CaptureEvent::StateChanged(CaptureState::Idle));
    }

    fn finished_result(&self) -> Result<Arc<AudioBlob>, CollageError> {
        let s = self.shared.lock();
        match (&s.blob, &s.last_error) {
            (Some(blob), _) => Ok(Arc::clone(blob)),
            (None, Some(e)) => Err(e.clone()),
            (None, None) => Err(CollageError::InvalidState("recording was discarded".into())),
        }
    }
}

impl<D: CaptureDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

enum Finish {
    Manual(StopReply),
    AutoStop,
    DeviceFailed(String),
    Abandoned,
}

/// Everything the spawned recording task needs, moved in at start.
struct RecordingLoop<D: CaptureDevice> {
    device: Arc<D>,
    shared: Arc<Mutex<SessionState>>,
    events: EventEmitter<CaptureEvent>,
    urls: ObjectUrls,
    config: CaptureConfig,
    generation: u64,
    started: Instant,
}

impl<D: CaptureDevice> RecordingLoop<D> {
    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<DeviceEvent>,
        mut stop_rx: oneshot::Receiver<StopReply>,
    ) {
        let max = self.config.max_duration();
        let auto_stop = tokio::time::sleep_until(self.started + max);
        tokio::pin!(auto_stop);

        let tick = self.config.tick_interval;
        let mut ticker = tokio::time::interval_at(self.started + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let finish = loop {
            tokio::select! {
                biased;
                reply = &mut stop_rx => match reply {
                    Ok(reply) => break Finish::Manual(reply),
                    Err(_) => break Finish::Abandoned,
                },
                _ = &mut auto_stop => break Finish::AutoStop,
                event = rx.recv() => match event {
                    Some(DeviceEvent::Chunk(bytes)) => chunks.push(bytes),
                    Some(DeviceEvent::Failed(msg)) => break Finish::DeviceFailed(msg),
                    Some(DeviceEvent::Closed) | None => {
                        break Finish::DeviceFailed("device closed unexpectedly".into())
                    }
                },
                _ = ticker.tick() => self.publish_elapsed(),
            }
        };

        match finish {
            Finish::Manual(reply) => {
                let result = self.finalize(&mut rx, chunks).await;
                let _ = reply.send(result);
            }
            Finish::AutoStop => {
                log::debug!("max duration reached, auto-stopping");
                let _ = self.finalize(&mut rx, chunks).await;
            }
            Finish::DeviceFailed(msg) => {
                log::error!("capture device failed: {}", msg);
                let _ = self.device.close();
                self.fail(CollageError::Capture(msg));
            }
            Finish::Abandoned => {
                let _ = self.device.close();
            }
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .elapsed()
            .as_secs_f64()
            .min(self.config.max_duration_secs)
    }

    fn publish_elapsed(&self) {
        let state = {
            let mut s = self.shared.lock();
            if s.generation != self.generation || !s.state.is_recording() {
                return;
            }
            s.state = CaptureState::Recording {
                elapsed_secs: self.elapsed_secs(),
            };
            s.state
        };
        self.events.emit(&CaptureEvent::StateChanged(state));
    }

    /// Close the device, collect everything it still has buffered, and assemble the blob.
    async fn finalize(
        &self,
        rx: &mut mpsc::UnboundedReceiver<DeviceEvent>,
        mut chunks: Vec<Vec<u8>>,
    ) -> Result<Arc<AudioBlob>, CollageError> {
        let duration_secs = self.elapsed_secs();

        if let Err(e) = self.device.close() {
            log::warn!("capture device reported an error while closing: {}", e);
        }

        let flushed = tokio::time::timeout(self.config.flush_timeout, async {
            while let Some(event) = rx.recv().await {
                match event {
                    DeviceEvent::Chunk(bytes) => chunks.push(bytes),
                    DeviceEvent::Closed => return Ok(()),
                    DeviceEvent::Failed(msg) => return Err(msg),
                }
            }
            Ok(())
        })
        .await;

        match flushed {
            Ok(Ok(())) => {}
            Ok(Err(msg)) => {
                let e = CollageError::Capture(msg);
                self.fail(e.clone());
                return Err(e);
            }
            Err(_) => log::warn!(
                "capture device did not confirm close within {:?}; finalizing with {} chunks",
                self.config.flush_timeout,
                chunks.len()
            ),
        }

        if chunks.iter().all(|c| c.is_empty()) {
            let e = CollageError::Capture("no audio was captured".into());
            self.fail(e.clone());
            return Err(e);
        }

        let bytes = match self.device.device_info().encoding {
            ChunkEncoding::Pcm16 {
                sample_rate,
                channels,
            } => wav_format::wrap_pcm16(&chunks.concat(), sample_rate, channels),
            ChunkEncoding::Container => chunks.concat(),
        };
        let blob = Arc::new(AudioBlob::new(bytes, self.config.mime_type.clone(), duration_secs));

        let url = {
            let mut s = self.shared.lock();
            if s.generation != self.generation {
                return Err(CollageError::InvalidState("recording was discarded".into()));
            }
            let url = self.urls.create(Arc::clone(&blob));
            s.lease = None;
            s.stop_tx = None;
            s.task = None;
            s.blob = Some(Arc::clone(&blob));
            s.blob_url = Some(url.clone());
            s.state = CaptureState::Stopped { duration_secs };
            url
        };

        log::info!(
            "recording finalized: {:.2}s, {} bytes",
            duration_secs,
            blob.len()
        );
        self.events
            .emit(&CaptureEvent::StateChanged(CaptureState::Stopped { duration_secs }));
        self.events.emit(&CaptureEvent::Finalized { duration_secs, url });
        Ok(blob)
    }

    fn fail(&self, error: CollageError) {
        {
            let mut s = self.shared.lock();
            if s.generation != self.generation {
                return;
            }
            s.lease = None;
            s.stop_tx = None;
            s.task = None;
            s.state = CaptureState::Idle;
            s.last_error = Some(error.clone());
        }
        self.events.emit(&CaptureEvent::StateChanged(CaptureState::Idle));
        self.events.emit(&CaptureEvent::Failed(error));
    }
}

/// A device that cannot be reached is reported the same way as a refused prompt.
fn access_error(e: CollageError) -> CollageError {
    match e {
        CollageError::PermissionDenied(_) => e,
        other => CollageError::PermissionDenied(other.to_string()),
    }
}
