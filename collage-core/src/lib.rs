//! # collage-core
//!
//! Platform-agnostic core for collecting voice contributions into a shared
//! collection and playing back the combined result.
//!
//! Provides microphone capture with exclusive device leasing, waveform
//! rendering, validated uploads, processing-task polling, and single-active
//! playback. Storage, processing, audio devices and players are collaborators
//! behind traits; `collage-http` implements the service traits over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! collage-core (this crate)
//! ├── traits/       ← CaptureDevice, ContributionStore, CollectionService, ProcessingService,
//! │                   SourceFetcher, WaveformRenderer/RenderHandle, PlayerBackend/TrackPlayer
//! ├── models/       ← CollageError, CaptureState, configs, AudioBlob, AudioMessage, ProcessingTask
//! ├── processing/   ← WAV header generation and parsing, level metering
//! ├── session/      ← CaptureSession, PlaybackSession
//! ├── waveform/     ← WaveformView, PeakRenderer
//! ├── storage/      ← ContributionUploader, ObjectUrls
//! ├── tasks/        ← TaskMonitor
//! └── events        ← EventEmitter
//! ```

pub mod events;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod tasks;
pub mod traits;
pub mod waveform;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at crate root for convenience.
pub use events::{EventEmitter, SubscriptionId};
pub use models::audio_models::{AudioBlob, ChunkEncoding, DeviceInfo, SourceUrl};
pub use models::config::{CaptureConfig, EndBehavior, MonitorConfig, PlaybackConfig, WaveformConfig};
pub use models::contribution::{AudioMessage, Collection, ContributorMetadata};
pub use models::error::CollageError;
pub use models::state::CaptureState;
pub use models::task::{ProcessingTask, StatusReport, TaskId, TaskProgress, TaskStatus};
pub use session::capture::{CaptureEvent, CaptureSession, Microphone};
pub use session::playback::{PlaybackEvent, PlaybackSession, Track};
pub use storage::object_urls::ObjectUrls;
pub use storage::uploader::{load_local_file, ContributionUploader};
pub use tasks::monitor::{MonitorEvent, TaskMonitor};
pub use traits::capture_device::{CaptureDevice, ChunkSender, DeviceEvent};
pub use traits::player::{PlayerBackend, PlayerEvent, PlayerEventSender, TrackPlayer};
pub use traits::renderer::{RenderHandle, WaveformEvent, WaveformRenderer, WaveformSummary};
pub use traits::services::{
    CollectionService, ContributionStore, ContributionUpload, ProcessingService, ProgressCallback,
    SourceFetcher,
};
pub use waveform::peaks::{PeakHandle, PeakRenderer};
pub use waveform::view::WaveformView;
