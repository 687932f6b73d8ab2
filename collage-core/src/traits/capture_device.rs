use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::audio_models::DeviceInfo;
use crate::models::error::CollageError;

/// Events a capture device delivers while open.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The next encoded chunk, in capture order.
    Chunk(Vec<u8>),
    /// The device failed (e.g. disconnected). No further chunks follow.
    Failed(String),
    /// All buffered data has been delivered after `close()`.
    Closed,
}

/// Sending half handed to a device on `open`.
pub type ChunkSender = mpsc::UnboundedSender<DeviceEvent>;

/// Interface for microphone or file-backed capture sources.
///
/// Devices deliver chunks at their natural cadence through the sender passed
/// to `open`. Closing must flush any buffered chunk and then emit
/// [`DeviceEvent::Closed`].
#[async_trait]
pub trait CaptureDevice: Send + Sync + 'static {
    /// Ask the user (or platform) for access. Fails with `PermissionDenied`
    /// if declined or the device is unavailable.
    async fn request_access(&self) -> Result<(), CollageError>;

    /// Start delivering events into `sink`.
    fn open(&self, sink: ChunkSender) -> Result<(), CollageError>;

    /// Stop capturing, flush the pending chunk, then emit `Closed`.
    fn close(&self) -> Result<(), CollageError>;

    /// Information about the device backing this source.
    fn device_info(&self) -> DeviceInfo;
}
