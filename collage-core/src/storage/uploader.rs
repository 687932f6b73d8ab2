use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::models::audio_models::AudioBlob;
use crate::models::contribution::{AudioMessage, ContributorMetadata};
use crate::models::error::CollageError;
use crate::processing::wav_format;
use crate::traits::services::{ContributionStore, ContributionUpload, ProgressCallback};

/// Forwards only values above the last one reported, capped at 100.
struct ProgressTracker {
    last: AtomicU8,
    callback: ProgressCallback,
}

impl ProgressTracker {
    fn new(callback: ProgressCallback) -> Self {
        Self {
            last: AtomicU8::new(0),
            callback,
        }
    }

    fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            (self.callback)(percent);
        }
    }
}

/// Packages a finalized recording with contributor details and submits it.
pub struct ContributionUploader<S: ContributionStore> {
    store: Arc<S>,
}

impl<S: ContributionStore> Clone for ContributionUploader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ContributionStore + 'static> ContributionUploader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Validate, upload, and return the record the storage service created.
    ///
    /// `on_progress` sees 0 first, then non-decreasing values, and 100 only on
    /// success. Validation failures return before any request is made.
    pub async fn submit<F>(
        &self,
        collection_id: &str,
        blob: Arc<AudioBlob>,
        metadata: &ContributorMetadata,
        on_progress: F,
    ) -> Result<AudioMessage, CollageError>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        metadata.validate()?;
        if collection_id.trim().is_empty() {
            return Err(CollageError::NotFound("collection id is required".into()));
        }
        if blob.is_empty() {
            return Err(CollageError::InvalidAudio("recording is empty".into()));
        }

        on_progress(0);
        let tracker = Arc::new(ProgressTracker::new(Arc::new(on_progress)));
        let forward = Arc::clone(&tracker);
        // 100 is reserved for a confirmed store.
        let progress: ProgressCallback = Arc::new(move |p| forward.report(p.min(99)));

        let upload = ContributionUpload {
            collection_id: collection_id.to_string(),
            metadata: metadata.normalized(),
            blob,
        };

        log::debug!(
            "uploading {} bytes to collection {}",
            upload.blob.len(),
            upload.collection_id
        );
        match self.store.store_contribution(&upload, progress).await {
            Ok(message) => {
                tracker.report(100);
                log::info!("contribution {} stored in {}", message.id, upload.collection_id);
                Ok(message)
            }
            Err(e) => {
                log::warn!("upload to {} failed: {}", upload.collection_id, e);
                Err(e)
            }
        }
    }
}

/// Read a local audio file into a blob ready for [`ContributionUploader::submit`].
///
/// Duration is read from the header for PCM WAV files and left at zero otherwise.
pub async fn load_local_file(path: &Path) -> Result<AudioBlob, CollageError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CollageError::InvalidAudio(format!("cannot read {}: {}", path.display(), e)))?;

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "webm" => "audio/webm",
        "m4a" => "audio/mp4",
        other => {
            return Err(CollageError::InvalidAudio(format!(
                "{} is not a supported audio file type",
                if other.is_empty() { "(none)" } else { other }
            )))
        }
    };

    let duration_secs = wav_format::parse_wav(&bytes)
        .map(|info| info.duration_secs())
        .unwrap_or(0.0);
    Ok(AudioBlob::new(bytes, mime, duration_secs))
}
