use std::sync::Arc;

use async_trait::async_trait;

use crate::models::audio_models::{AudioBlob, SourceUrl};
use crate::models::contribution::{AudioMessage, Collection, ContributorMetadata};
use crate::models::error::CollageError;
use crate::models::task::{StatusReport, TaskId};

/// Callback invoked with transfer progress in percent (0–100).
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync + 'static>;

/// Everything the storage service needs to create one contribution.
#[derive(Debug, Clone)]
pub struct ContributionUpload {
    pub collection_id: String,
    pub metadata: ContributorMetadata,
    pub blob: Arc<AudioBlob>,
}

/// Accepts uploaded audio plus metadata and returns the created record.
///
/// Implementations map transport failures to `Network` and missing or
/// conflicting collections to `NotFound`.
#[async_trait]
pub trait ContributionStore: Send + Sync {
    async fn store_contribution(
        &self,
        upload: &ContributionUpload,
        progress: ProgressCallback,
    ) -> Result<AudioMessage, CollageError>;
}

/// Returns a collection and its ordered contributions.
#[async_trait]
pub trait CollectionService: Send + Sync {
    async fn fetch_collection(&self, collection_id: &str) -> Result<Collection, CollageError>;
}

/// Server-side combination of all contributions in a collection.
#[async_trait]
pub trait ProcessingService: Send + Sync {
    /// Ask the service to begin combining `collection_id`.
    async fn start_processing(&self, collection_id: &str) -> Result<TaskId, CollageError>;

    /// Current status of `task_id`.
    async fn task_status(&self, task_id: &TaskId) -> Result<StatusReport, CollageError>;

    /// Revoke a running task.
    async fn cancel_task(&self, task_id: &TaskId) -> Result<(), CollageError>;

    /// URL the combined artifact is served from once processing completes.
    fn artifact_url(&self, collection_id: &str) -> SourceUrl;

    /// Download the combined artifact.
    async fn fetch_artifact(&self, collection_id: &str) -> Result<Vec<u8>, CollageError>;
}

/// Retrieves the bytes behind a remote [`SourceUrl`].
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch_source(&self, url: &SourceUrl) -> Result<Vec<u8>, CollageError>;
}
