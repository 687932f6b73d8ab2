use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use collage_core::{
    AudioMessage, CollageError, Collection, CollectionService, ContributionStore, ContributionUpload,
    ProcessingService, ProgressCallback, SourceFetcher, SourceUrl, StatusReport, TaskId,
};
use futures_util::stream::{self, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method, RequestBuilder, Response, StatusCode, Url};

use crate::auth::AuthSession;
use crate::config::HttpConfig;
use crate::wire::{ErrorBody, TaskCreated, TaskStatusBody};

/// Map a non-success HTTP status to the error a caller acts on.
pub fn error_for_status(status: StatusCode, detail: String) -> CollageError {
    match status.as_u16() {
        401 | 403 => CollageError::PermissionDenied(detail),
        404 | 409 => CollageError::NotFound(detail),
        400 | 422 => CollageError::Rejected(detail),
        code if code >= 500 => CollageError::Network(format!("server error {}: {}", code, detail)),
        code => CollageError::Network(format!("unexpected status {}: {}", code, detail)),
    }
}

fn transport(e: reqwest::Error) -> CollageError {
    CollageError::Network(e.to_string())
}

/// reqwest-backed implementation of every collaborator service.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    config: HttpConfig,
    auth: Arc<AuthSession>,
}

impl ApiClient {
    pub fn new(config: HttpConfig, auth: Arc<AuthSession>) -> Result<Self, CollageError> {
        config.validate()?;
        let base = config.parsed_base_url()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CollageError::Configuration(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            http,
            base,
            config,
            auth,
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    pub fn auth(&self) -> &Arc<AuthSession> {
        &self.auth
    }

    /// Succeeds if the service answers its health endpoint.
    pub async fn health(&self) -> Result<(), CollageError> {
        let url = self.endpoint(&["health"])?;
        self.send(self.request(Method::GET, url)).await?;
        Ok(())
    }

    /// Turn a stored audio reference into an absolute URL. Absolute and
    /// `blob:` references pass through unchanged.
    pub fn resolve_source(&self, reference: &SourceUrl) -> Result<Url, CollageError> {
        if let Ok(url) = Url::parse(reference.as_str()) {
            return Ok(url);
        }
        let path = reference.as_str().trim_start_matches('/');
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        // References carry the service prefix already, e.g. `/api/audio/{id}`.
        let mut url = self.origin();
        url.path_segments_mut()
            .map_err(|_| CollageError::Configuration("base url cannot carry a path".into()))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    fn origin(&self) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CollageError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| CollageError::Configuration("base url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        log::debug!("{} {}", method, url);
        let builder = self.http.request(method, url);
        match self.auth.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, CollageError> {
        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message())
            .unwrap_or(body);
        let detail = if detail.is_empty() {
            status.canonical_reason().unwrap_or("no detail").to_string()
        } else {
            detail
        };
        log::warn!("request failed with {}: {}", status, detail);
        Err(error_for_status(status, detail))
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, CollageError> {
        response
            .json::<T>()
            .await
            .map_err(|e| CollageError::Network(format!("malformed response body: {}", e)))
    }

    /// Stream `upload`'s bytes as one multipart part, reporting progress as
    /// each piece is handed to the transport.
    fn audio_part(&self, upload: &ContributionUpload, progress: ProgressCallback) -> Result<Part, CollageError> {
        let blob = Arc::clone(&upload.blob);
        let total = blob.len();
        let piece = self.config.upload_chunk_size;
        let pieces = total.div_ceil(piece);
        let sent = Arc::new(AtomicUsize::new(0));

        let file_name = blob.file_name();
        let mime_type = blob.mime_type.clone();
        let body = stream::iter(0..pieces).map(move |i| {
            let start = i * piece;
            let end = (start + piece).min(total);
            let bytes = blob.bytes[start..end].to_vec();
            let done = sent.fetch_add(bytes.len(), Ordering::SeqCst) + bytes.len();
            progress((done * 100 / total.max(1)) as u8);
            Ok::<_, std::io::Error>(bytes)
        });

        Part::stream_with_length(Body::wrap_stream(body), total as u64)
            .file_name(file_name)
            .mime_str(&mime_type)
            .map_err(|e| CollageError::InvalidAudio(format!("invalid audio mime type {:?}: {}", mime_type, e)))
    }
}

#[async_trait]
impl ContributionStore for ApiClient {
    async fn store_contribution(
        &self,
        upload: &ContributionUpload,
        progress: ProgressCallback,
    ) -> Result<AudioMessage, CollageError> {
        let meta = &upload.metadata;
        let mut form = Form::new()
            .text("collection_id", upload.collection_id.clone())
            .text("contributor_name", meta.name.clone())
            .text("contributor_email", meta.email.clone());
        if let Some(phone) = &meta.phone {
            form = form.text("contributor_phone", phone.clone());
        }
        form = form.part("audio_file", self.audio_part(upload, progress)?);

        let url = self.endpoint(&["contributions"])?;
        let response = self
            .send(self.request(Method::POST, url).multipart(form))
            .await?;
        let message: AudioMessage = Self::json(response).await?;
        log::info!("stored contribution {} ({} bytes)", message.id, upload.blob.len());
        Ok(message)
    }
}

#[async_trait]
impl CollectionService for ApiClient {
    async fn fetch_collection(&self, collection_id: &str) -> Result<Collection, CollageError> {
        let url = self.endpoint(&["collections", collection_id])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        Self::json(response).await
    }
}

#[async_trait]
impl ProcessingService for ApiClient {
    async fn start_processing(&self, collection_id: &str) -> Result<TaskId, CollageError> {
        let url = self.endpoint(&["collections", collection_id, "process"])?;
        let response = self.send(self.request(Method::POST, url)).await?;
        let created: TaskCreated = Self::json(response).await?;
        Ok(created.task_id)
    }

    async fn task_status(&self, task_id: &TaskId) -> Result<StatusReport, CollageError> {
        let url = self.endpoint(&["tasks", task_id.as_str()])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let body: TaskStatusBody = Self::json(response).await?;
        Ok(body.into())
    }

    async fn cancel_task(&self, task_id: &TaskId) -> Result<(), CollageError> {
        let url = self.endpoint(&["tasks", task_id.as_str()])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    fn artifact_url(&self, collection_id: &str) -> SourceUrl {
        match self.endpoint(&["collections", collection_id, "artifact"]) {
            Ok(url) => SourceUrl::new(url.to_string()),
            Err(_) => SourceUrl::new(format!(
                "{}/collections/{}/artifact",
                self.config.base_url.trim_end_matches('/'),
                collection_id
            )),
        }
    }

    async fn fetch_artifact(&self, collection_id: &str) -> Result<Vec<u8>, CollageError> {
        let url = self.endpoint(&["collections", collection_id, "artifact"])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SourceFetcher for ApiClient {
    async fn fetch_source(&self, source: &SourceUrl) -> Result<Vec<u8>, CollageError> {
        if source.is_object_url() {
            return Err(CollageError::InvalidState(format!(
                "{} is local and cannot be fetched over http",
                source
            )));
        }
        let url = self.resolve_source(source)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}
