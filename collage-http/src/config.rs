use std::time::Duration;

use collage_core::CollageError;
use reqwest::Url;

/// Configuration for [`ApiClient`](crate::ApiClient).
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// Root every endpoint path is appended to, e.g. `https://tapes.example/api`.
    pub base_url: String,

    /// Per-request timeout, covering connect and body transfer (default: 30s).
    pub request_timeout: Duration,

    /// Size of the pieces an upload body is streamed in; progress is reported
    /// once per piece (default: 64 KiB).
    pub upload_chunk_size: usize,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), CollageError> {
        self.parsed_base_url()?;
        if self.request_timeout.is_zero() {
            return Err(CollageError::Configuration("request timeout must be non-zero".into()));
        }
        if self.upload_chunk_size == 0 {
            return Err(CollageError::Configuration("upload chunk size must be non-zero".into()));
        }
        Ok(())
    }

    pub(crate) fn parsed_base_url(&self) -> Result<Url, CollageError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| CollageError::Configuration(format!("invalid base url {:?}: {}", self.base_url, e)))?;
        match url.scheme() {
            "http" | "https" if !url.cannot_be_a_base() => Ok(url),
            _ => Err(CollageError::Configuration(format!(
                "base url must be http or https, got {:?}",
                self.base_url
            ))),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".into(),
            request_timeout: Duration::from_secs(30),
            upload_chunk_size: 64 * 1024,
        }
    }
}
