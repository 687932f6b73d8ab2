use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Scheme prefix for URLs handed out by [`crate::storage::object_urls::ObjectUrls`].
pub const OBJECT_URL_SCHEME: &str = "blob:";

/// Location of a playable audio source: an object URL for a local blob, or a remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceUrl(String);

impl SourceUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this URL refers to an in-process blob rather than a remote resource.
    pub fn is_object_url(&self) -> bool {
        self.0.starts_with(OBJECT_URL_SCHEME)
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceUrl {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// How a capture device encodes the chunks it delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkEncoding {
    /// Raw little-endian 16-bit PCM; the session wraps the chunks in a WAV header.
    Pcm16 { sample_rate: u32, channels: u16 },
    /// Chunks are already pieces of a container stream and are concatenated as-is.
    Container,
}

/// A microphone (or file-backed) input available for capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub encoding: ChunkEncoding,
}

/// A finalized, playable recording.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlob {
    pub id: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub duration_secs: f64,
    /// Hex-encoded SHA-256 of `bytes`.
    pub checksum: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl AudioBlob {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, duration_secs: f64) -> Self {
        let checksum = hex_sha256(&bytes);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            bytes,
            mime_type: mime_type.into(),
            duration_secs,
            checksum,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File name used when the blob is uploaded as a form part.
    pub fn file_name(&self) -> String {
        let ext = match self.mime_type.as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/webm" => "webm",
            "audio/ogg" => "ogg",
            "audio/mpeg" => "mp3",
            _ => "bin",
        };
        format!("message.{}", ext)
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
