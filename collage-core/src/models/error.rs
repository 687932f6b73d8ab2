use thiserror::Error;

/// Errors surfaced by capture, waveform, upload, processing and playback operations.
///
/// Each kind maps to its own user-facing message via [`CollageError::user_message`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollageError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("microphone is held by another capture session")]
    DeviceBusy,

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("decode failed: {0}")]
    Decode(String),

    /// Required contributor fields are missing.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The audio offered for upload is empty, unreadable or of an unsupported type.
    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    /// Volume or trim settings outside what the message allows.
    #[error("invalid edit: {0}")]
    InvalidEdit(String),

    /// The service refused the request as malformed (HTTP 400/422).
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("collection {0} has no contributions")]
    EmptyCollection(String),

    #[error("processing did not finish after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error("processing failed: {0}")]
    Processing(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration failed: {0}")]
    Configuration(String),
}

impl CollageError {
    /// Message suitable for showing to the person operating the UI.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => {
                "Microphone access is required. Allow access in your browser or system settings and try again."
            }
            Self::DeviceBusy => "The microphone is already in use by another recording. Stop it first.",
            Self::Capture(_) => "Recording stopped because the microphone became unavailable. Please record again.",
            Self::Decode(_) => "This audio could not be loaded for preview.",
            Self::Validation(_) => "Please fill in your name and email before submitting.",
            Self::InvalidAudio(_) => {
                "Record a message or choose a WAV, MP3, OGG, WebM or M4A file before submitting."
            }
            Self::InvalidEdit(_) => "The trim start must come before the trim end.",
            Self::Rejected(_) => "The service could not accept this request. Check the details and try again.",
            Self::Network(_) => "Upload failed, please check your connection and try again.",
            Self::NotFound(_) => "This memory no longer exists or the link is invalid.",
            Self::EmptyCollection(_) => "Add at least one message before creating the collage.",
            Self::Timeout { .. } => "Processing is taking too long. Please start it again later.",
            Self::Processing(_) => "Audio processing failed. Please start it again.",
            Self::InvalidState(_) => "That action is not available right now.",
            Self::Configuration(_) => "The audio settings are invalid.",
        }
    }

    /// Transient failures the caller may retry manually. The core never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
