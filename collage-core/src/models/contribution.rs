use serde::{Deserialize, Serialize};

use super::audio_models::SourceUrl;
use super::error::CollageError;

/// Contributor details attached to an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorMetadata {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl ContributorMetadata {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Name and email must be non-blank and the email needs a local part and
    /// a domain around its `@`. A blank phone is normalized away.
    pub fn validate(&self) -> Result<(), CollageError> {
        if self.name.trim().is_empty() {
            return Err(CollageError::Validation("contributor name is required".into()));
        }
        let email = self.email.trim();
        if email.is_empty() {
            return Err(CollageError::Validation("contributor email is required".into()));
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(CollageError::Validation(format!(
                "{:?} is not an email address",
                email
            ))),
        }
    }

    pub(crate) fn normalized(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        }
    }
}

fn default_volume() -> u8 {
    100
}

/// One uploaded contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMessage {
    pub id: String,
    pub contributor_name: String,
    #[serde(default)]
    pub contributor_email: String,
    #[serde(default)]
    pub contributor_phone: Option<String>,
    /// Opaque handle to the stored bytes, resolvable to a playable URL by the storage service.
    #[serde(rename = "audio_url")]
    pub audio_reference: SourceUrl,
    #[serde(rename = "duration", default)]
    pub duration_secs: f64,
    #[serde(rename = "volume", default = "default_volume")]
    pub volume_percent: u8,
    #[serde(default)]
    pub trim_start: f64,
    #[serde(default)]
    pub trim_end: Option<f64>,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl AudioMessage {
    /// Set the per-message gain. Values outside [0, 100] clamp to the nearest bound.
    pub fn set_volume(&mut self, percent: i32) {
        self.volume_percent = percent.clamp(0, 100) as u8;
    }

    /// Set the playable window. Both ends clamp into [0, duration]; an inverted
    /// window is rejected.
    pub fn set_trim(&mut self, start: f64, end: f64) -> Result<(), CollageError> {
        if !(start.is_finite() && end.is_finite()) {
            return Err(CollageError::InvalidEdit("trim bounds must be finite".into()));
        }
        let duration = self.duration_secs.max(0.0);
        let start = start.clamp(0.0, duration);
        let end = end.clamp(0.0, duration);
        if start > end {
            return Err(CollageError::InvalidEdit(format!(
                "trim start {:.2}s is after trim end {:.2}s",
                start, end
            )));
        }
        self.trim_start = start;
        self.trim_end = Some(end);
        Ok(())
    }

    /// End of the playable window, defaulting to the full duration.
    pub fn effective_trim_end(&self) -> f64 {
        self.trim_end.unwrap_or(self.duration_secs)
    }

    /// Gain factor in [0.0, 1.0] derived from `volume_percent`.
    pub fn gain(&self) -> f32 {
        f32::from(self.volume_percent) / 100.0
    }
}

/// A shared collection of contributions (a memory / pod card).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "audio_messages", default)]
    pub messages: Vec<AudioMessage>,
}

impl Collection {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn sample_message(id: &str, duration_secs: f64) -> AudioMessage {
    AudioMessage {
        id: id.to_string(),
        contributor_name: format!("contributor {}", id),
        contributor_email: format!("{}@example.com", id),
        contributor_phone: None,
        audio_reference: SourceUrl::new(format!("https://tapes.example/api/audio/{}", id)),
        duration_secs,
        volume_percent: 100,
        trim_start: 0.0,
        trim_end: None,
        created_at: None,
    }
}
