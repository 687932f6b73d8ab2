use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioBlob, SourceUrl, OBJECT_URL_SCHEME};

/// Registry of in-process blobs addressable by temporary `blob:` URLs.
///
/// Cloning shares the registry. A URL stays resolvable until it is revoked.
#[derive(Debug, Clone, Default)]
pub struct ObjectUrls {
    entries: Arc<Mutex<HashMap<SourceUrl, Arc<AudioBlob>>>>,
}

impl ObjectUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `blob` and return a fresh URL for it.
    pub fn create(&self, blob: Arc<AudioBlob>) -> SourceUrl {
        let url = SourceUrl::new(format!("{}{}", OBJECT_URL_SCHEME, uuid::Uuid::new_v4()));
        self.entries.lock().insert(url.clone(), blob);
        url
    }

    pub fn resolve(&self, url: &SourceUrl) -> Option<Arc<AudioBlob>> {
        self.entries.lock().get(url).cloned()
    }

    /// Returns false if the URL was unknown or already revoked.
    pub fn revoke(&self, url: &SourceUrl) -> bool {
        self.entries.lock().remove(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_resolve_revoke() {
        let urls = ObjectUrls::new();
        let blob = Arc::new(AudioBlob::new(vec![1, 2, 3], "audio/wav", 0.1));

        let url = urls.create(Arc::clone(&blob));
        assert!(url.is_object_url());
        assert_eq!(urls.resolve(&url).as_deref(), Some(&*blob));

        assert!(urls.revoke(&url));
        assert!(urls.resolve(&url).is_none());
        assert!(!urls.revoke(&url));
        assert!(urls.is_empty());
    }

    #[test]
    fn each_registration_gets_its_own_url() {
        let urls = ObjectUrls::new();
        let blob = Arc::new(AudioBlob::new(vec![0], "audio/wav", 0.0));
        let a = urls.create(Arc::clone(&blob));
        let b = urls.create(blob);
        assert_ne!(a, b);
        assert_eq!(urls.len(), 2);
    }
}
