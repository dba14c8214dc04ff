use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::MediaSession;

/// Registry of named media sources, keyed by stream name.
///
/// Shared by every connection; sessions only ever read from it.
#[derive(Clone)]
pub struct MediaRegistry {
    sources: Arc<RwLock<HashMap<String, Arc<MediaSession>>>>,
}

impl MediaRegistry {
    pub fn new() -> Self {
        Self {
            sources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a media source. Replaces any existing source with the same name.
    pub fn add(&self, media: MediaSession) -> Arc<MediaSession> {
        let media = Arc::new(media);
        let name = media.name().to_string();
        self.sources.write().insert(name.clone(), media.clone());
        tracing::info!(
            stream = %name,
            tracks = media.subsessions().len(),
            multicast = media.is_multicast(),
            "media source registered"
        );
        media
    }

    /// Look up a media source by stream name.
    pub fn lookup(&self, name: &str) -> Option<Arc<MediaSession>> {
        self.sources.read().get(name).cloned()
    }

    /// Unregister a source. Sessions already bound to it keep their reference.
    pub fn remove(&self, name: &str) -> Option<Arc<MediaSession>> {
        let removed = self.sources.write().remove(name);
        if removed.is_some() {
            tracing::info!(stream = name, "media source removed");
        }
        removed
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for MediaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
