// Best-effort metadata cache for the info endpoint

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use super::models::{AudioMetadata, ContentId};

/// Bounded LRU of resolved metadata. Source URLs are never cached; signed
/// media URLs expire and the stream endpoint always resolves afresh.
pub struct MetadataCache {
    entries: Option<Mutex<LruCache<ContentId, AudioMetadata>>>,
}

impl MetadataCache {
    /// A capacity of 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn get(&self, id: &ContentId) -> Option<AudioMetadata> {
        self.entries.as_ref()?.lock().get(id).cloned()
    }

    pub fn insert(&self, id: ContentId, metadata: AudioMetadata) {
        if let Some(entries) = &self.entries {
            entries.lock().put(id, metadata);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |e| e.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
