//! Output cache
//!
//! Every tool result is cached so a later call can use it as input
//! (`{"cache_key": ...}`) without a round trip through the client.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;

/// Kind of file a tool produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Pdf,
    Zip,
    Xlsx,
    Docx,
    Pptx,
}

impl ArtifactKind {
    pub fn media_type(self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::Zip => "application/zip",
            ArtifactKind::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ArtifactKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ArtifactKind::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Zip => "zip",
            ArtifactKind::Xlsx => "xlsx",
            ArtifactKind::Docx => "docx",
            ArtifactKind::Pptx => "pptx",
        }
    }
}

/// A cached tool output
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub data: Vec<u8>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    pub fn pdf(data: Vec<u8>) -> Self {
        Self::new(ArtifactKind::Pdf, data)
    }
}

struct CacheInner {
    lru: LruCache<String, Artifact>,
    total_bytes: usize,
}

/// Cache of tool outputs with entry count and byte budget limits
pub struct CacheManager {
    inner: Mutex<CacheInner>,
    max_bytes: usize,
}

impl CacheManager {
    /// Create a new cache manager with the specified entry capacity and byte budget
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Store an artifact.
    ///
    /// Entries larger than the whole budget are dropped; otherwise least
    /// recently used entries are evicted until the new one fits. Returns
    /// whether the artifact was stored.
    pub fn put(&self, key: String, artifact: Artifact) -> bool {
        let new_size = artifact.data.len();
        if new_size > self.max_bytes {
            tracing::debug!(bytes = new_size, budget = self.max_bytes, "artifact too large to cache");
            return false;
        }

        let mut inner = self.inner.lock();

        if let Some(old) = inner.lru.pop(&key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.data.len());
        }

        while inner.total_bytes + new_size > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(evicted.data.len());
                }
                None => break,
            }
        }

        // A full entry-count cache evicts silently on push
        if let Some((_, evicted)) = inner.lru.push(key, artifact) {
            inner.total_bytes = inner.total_bytes.saturating_sub(evicted.data.len());
        }
        inner.total_bytes += new_size;
        true
    }

    pub fn get(&self, key: &str) -> Option<Artifact> {
        self.inner.lock().lru.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().lru.contains(key)
    }

    pub fn remove(&self, key: &str) -> Option<Artifact> {
        let mut inner = self.inner.lock();
        let artifact = inner.lru.pop(key)?;
        inner.total_bytes = inner.total_bytes.saturating_sub(artifact.data.len());
        Some(artifact)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    /// Total bytes currently stored
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    /// Generate a new cache key that does not collide with existing keys.
    pub fn generate_unique_key(&self) -> String {
        let inner = self.inner.lock();
        loop {
            let key = uuid::Uuid::new_v4().to_string();
            if !inner.lru.contains(&key) {
                return key;
            }
        }
    }
}
