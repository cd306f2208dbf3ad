//! TTL cache mapping content ids to local blob handles.
//!
//! Retrieval-for-display paths consult this cache before touching the
//! network. Entries expire after a maximum age; expiry, revocation and
//! clearing all release the underlying handle, and a handle is released at
//! most once across its lifetime.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use hashd_primitives::ContentId;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Default maximum entry age.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// An opaque local reference to retrieved bytes.
///
/// Consumers use the handle without retransmitting the payload; `release`
/// frees whatever local resource backs it. Implementations must tolerate
/// repeated release calls, though the cache itself releases each handle at
/// most once.
pub trait BlobHandle: Send + Sync {
    /// Free the resource behind the handle.
    fn release(&self);
}

/// An in-memory blob handle over the raw payload bytes.
#[derive(Debug)]
pub struct MemoryBlob {
    data: Bytes,
    released: AtomicBool,
}

impl MemoryBlob {
    /// Wrap payload bytes in a handle.
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            released: AtomicBool::new(false),
        }
    }

    /// The payload bytes, or `None` once released.
    pub fn data(&self) -> Option<Bytes> {
        (!self.released.load(Ordering::Acquire)).then(|| self.data.clone())
    }
}

impl BlobHandle for MemoryBlob {
    fn release(&self) {
        self.released.store(true, Ordering::Release);
    }
}

struct CacheEntry<H> {
    handle: Arc<H>,
    media_type: String,
    stored_at: Instant,
}

/// TTL cache from content id to blob handle.
pub struct ContentCache<H> {
    entries: Mutex<HashMap<ContentId, CacheEntry<H>>>,
    max_age: Duration,
}

impl<H: BlobHandle> Default for ContentCache<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: BlobHandle> ContentCache<H> {
    /// Create a cache with the default maximum age.
    pub fn new() -> Self {
        Self::with_max_age(DEFAULT_MAX_AGE)
    }

    /// Create a cache with a custom maximum age.
    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_age,
        }
    }

    /// Insert or overwrite the entry for a content id.
    ///
    /// An overwritten entry's handle is released; the id then maps to the
    /// new handle only, keeping at most one live entry per id.
    pub fn set(&self, id: ContentId, handle: Arc<H>, media_type: impl Into<String>) {
        let entry = CacheEntry {
            handle,
            media_type: media_type.into(),
            stored_at: Instant::now(),
        };
        if let Some(previous) = self.entries.lock().insert(id, entry) {
            previous.handle.release();
        }
    }

    /// Look up a content id.
    ///
    /// An entry older than the maximum age is released and removed, and the
    /// lookup reports a miss.
    pub fn get(&self, id: &ContentId) -> Option<(Arc<H>, String)> {
        let mut entries = self.entries.lock();
        let expired = entries
            .get(id)
            .is_some_and(|entry| entry.stored_at.elapsed() > self.max_age);
        if expired {
            if let Some(entry) = entries.remove(id) {
                trace!(%id, "cache entry expired");
                entry.handle.release();
            }
            return None;
        }
        entries
            .get(id)
            .map(|entry| (Arc::clone(&entry.handle), entry.media_type.clone()))
    }

    /// Release and remove the entry for a content id, if present.
    pub fn revoke(&self, id: &ContentId) {
        if let Some(entry) = self.entries.lock().remove(id) {
            entry.handle.release();
        }
    }

    /// Release and remove every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        for (_, entry) in entries.drain() {
            entry.handle.release();
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct CountingHandle(Arc<AtomicUsize>);

    impl BlobHandle for CountingHandle {
        fn release(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn cid(tag: &str) -> ContentId {
        ContentId::from_payload(tag.as_bytes())
    }

    #[tokio::test]
    async fn test_set_then_get_hits() {
        let cache = ContentCache::with_max_age(Duration::from_secs(10));
        let releases = Arc::new(AtomicUsize::new(0));
        cache.set(
            cid("a"),
            Arc::new(CountingHandle(releases.clone())),
            "image/png",
        );

        let (_, media_type) = cache.get(&cid("a")).unwrap();
        assert_eq!(media_type, "image/png");
        assert_eq!(releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_releases_exactly_once() {
        let cache = ContentCache::with_max_age(Duration::from_secs(10));
        let releases = Arc::new(AtomicUsize::new(0));
        cache.set(cid("a"), Arc::new(CountingHandle(releases.clone())), "");

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get(&cid("a")).is_none());
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        // The entry is gone; further lookups release nothing more.
        assert!(cache.get(&cid("a")).is_none());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let cache = ContentCache::with_max_age(Duration::from_secs(10));
        let releases = Arc::new(AtomicUsize::new(0));
        cache.set(cid("a"), Arc::new(CountingHandle(releases.clone())), "");

        cache.revoke(&cid("a"));
        cache.revoke(&cid("a"));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_releases_every_entry_once() {
        let cache = ContentCache::with_max_age(Duration::from_secs(10));
        let releases = Arc::new(AtomicUsize::new(0));
        for tag in ["a", "b", "c"] {
            cache.set(cid(tag), Arc::new(CountingHandle(releases.clone())), "");
        }

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(releases.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_overwrite_releases_previous_handle() {
        let cache = ContentCache::with_max_age(Duration::from_secs(10));
        let releases = Arc::new(AtomicUsize::new(0));
        cache.set(cid("a"), Arc::new(CountingHandle(releases.clone())), "");
        cache.set(cid("a"), Arc::new(CountingHandle(releases.clone())), "");

        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_blob_release() {
        let blob = MemoryBlob::new(Bytes::from_static(b"bytes"));
        assert!(blob.data().is_some());
        blob.release();
        assert!(blob.data().is_none());
    }
}
