//! Consumer-facing client facade.
//!
//! The UI-binding layer talks to [`NodeClient`]: store returns a
//! `hashd://` URL, and fetch resolves one, consulting the content cache
//! before any network access. When a WebSocket fallback client is
//! attached, workflows that exhaust every stream-capable peer divert to
//! the relay as an alternate path.
//!
//! Callers that lose interest simply drop the returned future;
//! cancellation happens at the next await point, so an abandoned fetch
//! never commits its result anywhere.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use hashd_cache::{ContentCache, MemoryBlob};
use hashd_net_transport::Transport;
use hashd_primitives::{ContentId, ContentUrl};
use hashd_ws::WsFallbackClient;
use tracing::{debug, trace, warn};

use crate::{error::NodeError, node::StorageNode};

/// A cache-fronted facade over a [`StorageNode`].
pub struct NodeClient<T> {
    node: Arc<StorageNode<T>>,
    cache: ContentCache<MemoryBlob>,
    fallback: Option<Arc<WsFallbackClient>>,
}

impl<T: Transport> NodeClient<T> {
    /// Create a facade with the default cache age.
    pub fn new(node: Arc<StorageNode<T>>) -> Self {
        Self {
            node,
            cache: ContentCache::new(),
            fallback: None,
        }
    }

    /// Create a facade with a custom cache age.
    pub fn with_cache_max_age(node: Arc<StorageNode<T>>, max_age: Duration) -> Self {
        Self {
            node,
            cache: ContentCache::with_max_age(max_age),
            fallback: None,
        }
    }

    /// Attach a WebSocket fallback client.
    pub fn with_fallback(mut self, fallback: Arc<WsFallbackClient>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// The underlying node.
    pub fn node(&self) -> &Arc<StorageNode<T>> {
        &self.node
    }

    /// Store bytes and return the `hashd://` URL referencing them.
    pub async fn store_bytes(
        &self,
        payload: &[u8],
        mime_type: &str,
    ) -> Result<ContentUrl, NodeError> {
        let cid = match self.node.store(payload, mime_type, None).await {
            Ok(receipt) => receipt.cid,
            Err(primary) if primary.is_exhausted() && self.fallback.is_some() => {
                self.fallback_store(payload, mime_type, primary).await?
            }
            Err(primary) => return Err(primary),
        };
        Ok(ContentUrl::new(cid).with_mime_type(mime_type))
    }

    /// Resolve a `hashd://` URL to a blob handle.
    ///
    /// Malformed URLs fail synchronously before any network access. Cache
    /// hits never touch the network; a fetched payload is cached for
    /// subsequent display.
    pub async fn fetch(&self, url: &str) -> Result<(Arc<MemoryBlob>, Option<String>), NodeError> {
        let parsed = ContentUrl::parse(url)?;

        if let Some((handle, media_type)) = self.cache.get(&parsed.id) {
            trace!(cid = %parsed.id, "cache hit");
            let media_type = (!media_type.is_empty()).then_some(media_type);
            return Ok((handle, media_type));
        }

        let (payload, mime_type) = match self.node.retrieve(&parsed.id).await {
            Ok(content) => (content.payload, content.mime_type),
            Err(primary) if primary.is_exhausted() && self.fallback.is_some() => {
                self.fallback_retrieve(&parsed.id, primary).await?
            }
            Err(primary) => return Err(primary),
        };

        let media_type = mime_type.or(parsed.mime_type);
        let handle = Arc::new(MemoryBlob::new(payload));
        self.cache.set(
            parsed.id,
            Arc::clone(&handle),
            media_type.clone().unwrap_or_default(),
        );
        Ok((handle, media_type))
    }

    /// Release the cached blob for a URL, if any.
    pub fn evict(&self, url: &str) -> Result<(), NodeError> {
        let parsed = ContentUrl::parse(url)?;
        self.cache.revoke(&parsed.id);
        Ok(())
    }

    /// Release every cached blob.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn fallback_store(
        &self,
        payload: &[u8],
        mime_type: &str,
        primary: NodeError,
    ) -> Result<ContentId, NodeError> {
        let Some(fallback) = &self.fallback else {
            return Err(primary);
        };
        warn!(error = %primary, "peer store exhausted, diverting to fallback relay");
        match fallback
            .store(payload, mime_type, Some(self.node.config().app_id.as_str()))
            .await
        {
            Ok(cid) => Ok(cid),
            Err(e) => {
                debug!(error = %e, "fallback store failed");
                Err(primary)
            }
        }
    }

    async fn fallback_retrieve(
        &self,
        cid: &ContentId,
        primary: NodeError,
    ) -> Result<(Bytes, Option<String>), NodeError> {
        let Some(fallback) = &self.fallback else {
            return Err(primary);
        };
        warn!(error = %primary, "peer retrieval exhausted, diverting to fallback relay");
        match fallback.retrieve(cid).await {
            Ok(result) => Ok(result),
            Err(e) => {
                debug!(error = %e, "fallback retrieve failed");
                Err(primary)
            }
        }
    }
}
