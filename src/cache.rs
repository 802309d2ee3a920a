//! Memoizing response cache for the request gateway.
//!
//! A [`ResponseStore`] maps a request fingerprint to the last valid response
//! observed for it. The gateway consults the store before touching the
//! network and writes every fresh response back; whether a stored response is
//! still acceptable is decided by a caller-supplied validity predicate, not by
//! the store itself. Implementations must tolerate concurrent readers and
//! idempotent overwrites.

use std::sync::Arc;

use async_trait::async_trait;
use moka::sync::Cache;

use crate::gateway::WireResponse;

/// Accepts or rejects a cached response before it is served.
pub type ValidityCheck = Arc<dyn Fn(&WireResponse) -> bool + Send + Sync>;

/// Backing store for memoized gateway responses.
///
/// The only contract is fingerprint in, last stored response out.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Returns the stored response for `fingerprint`, if any.
    async fn load(&self, fingerprint: &str) -> Option<WireResponse>;

    /// Stores `response` under `fingerprint`, replacing any previous entry.
    async fn store(&self, fingerprint: &str, response: &WireResponse);
}

/// Bounded in-memory [`ResponseStore`], the default when caching is enabled.
pub struct MemoryStore {
    inner: Cache<String, WireResponse>,
}

impl MemoryStore {
    /// Creates a store retaining up to `max_entries` responses.
    pub fn new(max_entries: u64) -> Self {
        MemoryStore {
            inner: Cache::builder().max_capacity(max_entries).build(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn load(&self, fingerprint: &str) -> Option<WireResponse> {
        self.inner.get(fingerprint)
    }

    async fn store(&self, fingerprint: &str, response: &WireResponse) {
        self.inner.insert(fingerprint.to_string(), response.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_round_trips_by_fingerprint() {
        let store = MemoryStore::default();
        let response = WireResponse::Html("<html></html>".to_string());

        assert!(store.load("fp").await.is_none());
        store.store("fp", &response).await;
        match store.load("fp").await {
            Some(WireResponse::Html(body)) => assert_eq!(body, "<html></html>"),
            other => panic!("unexpected cache content: {other:?}"),
        }
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_entry() {
        let store = MemoryStore::default();
        store
            .store("fp", &WireResponse::Html("old".to_string()))
            .await;
        store
            .store("fp", &WireResponse::Html("new".to_string()))
            .await;
        match store.load("fp").await {
            Some(WireResponse::Html(body)) => assert_eq!(body, "new"),
            other => panic!("unexpected cache content: {other:?}"),
        }
    }
}
