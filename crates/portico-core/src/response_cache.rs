//! Response cache for GET and HEAD.
//!
//! Caches full HTTP responses keyed purely on `(bucket, key)` — no
//! authentication material enters the key, so two differently-signed
//! requests for the same object share one entry. Only successful (2xx) GET
//! responses are stored; a HEAD is served from the same entry by dropping
//! the body, and a HEAD alone stores nothing.
//!
//! Population and invalidation are fire-and-forget: both spawn a background
//! task and return immediately, so neither ever sits on the response path.
//! Mutating operations invalidate before the backend call is made and
//! regardless of its outcome — a failed mutation costs a cache miss, never a
//! stale read.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::kv::KvStore;

/// A cached HTTP response: status, headers in original order, body bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, ordered; names are kept lowercase.
    pub headers: Vec<(String, String)>,
    /// The response body.
    pub body: Vec<u8>,
}

/// Cache of GET/HEAD responses over a [`KvStore`].
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
    max_body: usize,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("max_body", &self.max_body)
            .finish_non_exhaustive()
    }
}

impl ResponseCache {
    /// Create a cache with the given entry TTL and body-size ceiling.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration, max_body: usize) -> Self {
        Self {
            store,
            ttl,
            max_body,
        }
    }

    /// Largest body this cache will retain.
    #[must_use]
    pub fn max_body(&self) -> usize {
        self.max_body
    }

    /// Look up the cached response for `(bucket, key)`.
    pub async fn lookup(&self, bucket: &str, key: &str) -> Option<CachedResponse> {
        let raw = self.store.get(&cache_key(bucket, key)).await?;
        match ciborium::from_reader(raw.as_ref()) {
            Ok(response) => Some(response),
            Err(err) => {
                // A corrupt entry is treated as a miss and evicted.
                warn!(bucket, key, error = %err, "dropping undecodable cache entry");
                self.store.delete(&cache_key(bucket, key)).await;
                None
            }
        }
    }

    /// Store a response for `(bucket, key)` in the background.
    ///
    /// Returns immediately; the write happens on a spawned task. Responses
    /// outside 2xx or with bodies above the ceiling are skipped.
    pub fn store(&self, bucket: &str, key: &str, response: CachedResponse) {
        if !(200..300).contains(&response.status) || response.body.len() > self.max_body {
            debug!(
                bucket,
                key,
                status = response.status,
                body_len = response.body.len(),
                "response not cacheable"
            );
            return;
        }

        let store = Arc::clone(&self.store);
        let entry_key = cache_key(bucket, key);
        let ttl = self.ttl;
        tokio::spawn(async move {
            let mut encoded = Vec::with_capacity(response.body.len() + 256);
            if let Err(err) = ciborium::into_writer(&response, &mut encoded) {
                warn!(key = %entry_key, error = %err, "failed to encode cache entry");
                return;
            }
            store.put(&entry_key, Bytes::from(encoded), ttl).await;
        });
    }

    /// Drop the entry for `(bucket, key)` in the background.
    ///
    /// Returns immediately; callers invoke this before issuing the mutating
    /// backend call.
    pub fn invalidate(&self, bucket: &str, key: &str) {
        let store = Arc::clone(&self.store);
        let entry_key = cache_key(bucket, key);
        tokio::spawn(async move {
            store.delete(&entry_key).await;
        });
    }
}

/// Cache key for an object: `resp:{bucket}/{key}`.
fn cache_key(bucket: &str, key: &str) -> String {
    format!("resp:{bucket}/{key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;

    fn cache() -> ResponseCache {
        ResponseCache::new(Arc::new(InMemoryKv::new()), Duration::from_secs(60), 1024)
    }

    fn ok_response(body: &[u8]) -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: vec![
                ("content-type".to_owned(), "text/plain".to_owned()),
                ("etag".to_owned(), "\"abc\"".to_owned()),
            ],
            body: body.to_vec(),
        }
    }

    /// Await the spawned store task by polling until the entry appears.
    async fn wait_for_entry(cache: &ResponseCache, bucket: &str, key: &str) -> CachedResponse {
        for _ in 0..50 {
            if let Some(found) = cache.lookup(bucket, key).await {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("cache entry for {bucket}/{key} never appeared");
    }

    #[tokio::test]
    async fn test_should_store_and_lookup_response() {
        let cache = cache();
        cache.store("bucket", "key.txt", ok_response(b"hello"));

        let found = wait_for_entry(&cache, "bucket", "key.txt").await;
        assert_eq!(found.status, 200);
        assert_eq!(found.body, b"hello");
        assert_eq!(found.headers[0].1, "text/plain");
    }

    #[tokio::test]
    async fn test_should_not_store_error_responses() {
        let cache = cache();
        let mut response = ok_response(b"denied");
        response.status = 404;
        cache.store("bucket", "key.txt", response);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.lookup("bucket", "key.txt").await.is_none());
    }

    #[tokio::test]
    async fn test_should_not_store_oversized_bodies() {
        let cache = cache();
        cache.store("bucket", "big.bin", ok_response(&[0u8; 2048]));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.lookup("bucket", "big.bin").await.is_none());
    }

    #[tokio::test]
    async fn test_should_invalidate_entry() {
        let cache = cache();
        cache.store("bucket", "key.txt", ok_response(b"v1"));
        wait_for_entry(&cache, "bucket", "key.txt").await;

        cache.invalidate("bucket", "key.txt");
        for _ in 0..50 {
            if cache.lookup("bucket", "key.txt").await.is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("cache entry survived invalidation");
    }

    #[tokio::test]
    async fn test_should_keep_entries_per_key() {
        let cache = cache();
        cache.store("bucket", "a.txt", ok_response(b"a"));
        cache.store("bucket", "b.txt", ok_response(b"b"));

        assert_eq!(wait_for_entry(&cache, "bucket", "a.txt").await.body, b"a");
        assert_eq!(wait_for_entry(&cache, "bucket", "b.txt").await.body, b"b");
    }
}
