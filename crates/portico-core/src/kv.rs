//! Minimal key-value capability backing the gateway's caches.
//!
//! Both the folder-resolution cache and the response cache sit on top of
//! [`KvStore`], a get/put/delete surface with per-entry expiry. The cache
//! logic stays testable against the in-memory [`InMemoryKv`] double and
//! swappable for a networked KV store in production.
//!
//! The store is best-effort by contract: writes and deletes carry no error
//! channel, and a lost entry only costs a backend round-trip. Nothing in the
//! gateway holds a cross-request lock around it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

/// Shared, externally-backed key-value capability.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Fetch the value for `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Option<Bytes>;

    /// Store `value` under `key` for at most `ttl`.
    async fn put(&self, key: &str, value: Bytes, ttl: Duration);

    /// Remove the entry for `key`, if any.
    async fn delete(&self, key: &str);
}

/// In-memory [`KvStore`] implementation over [`DashMap`].
///
/// Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct InMemoryKv {
    entries: DashMap<String, KvEntry>,
}

#[derive(Debug)]
struct KvEntry {
    value: Bytes,
    expires_at: Instant,
}

impl InMemoryKv {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (possibly expired but not yet collected) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn get(&self, key: &str) -> Option<Bytes> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Duration) {
        self.entries.insert(
            key.to_owned(),
            KvEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}
