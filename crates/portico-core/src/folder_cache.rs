//! Folder-resolution cache.
//!
//! Maps a bucket plus a path-segment chain to the opaque folder ID the
//! hierarchical backend resolved it to, so repeated operations under the
//! same prefix skip the tree walk. Entries expire after the configured TTL;
//! the backend can also diverge from the cache out of band (a folder moved
//! or deleted by another client), which is why the upload path re-validates
//! hits before trusting them for create-if-missing decisions.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::kv::KvStore;

/// Cache of `(bucket, segment chain) -> folder ID` resolutions.
#[derive(Clone)]
pub struct FolderResolutionCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl std::fmt::Debug for FolderResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderResolutionCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl FolderResolutionCache {
    /// Create a cache over the given store with a per-entry TTL.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Look up the folder ID cached for `bucket` + `segments`.
    pub async fn get(&self, bucket: &str, segments: &[&str]) -> Option<String> {
        let value = self.store.get(&entry_key(bucket, segments)).await?;
        String::from_utf8(value.to_vec()).ok()
    }

    /// Record the folder ID resolved for `bucket` + `segments`.
    pub async fn put(&self, bucket: &str, segments: &[&str], folder_id: &str) {
        self.store
            .put(
                &entry_key(bucket, segments),
                Bytes::from(folder_id.to_owned()),
                self.ttl,
            )
            .await;
    }

    /// Drop the cached resolution for `bucket` + `segments`.
    pub async fn invalidate(&self, bucket: &str, segments: &[&str]) {
        self.store.delete(&entry_key(bucket, segments)).await;
    }
}

/// Cache key for a segment chain: `folder:{bucket}/{seg1}/{seg2}/...`.
///
/// The bucket itself (empty segment chain) keys the bucket's root folder.
fn entry_key(bucket: &str, segments: &[&str]) -> String {
    let mut key = String::with_capacity(7 + bucket.len());
    key.push_str("folder:");
    key.push_str(bucket);
    for segment in segments {
        key.push('/');
        key.push_str(segment);
    }
    key
}
