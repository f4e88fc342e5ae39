//! Storage backend capability and shared data types.
//!
//! The gateway speaks to exactly one [`StorageBackend`], selected at
//! configuration time. Two implementations exist:
//!
//! - [`passthrough::PassthroughBackend`] forwards each operation, re-signed,
//!   to a native S3-compatible endpoint.
//! - [`hierarchical::HierarchicalBackend`] emulates the flat key space on a
//!   tree-structured file-hosting API by resolving path segments to folder
//!   IDs.
//!
//! Bodies cross this boundary as streams in both directions, so memory use
//! stays bounded regardless of object size.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::GatewayResult;

pub mod hierarchical;
pub mod passthrough;

/// A streaming request or response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Wrap a single chunk of bytes as a [`ByteStream`].
#[must_use]
pub fn stream_from_bytes(data: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// The bucket/key pair a request addresses.
///
/// The key is a slash-delimited path; an empty key addresses the bucket
/// itself (listing). The bucket must already have passed the allow-list
/// check before an address reaches a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAddress {
    /// Top-level namespace.
    pub bucket: String,
    /// Slash-delimited object path; may be empty for bucket-root listing.
    pub key: String,
}

impl ObjectAddress {
    /// Create an address from its parts.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// The key's path segments before the final one, i.e. the folder chain
    /// the object lives under.
    #[must_use]
    pub fn folder_segments(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self.key.split('/').filter(|s| !s.is_empty()).collect();
        segments.pop();
        segments
    }

    /// The final path segment, the object's own name.
    #[must_use]
    pub fn leaf_name(&self) -> Option<&str> {
        self.key.split('/').filter(|s| !s.is_empty()).next_back()
    }
}

/// Metadata for an object, as reported by a backend.
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    /// MIME type of the stored content.
    pub content_type: Option<String>,
    /// Size of the stored content in bytes.
    pub content_length: Option<u64>,
    /// Entity tag (backend-defined format).
    pub etag: Option<String>,
    /// When the object was last modified.
    pub last_modified: Option<DateTime<Utc>>,
}

/// The result of a `get`: object metadata plus the streaming body.
pub struct GetResult {
    /// Object metadata (also served for HEAD).
    pub meta: ObjectMeta,
    /// The object content.
    pub body: ByteStream,
}

impl std::fmt::Debug for GetResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetResult")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// The result of a `put`.
#[derive(Debug, Clone, Default)]
pub struct PutResult {
    /// Backend-assigned object identifier, when the backend has one.
    pub id: Option<String>,
    /// The stored object's name.
    pub name: Option<String>,
    /// Entity tag for the stored content, when the backend reports one.
    pub etag: Option<String>,
}

/// One entry in a bucket listing.
#[derive(Debug, Clone)]
pub struct ListEntry {
    /// Object key.
    pub key: String,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
    /// Entity tag.
    pub etag: Option<String>,
    /// Object size in bytes.
    pub size: u64,
}

/// The capability every storage backend provides.
///
/// Implementations translate each operation into their own service's idioms
/// and normalize failures into the gateway taxonomy: a missing object (or a
/// missing folder on its path) is `NotFound`, every other backend failure is
/// `Upstream`. No implementation retries.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Store `body` under the address, replacing any existing object.
    async fn put(
        &self,
        addr: &ObjectAddress,
        content_type: &str,
        body: ByteStream,
    ) -> GatewayResult<PutResult>;

    /// Fetch the object's metadata and streaming content.
    async fn get(&self, addr: &ObjectAddress) -> GatewayResult<GetResult>;

    /// Fetch the object's metadata only.
    async fn head(&self, addr: &ObjectAddress) -> GatewayResult<ObjectMeta>;

    /// Delete the object.
    async fn delete(&self, addr: &ObjectAddress) -> GatewayResult<()>;

    /// Enumerate the objects at the bucket root.
    async fn list(&self, bucket: &str) -> GatewayResult<Vec<ListEntry>>;
}
