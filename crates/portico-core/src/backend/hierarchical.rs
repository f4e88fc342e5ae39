//! Hierarchical backend: a flat S3 key space emulated on a tree of folders.
//!
//! The backing service has no buckets and no flat keys; its addressing unit
//! is a node in a folder tree, identified by an opaque ID. This adapter maps
//! `bucket/a/b/file.txt` onto that tree:
//!
//! 1. The bucket is a folder at the tree root, found by name.
//! 2. Each intermediate key segment is a folder found by `(name, parent)`
//!    exact-match search, created on demand during uploads.
//! 3. The final segment is the object itself, looked up under the resolved
//!    parent.
//!
//! Resolved folder IDs go through the [`FolderResolutionCache`] so repeated
//! operations under one prefix skip the walk. On the upload path a cache hit
//! is re-validated with a cheap existence probe before the create-if-missing
//! decision relies on it; the service can diverge from the cache out of band.
//!
//! Uploads use the service's two-phase resumable protocol: a session is
//! opened with the object's name, parent, and content type, then the request
//! body is streamed into the session URI without buffering.
//!
//! Two concurrent uploads under a not-yet-existing prefix can both miss the
//! cache and both create the folder, leaving duplicate same-named folders.
//! Resolution is deliberately not serialized per path; callers that need the
//! guarantee must serialize first writes themselves.

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use serde::Deserialize;
use tracing::debug;

use crate::backend::{
    ByteStream, GetResult, ListEntry, ObjectAddress, ObjectMeta, PutResult, StorageBackend,
};
use crate::error::{GatewayError, GatewayResult};
use crate::folder_cache::FolderResolutionCache;

/// MIME type the service assigns to folder nodes.
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Parent sentinel addressing the root of the tree.
const ROOT_PARENT: &str = "root";

/// Metadata fields requested from every search and lookup.
const FILE_FIELDS: &str = "files(id,name,mimeType,size,modifiedTime,md5Checksum)";

/// Storage backend over a tree-structured file-hosting API.
pub struct HierarchicalBackend {
    client: Client,
    endpoint: String,
    upload_endpoint: String,
    token: String,
    folders: FolderResolutionCache,
}

impl std::fmt::Debug for HierarchicalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchicalBackend")
            .field("endpoint", &self.endpoint)
            .field("upload_endpoint", &self.upload_endpoint)
            .field("folders", &self.folders)
            .finish_non_exhaustive()
    }
}

/// What a child search is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildKind {
    Folder,
    File,
}

/// A file or folder node as the service reports it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteNode {
    id: String,
    name: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    md5_checksum: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NodeList {
    #[serde(default)]
    files: Vec<RemoteNode>,
}

impl HierarchicalBackend {
    /// Create a backend over the given API endpoints and bearer token.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        upload_endpoint: impl Into<String>,
        token: impl Into<String>,
        folders: FolderResolutionCache,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: trim_endpoint(endpoint.into()),
            upload_endpoint: trim_endpoint(upload_endpoint.into()),
            token: token.into(),
            folders,
        }
    }

    /// Search for a child node by exact name under a parent.
    ///
    /// `parent = None` searches directly under the tree root (where bucket
    /// folders live). Only exact name matches are accepted; the first match
    /// wins when duplicates exist.
    async fn find_child(
        &self,
        parent: Option<&str>,
        name: &str,
        kind: ChildKind,
    ) -> GatewayResult<Option<RemoteNode>> {
        let parent_id = parent.unwrap_or(ROOT_PARENT);
        let mime_clause = match kind {
            ChildKind::Folder => format!("mimeType = '{FOLDER_MIME}'"),
            ChildKind::File => format!("mimeType != '{FOLDER_MIME}'"),
        };
        let query = format!(
            "name = '{}' and '{parent_id}' in parents and {mime_clause} and trashed = false",
            escape_query_value(name),
        );

        let response = self
            .client
            .get(format!("{}/files", self.endpoint))
            .bearer_auth(&self.token)
            .query(&[("q", query.as_str()), ("fields", FILE_FIELDS)])
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(upstream_failure("child search", response).await);
        }

        let list: NodeList = response.json().await.map_err(transport_error)?;
        Ok(list.files.into_iter().next())
    }

    /// Probe whether a folder ID still exists on the service.
    async fn folder_exists(&self, id: &str) -> GatewayResult<bool> {
        let response = self
            .client
            .get(format!("{}/files/{id}", self.endpoint))
            .bearer_auth(&self.token)
            .query(&[("fields", "id")])
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            _ => Err(upstream_failure("folder probe", response).await),
        }
    }

    /// Create a folder under a parent and return the new node.
    async fn create_folder(&self, parent: Option<&str>, name: &str) -> GatewayResult<RemoteNode> {
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent.unwrap_or(ROOT_PARENT)],
        });

        let response = self
            .client
            .post(format!("{}/files", self.endpoint))
            .bearer_auth(&self.token)
            .json(&metadata)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(upstream_failure("folder creation", response).await);
        }

        let node: RemoteNode = response.json().await.map_err(transport_error)?;
        debug!(name, id = %node.id, "created folder");
        Ok(node)
    }

    /// Walk the bucket folder and every key segment root-to-leaf, returning
    /// the ID of the folder that should contain the leaf object.
    ///
    /// Each step consults the folder cache first, then falls back to a
    /// `(name, parent)` search. With `create_if_missing` the walk
    /// materializes absent folders (and re-validates cache hits, since the
    /// service may have dropped a cached folder out of band); without it an
    /// absent folder ends the whole resolution with `Ok(None)`.
    async fn resolve_path(
        &self,
        bucket: &str,
        segments: &[&str],
        create_if_missing: bool,
    ) -> GatewayResult<Option<String>> {
        let mut parent: Option<String> = None;

        for depth in 0..=segments.len() {
            let name = if depth == 0 { bucket } else { segments[depth - 1] };
            let prefix = &segments[..depth];

            let mut resolved = self.folders.get(bucket, prefix).await;
            if let Some(id) = &resolved {
                if create_if_missing && !self.folder_exists(id).await? {
                    self.folders.invalidate(bucket, prefix).await;
                    resolved = None;
                }
            }

            if resolved.is_none() {
                resolved = self
                    .find_child(parent.as_deref(), name, ChildKind::Folder)
                    .await?
                    .map(|node| node.id);
            }

            let id = match resolved {
                Some(id) => id,
                None if create_if_missing => {
                    // Two racing writers can both reach this point and
                    // create duplicate same-named folders; see module docs.
                    self.create_folder(parent.as_deref(), name).await?.id
                }
                None => return Ok(None),
            };

            self.folders.put(bucket, prefix, &id).await;
            parent = Some(id);
        }

        Ok(parent)
    }

    /// Resolve the parent folder and leaf name for a non-empty key, failing
    /// with `NotFound` when the folder chain does not exist.
    async fn resolve_existing<'a>(
        &self,
        addr: &'a ObjectAddress,
    ) -> GatewayResult<(String, &'a str)> {
        let leaf = require_leaf(addr)?;
        let segments = addr.folder_segments();
        match self
            .resolve_path(&addr.bucket, &segments, false)
            .await?
        {
            Some(parent) => Ok((parent, leaf)),
            None => Err(GatewayError::not_found(&addr.key)),
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for HierarchicalBackend {
    async fn put(
        &self,
        addr: &ObjectAddress,
        content_type: &str,
        body: ByteStream,
    ) -> GatewayResult<PutResult> {
        let leaf = require_leaf(addr)?;
        let segments = addr.folder_segments();
        let parent = self
            .resolve_path(&addr.bucket, &segments, true)
            .await?
            .ok_or_else(|| {
                GatewayError::Internal(anyhow::anyhow!(
                    "create-if-missing resolution yielded no folder"
                ))
            })?;

        // Phase 1: open a resumable session scoped to name, parent, and the
        // declared content type.
        let init_response = self
            .client
            .post(format!("{}/files", self.upload_endpoint))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "resumable")])
            .header("X-Upload-Content-Type", content_type)
            .json(&serde_json::json!({ "name": leaf, "parents": [parent] }))
            .send()
            .await
            .map_err(transport_error)?;

        if !init_response.status().is_success() {
            return Err(upstream_failure("upload initiation", init_response).await);
        }

        let session_uri = init_response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                GatewayError::upstream(
                    init_response.status().as_u16(),
                    "upload initiation returned no session URI",
                )
            })?;

        // Phase 2: stream the request body into the session.
        let upload_response = self
            .client
            .put(&session_uri)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, content_type)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(transport_error)?;

        if !upload_response.status().is_success() {
            return Err(upstream_failure("upload transfer", upload_response).await);
        }

        let node: RemoteNode = upload_response.json().await.map_err(transport_error)?;
        debug!(bucket = %addr.bucket, key = %addr.key, id = %node.id, "stored object");

        Ok(PutResult {
            id: Some(node.id),
            name: Some(node.name),
            etag: node.md5_checksum,
        })
    }

    async fn get(&self, addr: &ObjectAddress) -> GatewayResult<GetResult> {
        let (parent, leaf) = self.resolve_existing(addr).await?;

        let node = self
            .find_child(Some(&parent), leaf, ChildKind::File)
            .await?
            .ok_or_else(|| GatewayError::not_found(&addr.key))?;

        let response = self
            .client
            .get(format!("{}/files/{}", self.endpoint, node.id))
            .bearer_auth(&self.token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::not_found(&addr.key));
        }
        if !response.status().is_success() {
            return Err(upstream_failure("content download", response).await);
        }

        let mut meta = node_meta(&node);
        if let Some(ct) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            meta.content_type = Some(ct.to_owned());
        }
        if let Some(len) = response.content_length() {
            meta.content_length = Some(len);
        }

        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::other(e.to_string())),
        );

        Ok(GetResult { meta, body })
    }

    async fn head(&self, addr: &ObjectAddress) -> GatewayResult<ObjectMeta> {
        let (parent, leaf) = self.resolve_existing(addr).await?;

        let node = self
            .find_child(Some(&parent), leaf, ChildKind::File)
            .await?
            .ok_or_else(|| GatewayError::not_found(&addr.key))?;

        Ok(node_meta(&node))
    }

    async fn delete(&self, addr: &ObjectAddress) -> GatewayResult<()> {
        let (parent, leaf) = self.resolve_existing(addr).await?;

        let node = self
            .find_child(Some(&parent), leaf, ChildKind::File)
            .await?
            .ok_or_else(|| GatewayError::not_found(&addr.key))?;

        let response = self
            .client
            .delete(format!("{}/files/{}", self.endpoint, node.id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::not_found(&addr.key));
        }
        if !response.status().is_success() {
            return Err(upstream_failure("object deletion", response).await);
        }

        Ok(())
    }

    async fn list(&self, bucket: &str) -> GatewayResult<Vec<ListEntry>> {
        // A read-only list never materializes the bucket folder; an absent
        // bucket yields an empty listing, not an error.
        let folder = match self.folders.get(bucket, &[]).await {
            Some(id) => Some(id),
            None => {
                let found = self
                    .find_child(None, bucket, ChildKind::Folder)
                    .await?
                    .map(|node| node.id);
                if let Some(id) = &found {
                    self.folders.put(bucket, &[], id).await;
                }
                found
            }
        };
        let Some(folder) = folder else {
            return Ok(Vec::new());
        };

        let query = format!("'{folder}' in parents and trashed = false");
        let response = self
            .client
            .get(format!("{}/files", self.endpoint))
            .bearer_auth(&self.token)
            .query(&[
                ("q", query.as_str()),
                ("fields", FILE_FIELDS),
                ("pageSize", "1000"),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(upstream_failure("bucket listing", response).await);
        }

        let list: NodeList = response.json().await.map_err(transport_error)?;
        Ok(list
            .files
            .into_iter()
            .filter(|node| node.mime_type.as_deref() != Some(FOLDER_MIME))
            .map(|node| ListEntry {
                key: node.name,
                last_modified: node.modified_time,
                etag: node.md5_checksum,
                size: node.size.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0),
            })
            .collect())
    }
}

/// Metadata derived from a node's own fields (no content request involved).
fn node_meta(node: &RemoteNode) -> ObjectMeta {
    ObjectMeta {
        content_type: node.mime_type.clone(),
        content_length: node.size.as_deref().and_then(|s| s.parse().ok()),
        etag: node.md5_checksum.clone(),
        last_modified: node.modified_time,
    }
}

/// The leaf name of a key, or `InvalidRequest` when the key is empty.
fn require_leaf(addr: &ObjectAddress) -> GatewayResult<&str> {
    addr.leaf_name().ok_or_else(|| GatewayError::InvalidRequest {
        message: "missing object key".to_owned(),
    })
}

/// Escape a name for embedding in a search query literal.
fn escape_query_value(name: &str) -> String {
    name.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Strip a trailing slash so endpoint joining stays uniform.
fn trim_endpoint(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_owned()
}

/// Map a transport-level client error to the gateway taxonomy.
fn transport_error(err: reqwest::Error) -> GatewayError {
    GatewayError::Upstream {
        status: None,
        message: format!("file API request failed: {err}"),
    }
}

/// Map a non-success response to an `Upstream` error, with a body snippet.
async fn upstream_failure(context: &str, response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    body.truncate(200);
    GatewayError::upstream(status, format!("{context} failed with status {status}: {body}"))
}
