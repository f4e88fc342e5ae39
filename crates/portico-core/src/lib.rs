//! Core building blocks of the Portico gateway.
//!
//! Portico exposes an S3-compatible surface and satisfies it against one of
//! two unrelated backends. This crate holds everything below the HTTP layer:
//!
//! - [`backend`] - the [`StorageBackend`](backend::StorageBackend)
//!   capability and its two implementations (passthrough re-signing to a
//!   native S3 store, and flat-key emulation over a tree-structured file
//!   API)
//! - [`folder_cache`] - path-prefix to folder-ID resolutions
//! - [`response_cache`] - cached GET/HEAD responses
//! - [`kv`] - the minimal shared store both caches sit on
//! - [`config`] - environment-driven configuration
//! - [`error`] - the gateway error taxonomy

pub mod backend;
pub mod config;
pub mod error;
pub mod folder_cache;
pub mod kv;
pub mod response_cache;

pub use backend::{ObjectAddress, StorageBackend};
pub use config::{BackendKind, GatewayConfig};
pub use error::{GatewayError, GatewayResult};
pub use folder_cache::FolderResolutionCache;
pub use kv::{InMemoryKv, KvStore};
pub use response_cache::{CachedResponse, ResponseCache};
