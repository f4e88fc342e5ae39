//! S3-compatible HTTP surface for the Portico gateway.
//!
//! This crate owns everything between the TCP connection and the storage
//! backend:
//!
//! - **Routing** ([`routing`]): maps method and path onto an object address
//!   and one of the five S3-style operations (path-style addressing only).
//!
//! - **Response shaping** ([`response`]): the success shapes (JSON PUT
//!   result, streamed GET, XML listing, 204 DELETE) and the plain-text error
//!   bodies.
//!
//! - **Listing XML** ([`xml`]): the `ListBucketResult` document.
//!
//! - **Body** ([`body`]): the [`GatewayBody`](body::GatewayBody) response
//!   body with buffered, empty, and streaming modes.
//!
//! - **Service** ([`service`]): the [`Gateway`](service::Gateway) pipeline
//!   and the hyper-compatible [`GatewayService`](service::GatewayService).
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> GatewayService (hyper Service)
//!     -> Health check / OPTIONS / 405 interception
//!     -> routing::resolve (bucket + key + operation)
//!     -> Bucket allow-list (before any signature work)
//!     -> SigV4 verification (portico-auth)
//!     -> Response cache lookup (GET/HEAD)
//!     -> StorageBackend dispatch (portico-core)
//!     -> Cache populate (GET tee) / invalidate (PUT, DELETE)
//!     -> Common response headers (x-amz-request-id, Server)
//!   <- HTTP Response
//! ```

pub mod body;
pub mod response;
pub mod routing;
pub mod service;
pub mod xml;

pub use body::GatewayBody;
pub use routing::{Operation, Route};
pub use service::{Gateway, GatewayService};
