//! AWS Signature Version 4 verification and signing for the Portico gateway.
//!
//! The gateway authenticates every inbound S3-style request itself before
//! touching a backend. This crate implements that verification from the wire
//! specification: canonical request construction, string-to-sign assembly,
//! signing-key derivation, and constant-time signature comparison. It also
//! provides the outbound signing helper the passthrough backend uses to
//! re-sign forwarded requests.
//!
//! # Usage
//!
//! ```rust
//! use portico_auth::verify;
//!
//! let (parts, ()) = http::Request::builder()
//!     .method("GET")
//!     .uri("http://gateway.local/bucket/key")
//!     .body(())
//!     .unwrap()
//!     .into_parts();
//!
//! // An unauthenticated request never verifies.
//! assert!(!verify(&parts, "ACCESS", "SECRET", "us-east-1"));
//! ```
//!
//! # Modules
//!
//! - [`canonical`] - Canonical request construction
//! - [`error`] - Internal failure taxonomy (the public API degrades to `false`)
//! - [`sigv4`] - Verification entry point and outbound signing

pub mod canonical;
pub mod error;
pub mod sigv4;

pub use error::AuthError;
pub use sigv4::{OutboundSignature, UNSIGNED_PAYLOAD, sign_outbound, verify};
