//! Request routing: URI path to object address, method to operation.
//!
//! The surface is deliberately small: path-style addressing only, with the
//! first path segment as the bucket and the remainder as the key. `GET` on a
//! bare bucket is a listing; `PUT`, `HEAD`, and `DELETE` require an object
//! key.

use http::Method;
use percent_encoding::percent_decode_str;

use portico_core::backend::ObjectAddress;
use portico_core::error::{GatewayError, GatewayResult};

/// The S3-style operation a request resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `PUT /{bucket}/{key}` - store an object.
    PutObject,
    /// `GET /{bucket}/{key}` - fetch an object.
    GetObject,
    /// `HEAD /{bucket}/{key}` - fetch object metadata.
    HeadObject,
    /// `DELETE /{bucket}/{key}` - delete an object.
    DeleteObject,
    /// `GET /{bucket}` - list the bucket root.
    ListBucket,
}

/// A routed request: the address plus the identified operation.
#[derive(Debug, Clone)]
pub struct Route {
    /// The bucket/key pair the request addresses.
    pub address: ObjectAddress,
    /// The identified operation.
    pub operation: Operation,
}

/// Resolve a request's method and path into a [`Route`].
///
/// # Errors
///
/// Returns `InvalidRequest` when the path carries no bucket, or when a
/// method that needs an object key is used against a bare bucket.
pub fn resolve(method: &Method, path: &str) -> GatewayResult<Route> {
    let (bucket, key) = parse_path(path);

    let Some(bucket) = bucket else {
        return Err(GatewayError::InvalidRequest {
            message: "missing bucket in request path".to_owned(),
        });
    };

    let has_key = !key.is_empty();
    let operation = match *method {
        Method::GET if has_key => Operation::GetObject,
        Method::GET => Operation::ListBucket,
        Method::PUT | Method::HEAD | Method::DELETE if !has_key => {
            return Err(GatewayError::InvalidRequest {
                message: "missing object key".to_owned(),
            });
        }
        Method::PUT => Operation::PutObject,
        Method::HEAD => Operation::HeadObject,
        Method::DELETE => Operation::DeleteObject,
        // Unsupported methods are answered with 405 before routing.
        _ => {
            return Err(GatewayError::InvalidRequest {
                message: format!("unroutable method {method}"),
            });
        }
    };

    Ok(Route {
        address: ObjectAddress::new(bucket, key),
        operation,
    })
}

/// Parse `/{bucket}/{key...}` into its decoded components.
fn parse_path(path: &str) -> (Option<String>, String) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return (None, String::new());
    }

    match trimmed.split_once('/') {
        Some((bucket, key)) => (Some(decode(bucket)), decode(key)),
        None => (Some(decode(trimmed)), String::new()),
    }
}

fn decode(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}
