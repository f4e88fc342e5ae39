//! Response shaping for the S3-compatible surface.
//!
//! Success shapes:
//! - `PUT` → 200 with a small JSON body carrying the etag and, for the
//!   hierarchical backend, the assigned id/name.
//! - `GET` → 200 with the streamed body and `Content-Type` /
//!   `Content-Length` / `ETag` / `Cache-Control` headers.
//! - `HEAD` → 200, same headers, no body.
//! - `DELETE` → 204, no body.
//! - Listing → 200 `application/xml`.
//!
//! Error bodies are short plain text (`NoSuchKey`, `Access denied to this
//! bucket`, the upstream error message); a 404 answered to a `HEAD` carries
//! no body at all.

use http::header::HeaderValue;
use http::{Response, StatusCode};

use portico_core::backend::{ObjectMeta, PutResult};
use portico_core::error::GatewayError;
use portico_core::response_cache::CachedResponse;

use crate::body::GatewayBody;

/// Cache hint attached to successful object reads for downstream caches.
const CACHE_CONTROL_HINT: &str = "public, max-age=60";

/// Shape a `PUT` result as a 200 with a JSON body.
#[must_use]
pub fn put_response(result: &PutResult) -> Response<GatewayBody> {
    let mut body = serde_json::Map::new();
    if let Some(etag) = &result.etag {
        body.insert(
            "etag".to_owned(),
            serde_json::Value::String(format!("\"{etag}\"")),
        );
    }
    if let Some(id) = &result.id {
        body.insert("id".to_owned(), serde_json::Value::String(id.clone()));
    }
    if let Some(name) = &result.name {
        body.insert("name".to_owned(), serde_json::Value::String(name.clone()));
    }

    let json = serde_json::Value::Object(body).to_string();
    build(
        Response::builder()
            .status(StatusCode::OK)
            .header(http::header::CONTENT_TYPE, "application/json"),
        GatewayBody::from_string(json),
    )
}

/// Headers shared by `GET` and `HEAD` responses for an object.
///
/// Returned as a plain list so the same set can be stored in the response
/// cache verbatim.
#[must_use]
pub fn object_headers(meta: &ObjectMeta) -> Vec<(String, String)> {
    let mut headers = Vec::with_capacity(5);
    if let Some(content_type) = &meta.content_type {
        headers.push(("content-type".to_owned(), content_type.clone()));
    }
    if let Some(length) = meta.content_length {
        headers.push(("content-length".to_owned(), length.to_string()));
    }
    if let Some(etag) = &meta.etag {
        headers.push(("etag".to_owned(), format!("\"{etag}\"")));
    }
    if let Some(modified) = &meta.last_modified {
        headers.push((
            "last-modified".to_owned(),
            modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        ));
    }
    headers.push(("cache-control".to_owned(), CACHE_CONTROL_HINT.to_owned()));
    headers
}

/// Build a 200 with the given header list and body.
#[must_use]
pub fn object_response(headers: &[(String, String)], body: GatewayBody) -> Response<GatewayBody> {
    let mut builder = Response::builder().status(StatusCode::OK);
    for (name, value) in headers {
        if let Ok(hv) = HeaderValue::from_str(value) {
            builder = builder.header(name.as_str(), hv);
        }
    }
    build(builder, body)
}

/// Shape a `DELETE` confirmation: 204 with no body.
#[must_use]
pub fn delete_response() -> Response<GatewayBody> {
    build(
        Response::builder().status(StatusCode::NO_CONTENT),
        GatewayBody::empty(),
    )
}

/// Shape a bucket listing: 200 `application/xml`.
#[must_use]
pub fn list_response(xml: Vec<u8>) -> Response<GatewayBody> {
    build(
        Response::builder()
            .status(StatusCode::OK)
            .header(http::header::CONTENT_TYPE, "application/xml"),
        GatewayBody::from_bytes(xml),
    )
}

/// Shape the `OPTIONS` short-circuit: 204 immediately, no auth consulted.
#[must_use]
pub fn options_response() -> Response<GatewayBody> {
    build(
        Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("Access-Control-Allow-Origin", "*")
            .header(
                "Access-Control-Allow-Methods",
                "GET, PUT, DELETE, HEAD, OPTIONS",
            )
            .header("Access-Control-Allow-Headers", "*"),
        GatewayBody::empty(),
    )
}

/// Shape the response for an unsupported HTTP method.
#[must_use]
pub fn method_not_allowed() -> Response<GatewayBody> {
    build(
        Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header(http::header::ALLOW, "GET, PUT, DELETE, HEAD, OPTIONS"),
        GatewayBody::from_string("Method not allowed"),
    )
}

/// Map a gateway error onto its plain-text response.
///
/// `HEAD` responses never carry a body, so a not-found on HEAD is an empty
/// 404.
#[must_use]
pub fn error_response(err: &GatewayError, is_head: bool) -> Response<GatewayBody> {
    let status = err.status_code();
    let body = if is_head {
        GatewayBody::empty()
    } else {
        GatewayBody::from_string(err.to_string())
    };
    build(
        Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "text/plain"),
        body,
    )
}

/// Rehydrate a cached entry into a response; `HEAD` drops the body but
/// serves identical headers.
#[must_use]
pub fn from_cached(cached: &CachedResponse, is_head: bool) -> Response<GatewayBody> {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK));
    for (name, value) in &cached.headers {
        if let Ok(hv) = HeaderValue::from_str(value) {
            builder = builder.header(name.as_str(), hv);
        }
    }
    let body = if is_head {
        GatewayBody::empty()
    } else {
        GatewayBody::from_bytes(cached.body.clone())
    };
    build(builder, body)
}

/// Finalize a builder, falling back to a bare 500 if construction fails.
fn build(builder: http::response::Builder, body: GatewayBody) -> Response<GatewayBody> {
    builder.body(body).unwrap_or_else(|_| {
        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(GatewayBody::empty())
            .expect("static response should be valid")
    })
}
