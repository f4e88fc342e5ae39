//! The gateway request pipeline and hyper `Service` implementation.
//!
//! [`Gateway`] ties together routing, the bucket allow-list, signature
//! verification, the response cache, and backend dispatch into a single
//! request pipeline:
//!
//! 1. Health check interception (`GET /_health`)
//! 2. CORS preflight requests (`OPTIONS`, answered 204 with no auth)
//! 3. Method filtering (anything but GET/PUT/HEAD/DELETE is a 405)
//! 4. Routing via [`routing::resolve`]
//! 5. Bucket allow-list enforcement, before any signature work
//! 6. SigV4 verification via `portico-auth`
//! 7. Response-cache consultation for GET/HEAD
//! 8. Dispatch to the configured [`StorageBackend`]
//! 9. Cache population (GET) and invalidation (PUT/DELETE)
//! 10. Common response headers (`x-amz-request-id`, `Server`)
//!
//! [`GatewayService`] wraps a shared [`Gateway`] as a hyper-compatible
//! service. Every failure is turned into a response inside the pipeline;
//! nothing escapes to the connection as an unhandled fault.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use hyper::body::Incoming;
use hyper::service::Service;
use tracing::{debug, info, warn};
use uuid::Uuid;

use portico_core::backend::{ByteStream, ObjectAddress, StorageBackend};
use portico_core::config::GatewayConfig;
use portico_core::error::{GatewayError, GatewayResult};
use portico_core::response_cache::{CachedResponse, ResponseCache};

use crate::body::GatewayBody;
use crate::response;
use crate::routing::{self, Operation};
use crate::xml;

/// Fallback content type when a PUT carries none.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// The gateway: one configured backend, one response cache, one key pair.
pub struct Gateway {
    config: GatewayConfig,
    backend: Arc<dyn StorageBackend>,
    cache: ResponseCache,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("backend", &self.config.backend)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Create a gateway over the given backend and response cache.
    #[must_use]
    pub fn new(config: GatewayConfig, backend: Arc<dyn StorageBackend>, cache: ResponseCache) -> Self {
        Self {
            config,
            backend,
            cache,
        }
    }

    /// Run one request through the full pipeline.
    ///
    /// This never fails: every error becomes a shaped error response, and a
    /// `HEAD` error response carries no body.
    pub async fn process(
        &self,
        parts: http::request::Parts,
        body: ByteStream,
        request_id: &str,
    ) -> http::Response<GatewayBody> {
        let method = parts.method.clone();
        let path = parts.uri.path().to_owned();
        debug!(%method, %path, request_id, "processing request");

        if method == http::Method::GET && path == "/_health" {
            return health_response();
        }
        if method == http::Method::OPTIONS {
            return response::options_response();
        }
        if !matches!(
            method,
            http::Method::GET | http::Method::PUT | http::Method::HEAD | http::Method::DELETE
        ) {
            return response::method_not_allowed();
        }

        let is_head = method == http::Method::HEAD;
        match self.handle(&parts, body, request_id).await {
            Ok(response) => response,
            Err(err) => {
                debug!(%method, %path, error = %err, request_id, "request failed");
                response::error_response(&err, is_head)
            }
        }
    }

    /// The fallible part of the pipeline: route, authorize, dispatch.
    async fn handle(
        &self,
        parts: &http::request::Parts,
        body: ByteStream,
        request_id: &str,
    ) -> GatewayResult<http::Response<GatewayBody>> {
        let route = routing::resolve(&parts.method, parts.uri.path())?;
        let bucket = route.address.bucket.as_str();
        let key = route.address.key.as_str();

        // The allow-list is enforced before signature verification; a
        // refused bucket never costs a signature computation or a backend
        // call.
        if !self.config.bucket_allowed(bucket) {
            warn!(bucket, request_id, "bucket not on the allow-list");
            return Err(GatewayError::AccessDenied {
                bucket: bucket.to_owned(),
            });
        }

        if !portico_auth::verify(
            parts,
            &self.config.access_key_id,
            &self.config.secret_access_key,
            &self.config.signing_region,
        ) {
            warn!(bucket, key, request_id, "signature verification failed");
            return Err(GatewayError::InvalidSignature);
        }

        info!(
            operation = ?route.operation,
            bucket,
            key,
            request_id,
            "routed request"
        );

        match route.operation {
            Operation::GetObject => self.get_object(&route.address).await,
            Operation::HeadObject => self.head_object(&route.address).await,
            Operation::PutObject => self.put_object(&route.address, parts, body).await,
            Operation::DeleteObject => self.delete_object(&route.address).await,
            Operation::ListBucket => self.list_bucket(bucket).await,
        }
    }

    /// `GET /{bucket}/{key}`: cache lookup, then a streamed backend read
    /// teed into the cache.
    async fn get_object(&self, addr: &ObjectAddress) -> GatewayResult<http::Response<GatewayBody>> {
        if let Some(cached) = self.cache.lookup(&addr.bucket, &addr.key).await {
            debug!(bucket = %addr.bucket, key = %addr.key, "serving GET from cache");
            return Ok(response::from_cached(&cached, false));
        }

        let result = self.backend.get(addr).await?;
        let headers = response::object_headers(&result.meta);
        let teed = CacheTee::wrap(
            result.body,
            self.cache.clone(),
            addr.clone(),
            headers.clone(),
        );
        Ok(response::object_response(
            &headers,
            GatewayBody::streaming(teed),
        ))
    }

    /// `HEAD /{bucket}/{key}`: served from a cached GET when one exists;
    /// a HEAD alone never populates the cache.
    async fn head_object(&self, addr: &ObjectAddress) -> GatewayResult<http::Response<GatewayBody>> {
        if let Some(cached) = self.cache.lookup(&addr.bucket, &addr.key).await {
            debug!(bucket = %addr.bucket, key = %addr.key, "serving HEAD from cache");
            return Ok(response::from_cached(&cached, true));
        }

        let meta = self.backend.head(addr).await?;
        let headers = response::object_headers(&meta);
        Ok(response::object_response(&headers, GatewayBody::empty()))
    }

    /// `PUT /{bucket}/{key}`: invalidate the cache entry up front, then
    /// stream the body into the backend.
    async fn put_object(
        &self,
        addr: &ObjectAddress,
        parts: &http::request::Parts,
        body: ByteStream,
    ) -> GatewayResult<http::Response<GatewayBody>> {
        // Invalidation is scheduled before the backend call and sticks
        // regardless of its outcome; a failed mutation costs a cache miss,
        // never a stale read.
        self.cache.invalidate(&addr.bucket, &addr.key);

        let content_type = parts
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let result = self.backend.put(addr, content_type, body).await?;
        Ok(response::put_response(&result))
    }

    /// `DELETE /{bucket}/{key}`: invalidate, delete, 204.
    async fn delete_object(&self, addr: &ObjectAddress) -> GatewayResult<http::Response<GatewayBody>> {
        self.cache.invalidate(&addr.bucket, &addr.key);
        self.backend.delete(addr).await?;
        Ok(response::delete_response())
    }

    /// `GET /{bucket}`: bucket-root listing as a `ListBucketResult` document.
    async fn list_bucket(&self, bucket: &str) -> GatewayResult<http::Response<GatewayBody>> {
        let entries = self.backend.list(bucket).await?;
        let xml = xml::list_bucket_result(bucket, &entries)
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("listing serialization: {e}")))?;
        Ok(response::list_response(xml))
    }
}

/// Stream adapter that forwards chunks to the caller while accumulating a
/// copy for the response cache.
///
/// The copy is handed to [`ResponseCache::store`] only when the stream ends
/// cleanly; the store itself runs on a background task, so the response path
/// never waits on the cache. Accumulation stops permanently once the body
/// exceeds the cache's size ceiling, keeping memory bounded for large
/// objects.
struct CacheTee {
    inner: ByteStream,
    cache: ResponseCache,
    addr: ObjectAddress,
    headers: Vec<(String, String)>,
    /// `None` once the body is over the ceiling or the stream has errored.
    buffer: Option<Vec<u8>>,
}

impl CacheTee {
    fn wrap(
        inner: ByteStream,
        cache: ResponseCache,
        addr: ObjectAddress,
        headers: Vec<(String, String)>,
    ) -> ByteStream {
        Box::pin(Self {
            inner,
            cache,
            addr,
            headers,
            buffer: Some(Vec::new()),
        })
    }
}

impl Stream for CacheTee {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(buffer) = &mut this.buffer {
                    if buffer.len() + chunk.len() <= this.cache.max_body() {
                        buffer.extend_from_slice(&chunk);
                    } else {
                        this.buffer = None;
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                // A truncated body must never be cached.
                this.buffer = None;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                if let Some(body) = this.buffer.take() {
                    this.cache.store(
                        &this.addr.bucket,
                        &this.addr.key,
                        CachedResponse {
                            status: 200,
                            headers: std::mem::take(&mut this.headers),
                            body,
                        },
                    );
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Hyper-compatible service over a shared [`Gateway`].
#[derive(Debug, Clone)]
pub struct GatewayService {
    gateway: Arc<Gateway>,
}

impl GatewayService {
    /// Create a service owning its gateway.
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }

    /// Create a service from an already-shared gateway.
    #[must_use]
    pub fn from_shared(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

impl Service<http::Request<Incoming>> for GatewayService {
    type Response = http::Response<GatewayBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let gateway = Arc::clone(&self.gateway);

        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            let (parts, incoming) = req.into_parts();
            let response = gateway
                .process(parts, incoming_stream(incoming), &request_id)
                .await;
            Ok(add_common_headers(response, &request_id))
        })
    }
}

/// Adapt a hyper request body into the backend byte-stream type, dropping
/// non-data frames (trailers).
fn incoming_stream(incoming: Incoming) -> ByteStream {
    Box::pin(
        http_body_util::BodyStream::new(incoming).filter_map(|frame| async move {
            match frame {
                Ok(frame) => frame.into_data().ok().map(Ok),
                Err(err) => Some(Err(std::io::Error::other(err))),
            }
        }),
    )
}

/// The gateway health probe response.
fn health_response() -> http::Response<GatewayBody> {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(GatewayBody::from_string(
            r#"{"status":"running","service":"portico"}"#,
        ))
        .expect("static health response should be valid")
}

/// Add common response headers to every gateway response.
fn add_common_headers(
    mut response: http::Response<GatewayBody>,
    request_id: &str,
) -> http::Response<GatewayBody> {
    let headers = response.headers_mut();

    if let Ok(hv) = http::header::HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", hv);
    }
    headers.insert("Server", http::header::HeaderValue::from_static("Portico"));
    headers.insert(
        "Access-Control-Allow-Origin",
        http::header::HeaderValue::from_static("*"),
    );
    headers.insert(
        "Access-Control-Expose-Headers",
        http::header::HeaderValue::from_static("x-amz-request-id, ETag"),
    );

    response
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use futures::TryStreamExt;
    use http_body_util::BodyExt;

    use portico_auth::sign_outbound;
    use portico_core::backend::{
        GetResult, ListEntry, ObjectMeta, PutResult, stream_from_bytes,
    };
    use portico_core::config::BackendKind;
    use portico_core::kv::InMemoryKv;

    use super::*;

    const ACCESS_KEY: &str = "GWACCESSKEY";
    const SECRET_KEY: &str = "gw-secret-key";
    const REGION: &str = "us-east-1";
    const HOST: &str = "gateway.test";

    /// In-memory backend double that counts every call, so tests can assert
    /// whether the cache or the backend served a read.
    #[derive(Default)]
    struct CountingBackend {
        objects: Mutex<HashMap<(String, String), (String, Vec<u8>)>>,
        get_calls: AtomicUsize,
        head_calls: AtomicUsize,
        put_calls: AtomicUsize,
        delete_calls: AtomicUsize,
        list_calls: AtomicUsize,
    }

    impl CountingBackend {
        fn total_calls(&self) -> usize {
            self.get_calls.load(Ordering::SeqCst)
                + self.head_calls.load(Ordering::SeqCst)
                + self.put_calls.load(Ordering::SeqCst)
                + self.delete_calls.load(Ordering::SeqCst)
                + self.list_calls.load(Ordering::SeqCst)
        }

        fn meta_for(content_type: &str, body: &[u8]) -> ObjectMeta {
            ObjectMeta {
                content_type: Some(content_type.to_owned()),
                content_length: Some(body.len() as u64),
                etag: Some(format!("etag-{}", body.len())),
                last_modified: Some(Utc::now()),
            }
        }
    }

    #[async_trait]
    impl StorageBackend for CountingBackend {
        async fn put(
            &self,
            addr: &ObjectAddress,
            content_type: &str,
            body: ByteStream,
        ) -> GatewayResult<PutResult> {
            self.put_calls.fetch_add(1, Ordering::SeqCst);
            let chunks: Vec<Bytes> = body
                .try_collect()
                .await
                .map_err(|e| GatewayError::upstream(500, e.to_string()))?;
            let data = chunks.concat();
            let etag = format!("etag-{}", data.len());
            self.objects.lock().expect("test lock").insert(
                (addr.bucket.clone(), addr.key.clone()),
                (content_type.to_owned(), data),
            );
            Ok(PutResult {
                id: Some("obj-1".to_owned()),
                name: addr.leaf_name().map(ToOwned::to_owned),
                etag: Some(etag),
            })
        }

        async fn get(&self, addr: &ObjectAddress) -> GatewayResult<GetResult> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            let objects = self.objects.lock().expect("test lock");
            let (content_type, data) = objects
                .get(&(addr.bucket.clone(), addr.key.clone()))
                .ok_or_else(|| GatewayError::not_found(&addr.key))?;
            Ok(GetResult {
                meta: Self::meta_for(content_type, data),
                body: stream_from_bytes(Bytes::from(data.clone())),
            })
        }

        async fn head(&self, addr: &ObjectAddress) -> GatewayResult<ObjectMeta> {
            self.head_calls.fetch_add(1, Ordering::SeqCst);
            let objects = self.objects.lock().expect("test lock");
            let (content_type, data) = objects
                .get(&(addr.bucket.clone(), addr.key.clone()))
                .ok_or_else(|| GatewayError::not_found(&addr.key))?;
            Ok(Self::meta_for(content_type, data))
        }

        async fn delete(&self, addr: &ObjectAddress) -> GatewayResult<()> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            self.objects
                .lock()
                .expect("test lock")
                .remove(&(addr.bucket.clone(), addr.key.clone()))
                .map(|_| ())
                .ok_or_else(|| GatewayError::not_found(&addr.key))
        }

        async fn list(&self, bucket: &str) -> GatewayResult<Vec<ListEntry>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let objects = self.objects.lock().expect("test lock");
            let mut entries: Vec<ListEntry> = objects
                .iter()
                .filter(|((b, _), _)| b == bucket)
                .map(|((_, key), (_, data))| ListEntry {
                    key: key.clone(),
                    last_modified: Some(Utc::now()),
                    etag: Some(format!("etag-{}", data.len())),
                    size: data.len() as u64,
                })
                .collect();
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(entries)
        }
    }

    struct TestGateway {
        gateway: Gateway,
        backend: Arc<CountingBackend>,
        cache: ResponseCache,
    }

    fn test_gateway() -> TestGateway {
        let config = GatewayConfig::builder()
            .access_key_id(ACCESS_KEY.into())
            .secret_access_key(SECRET_KEY.into())
            .allowed_buckets(vec!["test-bucket".to_owned()])
            .backend(BackendKind::Hierarchical)
            .build();
        let backend = Arc::new(CountingBackend::default());
        let cache = ResponseCache::new(Arc::new(InMemoryKv::new()), Duration::from_secs(60), 1024);
        let gateway = Gateway::new(config, Arc::clone(&backend) as Arc<dyn StorageBackend>, cache.clone());
        TestGateway {
            gateway,
            backend,
            cache,
        }
    }

    /// Build request parts with a valid signature for the gateway's key pair.
    fn signed_parts(method: &str, path: &str, content_type: Option<&str>) -> http::request::Parts {
        let signed = sign_outbound(method, path, "", HOST, ACCESS_KEY, SECRET_KEY, REGION, Utc::now());

        let mut builder = http::Request::builder()
            .method(method)
            .uri(format!("http://{HOST}{path}"))
            .header("host", HOST)
            .header("x-amz-content-sha256", signed.content_sha256)
            .header("x-amz-date", &signed.amz_date)
            .header(http::header::AUTHORIZATION, &signed.authorization);
        if let Some(ct) = content_type {
            builder = builder.header(http::header::CONTENT_TYPE, ct);
        }
        let (parts, ()) = builder.body(()).expect("valid request").into_parts();
        parts
    }

    fn unsigned_parts(method: &str, path: &str) -> http::request::Parts {
        let (parts, ()) = http::Request::builder()
            .method(method)
            .uri(format!("http://{HOST}{path}"))
            .header("host", HOST)
            .body(())
            .expect("valid request")
            .into_parts();
        parts
    }

    fn empty_body() -> ByteStream {
        stream_from_bytes(Bytes::new())
    }

    async fn body_bytes(response: http::Response<GatewayBody>) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .expect("body should collect")
            .to_bytes()
            .to_vec()
    }

    async fn wait_for_cache(cache: &ResponseCache, bucket: &str, key: &str) {
        for _ in 0..100 {
            if cache.lookup(bucket, key).await.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("cache entry for {bucket}/{key} never appeared");
    }

    async fn wait_for_invalidation(cache: &ResponseCache, bucket: &str, key: &str) {
        for _ in 0..100 {
            if cache.lookup(bucket, key).await.is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("cache entry for {bucket}/{key} survived invalidation");
    }

    async fn put_hello(t: &TestGateway) {
        let parts = signed_parts("PUT", "/test-bucket/test-file.txt", Some("text/plain"));
        let response = t
            .gateway
            .process(parts, stream_from_bytes(Bytes::from("Hello World")), "rid")
            .await;
        assert_eq!(response.status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_should_return_json_with_etag_on_put() {
        let t = test_gateway();
        let parts = signed_parts("PUT", "/test-bucket/test-file.txt", Some("text/plain"));
        let response = t
            .gateway
            .process(parts, stream_from_bytes(Bytes::from("Hello World")), "rid")
            .await;

        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("application/json"),
        );
        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).expect("JSON body");
        assert!(body.get("etag").is_some());
        assert_eq!(body.get("name").and_then(|v| v.as_str()), Some("test-file.txt"));
    }

    #[tokio::test]
    async fn test_should_round_trip_put_then_get() {
        let t = test_gateway();
        put_hello(&t).await;

        let parts = signed_parts("GET", "/test-bucket/test-file.txt", None);
        let response = t.gateway.process(parts, empty_body(), "rid").await;

        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("text/plain"),
        );
        assert_eq!(
            response.headers().get("etag").and_then(|v| v.to_str().ok()),
            Some("\"etag-11\""),
        );
        assert!(response.headers().contains_key("cache-control"));
        assert_eq!(body_bytes(response).await, b"Hello World");
    }

    #[tokio::test]
    async fn test_should_serve_second_get_from_cache() {
        let t = test_gateway();
        put_hello(&t).await;

        let first = t
            .gateway
            .process(signed_parts("GET", "/test-bucket/test-file.txt", None), empty_body(), "rid")
            .await;
        let first_body = body_bytes(first).await;
        assert_eq!(t.backend.get_calls.load(Ordering::SeqCst), 1);

        // The tee stores the entry after the body has been drained.
        wait_for_cache(&t.cache, "test-bucket", "test-file.txt").await;

        let second = t
            .gateway
            .process(signed_parts("GET", "/test-bucket/test-file.txt", None), empty_body(), "rid")
            .await;
        assert_eq!(second.status(), http::StatusCode::OK);
        assert_eq!(body_bytes(second).await, first_body);
        assert_eq!(t.backend.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_should_refetch_after_put_invalidates_cache() {
        let t = test_gateway();
        put_hello(&t).await;

        let first = t
            .gateway
            .process(signed_parts("GET", "/test-bucket/test-file.txt", None), empty_body(), "rid")
            .await;
        body_bytes(first).await;
        wait_for_cache(&t.cache, "test-bucket", "test-file.txt").await;

        // Overwrite the object; the entry must be gone before the next GET.
        let parts = signed_parts("PUT", "/test-bucket/test-file.txt", Some("text/plain"));
        t.gateway
            .process(parts, stream_from_bytes(Bytes::from("Hello Again!")), "rid")
            .await;
        wait_for_invalidation(&t.cache, "test-bucket", "test-file.txt").await;

        let second = t
            .gateway
            .process(signed_parts("GET", "/test-bucket/test-file.txt", None), empty_body(), "rid")
            .await;
        assert_eq!(body_bytes(second).await, b"Hello Again!");
        assert_eq!(t.backend.get_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_should_serve_head_from_get_cache_entry() {
        let t = test_gateway();
        put_hello(&t).await;

        let get = t
            .gateway
            .process(signed_parts("GET", "/test-bucket/test-file.txt", None), empty_body(), "rid")
            .await;
        body_bytes(get).await;
        wait_for_cache(&t.cache, "test-bucket", "test-file.txt").await;

        let head = t
            .gateway
            .process(signed_parts("HEAD", "/test-bucket/test-file.txt", None), empty_body(), "rid")
            .await;
        assert_eq!(head.status(), http::StatusCode::OK);
        assert_eq!(
            head.headers().get("etag").and_then(|v| v.to_str().ok()),
            Some("\"etag-11\""),
        );
        assert!(body_bytes(head).await.is_empty());
        // The HEAD was answered from the GET's entry.
        assert_eq!(t.backend.head_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_should_not_populate_cache_from_head_alone() {
        let t = test_gateway();
        put_hello(&t).await;

        let head = t
            .gateway
            .process(signed_parts("HEAD", "/test-bucket/test-file.txt", None), empty_body(), "rid")
            .await;
        assert_eq!(head.status(), http::StatusCode::OK);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(t.cache.lookup("test-bucket", "test-file.txt").await.is_none());
    }

    #[tokio::test]
    async fn test_should_return_404_with_no_such_key_body() {
        let t = test_gateway();
        let parts = signed_parts("GET", "/test-bucket/missing.txt", None);
        let response = t.gateway.process(parts, empty_body(), "rid").await;

        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
        assert_eq!(body_bytes(response).await, b"NoSuchKey");
    }

    #[tokio::test]
    async fn test_should_return_404_after_delete() {
        let t = test_gateway();
        put_hello(&t).await;

        let delete = t
            .gateway
            .process(signed_parts("DELETE", "/test-bucket/test-file.txt", None), empty_body(), "rid")
            .await;
        assert_eq!(delete.status(), http::StatusCode::NO_CONTENT);
        wait_for_invalidation(&t.cache, "test-bucket", "test-file.txt").await;

        let get = t
            .gateway
            .process(signed_parts("GET", "/test-bucket/test-file.txt", None), empty_body(), "rid")
            .await;
        assert_eq!(get.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_should_refuse_forbidden_bucket_without_backend_calls() {
        let t = test_gateway();
        let parts = signed_parts("GET", "/forbidden-bucket/x", None);
        let response = t.gateway.process(parts, empty_body(), "rid").await;

        assert_eq!(response.status(), http::StatusCode::FORBIDDEN);
        assert_eq!(body_bytes(response).await, b"Access denied to this bucket");
        assert_eq!(t.backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_should_refuse_unsigned_request() {
        let t = test_gateway();
        let parts = unsigned_parts("GET", "/test-bucket/test-file.txt");
        let response = t.gateway.process(parts, empty_body(), "rid").await;

        assert_eq!(response.status(), http::StatusCode::FORBIDDEN);
        assert_eq!(t.backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_should_refuse_tampered_signature() {
        let t = test_gateway();
        let mut parts = signed_parts("GET", "/test-bucket/test-file.txt", None);
        let auth = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .expect("auth header")
            .to_owned();
        let tampered = if auth.ends_with('0') {
            format!("{}1", &auth[..auth.len() - 1])
        } else {
            format!("{}0", &auth[..auth.len() - 1])
        };
        parts.headers.insert(
            http::header::AUTHORIZATION,
            http::header::HeaderValue::from_str(&tampered).expect("header value"),
        );

        let response = t.gateway.process(parts, empty_body(), "rid").await;
        assert_eq!(response.status(), http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_should_answer_options_without_auth() {
        let t = test_gateway();
        let parts = unsigned_parts("OPTIONS", "/test-bucket/anything");
        let response = t.gateway.process(parts, empty_body(), "rid").await;

        assert_eq!(response.status(), http::StatusCode::NO_CONTENT);
        assert_eq!(t.backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_should_answer_405_for_unsupported_method() {
        let t = test_gateway();
        let parts = unsigned_parts("POST", "/test-bucket/key");
        let response = t.gateway.process(parts, empty_body(), "rid").await;

        assert_eq!(response.status(), http::StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(t.backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_should_answer_health_probe_without_auth() {
        let t = test_gateway();
        let parts = unsigned_parts("GET", "/_health");
        let response = t.gateway.process(parts, empty_body(), "rid").await;

        assert_eq!(response.status(), http::StatusCode::OK);
        let body = body_bytes(response).await;
        assert!(String::from_utf8_lossy(&body).contains("running"));
    }

    #[tokio::test]
    async fn test_should_list_empty_bucket_without_contents() {
        let t = test_gateway();
        let parts = signed_parts("GET", "/test-bucket", None);
        let response = t.gateway.process(parts, empty_body(), "rid").await;

        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("application/xml"),
        );
        let body = String::from_utf8(body_bytes(response).await).expect("UTF-8 XML");
        assert!(body.contains("<ListBucketResult"));
        assert!(!body.contains("<Contents>"));
    }

    #[tokio::test]
    async fn test_should_list_populated_bucket() {
        let t = test_gateway();
        put_hello(&t).await;

        let parts = signed_parts("GET", "/test-bucket/", None);
        let response = t.gateway.process(parts, empty_body(), "rid").await;

        assert_eq!(response.status(), http::StatusCode::OK);
        let body = String::from_utf8(body_bytes(response).await).expect("UTF-8 XML");
        assert!(body.contains("<Key>test-file.txt</Key>"));
        assert!(body.contains("<Size>11</Size>"));
        assert!(body.contains("etag-11"));
    }

    #[tokio::test]
    async fn test_should_skip_caching_bodies_over_the_ceiling() {
        let t = test_gateway();

        // 2 KiB body against a 1 KiB cache ceiling.
        let parts = signed_parts("PUT", "/test-bucket/big.bin", None);
        t.gateway
            .process(parts, stream_from_bytes(Bytes::from(vec![0u8; 2048])), "rid")
            .await;

        let get = t
            .gateway
            .process(signed_parts("GET", "/test-bucket/big.bin", None), empty_body(), "rid")
            .await;
        assert_eq!(body_bytes(get).await.len(), 2048);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(t.cache.lookup("test-bucket", "big.bin").await.is_none());

        // A second GET therefore goes back to the backend.
        let second = t
            .gateway
            .process(signed_parts("GET", "/test-bucket/big.bin", None), empty_body(), "rid")
            .await;
        body_bytes(second).await;
        assert_eq!(t.backend.get_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_should_default_put_content_type_to_octet_stream() {
        let t = test_gateway();
        let parts = signed_parts("PUT", "/test-bucket/raw.bin", None);
        t.gateway
            .process(parts, stream_from_bytes(Bytes::from("data")), "rid")
            .await;

        let objects = t.backend.objects.lock().expect("test lock");
        let (content_type, _) = objects
            .get(&("test-bucket".to_owned(), "raw.bin".to_owned()))
            .expect("stored object");
        assert_eq!(content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_should_add_common_headers() {
        let response = http::Response::builder()
            .status(http::StatusCode::OK)
            .body(GatewayBody::empty())
            .expect("valid response");
        let response = add_common_headers(response, "req-1");

        assert_eq!(
            response
                .headers()
                .get("x-amz-request-id")
                .and_then(|v| v.to_str().ok()),
            Some("req-1"),
        );
        assert_eq!(
            response.headers().get("Server").and_then(|v| v.to_str().ok()),
            Some("Portico"),
        );
        assert!(response.headers().contains_key("Access-Control-Allow-Origin"));
    }
}
