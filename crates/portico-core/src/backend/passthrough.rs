//! Passthrough backend: re-signed forwarding to a native S3-compatible store.
//!
//! Each operation maps one-to-one onto the upstream's own S3 surface; the
//! only work done here is re-signing (the gateway verified the caller's
//! signature and now signs with its upstream credentials) and taxonomy
//! normalization. Bodies stream through in both directions.

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::header::{CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::{Client, Method};

use portico_auth::canonical::uri_encode;
use portico_auth::sign_outbound;

use crate::backend::{
    ByteStream, GetResult, ListEntry, ObjectAddress, ObjectMeta, PutResult, StorageBackend,
};
use crate::error::{GatewayError, GatewayResult};

/// Storage backend that forwards to a native S3-compatible endpoint.
pub struct PassthroughBackend {
    client: Client,
    endpoint: String,
    host: String,
    region: String,
    access_key: String,
    secret_key: String,
}

impl std::fmt::Debug for PassthroughBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassthroughBackend")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl PassthroughBackend {
    /// Create a backend for the given endpoint and upstream credentials.
    ///
    /// # Errors
    ///
    /// Fails when the endpoint is not a valid absolute URL.
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> GatewayResult<Self> {
        let endpoint = endpoint.into();
        let url = reqwest::Url::parse(&endpoint).map_err(|e| {
            GatewayError::Internal(anyhow::anyhow!("invalid upstream endpoint {endpoint}: {e}"))
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| {
                GatewayError::Internal(anyhow::anyhow!("upstream endpoint {endpoint} has no host"))
            })?
            .to_owned();
        // The signed host value carries the port only when it is not the
        // scheme default, matching how inbound verification synthesizes it.
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };

        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            host,
            region: region.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        })
    }

    /// Percent-encoded object path: `/{bucket}/{key segments}`.
    fn object_path(addr: &ObjectAddress) -> String {
        let encoded_key = addr
            .key
            .split('/')
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/");
        format!("/{}/{}", addr.bucket, encoded_key)
    }

    /// Sign and send one upstream request.
    async fn send(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Option<ByteStream>,
    ) -> GatewayResult<reqwest::Response> {
        let signed = sign_outbound(
            method.as_str(),
            path,
            "",
            &self.host,
            &self.access_key,
            &self.secret_key,
            &self.region,
            Utc::now(),
        );

        let mut request = self
            .client
            .request(method, format!("{}{path}", self.endpoint))
            .header(http::header::AUTHORIZATION, &signed.authorization)
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256);

        if let Some(ct) = content_type {
            request = request.header(CONTENT_TYPE, ct);
        }
        if let Some(body) = body {
            request = request.body(reqwest::Body::wrap_stream(body));
        }

        request.send().await.map_err(|e| GatewayError::Upstream {
            status: None,
            message: format!("upstream request failed: {e}"),
        })
    }
}

#[async_trait::async_trait]
impl StorageBackend for PassthroughBackend {
    async fn put(
        &self,
        addr: &ObjectAddress,
        content_type: &str,
        body: ByteStream,
    ) -> GatewayResult<PutResult> {
        let path = Self::object_path(addr);
        let response = self
            .send(Method::PUT, &path, Some(content_type), Some(body))
            .await?;

        let response = check_status(response, &addr.key).await?;
        Ok(PutResult {
            id: None,
            name: addr.leaf_name().map(ToOwned::to_owned),
            etag: header_etag(&response),
        })
    }

    async fn get(&self, addr: &ObjectAddress) -> GatewayResult<GetResult> {
        let path = Self::object_path(addr);
        let response = self.send(Method::GET, &path, None, None).await?;
        let response = check_status(response, &addr.key).await?;

        let meta = header_meta(&response);
        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::other(e.to_string())),
        );

        Ok(GetResult { meta, body })
    }

    async fn head(&self, addr: &ObjectAddress) -> GatewayResult<ObjectMeta> {
        let path = Self::object_path(addr);
        let response = self.send(Method::HEAD, &path, None, None).await?;
        let response = check_status(response, &addr.key).await?;
        Ok(header_meta(&response))
    }

    async fn delete(&self, addr: &ObjectAddress) -> GatewayResult<()> {
        let path = Self::object_path(addr);
        let response = self.send(Method::DELETE, &path, None, None).await?;
        check_status(response, &addr.key).await?;
        Ok(())
    }

    async fn list(&self, bucket: &str) -> GatewayResult<Vec<ListEntry>> {
        let path = format!("/{bucket}");
        let response = self.send(Method::GET, &path, None, None).await?;
        let response = check_status(response, bucket).await?;

        let xml = response.bytes().await.map_err(|e| GatewayError::Upstream {
            status: None,
            message: format!("failed reading upstream listing: {e}"),
        })?;
        parse_list_xml(&xml)
    }
}

/// Map upstream statuses onto the gateway taxonomy.
async fn check_status(
    response: reqwest::Response,
    key: &str,
) -> GatewayResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(GatewayError::not_found(key));
    }
    let mut body = response.text().await.unwrap_or_default();
    body.truncate(200);
    Err(GatewayError::upstream(
        status.as_u16(),
        format!("upstream responded with status {status}: {body}"),
    ))
}

/// ETag from a response, with surrounding quotes stripped.
fn header_etag(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_owned())
}

/// Object metadata from upstream response headers.
fn header_meta(response: &reqwest::Response) -> ObjectMeta {
    ObjectMeta {
        content_type: response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned),
        content_length: response.content_length(),
        etag: header_etag(response),
        last_modified: response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Parse the `Contents` entries out of an upstream `ListBucketResult`.
fn parse_list_xml(xml: &[u8]) -> GatewayResult<Vec<ListEntry>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<ListEntry> = None;
    let mut field: Option<String> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                if name == "Contents" {
                    current = Some(ListEntry {
                        key: String::new(),
                        last_modified: None,
                        etag: None,
                        size: 0,
                    });
                } else if current.is_some() {
                    field = Some(name);
                }
            }
            Event::Text(text) => {
                if let (Some(entry), Some(name)) = (current.as_mut(), field.as_deref()) {
                    let value = text.unescape().map_err(xml_error)?.into_owned();
                    match name {
                        "Key" => entry.key = value,
                        "LastModified" => {
                            entry.last_modified = DateTime::parse_from_rfc3339(&value)
                                .ok()
                                .map(|dt| dt.with_timezone(&Utc));
                        }
                        "ETag" => entry.etag = Some(value.trim_matches('"').to_owned()),
                        "Size" => entry.size = value.parse().unwrap_or(0),
                        _ => {}
                    }
                }
            }
            Event::End(end) => {
                let name = end.name();
                if name.as_ref() == b"Contents" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                } else {
                    field = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

fn xml_error(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::Upstream {
        status: None,
        message: format!("unparseable upstream listing: {err}"),
    }
}
