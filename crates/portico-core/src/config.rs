//! Gateway configuration.
//!
//! Provides [`GatewayConfig`], loaded from environment variables via
//! [`GatewayConfig::from_env`]. The gateway itself holds one shared inbound
//! key pair and a bucket allow-list; each backend carries its own
//! credentials.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Which storage backend the gateway dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Forward each operation, re-signed, to a native S3-compatible endpoint.
    Passthrough,
    /// Emulate the flat key space on a tree-structured file-hosting API.
    Hierarchical,
}

impl BackendKind {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "passthrough" | "s3" => Some(Self::Passthrough),
            "hierarchical" | "tree" => Some(Self::Hierarchical),
            _ => None,
        }
    }
}

/// Gateway configuration.
///
/// All fields have defaults suitable for local development. Values are
/// loaded from environment variables via [`GatewayConfig::from_env`].
///
/// # Examples
///
/// ```
/// use portico_core::config::GatewayConfig;
///
/// let config = GatewayConfig::default();
/// assert_eq!(config.listen, "0.0.0.0:9000");
/// assert!(config.allowed_buckets.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Bind address for the gateway (e.g. `"0.0.0.0:9000"`).
    #[builder(default = String::from("0.0.0.0:9000"))]
    pub listen: String,

    /// Access key ID clients must sign inbound requests with.
    #[builder(default)]
    pub access_key_id: String,

    /// Secret access key paired with [`access_key_id`](Self::access_key_id).
    #[builder(default)]
    pub secret_access_key: String,

    /// Region inbound credential scopes must name.
    #[builder(default = String::from("us-east-1"))]
    pub signing_region: String,

    /// Buckets the gateway will serve; everything else is refused before
    /// signature verification.
    #[builder(default)]
    pub allowed_buckets: Vec<String>,

    /// Selected storage backend.
    #[builder(default = BackendKind::Hierarchical)]
    pub backend: BackendKind,

    /// Native S3-compatible endpoint for the passthrough backend.
    #[builder(default = String::from("http://127.0.0.1:9090"))]
    pub upstream_endpoint: String,

    /// Region the passthrough backend signs outbound requests for.
    #[builder(default = String::from("us-east-1"))]
    pub upstream_region: String,

    /// Access key ID for the passthrough backend.
    #[builder(default)]
    pub upstream_access_key_id: String,

    /// Secret access key for the passthrough backend.
    #[builder(default)]
    pub upstream_secret_access_key: String,

    /// Metadata/content endpoint of the tree-structured file-hosting API.
    #[builder(default = String::from("https://www.googleapis.com/drive/v3"))]
    pub hierarchical_endpoint: String,

    /// Resumable-upload endpoint of the file-hosting API.
    #[builder(default = String::from("https://www.googleapis.com/upload/drive/v3"))]
    pub hierarchical_upload_endpoint: String,

    /// Bearer token for the file-hosting API.
    #[builder(default)]
    pub hierarchical_token: String,

    /// How long resolved folder IDs stay cached, in seconds.
    #[builder(default = 600)]
    pub folder_cache_ttl_secs: u64,

    /// How long cached GET/HEAD responses stay valid, in seconds.
    #[builder(default = 60)]
    pub response_cache_ttl_secs: u64,

    /// Largest response body, in bytes, the response cache will retain.
    #[builder(default = 8_388_608)]
    pub response_cache_max_body: usize,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: String::from("0.0.0.0:9000"),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            signing_region: String::from("us-east-1"),
            allowed_buckets: Vec::new(),
            backend: BackendKind::Hierarchical,
            upstream_endpoint: String::from("http://127.0.0.1:9090"),
            upstream_region: String::from("us-east-1"),
            upstream_access_key_id: String::new(),
            upstream_secret_access_key: String::new(),
            hierarchical_endpoint: String::from("https://www.googleapis.com/drive/v3"),
            hierarchical_upload_endpoint: String::from("https://www.googleapis.com/upload/drive/v3"),
            hierarchical_token: String::new(),
            folder_cache_ttl_secs: 600,
            response_cache_ttl_secs: 60,
            response_cache_max_body: 8_388_608,
            log_level: String::from("info"),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following variables (falling back to defaults):
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GATEWAY_LISTEN` | `0.0.0.0:9000` |
    /// | `GATEWAY_ACCESS_KEY_ID` | *(empty)* |
    /// | `GATEWAY_SECRET_ACCESS_KEY` | *(empty)* |
    /// | `GATEWAY_SIGNING_REGION` | `us-east-1` |
    /// | `GATEWAY_ALLOWED_BUCKETS` | *(empty, comma-separated)* |
    /// | `GATEWAY_BACKEND` | `hierarchical` |
    /// | `UPSTREAM_ENDPOINT` | `http://127.0.0.1:9090` |
    /// | `UPSTREAM_REGION` | `us-east-1` |
    /// | `UPSTREAM_ACCESS_KEY_ID` | *(empty)* |
    /// | `UPSTREAM_SECRET_ACCESS_KEY` | *(empty)* |
    /// | `HIERARCHICAL_ENDPOINT` | Drive v3 metadata endpoint |
    /// | `HIERARCHICAL_UPLOAD_ENDPOINT` | Drive v3 upload endpoint |
    /// | `HIERARCHICAL_TOKEN` | *(empty)* |
    /// | `FOLDER_CACHE_TTL_SECS` | `600` |
    /// | `RESPONSE_CACHE_TTL_SECS` | `60` |
    /// | `RESPONSE_CACHE_MAX_BODY` | `8388608` |
    /// | `LOG_LEVEL` | `info` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("GATEWAY_LISTEN") {
            config.listen = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_ACCESS_KEY_ID") {
            config.access_key_id = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_SECRET_ACCESS_KEY") {
            config.secret_access_key = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_SIGNING_REGION") {
            config.signing_region = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_ALLOWED_BUCKETS") {
            config.allowed_buckets = parse_bucket_list(&v);
        }
        if let Ok(v) = std::env::var("GATEWAY_BACKEND") {
            if let Some(kind) = BackendKind::parse(&v) {
                config.backend = kind;
            }
        }
        if let Ok(v) = std::env::var("UPSTREAM_ENDPOINT") {
            config.upstream_endpoint = v;
        }
        if let Ok(v) = std::env::var("UPSTREAM_REGION") {
            config.upstream_region = v;
        }
        if let Ok(v) = std::env::var("UPSTREAM_ACCESS_KEY_ID") {
            config.upstream_access_key_id = v;
        }
        if let Ok(v) = std::env::var("UPSTREAM_SECRET_ACCESS_KEY") {
            config.upstream_secret_access_key = v;
        }
        if let Ok(v) = std::env::var("HIERARCHICAL_ENDPOINT") {
            config.hierarchical_endpoint = v;
        }
        if let Ok(v) = std::env::var("HIERARCHICAL_UPLOAD_ENDPOINT") {
            config.hierarchical_upload_endpoint = v;
        }
        if let Ok(v) = std::env::var("HIERARCHICAL_TOKEN") {
            config.hierarchical_token = v;
        }
        if let Ok(v) = std::env::var("FOLDER_CACHE_TTL_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                config.folder_cache_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("RESPONSE_CACHE_TTL_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                config.response_cache_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("RESPONSE_CACHE_MAX_BODY") {
            if let Ok(n) = v.parse::<usize>() {
                config.response_cache_max_body = n;
            }
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Whether a bucket is on the allow-list.
    #[must_use]
    pub fn bucket_allowed(&self, bucket: &str) -> bool {
        self.allowed_buckets.iter().any(|b| b == bucket)
    }
}

/// Split a comma-separated bucket list, dropping empty entries.
fn parse_bucket_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
