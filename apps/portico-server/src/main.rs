//! Portico - S3-compatible object-storage gateway.
//!
//! This binary serves the S3-style surface from `portico-http` against one
//! of the two storage backends in `portico-core`: re-signed passthrough to a
//! native S3-compatible endpoint, or flat-key emulation over a
//! tree-structured file-hosting API.
//!
//! # Usage
//!
//! ```text
//! GATEWAY_LISTEN=0.0.0.0:9000 \
//! GATEWAY_ACCESS_KEY_ID=AKID GATEWAY_SECRET_ACCESS_KEY=secret \
//! GATEWAY_ALLOWED_BUCKETS=test-bucket,media \
//! GATEWAY_BACKEND=hierarchical portico-server
//! ```
//!
//! See [`GatewayConfig::from_env`] for the full environment surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use portico_core::backend::hierarchical::HierarchicalBackend;
use portico_core::backend::passthrough::PassthroughBackend;
use portico_core::{
    BackendKind, FolderResolutionCache, GatewayConfig, InMemoryKv, KvStore, ResponseCache,
    StorageBackend,
};
use portico_http::{Gateway, GatewayService};

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Build the configured storage backend over the shared KV store.
fn build_backend(
    config: &GatewayConfig,
    kv: &Arc<dyn KvStore>,
) -> Result<Arc<dyn StorageBackend>> {
    match config.backend {
        BackendKind::Passthrough => {
            let backend = PassthroughBackend::new(
                &config.upstream_endpoint,
                &config.upstream_region,
                &config.upstream_access_key_id,
                &config.upstream_secret_access_key,
            )
            .context("failed to build passthrough backend")?;
            Ok(Arc::new(backend))
        }
        BackendKind::Hierarchical => {
            let folders = FolderResolutionCache::new(
                Arc::clone(kv),
                Duration::from_secs(config.folder_cache_ttl_secs),
            );
            Ok(Arc::new(HierarchicalBackend::new(
                &config.hierarchical_endpoint,
                &config.hierarchical_upload_endpoint,
                &config.hierarchical_token,
                folders,
            )))
        }
    }
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, service: GatewayService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Perform a health check by requesting the gateway's health endpoint.
///
/// Exits with code 0 if healthy, 1 otherwise.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /_health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"status\":\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let config = GatewayConfig::from_env();
        let addr = config.listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = GatewayConfig::from_env();

    init_tracing(&config.log_level)?;

    info!(
        listen = %config.listen,
        backend = ?config.backend,
        allowed_buckets = ?config.allowed_buckets,
        version = VERSION,
        "starting Portico gateway",
    );

    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
    let cache = ResponseCache::new(
        Arc::clone(&kv),
        Duration::from_secs(config.response_cache_ttl_secs),
        config.response_cache_max_body,
    );
    let backend = build_backend(&config, &kv)?;
    let gateway = Gateway::new(config.clone(), backend, cache);
    let service = GatewayService::new(gateway);

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, service).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_build_backend_for_each_kind() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());

        let hierarchical = GatewayConfig::builder()
            .backend(BackendKind::Hierarchical)
            .build();
        assert!(build_backend(&hierarchical, &kv).is_ok());

        let passthrough = GatewayConfig::builder()
            .backend(BackendKind::Passthrough)
            .build();
        assert!(build_backend(&passthrough, &kv).is_ok());
    }

    #[test]
    fn test_should_reject_invalid_upstream_endpoint() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
        let config = GatewayConfig::builder()
            .backend(BackendKind::Passthrough)
            .upstream_endpoint("not a url".into())
            .build();
        assert!(build_backend(&config, &kv).is_err());
    }
}
