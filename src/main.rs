use anyhow::{Context, Result};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;

use config::{AppConfig, Backend};
use services::{
    archive::ArchiveLimits, gateway::GatewayService, memory_store::MemoryStore,
    s3_store::S3Store, store::ObjectStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    tracing::info!("Starting object-gateway with config: {:?}", cfg);

    // --- Build the shared object-store handle once ---
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        Backend::S3 => {
            let store_cfg = cfg
                .store
                .as_ref()
                .context("s3 backend selected without store settings")?;
            tracing::info!("Using S3 backend at {}", store_cfg.endpoint_url());
            Arc::new(S3Store::connect(store_cfg).await)
        }
        Backend::Memory => {
            tracing::warn!("Using in-memory backend; objects are lost on exit");
            Arc::new(MemoryStore::new(cfg.public_url.clone()))
        }
    };

    let service = GatewayService::new(
        store,
        cfg.presign_ttl,
        ArchiveLimits {
            max_archive_bytes: cfg.max_archive_bytes,
        },
    );

    // --- Build router ---
    let app = routes::routes::app(service, cfg.max_upload_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err).with_context(|| format!("binding {}", addr)),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolve on Ctrl-C so in-flight requests can finish.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
