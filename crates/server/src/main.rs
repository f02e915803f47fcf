//! barrio-sw server entry point.
//!
//! Boots one offline worker (install, then activate) and serves it as an
//! MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use barrio_client::{CacheEngine, FetchClient, FetchConfig, ServiceWorker};
use barrio_core::{AppConfig, CacheDb, SystemClock};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(
        origin = %config.origin,
        version = %config.cache_version,
        db = %config.db_path.display(),
        "Starting barrio-sw server on stdio transport"
    );

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache at {}", config.db_path.display()))?;
    let fetcher = FetchClient::new(FetchConfig::from(&config))?;
    let engine = CacheEngine::new(config, db, Arc::new(fetcher), Arc::new(SystemClock))?;

    let worker = Arc::new(ServiceWorker::new(engine));
    let state = worker.start().await?;
    tracing::info!(%state, context = %worker.context(), "worker ready");

    let handler = handler::BarrioServer::new(worker);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
