// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use precog_api::{AppState, build_app};
use precog_bus::{InMemoryBus, RedisStreamBus, StreamBus};
use precog_core::PlatformConfig;
use precog_ingest::{IngestOptions, Ingestor};
use precog_store::Store;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "precog-api", version, about = "Precogs HTTP control plane")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8080", env = "PRECOG_BIND")]
    bind: String,

    /// Durable-store connection string.
    #[arg(long, env = "PRECOG_DATABASE_URL")]
    database_url: Option<String>,

    /// Stream-bus connection string; omit to run the in-memory bus.
    #[arg(long, env = "PRECOG_REDIS_URL")]
    redis_url: Option<String>,

    /// Enable request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("precog=debug,tower_http=debug")
    } else {
        EnvFilter::new("precog=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = PlatformConfig::from_env();
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if args.redis_url.is_some() {
        config.redis_url = args.redis_url;
    }

    let store = Store::connect(&config.database_url)
        .await
        .context("connect store")?;

    let bus: Arc<dyn StreamBus> = match &config.redis_url {
        Some(url) => Arc::new(RedisStreamBus::connect(url).await.context("connect redis")?),
        None => {
            warn!("no PRECOG_REDIS_URL set, using the in-memory bus (single-process only)");
            Arc::new(InMemoryBus::new())
        }
    };

    let ingestor = Ingestor::new(store.clone(), IngestOptions::default());
    let state = Arc::new(
        AppState::new(store, bus, config, ingestor)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?,
    );
    state.limiter.spawn_sweeper();

    let app = build_app(state.clone());
    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, build = %state.config.build_sha, "precog-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
    info!("shutdown signal received");
}
