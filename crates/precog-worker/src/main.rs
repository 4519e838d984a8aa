// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use precog_bus::{InMemoryBus, RedisStreamBus, StreamBus};
use precog_core::PlatformConfig;
use precog_ingest::{IngestOptions, Ingestor};
use precog_store::Store;
use precog_worker::{IngestProcessor, ProcessorRegistry, WorkerRuntime};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "precog-worker", version, about = "Precogs worker runtime")]
struct Args {
    /// Durable-store connection string.
    #[arg(long, env = "PRECOG_DATABASE_URL")]
    database_url: Option<String>,

    /// Stream-bus connection string; omit to run the in-memory bus.
    #[arg(long, env = "PRECOG_REDIS_URL")]
    redis_url: Option<String>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("precog=debug")
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
    let mut registry = ProcessorRegistry::new();
    registry.register("ingest", IngestProcessor::new(ingestor, store.clone()));

    let runtime = WorkerRuntime::new(store, bus, Arc::new(registry));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
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
        let _ = shutdown_tx.send(true);
    });

    runtime.run(shutdown_rx).await
}
