// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! precog-api
#![deny(unsafe_code)]

pub mod dispatch;
pub mod error;
pub mod fanout;
pub mod ingest_api;
pub mod metrics;
pub mod middleware;
pub mod publishers;
pub mod ratelimit;
pub mod verify;

pub use error::ApiError;
pub use metrics::Metrics;
pub use ratelimit::IpRateLimiter;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Router, middleware as axum_middleware};
use chrono::Utc;
use precog_bus::StreamBus;
use precog_core::PlatformConfig;
use precog_ingest::Ingestor;
use precog_store::Store;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Shared state behind every handler.
pub struct AppState {
    pub store: Store,
    pub bus: Arc<dyn StreamBus>,
    pub config: PlatformConfig,
    pub limiter: IpRateLimiter,
    pub ingestor: Ingestor,
    pub metrics: Metrics,
    pub started_at: Instant,
}

impl AppState {
    /// Assemble state from the shared components.
    pub fn new(
        store: Store,
        bus: Arc<dyn StreamBus>,
        config: PlatformConfig,
        ingestor: Ingestor,
    ) -> Result<Self, precog_core::Error> {
        let metrics =
            Metrics::new().map_err(|e| precog_core::Error::TransientInfra(e.to_string()))?;
        Ok(Self {
            store,
            bus,
            config,
            limiter: IpRateLimiter::default(),
            ingestor,
            metrics,
            started_at: Instant::now(),
        })
    }
}

/// Build the Axum router with the full HTTP surface.
pub fn build_app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/v1/invoke", post(dispatch::invoke))
        .route("/v1/jobs/{id}", get(dispatch::get_job))
        .route("/v1/jobs/{id}/events", get(dispatch::job_events_sse))
        .route(
            "/v1/run.ndjson",
            get(dispatch::run_ndjson_get).post(dispatch::run_ndjson_post),
        )
        .route("/v1/ingest", post(ingest_api::ingest))
        .route("/v1/discover", post(ingest_api::discover))
        .route("/v1/facts/{domain_file}", get(publishers::facts_ndjson))
        .route("/v1/graph/{domain_file}", get(publishers::graph_jsonld))
        .route("/v1/extract/{domain}", get(publishers::extract_report))
        .route("/v1/status/{domain}", get(publishers::domain_status))
        .route("/v1/mirror/{domain}/{*path}", get(publishers::mirror))
        .route("/v1/dlq", get(publishers::dead_letters))
        .route("/v1/verify/initiate", post(verify::initiate))
        .route("/v1/verify/check", post(verify::check))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health))
        .route("/health/redis", get(health_redis))
        .layer(axum_middleware::from_fn(middleware::observe_request));

    if !state.config.cors_origins.is_empty() {
        router = router.layer(middleware::cors_layer(&state.config.cors_origins));
    }

    router.with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "protocol_version": precog_core::PROTOCOL_VERSION,
        "build_sha": state.config.build_sha,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "time": Utc::now().to_rfc3339(),
    }))
}

async fn health_redis(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.bus.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "error": e.to_string() })),
        ),
    }
}

async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let text = state.metrics.render(&state.store).await?;
    Ok((
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}
