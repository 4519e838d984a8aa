// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ingestion and discovery endpoints.

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::check_bearer;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use chrono::Utc;
use precog_store::DiscoveredPage;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// POST /v1/ingest
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub domain: Option<String>,
    pub url: Option<String>,
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_bearer(&state.config, &headers, None)?;
    let domain = req
        .domain
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::validation("missing domain"))?;
    let url = req
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::validation("missing url"))?;

    let outcome = state.ingestor.ingest(domain, url).await?;
    Ok(Json(json!({ "ok": true, "data": outcome })))
}

// ---------------------------------------------------------------------------
// POST /v1/discover
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub domain: Option<String>,
    pub page: Option<String>,
    pub alternate: Option<String>,
}

pub async fn discover(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<DiscoverRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_bearer(&state.config, &headers, None)?;
    let domain = req
        .domain
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::validation("missing domain"))?;
    let page_url = req
        .page
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::validation("missing page"))?;

    // Discovery is reserved for owners who have proven control.
    if !state.store.is_domain_verified(domain).await? {
        return Err(precog_core::Error::Auth(format!("domain {domain} is not verified")).into());
    }

    let proof = state.ingestor.discover(domain, page_url).await?;
    let ingest_result = state.ingestor.ingest(domain, page_url).await;

    let (ingestion, ingestion_id) = match &ingest_result {
        Ok(outcome) => (
            json!({ "ok": true, "data": outcome }),
            Some(outcome.doc_id.clone()),
        ),
        Err(e) => (
            json!({ "ok": false, "error": e.to_string() }),
            None,
        ),
    };

    state
        .store
        .upsert_discovered_page(&DiscoveredPage {
            domain: domain.to_string(),
            page_url: page_url.to_string(),
            alternate_href: proof
                .alternate_href
                .clone()
                .or_else(|| req.alternate.clone()),
            discovered_mirror_url: proof.discovered_mirror_url.clone(),
            discovery_method: proof.method,
            discovered_at: Utc::now(),
            ingestion_id,
        })
        .await?;

    Ok(Json(json!({
        "ok": true,
        "domain": domain,
        "page": page_url,
        "discovery": {
            "method": proof.method.as_str(),
            "alternate_href": proof.alternate_href,
            "header_href": proof.header_href,
            "discovered_mirror_url": proof.discovered_mirror_url,
        },
        "ingestion": ingestion,
    })))
}
