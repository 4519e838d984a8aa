// SPDX-License-Identifier: MIT OR Apache-2.0
//! Domain ownership verification over the well-known HTTP channel.
//!
//! `initiate` registers the domain with a fresh token; `check` probes
//! `/.well-known/croutons-verification.txt` for it. DNS TXT proof is left
//! to an external checker; the core only stamps `verified_at`.

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::check_bearer;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Well-known path owners must serve their token from.
pub const WELL_KNOWN_PATH: &str = "/.well-known/croutons-verification.txt";

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub domain: Option<String>,
}

fn required_domain(raw: &Option<String>) -> Result<&str, ApiError> {
    raw.as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::validation("missing domain"))
}

/// Domains carrying an explicit port are probed over plain HTTP
/// (non-standard deployments); everything else over HTTPS.
fn well_known_url(domain: &str) -> String {
    let scheme = if domain.contains(':') { "http" } else { "https" };
    format!("{scheme}://{domain}{WELL_KNOWN_PATH}")
}

// ---------------------------------------------------------------------------
// POST /v1/verify/initiate
// ---------------------------------------------------------------------------

pub async fn initiate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_bearer(&state.config, &headers, None)?;
    let domain = required_domain(&req.domain)?;

    if state.store.is_domain_verified(domain).await? {
        return Err(precog_core::Error::Conflict(format!(
            "domain {domain} is already verified"
        ))
        .into());
    }

    let token = format!("precogs-verify-{}", Uuid::new_v4().simple());
    let record = state.store.initiate_domain(domain, &token).await?;
    info!(domain, "verification initiated");

    Ok(Json(json!({
        "ok": true,
        "domain": record.domain,
        "verification_token": record.verification_token,
        "instructions": {
            "dns": format!("add a TXT record: precogs-verify={}", record.verification_token),
            "well_known": format!(
                "serve the token at {}",
                well_known_url(&record.domain)
            ),
        },
    })))
}

// ---------------------------------------------------------------------------
// POST /v1/verify/check
// ---------------------------------------------------------------------------

pub async fn check(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_bearer(&state.config, &headers, None)?;
    let domain = required_domain(&req.domain)?;

    let record = state.store.get_domain(domain).await?;
    if record.is_verified() {
        return Ok(Json(json!({ "ok": true, "domain": domain, "verified": true })));
    }

    let url = well_known_url(domain);
    let body = match state.ingestor.fetcher().fetch_text(&url).await {
        Ok(body) => body,
        Err(e) => {
            return Ok(Json(json!({
                "ok": false,
                "domain": domain,
                "verified": false,
                "reason": format!("well-known fetch failed: {e}"),
            })));
        }
    };

    if !body.contains(&record.verification_token) {
        return Ok(Json(json!({
            "ok": false,
            "domain": domain,
            "verified": false,
            "reason": "token not found in well-known file",
        })));
    }

    let verified = state.store.mark_domain_verified(domain).await?;
    info!(domain, "domain verified");
    Ok(Json(json!({
        "ok": true,
        "domain": verified.domain,
        "verified": true,
    })))
}
