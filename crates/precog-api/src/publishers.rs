// SPDX-License-Identifier: MIT OR Apache-2.0
//! Domain-scoped truth publishers: facts, graph, validation, status, mirror.

use crate::AppState;
use crate::error::ApiError;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use precog_core::{Crouton, EvidenceType, TierInputs};
use precog_ingest::validator;
use precog_store::{FactFilter, StoreError};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// GET /v1/facts/{domain}.ndjson
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct FactsQuery {
    pub evidence_type: Option<String>,
    pub source_url: Option<String>,
}

/// Strip a required filename suffix from a path parameter.
fn strip_suffix<'a>(param: &'a str, suffix: &str) -> Result<&'a str, ApiError> {
    param
        .strip_suffix(suffix)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::not_found(format!("expected <domain>{suffix}")))
}

pub async fn facts_ndjson(
    State(state): State<Arc<AppState>>,
    Path(domain_file): Path<String>,
    Query(query): Query<FactsQuery>,
) -> Result<Response, ApiError> {
    let domain = strip_suffix(&domain_file, ".ndjson")?;

    let evidence_type = match query.evidence_type.as_deref() {
        None => None,
        Some(raw) => Some(EvidenceType::parse(raw).map_err(|e| ApiError::validation(e.to_string()))?),
    };
    let filter = FactFilter {
        evidence_type,
        source_url: query.source_url.clone(),
    };
    let facts = state.store.list_facts(domain, &filter).await?;

    let mut body = String::new();
    for fact in &facts {
        body.push_str(&fact.to_ndjson_value().to_string());
        body.push('\n');
    }

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        body,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/graph/{domain}.jsonld
// ---------------------------------------------------------------------------

/// Group a domain's facts into JSON-LD entity nodes.
fn build_graph(graph_base_url: &str, domain: &str, facts: &[Crouton]) -> Value {
    let mut nodes: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    for fact in facts {
        let node = nodes.entry(fact.triple.subject.clone()).or_insert_with(|| {
            let mut map = Map::new();
            map.insert("@id".into(), Value::String(fact.triple.subject.clone()));
            map
        });
        match node.get_mut(&fact.triple.predicate) {
            None => {
                node.insert(
                    fact.triple.predicate.clone(),
                    Value::String(fact.triple.object.clone()),
                );
            }
            Some(Value::Array(values)) => {
                values.push(Value::String(fact.triple.object.clone()));
            }
            Some(existing) => {
                let first = existing.clone();
                *existing = Value::Array(vec![
                    first,
                    Value::String(fact.triple.object.clone()),
                ]);
            }
        }
    }

    json!({
        "@context": "https://schema.org",
        "@id": format!("{}/{}", graph_base_url.trim_end_matches('/'), domain),
        "@graph": nodes.into_values().map(Value::Object).collect::<Vec<_>>(),
    })
}

pub async fn graph_jsonld(
    State(state): State<Arc<AppState>>,
    Path(domain_file): Path<String>,
) -> Result<Response, ApiError> {
    let domain = strip_suffix(&domain_file, ".jsonld")?;
    let facts = state.store.list_facts(domain, &FactFilter::default()).await?;
    let graph = build_graph(&state.config.graph_base_url, domain, &facts);
    Ok((
        [(header::CONTENT_TYPE, "application/ld+json")],
        graph.to_string(),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/extract/{domain}?url=
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ExtractQuery {
    pub url: Option<String>,
}

pub async fn extract_report(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    Query(query): Query<ExtractQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let url = query
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::validation("missing url parameter"))?;

    let snapshot = match state.store.get_snapshot(&domain, &url).await {
        Ok(s) => s,
        Err(StoreError::NotFound(_)) => {
            // Trailing-slash tolerance mirrors the facts filter.
            let sibling = if let Some(stripped) = url.strip_suffix('/') {
                stripped.to_string()
            } else {
                format!("{url}/")
            };
            state.store.get_snapshot(&domain, &sibling).await?
        }
        Err(e) => return Err(e.into()),
    };

    let facts = state.store.text_facts_for_url(&domain, &url).await?;
    let report = validator::validate(&snapshot.canonical_extracted_text, &facts);

    Ok(Json(json!({
        "ok": true,
        "domain": domain,
        "url": url,
        "extraction_text_hash": snapshot.extraction_text_hash,
        "validation": {
            "facts_validated": report.facts_validated,
            "facts_passed": report.facts_passed,
            "pass_rate": report.pass_rate,
            "citation_grade": report.citation_grade,
            "failed_examples": report.failed_examples,
        },
    })))
}

// ---------------------------------------------------------------------------
// GET /v1/status/{domain}
// ---------------------------------------------------------------------------

pub async fn domain_status(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let counts = state.store.fact_counts(&domain).await?;
    let verified = state.store.is_domain_verified(&domain).await?;
    let markdown_version = state.store.active_markdown_version(&domain).await?;

    let facts_version = (counts.facts_total > 0).then(|| precog_core::PROTOCOL_VERSION.to_string());
    let graph_nonempty = counts.entities > 0;
    let graph_version = graph_nonempty.then(|| precog_core::PROTOCOL_VERSION.to_string());

    let inputs = TierInputs {
        facts_text_extraction: counts.facts_text_extraction,
        anchored_text_facts: counts.anchored_text_facts,
        markdown_version: markdown_version.clone(),
        facts_version: facts_version.clone(),
        graph_nonempty,
    };

    Ok(Json(json!({
        "ok": true,
        "domain": domain,
        "verified": verified,
        "versions": {
            "markdown": markdown_version,
            "facts": facts_version,
            "graph": graph_version,
        },
        "counts": {
            "facts_total": counts.facts_total,
            "facts_text_extraction": counts.facts_text_extraction,
            "facts_structured_data": counts.facts_structured_data,
            "pages": counts.pages,
            "entities": counts.entities,
        },
        "nonempty": {
            "facts": counts.facts_total > 0,
            "markdown": inputs.markdown_version.is_some(),
            "graph": graph_nonempty,
        },
        "qa": {
            "anchor_coverage_text": inputs.anchor_coverage(),
            "tier": inputs.tier(),
        },
    })))
}

// ---------------------------------------------------------------------------
// GET /v1/mirror/{domain}/{*path}
// ---------------------------------------------------------------------------

pub async fn mirror(
    State(state): State<Arc<AppState>>,
    Path((domain, path)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let path = path.trim_matches('/');
    let path = if path.is_empty() { "index" } else { path };
    let version = state.store.get_active_markdown(&domain, path).await?;

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE.as_str(),
                "text/markdown; charset=utf-8".to_string(),
            ),
            (header::ETAG.as_str(), format!("\"{}\"", version.content_hash)),
            (
                "link",
                format!(
                    "</v1/mirror/{domain}/{path}>; rel=\"authoritative-truth\""
                ),
            ),
        ],
        version.content,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/dlq
// ---------------------------------------------------------------------------

pub async fn dead_letters(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    crate::middleware::check_bearer(&state.config, &headers, None)?;
    let letters = state
        .bus
        .dead_letters(100)
        .await
        .map_err(|e| ApiError::from(precog_core::Error::from(e)))?;
    Ok(Json(json!({ "ok": true, "dead_letters": letters })))
}
