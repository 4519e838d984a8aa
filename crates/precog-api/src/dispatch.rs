// SPDX-License-Identifier: MIT OR Apache-2.0
//! The dispatcher: job submission and the combined submit-and-tail streams.

use crate::AppState;
use crate::error::ApiError;
use crate::fanout::{self, Frame, TailConfig};
use crate::middleware::{check_bearer, client_ip};
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use precog_bus::JobPayload;
use precog_core::{Job, event_types};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use uuid::Uuid;

/// Default task when a submission names only the precog.
fn default_task(precog: &str) -> String {
    match precog {
        "ingest" => "ingest the configured url".to_string(),
        "schema" => "analyze structured data coverage".to_string(),
        other => format!("run {other}"),
    }
}

/// Shared submission path: validate, insert, append the ack event, and
/// best-effort enqueue on the stream bus.
///
/// A bus failure is logged but does not fail the submission; the job is
/// already durable and a reclaim-from-store pass can pick it up later.
pub async fn submit_job(
    state: &AppState,
    precog: Option<&str>,
    task: Option<&str>,
    context: BTreeMap<String, Value>,
) -> Result<Job, ApiError> {
    let precog = precog
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::validation("missing precog"))?;
    let task = task
        .map(str::to_string)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| default_task(precog));

    let job = state.store.insert_job(precog, &task, context.clone()).await?;
    state
        .store
        .insert_event(
            job.id,
            event_types::ACK,
            json!({ "job_id": job.id, "precog": precog }),
        )
        .await?;

    let payload = JobPayload {
        job_id: job.id,
        precog: precog.to_string(),
        task,
        context,
    };
    if let Err(e) = state.bus.enqueue(&payload).await {
        warn!(job_id = %job.id, error = %e, "bus enqueue failed, job remains pending in store");
    }

    Ok(job)
}

fn check_rate(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    state
        .limiter
        .check(&client_ip(headers))
        .map_err(|retry_after_secs| {
            precog_core::Error::RateLimited { retry_after_secs }.into()
        })
}

// ---------------------------------------------------------------------------
// POST /v1/invoke
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub precog: Option<String>,
    pub prompt: Option<String>,
    #[serde(default)]
    pub context: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub stream: Option<bool>,
}

pub async fn invoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<InvokeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_bearer(&state.config, &headers, None)?;
    check_rate(&state, &headers)?;

    let job = submit_job(
        &state,
        req.precog.as_deref(),
        req.prompt.as_deref(),
        req.context.unwrap_or_default(),
    )
    .await?;

    Ok(Json(json!({ "ok": true, "job_id": job.id })))
}

// ---------------------------------------------------------------------------
// GET /v1/jobs/{id} and GET /v1/jobs/{id}/events
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    check_bearer(&state.config, &headers, None)?;
    let job = state.store.get_job(id).await?;
    Ok(Json(json!({ "ok": true, "job": job })))
}

/// SSE tail of one job's event log.
pub async fn job_events_sse(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(query): Query<TokenQuery>,
) -> Result<Response, ApiError> {
    // Browsers' event sources cannot set headers; accept `?token=` too.
    check_bearer(&state.config, &headers, query.token.as_deref())?;
    state.store.get_job(id).await?;

    let (tx, rx) = mpsc::channel::<Frame>(64);
    tokio::spawn(fanout::tail(
        state.store.clone(),
        id,
        TailConfig::default(),
        tx,
    ));

    let stream = ReceiverStream::new(rx)
        .map(|frame| Ok::<_, Infallible>(fanout::frame_to_sse(&frame)));
    let mut response = Sse::new(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, "no-cache".parse().expect("static header"));
    headers.insert("x-accel-buffering", "no".parse().expect("static header"));
    Ok(response)
}

// ---------------------------------------------------------------------------
// /v1/run.ndjson
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    pub precog: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub task: Option<String>,
    pub kb: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub precog: Option<String>,
    pub kb: Option<String>,
    pub content_source: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub task: Option<String>,
    pub region: Option<String>,
    pub domain: Option<String>,
    pub vertical: Option<String>,
}

fn insert_if_some(context: &mut BTreeMap<String, Value>, key: &str, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        context.insert(key.to_string(), Value::String(v.to_string()));
    }
}

/// NDJSON streaming response tailing `job_id`. The ack event appended at
/// submission is the first line every client sees.
fn ndjson_response(state: &AppState, job_id: Uuid) -> Response {
    let (tx, rx) = mpsc::channel::<Frame>(64);
    tokio::spawn(fanout::tail(
        state.store.clone(),
        job_id,
        TailConfig::default(),
        tx,
    ));

    let stream = ReceiverStream::new(rx)
        .map(|frame| Ok::<_, Infallible>(fanout::frame_to_ndjson(&frame)));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// `GET /v1/run.ndjson` — create a job from query parameters and tail it.
pub async fn run_ndjson_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RunQuery>,
) -> Result<Response, ApiError> {
    check_bearer(&state.config, &headers, query.token.as_deref())?;
    check_rate(&state, &headers)?;

    let mut context = BTreeMap::new();
    insert_if_some(&mut context, "url", query.url.as_deref());
    insert_if_some(&mut context, "type", query.content_type.as_deref());
    insert_if_some(&mut context, "kb", query.kb.as_deref());

    let job = submit_job(&state, query.precog.as_deref(), query.task.as_deref(), context).await?;
    Ok(ndjson_response(&state, job.id))
}

/// `POST /v1/run.ndjson` — create a job from a JSON body and tail it.
pub async fn run_ndjson_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RunRequest>,
) -> Result<Response, ApiError> {
    check_bearer(&state.config, &headers, None)?;
    check_rate(&state, &headers)?;

    let mut context = BTreeMap::new();
    match req.content_source.as_deref() {
        Some("inline") => {
            let content = req
                .content
                .as_deref()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| {
                    ApiError::validation("content is required when content_source is 'inline'")
                })?;
            context.insert("content".to_string(), Value::String(content.to_string()));
        }
        Some("url") => {
            let url = req.url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
                ApiError::validation("url is required when content_source is 'url'")
            })?;
            context.insert("url".to_string(), Value::String(url.to_string()));
        }
        Some(other) => {
            return Err(ApiError::validation(format!(
                "unknown content_source '{other}'"
            )));
        }
        None => {
            insert_if_some(&mut context, "url", req.url.as_deref());
            insert_if_some(&mut context, "content", req.content.as_deref());
        }
    }
    insert_if_some(&mut context, "type", req.content_type.as_deref());
    insert_if_some(&mut context, "kb", req.kb.as_deref());
    insert_if_some(&mut context, "region", req.region.as_deref());
    insert_if_some(&mut context, "domain", req.domain.as_deref());
    insert_if_some(&mut context, "vertical", req.vertical.as_deref());

    let job = submit_job(&state, req.precog.as_deref(), req.task.as_deref(), context).await?;
    Ok(ndjson_response(&state, job.id))
}
