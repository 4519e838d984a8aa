// SPDX-License-Identifier: MIT OR Apache-2.0
//! Router-level tests: dispatch, auth, rate limiting, fan-out framing.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use precog_api::{AppState, build_app};
use precog_bus::{InMemoryBus, StreamBus};
use precog_core::{JobStatus, PlatformConfig};
use precog_ingest::{IngestOptions, Ingestor};
use precog_store::Store;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    app: Router,
    state: Arc<AppState>,
    bus: Arc<InMemoryBus>,
}

async fn harness_with_config(config: PlatformConfig) -> Harness {
    let store = Store::connect("sqlite::memory:").await.expect("store");
    let bus = Arc::new(InMemoryBus::new());
    let ingestor = Ingestor::new(store.clone(), IngestOptions::default());
    let state = Arc::new(
        AppState::new(store, bus.clone() as Arc<dyn StreamBus>, config, ingestor)
            .expect("state"),
    );
    Harness {
        app: build_app(state.clone()),
        state,
        bus,
    }
}

async fn harness() -> Harness {
    harness_with_config(PlatformConfig::default()).await
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

// ---------------------------------------------------------------------------
// Health and metrics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_build_metadata() {
    let h = harness().await;
    let resp = h
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["protocol_version"], "1.1");
    assert_eq!(body["build_sha"], "dev");
}

#[tokio::test]
async fn health_redis_reflects_bus_liveness() {
    let h = harness().await;
    let resp = h
        .app
        .oneshot(
            Request::builder()
                .uri("/health/redis")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_expose_job_gauges() {
    let h = harness().await;
    h.app
        .clone()
        .oneshot(post_json("/v1/invoke", json!({ "precog": "schema" })))
        .await
        .unwrap();

    let resp = h
        .app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("precog_jobs_processed_total"));
    assert!(text.contains("precog_oldest_pending_age_seconds"));
    assert!(text.contains("precog_bus_lag_seconds"));
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invoke_creates_job_and_enqueues() {
    let h = harness().await;
    let resp = h
        .app
        .oneshot(post_json(
            "/v1/invoke",
            json!({ "precog": "schema", "prompt": "analyze nrlc.ai" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["ok"], true);

    let job_id: uuid::Uuid = body["job_id"].as_str().unwrap().parse().unwrap();
    let job = h.state.store.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.task, "analyze nrlc.ai");

    // The handoff landed on the bus and the ack event is in the log.
    let claimed = h.bus.read_group("probe", 10, 50).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].payload.job_id, job_id);
    let events = h.state.store.events_since(job_id, 0, 10).await.unwrap();
    assert_eq!(events[0].event_type, "ack");
}

#[tokio::test]
async fn invoke_without_precog_is_rejected() {
    let h = harness().await;
    let resp = h
        .app
        .oneshot(post_json("/v1/invoke", json!({ "prompt": "hm" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("missing precog"));
}

#[tokio::test]
async fn invoke_uses_precog_default_task() {
    let h = harness().await;
    let resp = h
        .app
        .oneshot(post_json("/v1/invoke", json!({ "precog": "schema" })))
        .await
        .unwrap();
    let body = body_json(resp).await;
    let job_id: uuid::Uuid = body["job_id"].as_str().unwrap().parse().unwrap();
    let job = h.state.store.get_job(job_id).await.unwrap();
    assert!(!job.task.is_empty());
}

#[tokio::test]
async fn unknown_job_is_404() {
    let h = harness().await;
    let resp = h
        .app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/jobs/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Auth gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bearer_gate_guards_invoke() {
    let mut config = PlatformConfig::default();
    config.bearer_token = Some("s3cret".into());
    let h = harness_with_config(config).await;

    let denied = h
        .app
        .clone()
        .oneshot(post_json("/v1/invoke", json!({ "precog": "schema" })))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let mut req = post_json("/v1/invoke", json!({ "precog": "schema" }));
    req.headers_mut()
        .insert("authorization", "Bearer s3cret".parse().unwrap());
    let allowed = h.app.oneshot(req).await.unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn sse_accepts_query_token() {
    let mut config = PlatformConfig::default();
    config.bearer_token = Some("s3cret".into());
    let h = harness_with_config(config).await;

    let job = h
        .state
        .store
        .insert_job("schema", "t", Default::default())
        .await
        .unwrap();
    h.state
        .store
        .update_status(job.id, JobStatus::Running, None)
        .await
        .unwrap();
    h.state
        .store
        .update_status(job.id, JobStatus::Done, None)
        .await
        .unwrap();

    let denied = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/jobs/{}/events", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let allowed = h
        .app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/jobs/{}/events?token=s3cret", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
    assert!(allowed
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn burst_of_sixty_one_yields_exactly_one_429() {
    let h = harness().await;
    let mut rejected = 0;
    let mut retry_after_present = false;

    for _ in 0..61 {
        let mut req = post_json("/v1/invoke", json!({ "precog": "schema" }));
        req.headers_mut()
            .insert("x-forwarded-for", "9.9.9.9".parse().unwrap());
        let resp = h.app.clone().oneshot(req).await.unwrap();
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            rejected += 1;
            retry_after_present = resp.headers().contains_key("retry-after");
            let body = body_json(resp).await;
            assert!(body["retry_after"].as_u64().unwrap() >= 1);
        }
    }
    assert_eq!(rejected, 1);
    assert!(retry_after_present);
}

#[tokio::test]
async fn distinct_ips_do_not_share_buckets() {
    let h = harness().await;
    for i in 0..70 {
        let mut req = post_json("/v1/invoke", json!({ "precog": "schema" }));
        req.headers_mut().insert(
            "x-forwarded-for",
            format!("10.0.0.{i}").parse().unwrap(),
        );
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sse_for_unknown_job_is_404_before_streaming() {
    let h = harness().await;
    let resp = h
        .app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/jobs/{}/events", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sse_streams_events_and_closes_on_terminal_job() {
    let h = harness().await;
    let job = h
        .state
        .store
        .insert_job("schema", "t", Default::default())
        .await
        .unwrap();
    h.state
        .store
        .insert_event(job.id, "answer.delta", json!({ "text": "partial" }))
        .await
        .unwrap();
    h.state
        .store
        .update_status(job.id, JobStatus::Running, None)
        .await
        .unwrap();
    h.state
        .store
        .update_status(job.id, JobStatus::Done, None)
        .await
        .unwrap();

    let resp = h
        .app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/jobs/{}/events", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("cache-control").unwrap(), "no-cache");

    let bytes = tokio::time::timeout(Duration::from_secs(10), resp.into_body().collect())
        .await
        .expect("stream should close on terminal job")
        .unwrap()
        .to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("event: answer.delta"));
    assert!(text.contains("\"text\":\"partial\""));
    assert!(text.contains("event: complete"));
    assert!(text.contains("\"status\":\"done\""));
}

#[tokio::test]
async fn run_ndjson_streams_ack_deltas_and_completion() {
    let h = harness().await;

    // Simulated worker: claim the handoff, emit, finish.
    let store = h.state.store.clone();
    let bus = h.bus.clone();
    tokio::spawn(async move {
        let batch = bus.read_group("sim-worker", 1, 5_000).await.unwrap();
        let Some(msg) = batch.into_iter().next() else {
            return;
        };
        let job_id = msg.payload.job_id;
        store
            .update_status(job_id, JobStatus::Running, None)
            .await
            .unwrap();
        store
            .insert_event(job_id, "grounding.chunk", json!({ "fact_id": "abc" }))
            .await
            .unwrap();
        store
            .insert_event(job_id, "answer.delta", json!({ "text": "chunk one" }))
            .await
            .unwrap();
        store
            .insert_event(job_id, "answer.complete", json!({ "ok": true }))
            .await
            .unwrap();
        store
            .update_status(job_id, JobStatus::Done, None)
            .await
            .unwrap();
        bus.ack(&msg.id).await.unwrap();
    });

    let resp = h
        .app
        .oneshot(
            Request::builder()
                .uri("/v1/run.ndjson?precog=schema&url=https%3A%2F%2Fnrlc.ai%2F")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/x-ndjson"
    );

    let bytes = tokio::time::timeout(Duration::from_secs(10), resp.into_body().collect())
        .await
        .expect("ndjson stream should close")
        .unwrap()
        .to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let lines: Vec<Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).expect("every line is a complete JSON object"))
        .collect();
    assert!(lines.len() >= 4);
    assert_eq!(lines[0]["type"], "ack");
    assert!(lines[0]["job_id"].is_string());
    assert!(lines.iter().any(|l| l["type"] == "grounding.chunk"));
    assert!(lines.iter().any(|l| l["type"] == "answer.delta"));
    let last = lines.last().unwrap();
    assert_eq!(last["type"], "complete");
    assert_eq!(last["status"], "done");
}

#[tokio::test]
async fn run_ndjson_post_validates_content_source() {
    let h = harness().await;

    let missing_content = h
        .app
        .clone()
        .oneshot(post_json(
            "/v1/run.ndjson",
            json!({ "precog": "schema", "content_source": "inline" }),
        ))
        .await
        .unwrap();
    assert_eq!(missing_content.status(), StatusCode::BAD_REQUEST);

    let missing_url = h
        .app
        .clone()
        .oneshot(post_json(
            "/v1/run.ndjson",
            json!({ "precog": "schema", "content_source": "url" }),
        ))
        .await
        .unwrap();
    assert_eq!(missing_url.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// DLQ inspection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dlq_endpoint_lists_dead_letters() {
    let h = harness().await;
    h.bus
        .enqueue_dead_letter(&precog_bus::DeadLetter {
            payload: precog_bus::JobPayload {
                job_id: uuid::Uuid::new_v4(),
                precog: "schema".into(),
                task: "t".into(),
                context: Default::default(),
            },
            error: "exhausted".into(),
            failed_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let resp = h
        .app
        .oneshot(Request::builder().uri("/v1/dlq").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["dead_letters"].as_array().unwrap().len(), 1);
    assert_eq!(body["dead_letters"][0]["error"], "exhausted");
}
