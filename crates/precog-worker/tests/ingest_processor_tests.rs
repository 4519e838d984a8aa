// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end: the built-in ingest processor driven through the runtime.

use precog_bus::{InMemoryBus, JobPayload, StreamBus};
use precog_core::{JobStatus, event_types};
use precog_ingest::{IngestOptions, Ingestor};
use precog_store::Store;
use precog_worker::{IngestProcessor, ProcessorRegistry, WorkerRuntime};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rich_page() -> String {
    let sentences: Vec<String> = (1..=10)
        .map(|i| {
            format!(
                "<p>Capability number {i} of the NRLC oracle platform delivers grounded answers to clients.</p>"
            )
        })
        .collect();
    format!(
        r#"<html><head>
          <script type="application/ld+json">
          {{"@context":"https://schema.org","@type":"Organization","name":"NRLC"}}
          </script>
        </head><body><h1>NRLC Research</h1>{}</body></html>"#,
        sentences.join("\n")
    )
}

#[tokio::test]
async fn ingest_job_emits_grounding_and_completion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rich_page()))
        .mount(&server)
        .await;

    let store = Store::connect("sqlite::memory:").await.unwrap();
    let bus = Arc::new(InMemoryBus::new());
    let ingestor = Ingestor::new(store.clone(), IngestOptions::default());
    let mut registry = ProcessorRegistry::new();
    registry.register("ingest", IngestProcessor::new(ingestor, store.clone()));
    let runtime = WorkerRuntime::new(store.clone(), bus.clone(), Arc::new(registry))
        .with_consumer_name("ingest-worker");

    let url = format!("{}/", server.uri());
    let context = BTreeMap::from([
        ("url".to_string(), json!(url)),
        ("domain".to_string(), json!("nrlc.ai")),
    ]);
    let job = store.insert_job("ingest", "ingest", context.clone()).await.unwrap();
    bus.enqueue(&JobPayload {
        job_id: job.id,
        precog: "ingest".into(),
        task: "ingest".into(),
        context,
    })
    .await
    .unwrap();

    let batch = bus.read_group("ingest-worker", 10, 100).await.unwrap();
    runtime.handle_message(batch.into_iter().next().unwrap()).await.unwrap();

    let done = store.get_job(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Done);

    let events = store.events_since(job.id, 0, 100).await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&event_types::THINKING));
    assert!(types.contains(&event_types::GROUNDING_CHUNK));
    assert!(types.contains(&event_types::ANSWER_DELTA));
    assert_eq!(types.last().copied(), Some(event_types::ANSWER_COMPLETE));

    // Grounding chunks are publishable fact records.
    let chunk = events
        .iter()
        .find(|e| e.event_type == event_types::GROUNDING_CHUNK)
        .unwrap();
    assert!(chunk.data["fact_id"].is_string());
    assert_eq!(chunk.data["evidence_type"], "text_extraction");

    // The completion payload names the published mirror.
    let complete = events.last().unwrap();
    assert_eq!(complete.data["ok"], true);
    assert_eq!(complete.data["path"], "index");
    assert!(complete.data["facts_text_extraction"].as_u64().unwrap() >= 10);
}

#[tokio::test]
async fn ingest_job_without_url_is_dead_lettered() {
    let store = Store::connect("sqlite::memory:").await.unwrap();
    let bus = Arc::new(InMemoryBus::new());
    let ingestor = Ingestor::new(store.clone(), IngestOptions::default());
    let mut registry = ProcessorRegistry::new();
    registry.register("ingest", IngestProcessor::new(ingestor, store.clone()));
    let runtime = WorkerRuntime::new(store.clone(), bus.clone(), Arc::new(registry))
        .with_consumer_name("ingest-worker")
        .with_backoff_base(std::time::Duration::from_millis(1));

    let job = store.insert_job("ingest", "ingest", BTreeMap::new()).await.unwrap();
    bus.enqueue(&JobPayload {
        job_id: job.id,
        precog: "ingest".into(),
        task: "ingest".into(),
        context: BTreeMap::new(),
    })
    .await
    .unwrap();

    let batch = bus.read_group("ingest-worker", 10, 100).await.unwrap();
    runtime.handle_message(batch.into_iter().next().unwrap()).await.unwrap();

    let failed = store.get_job(job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Error);
    assert_eq!(bus.dead_letters(10).await.unwrap().len(), 1);
}
