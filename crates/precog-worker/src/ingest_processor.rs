// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in `ingest` processor: runs the citation-grade pipeline as a job.

use crate::processor::{EventSink, PrecogProcessor};
use anyhow::Context as _;
use async_trait::async_trait;
use precog_bus::JobPayload;
use precog_core::event_types;
use precog_ingest::Ingestor;
use precog_store::Store;
use serde_json::{Value, json};
use url::Url;

/// How many anchored facts are surfaced as `grounding.chunk` events.
const GROUNDING_CHUNKS: usize = 5;

/// Processor for the `ingest` precog tag.
///
/// Context keys: `url` (required), `domain` (defaults to the URL host).
pub struct IngestProcessor {
    ingestor: Ingestor,
    store: Store,
}

impl IngestProcessor {
    /// Build the processor.
    #[must_use]
    pub fn new(ingestor: Ingestor, store: Store) -> Self {
        Self { ingestor, store }
    }
}

#[async_trait]
impl PrecogProcessor for IngestProcessor {
    async fn process(&self, payload: &JobPayload, sink: &EventSink) -> anyhow::Result<Value> {
        let url = payload
            .context
            .get("url")
            .and_then(Value::as_str)
            .context("ingest requires a 'url' context entry")?
            .to_string();
        let domain = match payload.context.get("domain").and_then(Value::as_str) {
            Some(d) => d.to_string(),
            None => Url::parse(&url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .context("ingest requires a 'domain' context entry or a URL with a host")?,
        };

        sink.emit(
            event_types::THINKING,
            json!({ "text": format!("fetching {url}") }),
        )
        .await?;

        let outcome = self.ingestor.ingest(&domain, &url).await?;

        let facts = self.store.text_facts_for_url(&domain, &url).await?;
        for fact in facts.iter().take(GROUNDING_CHUNKS) {
            sink.emit(event_types::GROUNDING_CHUNK, fact.to_ndjson_value())
                .await?;
        }

        sink.emit(
            event_types::ANSWER_DELTA,
            json!({
                "text": format!(
                    "published {} facts for {} at /{}",
                    outcome.facts_total, outcome.domain, outcome.path
                )
            }),
        )
        .await?;

        Ok(json!({
            "ok": true,
            "doc_id": outcome.doc_id,
            "path": outcome.path,
            "facts_total": outcome.facts_total,
            "facts_text_extraction": outcome.facts_text_extraction,
            "facts_structured_data": outcome.facts_structured_data,
        }))
    }
}
