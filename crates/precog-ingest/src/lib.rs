// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! precog-ingest
#![deny(unsafe_code)]

/// Sentence atomization and anchoring.
pub mod atomize;
/// Crouton assembly and deterministic identity.
pub mod builder;
/// Mirror discovery proofs.
pub mod discover;
mod error;
/// Canonical text extraction.
pub mod extract;
/// Page fetching.
pub mod fetch;
/// Mirror generation.
pub mod markdown;
/// The publication QA gate.
pub mod qa;
/// Structured-data harvest.
pub mod structured;
/// Stored-anchor validation.
pub mod validator;

pub use error::IngestError;
pub use fetch::{FetchedPage, PageFetcher, USER_AGENT};
pub use qa::QaReport;
pub use validator::ValidationReport;

use chrono::Utc;
use precog_core::Crouton;
use precog_store::{HtmlSnapshot, Store};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Options & outcome
// ---------------------------------------------------------------------------

/// Ingest tuning derived from the knowledge base for a domain's vertical.
#[derive(Clone, Debug, Default)]
pub struct IngestOptions {
    /// Schema properties the KB expects structured data to declare.
    pub expected_schema_props: Vec<String>,
}

/// What a successful ingest produced.
#[derive(Clone, Debug, Serialize)]
pub struct IngestOutcome {
    /// Domain ingested.
    pub domain: String,
    /// URL ingested.
    pub source_url: String,
    /// Mirror path the Markdown was published under.
    pub path: String,
    /// Content hash of the published mirror (the document id).
    pub doc_id: String,
    /// All facts persisted for this URL in this run.
    pub facts_total: u64,
    /// Anchored text facts persisted.
    pub facts_text_extraction: u64,
    /// Structured facts persisted.
    pub facts_structured_data: u64,
    /// The QA gate report.
    pub qa: QaReport,
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// The citation-grade ingestion pipeline.
///
/// Facts are staged in memory and committed together with the Markdown
/// mirror only when the QA gate passes; a refused ingest leaves only the
/// HTML snapshot behind.
#[derive(Clone)]
pub struct Ingestor {
    store: Store,
    fetcher: PageFetcher,
    options: IngestOptions,
}

impl Ingestor {
    /// Build an ingestor over the given store.
    #[must_use]
    pub fn new(store: Store, options: IngestOptions) -> Self {
        Self {
            store,
            fetcher: PageFetcher::new(),
            options,
        }
    }

    /// Access the shared fetcher (discovery and verification reuse it).
    #[must_use]
    pub fn fetcher(&self) -> &PageFetcher {
        &self.fetcher
    }

    /// Run the full pipeline for one URL.
    pub async fn ingest(&self, domain: &str, url: &str) -> Result<IngestOutcome, IngestError> {
        // 1. Fetch.
        let page = self.fetcher.fetch(url).await?;

        // 2+3. Snapshot with the canonical extraction.
        let extraction = extract::extract(&page.html);
        let snapshot = HtmlSnapshot {
            domain: domain.to_string(),
            source_url: url.to_string(),
            html: page.html.clone(),
            canonical_extracted_text: extraction.text.clone(),
            extraction_text_hash: extraction.text_hash.clone(),
            extraction_method: extraction.method.clone(),
            fetched_at: Utc::now(),
        };
        self.store.upsert_snapshot(&snapshot).await?;

        // 4. Structured-data harvest.
        let items = structured::harvest(&page.html);

        // 5. Text-fact atomization with hard anchor validation.
        let (text_facts, stats) = atomize::atomize(&extraction);

        // 6. Stage croutons with deterministic identity.
        let mut staged: Vec<Crouton> =
            builder::text_croutons(domain, url, &extraction.text_hash, &text_facts);
        staged.extend(builder::structured_croutons(domain, url, &items));

        let entities: HashSet<&str> =
            staged.iter().map(|f| f.triple.subject.as_str()).collect();
        let schema_props: Vec<String> = items
            .iter()
            .flat_map(|i| i.properties.iter().map(|p| p.predicate.clone()))
            .collect();

        // 7. QA gate. Verified domains get the relaxed schema threshold.
        let verified = self.store.is_domain_verified(domain).await?;
        let report = qa::evaluate(&qa::QaInputs {
            sentences_total: stats.sentences_total,
            candidates: stats.candidates,
            text_facts: text_facts.len(),
            structured_facts: staged.len() - text_facts.len(),
            entities: entities.len(),
            schema_props_found: schema_props,
            schema_props_expected: self.options.expected_schema_props.clone(),
            domain_verified: verified,
        });

        if !report.pass {
            warn!(domain, url, errors = ?report.errors, "qa gate refused publication");
            self.store
                .record_domain_qa(domain, precog_core::Tier::BestEffort, false)
                .await?;
            return Err(IngestError::QaGate { report });
        }

        // Commit staged facts only now that the gate has passed.
        let mut persisted = Vec::with_capacity(staged.len());
        for fact in &staged {
            persisted.push(self.store.upsert_fact(fact).await?);
        }

        // 8. Markdown publication with the atomic active swap.
        let path = markdown::derived_path(url);
        let document = markdown::render_mirror(domain, url, &persisted);
        let version = self.store.publish_markdown(domain, &path, &document).await?;

        let counts = self.store.fact_counts(domain).await?;
        let tier = precog_core::TierInputs {
            facts_text_extraction: counts.facts_text_extraction,
            anchored_text_facts: counts.anchored_text_facts,
            markdown_version: Some(version.markdown_version.clone()),
            facts_version: Some(precog_core::PROTOCOL_VERSION.to_string()),
            graph_nonempty: counts.entities > 0,
        }
        .tier();
        self.store.record_domain_qa(domain, tier, true).await?;

        let text_count = persisted
            .iter()
            .filter(|f| f.evidence_type == precog_core::EvidenceType::TextExtraction)
            .count() as u64;
        info!(
            domain,
            url,
            facts = persisted.len(),
            path = %path,
            tier = %tier,
            "ingest published"
        );

        Ok(IngestOutcome {
            domain: domain.to_string(),
            source_url: url.to_string(),
            path,
            doc_id: version.content_hash,
            facts_total: persisted.len() as u64,
            facts_text_extraction: text_count,
            facts_structured_data: persisted.len() as u64 - text_count,
            qa: report,
        })
    }

    /// Fetch a page and inspect it for mirror declarations, recording the
    /// result. The caller gates on domain verification.
    pub async fn discover(
        &self,
        domain: &str,
        page_url: &str,
    ) -> Result<discover::DiscoveryProof, IngestError> {
        let page = self.fetcher.fetch(page_url).await?;
        let proof = discover::inspect(&page);
        info!(domain, page_url, method = proof.method.as_str(), "page discovery inspected");
        Ok(proof)
    }
}
