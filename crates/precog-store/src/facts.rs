// SPDX-License-Identifier: MIT OR Apache-2.0
//! Crouton persistence and the revision-chain discipline.
//!
//! `fact_id` includes the fragment hash, so any edit to the supporting text
//! yields a new identity. The slot holds the latest revision: re-upserting
//! an unchanged fact only refreshes `updated_at`, while a changed fact for
//! an existing slot replaces the row in place, advancing `revision` and
//! pointing `previous_fact_id` at the replaced identity.

use crate::{Store, StoreError, now_rfc3339, parse_ts};
use precog_core::{Crouton, EvidenceAnchor, EvidenceType, Triple};
use sqlx::FromRow;
use tracing::debug;

/// Query filter for fact listings.
#[derive(Clone, Debug, Default)]
pub struct FactFilter {
    /// Restrict to one evidence type.
    pub evidence_type: Option<EvidenceType>,
    /// Restrict to one source URL; its single-slash sibling also matches.
    pub source_url: Option<String>,
}

/// Aggregate counts backing the status publisher.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FactCounts {
    /// All facts for the domain.
    pub facts_total: u64,
    /// Facts with `evidence_type = text_extraction`.
    pub facts_text_extraction: u64,
    /// Facts with `evidence_type = structured_data`.
    pub facts_structured_data: u64,
    /// Text facts carrying a complete anchor.
    pub anchored_text_facts: u64,
    /// Distinct source URLs with at least one fact.
    pub pages: u64,
    /// Distinct triple subjects.
    pub entities: u64,
}

/// The URL with a trailing slash toggled, for lenient per-URL filters.
pub(crate) fn slash_sibling(url: &str) -> String {
    match url.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => format!("{url}/"),
    }
}

#[derive(FromRow)]
struct CroutonRow {
    crouton_id: String,
    domain: String,
    source_url: String,
    slot_id: String,
    fact_id: String,
    revision: i64,
    previous_fact_id: Option<String>,
    subject: String,
    predicate: String,
    object: String,
    text: String,
    supporting_text: Option<String>,
    char_start: Option<i64>,
    char_end: Option<i64>,
    fragment_hash: Option<String>,
    extraction_text_hash: Option<String>,
    evidence_type: String,
    source_path: Option<String>,
    anchor_missing: i64,
    confidence: f64,
    updated_at: String,
}

impl CroutonRow {
    fn into_crouton(self) -> Result<Crouton, StoreError> {
        let evidence_anchor = match (
            self.char_start,
            self.char_end,
            self.fragment_hash,
            self.extraction_text_hash,
        ) {
            (Some(start), Some(end), Some(fragment), Some(extraction)) => Some(EvidenceAnchor {
                char_start: start as usize,
                char_end: end as usize,
                fragment_hash: fragment,
                extraction_text_hash: extraction,
            }),
            _ => None,
        };
        Ok(Crouton {
            crouton_id: self.crouton_id,
            domain: self.domain,
            source_url: self.source_url,
            slot_id: self.slot_id,
            fact_id: self.fact_id,
            revision: self.revision,
            previous_fact_id: self.previous_fact_id,
            triple: Triple {
                subject: self.subject,
                predicate: self.predicate,
                object: self.object,
            },
            text: self.text,
            supporting_text: self.supporting_text,
            evidence_anchor,
            evidence_type: EvidenceType::parse(&self.evidence_type)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            source_path: self.source_path,
            anchor_missing: self.anchor_missing != 0,
            confidence: self.confidence,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    crouton_id, domain, source_url, slot_id, fact_id, revision, previous_fact_id,
    subject, predicate, object, text, supporting_text, char_start, char_end,
    fragment_hash, extraction_text_hash, evidence_type, source_path,
    anchor_missing, confidence, updated_at
"#;

impl Store {
    /// Upsert one fact, maintaining the revision discipline: the slot holds
    /// the latest revision.
    ///
    /// Re-upserting an unchanged fact (same `fact_id`) only refreshes
    /// `updated_at`. A changed fact for an existing slot replaces the row in
    /// place: `revision` advances, `previous_fact_id` points at the replaced
    /// identity, and the new `fact_id` becomes the row's `crouton_id`.
    pub async fn upsert_fact(&self, fact: &Crouton) -> Result<Crouton, StoreError> {
        let mut tx = self.pool().begin().await?;
        let now = now_rfc3339();

        let prior: Option<(String, i64)> =
            sqlx::query_as("SELECT fact_id, revision FROM croutons WHERE slot_id = ?")
                .bind(&fact.slot_id)
                .fetch_optional(&mut *tx)
                .await?;

        let anchor = fact.evidence_anchor.as_ref();
        match prior {
            Some((prev_id, _)) if prev_id == fact.fact_id => {
                sqlx::query("UPDATE croutons SET confidence = ?, updated_at = ? WHERE slot_id = ?")
                    .bind(fact.confidence)
                    .bind(&now)
                    .bind(&fact.slot_id)
                    .execute(&mut *tx)
                    .await?;
            }
            Some((prev_id, prev_rev)) => {
                sqlx::query(
                    r#"
                    UPDATE croutons SET
                        crouton_id = ?, fact_id = ?, revision = ?, previous_fact_id = ?,
                        subject = ?, predicate = ?, object = ?, text = ?,
                        supporting_text = ?, char_start = ?, char_end = ?,
                        fragment_hash = ?, extraction_text_hash = ?,
                        evidence_type = ?, source_path = ?, anchor_missing = ?,
                        confidence = ?, updated_at = ?
                    WHERE slot_id = ?
                    "#,
                )
                .bind(&fact.fact_id)
                .bind(&fact.fact_id)
                .bind(prev_rev + 1)
                .bind(&prev_id)
                .bind(&fact.triple.subject)
                .bind(&fact.triple.predicate)
                .bind(&fact.triple.object)
                .bind(&fact.text)
                .bind(&fact.supporting_text)
                .bind(anchor.map(|a| a.char_start as i64))
                .bind(anchor.map(|a| a.char_end as i64))
                .bind(anchor.map(|a| a.fragment_hash.as_str()))
                .bind(anchor.map(|a| a.extraction_text_hash.as_str()))
                .bind(fact.evidence_type.as_str())
                .bind(&fact.source_path)
                .bind(i64::from(fact.anchor_missing))
                .bind(fact.confidence)
                .bind(&now)
                .bind(&fact.slot_id)
                .execute(&mut *tx)
                .await?;
                debug!(slot_id = %fact.slot_id, revision = prev_rev + 1, "fact revised");
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO croutons
                        (crouton_id, domain, source_url, slot_id, fact_id, revision,
                         previous_fact_id, subject, predicate, object, text,
                         supporting_text, char_start, char_end, fragment_hash,
                         extraction_text_hash, evidence_type, source_path,
                         anchor_missing, confidence, updated_at)
                    VALUES (?, ?, ?, ?, ?, 1, NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&fact.crouton_id)
                .bind(&fact.domain)
                .bind(&fact.source_url)
                .bind(&fact.slot_id)
                .bind(&fact.fact_id)
                .bind(&fact.triple.subject)
                .bind(&fact.triple.predicate)
                .bind(&fact.triple.object)
                .bind(&fact.text)
                .bind(&fact.supporting_text)
                .bind(anchor.map(|a| a.char_start as i64))
                .bind(anchor.map(|a| a.char_end as i64))
                .bind(anchor.map(|a| a.fragment_hash.as_str()))
                .bind(anchor.map(|a| a.extraction_text_hash.as_str()))
                .bind(fact.evidence_type.as_str())
                .bind(&fact.source_path)
                .bind(i64::from(fact.anchor_missing))
                .bind(fact.confidence)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
                debug!(crouton_id = %fact.crouton_id, "fact inserted");
            }
        }
        tx.commit().await?;

        self.get_fact(&fact.fact_id).await
    }

    /// Fetch one fact by identity.
    pub async fn get_fact(&self, crouton_id: &str) -> Result<Crouton, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM croutons WHERE crouton_id = ?");
        let row: Option<CroutonRow> = sqlx::query_as(&sql)
            .bind(crouton_id)
            .fetch_optional(self.pool())
            .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("crouton {crouton_id}")))?
            .into_crouton()
    }

    /// All facts for a domain matching the filter, in stable slot order.
    pub async fn list_facts(
        &self,
        domain: &str,
        filter: &FactFilter,
    ) -> Result<Vec<Crouton>, StoreError> {
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM croutons WHERE domain = ?");
        if filter.evidence_type.is_some() {
            sql.push_str(" AND evidence_type = ?");
        }
        if filter.source_url.is_some() {
            sql.push_str(" AND source_url IN (?, ?)");
        }
        sql.push_str(" ORDER BY slot_id ASC");

        let mut query = sqlx::query_as::<_, CroutonRow>(&sql).bind(domain);
        if let Some(et) = filter.evidence_type {
            query = query.bind(et.as_str());
        }
        if let Some(url) = &filter.source_url {
            query = query.bind(url.clone()).bind(slash_sibling(url));
        }

        let rows = query.fetch_all(self.pool()).await?;
        rows.into_iter().map(CroutonRow::into_crouton).collect()
    }

    /// Text-extraction facts for one URL (trailing-slash tolerant), for the
    /// anchor validator.
    pub async fn text_facts_for_url(
        &self,
        domain: &str,
        source_url: &str,
    ) -> Result<Vec<Crouton>, StoreError> {
        let filter = FactFilter {
            evidence_type: Some(EvidenceType::TextExtraction),
            source_url: Some(source_url.to_string()),
        };
        self.list_facts(domain, &filter).await
    }

    /// Aggregate counts for the status publisher.
    pub async fn fact_counts(&self, domain: &str) -> Result<FactCounts, StoreError> {
        let (total, text, structured, anchored, pages, entities): (i64, i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(evidence_type = 'text_extraction'), 0),
                    COALESCE(SUM(evidence_type = 'structured_data'), 0),
                    COALESCE(SUM(evidence_type = 'text_extraction' AND anchor_missing = 0), 0),
                    COUNT(DISTINCT source_url),
                    COUNT(DISTINCT subject)
                FROM croutons
                WHERE domain = ?
                "#,
            )
            .bind(domain)
            .fetch_one(self.pool())
            .await?;
        Ok(FactCounts {
            facts_total: total as u64,
            facts_text_extraction: text as u64,
            facts_structured_data: structured as u64,
            anchored_text_facts: anchored as u64,
            pages: pages as u64,
            entities: entities as u64,
        })
    }
}
