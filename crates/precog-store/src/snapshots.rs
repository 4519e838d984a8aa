// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTML snapshots: one authoritative row per `(domain, source_url)`.

use crate::{Store, StoreError, parse_ts};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A fetched page and its canonical extraction.
///
/// `canonical_extracted_text` is the sole reference for anchor validation;
/// re-fetching a page replaces the row in place.
#[derive(Clone, Debug)]
pub struct HtmlSnapshot {
    /// Domain the page belongs to.
    pub domain: String,
    /// Exact URL fetched.
    pub source_url: String,
    /// Raw response body.
    pub html: String,
    /// Deterministic boilerplate-scrubbed extraction.
    pub canonical_extracted_text: String,
    /// SHA-256 of `canonical_extracted_text`.
    pub extraction_text_hash: String,
    /// Extractor identifier (e.g. `"sections-v1"`).
    pub extraction_method: String,
    /// Fetch timestamp.
    pub fetched_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SnapshotRow {
    domain: String,
    source_url: String,
    html: String,
    canonical_extracted_text: String,
    extraction_text_hash: String,
    extraction_method: String,
    fetched_at: String,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<HtmlSnapshot, StoreError> {
        Ok(HtmlSnapshot {
            domain: self.domain,
            source_url: self.source_url,
            html: self.html,
            canonical_extracted_text: self.canonical_extracted_text,
            extraction_text_hash: self.extraction_text_hash,
            extraction_method: self.extraction_method,
            fetched_at: parse_ts(&self.fetched_at)?,
        })
    }
}

impl Store {
    /// Insert or replace the snapshot for `(domain, source_url)`.
    pub async fn upsert_snapshot(&self, snapshot: &HtmlSnapshot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO html_snapshots
                (domain, source_url, html, canonical_extracted_text,
                 extraction_text_hash, extraction_method, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (domain, source_url) DO UPDATE SET
                html = excluded.html,
                canonical_extracted_text = excluded.canonical_extracted_text,
                extraction_text_hash = excluded.extraction_text_hash,
                extraction_method = excluded.extraction_method,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(&snapshot.domain)
        .bind(&snapshot.source_url)
        .bind(&snapshot.html)
        .bind(&snapshot.canonical_extracted_text)
        .bind(&snapshot.extraction_text_hash)
        .bind(&snapshot.extraction_method)
        .bind(snapshot.fetched_at.to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Latest snapshot for `(domain, source_url)`.
    pub async fn get_snapshot(
        &self,
        domain: &str,
        source_url: &str,
    ) -> Result<HtmlSnapshot, StoreError> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT domain, source_url, html, canonical_extracted_text,
                   extraction_text_hash, extraction_method, fetched_at
            FROM html_snapshots
            WHERE domain = ? AND source_url = ?
            "#,
        )
        .bind(domain)
        .bind(source_url)
        .fetch_optional(self.pool())
        .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("snapshot {domain} {source_url}")))?
            .into_snapshot()
    }
}
