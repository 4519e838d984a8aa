// SPDX-License-Identifier: MIT OR Apache-2.0
//! Idempotent schema migrations.
//!
//! Every statement is `IF NOT EXISTS`, so migrations run unconditionally at
//! startup and re-running against an already-migrated database is a no-op.

use crate::StoreError;
use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id         TEXT PRIMARY KEY,
        precog     TEXT NOT NULL,
        task       TEXT NOT NULL,
        context    TEXT NOT NULL DEFAULT '{}',
        status     TEXT NOT NULL DEFAULT 'pending',
        error      TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs(status, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS job_events (
        job_id     TEXT NOT NULL,
        seq        INTEGER NOT NULL,
        event_type TEXT NOT NULL,
        data       TEXT NOT NULL DEFAULT '{}',
        ts         TEXT NOT NULL,
        PRIMARY KEY (job_id, seq)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS html_snapshots (
        id                       INTEGER PRIMARY KEY AUTOINCREMENT,
        domain                   TEXT NOT NULL,
        source_url               TEXT NOT NULL,
        html                     TEXT NOT NULL,
        canonical_extracted_text TEXT NOT NULL DEFAULT '',
        extraction_text_hash     TEXT NOT NULL DEFAULT '',
        extraction_method        TEXT NOT NULL DEFAULT '',
        fetched_at               TEXT NOT NULL,
        UNIQUE (domain, source_url)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS croutons (
        crouton_id           TEXT PRIMARY KEY,
        domain               TEXT NOT NULL,
        source_url           TEXT NOT NULL,
        slot_id              TEXT NOT NULL,
        fact_id              TEXT NOT NULL,
        revision             INTEGER NOT NULL DEFAULT 1,
        previous_fact_id     TEXT,
        subject              TEXT NOT NULL,
        predicate            TEXT NOT NULL,
        object               TEXT NOT NULL,
        text                 TEXT NOT NULL,
        supporting_text      TEXT,
        char_start           INTEGER,
        char_end             INTEGER,
        fragment_hash        TEXT,
        extraction_text_hash TEXT,
        evidence_type        TEXT NOT NULL,
        source_path          TEXT,
        anchor_missing       INTEGER NOT NULL DEFAULT 1,
        confidence           REAL NOT NULL DEFAULT 0.5,
        updated_at           TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_croutons_domain ON croutons(domain)",
    "CREATE INDEX IF NOT EXISTS idx_croutons_domain_url ON croutons(domain, source_url)",
    "CREATE INDEX IF NOT EXISTS idx_croutons_evidence ON croutons(evidence_type)",
    "CREATE INDEX IF NOT EXISTS idx_croutons_slot_rev ON croutons(slot_id, revision)",
    r#"
    CREATE TABLE IF NOT EXISTS markdown_versions (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        domain           TEXT NOT NULL,
        path             TEXT NOT NULL,
        content          TEXT NOT NULL,
        content_hash     TEXT NOT NULL,
        generated_at     TEXT NOT NULL,
        is_active        INTEGER NOT NULL DEFAULT 0,
        markdown_version TEXT NOT NULL,
        protocol_version TEXT NOT NULL,
        UNIQUE (domain, path, content_hash)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_markdown_active ON markdown_versions(domain, path, is_active)",
    r#"
    CREATE TABLE IF NOT EXISTS verified_domains (
        domain             TEXT PRIMARY KEY,
        verification_token TEXT NOT NULL,
        verified_at        TEXT,
        protocol_version   TEXT NOT NULL,
        last_ingested_at   TEXT,
        qa_tier            TEXT,
        qa_pass            INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS discovered_pages (
        domain                TEXT NOT NULL,
        page_url              TEXT NOT NULL,
        alternate_href        TEXT,
        discovered_mirror_url TEXT,
        discovery_method      TEXT NOT NULL DEFAULT 'none',
        discovered_at         TEXT NOT NULL,
        ingestion_id          TEXT,
        UNIQUE (domain, page_url)
    )
    "#,
];

/// Apply all migrations. Safe to call on every startup.
pub(crate) async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    for stmt in STATEMENTS {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
