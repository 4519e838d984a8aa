// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! precog-store
#![deny(unsafe_code)]

mod domains;
mod error;
mod facts;
mod jobs;
mod markdown;
mod schema;
mod snapshots;

pub use domains::{DiscoveredPage, DiscoveryMethod, VerifiedDomain};
pub use error::StoreError;
pub use facts::{FactCounts, FactFilter};
pub use markdown::MarkdownVersion;
pub use snapshots::HtmlSnapshot;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

/// Shared handle over the durable store.
///
/// Cheap to clone; all methods take `&self`. Every multi-row write runs in a
/// transaction, so callers observe either commit or an error.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the store and run idempotent migrations.
    ///
    /// In-memory URLs are pinned to a single connection so every caller
    /// sees the same database.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(url = %database_url, "store connected");
        Ok(store)
    }

    /// Wrap an existing pool (tests, embedded deployments).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run the idempotent schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        schema::migrate(&self.pool).await
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Timestamps are stored as RFC3339 TEXT; decode failures surface as
/// [`StoreError::Corrupt`] rather than panicking.
pub(crate) fn parse_ts(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Fresh single-connection in-memory store for unit tests.
    pub async fn memory_store() -> Store {
        Store::connect("sqlite::memory:")
            .await
            .expect("in-memory store")
    }
}
