// SPDX-License-Identifier: MIT OR Apache-2.0
//! Markdown mirror versions with atomic active-flag swaps.

use crate::{Store, StoreError, now_rfc3339, parse_ts};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::debug;

/// One generated Markdown document for `(domain, path)`.
#[derive(Clone, Debug)]
pub struct MarkdownVersion {
    /// Owning domain.
    pub domain: String,
    /// Mirror path (source URL pathname, slashes stripped, `index` for root).
    pub path: String,
    /// The document body.
    pub content: String,
    /// SHA-256 of `content`; doubles as the mirror ETag.
    pub content_hash: String,
    /// Generation timestamp.
    pub generated_at: DateTime<Utc>,
    /// Whether this row is the one the mirror serves.
    pub is_active: bool,
    /// Markdown format version (frontmatter value).
    pub markdown_version: String,
    /// Protocol version the facts were published under.
    pub protocol_version: String,
}

#[derive(FromRow)]
struct MarkdownRow {
    domain: String,
    path: String,
    content: String,
    content_hash: String,
    generated_at: String,
    is_active: i64,
    markdown_version: String,
    protocol_version: String,
}

impl MarkdownRow {
    fn into_version(self) -> Result<MarkdownVersion, StoreError> {
        Ok(MarkdownVersion {
            domain: self.domain,
            path: self.path,
            content: self.content,
            content_hash: self.content_hash,
            generated_at: parse_ts(&self.generated_at)?,
            is_active: self.is_active != 0,
            markdown_version: self.markdown_version,
            protocol_version: self.protocol_version,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    domain, path, content, content_hash, generated_at, is_active,
    markdown_version, protocol_version
"#;

impl Store {
    /// Publish a new Markdown version for `(domain, path)`.
    ///
    /// The previous active row is deactivated and the new one activated in
    /// one transaction, so exactly one row is active at any time. If the
    /// content hash matches a stored version, that row is (re)activated
    /// instead of inserting a duplicate; republishing the currently active
    /// content is a no-op.
    pub async fn publish_markdown(
        &self,
        domain: &str,
        path: &str,
        content: &str,
    ) -> Result<MarkdownVersion, StoreError> {
        let content_hash = precog_core::sha256_hex(content);
        let mut tx = self.pool().begin().await?;

        let existing: Option<(i64, i64)> = sqlx::query_as(
            "SELECT id, is_active FROM markdown_versions
             WHERE domain = ? AND path = ? AND content_hash = ?",
        )
        .bind(domain)
        .bind(path)
        .bind(&content_hash)
        .fetch_optional(&mut *tx)
        .await?;

        match existing {
            Some((_, active)) if active != 0 => {
                tx.commit().await?;
                return self.get_active_markdown(domain, path).await;
            }
            Some((id, _)) => {
                sqlx::query(
                    "UPDATE markdown_versions SET is_active = 0
                     WHERE domain = ? AND path = ? AND is_active = 1",
                )
                .bind(domain)
                .bind(path)
                .execute(&mut *tx)
                .await?;
                sqlx::query(
                    "UPDATE markdown_versions SET is_active = 1, generated_at = ? WHERE id = ?",
                )
                .bind(now_rfc3339())
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE markdown_versions SET is_active = 0
                     WHERE domain = ? AND path = ? AND is_active = 1",
                )
                .bind(domain)
                .bind(path)
                .execute(&mut *tx)
                .await?;
                sqlx::query(
                    r#"
                    INSERT INTO markdown_versions
                        (domain, path, content, content_hash, generated_at,
                         is_active, markdown_version, protocol_version)
                    VALUES (?, ?, ?, ?, ?, 1, ?, ?)
                    "#,
                )
                .bind(domain)
                .bind(path)
                .bind(content)
                .bind(&content_hash)
                .bind(now_rfc3339())
                .bind(precog_core::MARKDOWN_VERSION)
                .bind(precog_core::PROTOCOL_VERSION)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        debug!(domain, path, hash = %content_hash, "markdown published");
        self.get_active_markdown(domain, path).await
    }

    /// The currently active version for `(domain, path)`.
    pub async fn get_active_markdown(
        &self,
        domain: &str,
        path: &str,
    ) -> Result<MarkdownVersion, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM markdown_versions
             WHERE domain = ? AND path = ? AND is_active = 1"
        );
        let row: Option<MarkdownRow> = sqlx::query_as(&sql)
            .bind(domain)
            .bind(path)
            .fetch_optional(self.pool())
            .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("mirror {domain}/{path}")))?
            .into_version()
    }

    /// Markdown format version of the domain's active mirrors, if any.
    pub async fn active_markdown_version(
        &self,
        domain: &str,
    ) -> Result<Option<String>, StoreError> {
        let version: Option<String> = sqlx::query_scalar(
            "SELECT markdown_version FROM markdown_versions
             WHERE domain = ? AND is_active = 1
             ORDER BY generated_at DESC LIMIT 1",
        )
        .bind(domain)
        .fetch_optional(self.pool())
        .await?;
        Ok(version)
    }

    /// Count of stored versions for `(domain, path)` (all revisions).
    pub async fn markdown_version_count(
        &self,
        domain: &str,
        path: &str,
    ) -> Result<i64, StoreError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM markdown_versions WHERE domain = ? AND path = ?",
        )
        .bind(domain)
        .bind(path)
        .fetch_one(self.pool())
        .await?;
        Ok(n)
    }
}
