// SPDX-License-Identifier: MIT OR Apache-2.0
//! Verified domains and discovered pages.

use crate::{Store, StoreError, now_rfc3339, parse_ts};
use chrono::{DateTime, Utc};
use precog_core::Tier;
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// VerifiedDomain
// ---------------------------------------------------------------------------

/// Ownership-verification state for a domain.
///
/// A domain is *verified* iff `verified_at` is non-null. The core reads this
/// flag to gate discovery and to relax the ingest QA schema threshold.
#[derive(Clone, Debug)]
pub struct VerifiedDomain {
    /// The domain name.
    pub domain: String,
    /// Token the owner must publish to prove control.
    pub verification_token: String,
    /// When the proof was observed, if ever.
    pub verified_at: Option<DateTime<Utc>>,
    /// Protocol version the domain was registered under.
    pub protocol_version: String,
    /// Timestamp of the last successful ingest.
    pub last_ingested_at: Option<DateTime<Utc>>,
    /// Last computed quality tier.
    pub qa_tier: Option<String>,
    /// Whether the last QA gate passed.
    pub qa_pass: Option<bool>,
}

impl VerifiedDomain {
    /// Returns `true` when ownership has been proven.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }
}

#[derive(FromRow)]
struct DomainRow {
    domain: String,
    verification_token: String,
    verified_at: Option<String>,
    protocol_version: String,
    last_ingested_at: Option<String>,
    qa_tier: Option<String>,
    qa_pass: Option<i64>,
}

impl DomainRow {
    fn into_domain(self) -> Result<VerifiedDomain, StoreError> {
        Ok(VerifiedDomain {
            domain: self.domain,
            verification_token: self.verification_token,
            verified_at: self.verified_at.as_deref().map(parse_ts).transpose()?,
            protocol_version: self.protocol_version,
            last_ingested_at: self.last_ingested_at.as_deref().map(parse_ts).transpose()?,
            qa_tier: self.qa_tier,
            qa_pass: self.qa_pass.map(|v| v != 0),
        })
    }
}

// ---------------------------------------------------------------------------
// DiscoveredPage
// ---------------------------------------------------------------------------

/// How a page declared its mirror.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoveryMethod {
    /// `<link rel="alternate">` in the HTML head.
    HtmlLink,
    /// `Link` response header.
    HttpLink,
    /// Both of the above.
    Both,
    /// No declaration found.
    None,
}

impl DiscoveryMethod {
    /// Stable wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HtmlLink => "html_link",
            Self::HttpLink => "http_link",
            Self::Both => "both",
            Self::None => "none",
        }
    }

    /// Parse a stable wire name.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "html_link" => Ok(Self::HtmlLink),
            "http_link" => Ok(Self::HttpLink),
            "both" => Ok(Self::Both),
            "none" => Ok(Self::None),
            other => Err(StoreError::Corrupt(format!(
                "unknown discovery method '{other}'"
            ))),
        }
    }
}

/// A page registered through the discovery endpoint.
#[derive(Clone, Debug)]
pub struct DiscoveredPage {
    /// Owning domain.
    pub domain: String,
    /// The page URL.
    pub page_url: String,
    /// `href` of the alternate link found on the page, if any.
    pub alternate_href: Option<String>,
    /// Mirror URL the discovery resolved to.
    pub discovered_mirror_url: Option<String>,
    /// How the mirror was declared.
    pub discovery_method: DiscoveryMethod,
    /// When the page was discovered.
    pub discovered_at: DateTime<Utc>,
    /// Ingest job that processed the page, if one ran.
    pub ingestion_id: Option<String>,
}

#[derive(FromRow)]
struct PageRow {
    domain: String,
    page_url: String,
    alternate_href: Option<String>,
    discovered_mirror_url: Option<String>,
    discovery_method: String,
    discovered_at: String,
    ingestion_id: Option<String>,
}

impl PageRow {
    fn into_page(self) -> Result<DiscoveredPage, StoreError> {
        Ok(DiscoveredPage {
            domain: self.domain,
            page_url: self.page_url,
            alternate_href: self.alternate_href,
            discovered_mirror_url: self.discovered_mirror_url,
            discovery_method: DiscoveryMethod::parse(&self.discovery_method)?,
            discovered_at: parse_ts(&self.discovered_at)?,
            ingestion_id: self.ingestion_id,
        })
    }
}

impl Store {
    /// Register a domain for verification with a fresh token.
    ///
    /// Re-initiating an unverified domain rotates the token; an
    /// already-verified domain is left untouched and returned as-is.
    pub async fn initiate_domain(
        &self,
        domain: &str,
        token: &str,
    ) -> Result<VerifiedDomain, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO verified_domains (domain, verification_token, protocol_version)
            VALUES (?, ?, ?)
            ON CONFLICT (domain) DO UPDATE SET
                verification_token = CASE
                    WHEN verified_domains.verified_at IS NULL THEN excluded.verification_token
                    ELSE verified_domains.verification_token
                END
            "#,
        )
        .bind(domain)
        .bind(token)
        .bind(precog_core::PROTOCOL_VERSION)
        .execute(self.pool())
        .await?;
        self.get_domain(domain).await
    }

    /// Stamp `verified_at = now`.
    pub async fn mark_domain_verified(&self, domain: &str) -> Result<VerifiedDomain, StoreError> {
        let updated = sqlx::query("UPDATE verified_domains SET verified_at = ? WHERE domain = ?")
            .bind(now_rfc3339())
            .bind(domain)
            .execute(self.pool())
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::NotFound(format!("domain {domain}")));
        }
        self.get_domain(domain).await
    }

    /// Fetch a domain's verification state.
    pub async fn get_domain(&self, domain: &str) -> Result<VerifiedDomain, StoreError> {
        let row: Option<DomainRow> =
            sqlx::query_as("SELECT * FROM verified_domains WHERE domain = ?")
                .bind(domain)
                .fetch_optional(self.pool())
                .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("domain {domain}")))?
            .into_domain()
    }

    /// Returns `true` iff the domain exists and has been verified.
    pub async fn is_domain_verified(&self, domain: &str) -> Result<bool, StoreError> {
        match self.get_domain(domain).await {
            Ok(d) => Ok(d.is_verified()),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Record the outcome of an ingest QA pass on the domain row.
    pub async fn record_domain_qa(
        &self,
        domain: &str,
        tier: Tier,
        qa_pass: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO verified_domains
                (domain, verification_token, protocol_version, last_ingested_at, qa_tier, qa_pass)
            VALUES (?, '', ?, ?, ?, ?)
            ON CONFLICT (domain) DO UPDATE SET
                last_ingested_at = excluded.last_ingested_at,
                qa_tier = excluded.qa_tier,
                qa_pass = excluded.qa_pass
            "#,
        )
        .bind(domain)
        .bind(precog_core::PROTOCOL_VERSION)
        .bind(now_rfc3339())
        .bind(tier.as_str())
        .bind(i64::from(qa_pass))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Insert or replace a discovered page for `(domain, page_url)`.
    pub async fn upsert_discovered_page(&self, page: &DiscoveredPage) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO discovered_pages
                (domain, page_url, alternate_href, discovered_mirror_url,
                 discovery_method, discovered_at, ingestion_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (domain, page_url) DO UPDATE SET
                alternate_href = excluded.alternate_href,
                discovered_mirror_url = excluded.discovered_mirror_url,
                discovery_method = excluded.discovery_method,
                discovered_at = excluded.discovered_at,
                ingestion_id = excluded.ingestion_id
            "#,
        )
        .bind(&page.domain)
        .bind(&page.page_url)
        .bind(&page.alternate_href)
        .bind(&page.discovered_mirror_url)
        .bind(page.discovery_method.as_str())
        .bind(now_rfc3339())
        .bind(&page.ingestion_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// All discovered pages for a domain.
    pub async fn list_discovered_pages(
        &self,
        domain: &str,
    ) -> Result<Vec<DiscoveredPage>, StoreError> {
        let rows: Vec<PageRow> = sqlx::query_as(
            "SELECT * FROM discovered_pages WHERE domain = ? ORDER BY page_url ASC",
        )
        .bind(domain)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(PageRow::into_page).collect()
    }
}
