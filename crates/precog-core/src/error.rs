// SPDX-License-Identifier: MIT OR Apache-2.0
//! Boundary error taxonomy.
//!
//! Every error observable at a component boundary maps to one of these
//! kinds; HTTP handlers translate kinds to status codes and user-visible
//! messages without leaking stack detail.

use serde::Serialize;

/// Platform-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or mismatching bearer token.
    #[error("auth error: {0}")]
    Auth(String),

    /// Job, domain, snapshot, or mirror missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Conflicting state (e.g. an already-verified domain).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Per-IP token bucket exhausted.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the window rolls and a token is available again.
        retry_after_secs: u64,
    },

    /// Non-2xx response while fetching a source URL.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),

    /// The ingest QA gate refused publication.
    #[error("qa gate failed: {}", errors.join("; "))]
    QaGate {
        /// What failed.
        errors: Vec<String>,
        /// Concrete remediation hints returned to the caller.
        fix_suggestions: Vec<String>,
    },

    /// A precog processor raised.
    #[error("processor error: {0}")]
    Processor(String),

    /// Store or bus unavailable.
    #[error("infrastructure error: {0}")]
    TransientInfra(String),
}

impl Error {
    /// Machine-readable kind name, stable across releases.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Auth(_) => "auth",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::RateLimited { .. } => "rate_limited",
            Self::UpstreamFetch(_) => "upstream_fetch",
            Self::QaGate { .. } => "qa_gate",
            Self::Processor(_) => "processor",
            Self::TransientInfra(_) => "transient_infra",
        }
    }

    /// Render the boundary representation (kind + message, no stack detail).
    #[must_use]
    pub fn to_boundary(&self) -> BoundaryError {
        BoundaryError {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Serializable boundary form of an [`Error`].
#[derive(Debug, Clone, Serialize)]
pub struct BoundaryError {
    /// Stable kind name.
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
}
