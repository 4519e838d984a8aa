// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ingest error type.

use crate::qa::QaReport;
use precog_store::StoreError;

/// Errors surfaced by the ingestion pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Fetching the source URL failed (network error or non-2xx).
    #[error("upstream fetch failed: {0}")]
    Fetch(String),

    /// Durable-store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The QA gate refused publication; nothing was persisted beyond the
    /// snapshot.
    #[error("qa gate failed: {}", report.errors.join("; "))]
    QaGate {
        /// The full gate report, including fix suggestions.
        report: QaReport,
    },
}

impl From<IngestError> for precog_core::Error {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Fetch(msg) => precog_core::Error::UpstreamFetch(msg),
            IngestError::Store(e) => e.into(),
            IngestError::QaGate { report } => precog_core::Error::QaGate {
                errors: report.errors,
                fix_suggestions: report.fix_suggestions,
            },
        }
    }
}
