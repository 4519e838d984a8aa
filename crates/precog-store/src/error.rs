// SPDX-License-Identifier: MIT OR Apache-2.0
//! Store error type.

use precog_core::JobStatus;

/// Errors surfaced by the durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A status transition violated the monotone lifecycle.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: JobStatus,
        /// Rejected successor.
        to: JobStatus,
    },

    /// A stored row failed to decode (bad timestamp, bad JSON).
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for precog_core::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => precog_core::Error::NotFound(what),
            StoreError::InvalidTransition { from, to } => {
                precog_core::Error::Conflict(format!("invalid status transition {from} -> {to}"))
            }
            other => precog_core::Error::TransientInfra(other.to_string()),
        }
    }
}
