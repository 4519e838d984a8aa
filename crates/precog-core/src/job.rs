// SPDX-License-Identifier: MIT OR Apache-2.0
//! Jobs, the status machine, and the per-job event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a precog job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created by the dispatcher, waiting for a worker.
    Pending,
    /// Claimed by a worker and currently processing.
    Running,
    /// The processor finished successfully.
    Done,
    /// The processor exhausted its retry budget, or the payload was invalid.
    Error,
    /// Cancelled before completion.
    Cancelled,
}

impl JobStatus {
    /// Returns `true` if this status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }

    /// Returns the set of statuses that are valid successors of `self`.
    ///
    /// Terminal transitions are monotone: once a job is `done`, `error`, or
    /// `cancelled` it never moves again.
    #[must_use]
    pub fn valid_transitions(&self) -> &'static [JobStatus] {
        match self {
            Self::Pending => &[Self::Running, Self::Error, Self::Cancelled],
            Self::Running => &[Self::Done, Self::Error, Self::Cancelled],
            Self::Done | Self::Error | Self::Cancelled => &[],
        }
    }

    /// Returns `true` if transitioning from `self` to `next` is valid.
    #[must_use]
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Stable wire name (matches the serde representation).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a stable wire name back into a status.
    pub fn parse(s: &str) -> Result<Self, crate::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(crate::Error::Validation(format!(
                "unknown job status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A single precog request tracked by the registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    /// Opaque job identifier.
    pub id: Uuid,

    /// Precog tag selecting the processor (e.g. `"schema"`, `"home.safety"`).
    pub precog: String,

    /// The task the processor should perform.
    pub task: String,

    /// Free-form context handed to the processor.
    pub context: BTreeMap<String, Value>,

    /// Current lifecycle status.
    pub status: JobStatus,

    /// Error message; non-empty iff `status` is [`JobStatus::Error`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Timestamp when the job was created.
    pub created_at: DateTime<Utc>,

    /// Timestamp of the most recent status transition.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// One entry in a job's append-only event log.
///
/// `id` is a strictly monotone per-job sequence assigned by the registry;
/// it defines the only ordering clients observe.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobEvent {
    /// Per-job sequence number, starting at 1.
    pub id: i64,

    /// The owning job.
    pub job_id: Uuid,

    /// Event type name (see [`crate::event_types`]).
    #[serde(rename = "type")]
    pub event_type: String,

    /// Structured payload.
    pub data: Value,

    /// Timestamp stamped by the registry at append time.
    pub ts: DateTime<Utc>,
}
