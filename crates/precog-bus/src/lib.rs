// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! precog-bus
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// In-memory bus with Redis-compatible claim semantics.
pub mod memory;
/// Redis Streams implementation.
pub mod stream;

pub use memory::InMemoryBus;
pub use stream::RedisStreamBus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Name of the primary work-queue log.
pub const JOBS_STREAM: &str = "jobs";

/// Name of the dead-letter log.
pub const DLQ_STREAM: &str = "jobs_dlq";

/// The single consumer group workers register in.
pub const CONSUMER_GROUP: &str = "precog-workers";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// The handoff payload the dispatcher enqueues and workers decode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Job identifier in the durable store.
    pub job_id: Uuid,
    /// Precog tag selecting the processor.
    pub precog: String,
    /// Task for the processor.
    pub task: String,
    /// Free-form context.
    pub context: BTreeMap<String, Value>,
}

/// A claimed message: the broker id plus the decoded payload.
#[derive(Clone, Debug)]
pub struct BusMessage {
    /// Broker-assigned message id; pass back to [`StreamBus::ack`].
    pub id: String,
    /// Decoded handoff payload.
    pub payload: JobPayload,
}

/// A dead letter: the original payload plus the terminal error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The payload that exhausted its retry budget.
    pub payload: JobPayload,
    /// Final error string from the processor.
    pub error: String,
    /// When the message was routed here.
    pub failed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the stream bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Underlying Redis failure.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A payload failed to encode or decode.
    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A broker reply was missing an expected field.
    #[error("malformed broker reply: {0}")]
    Malformed(String),
}

impl From<BusError> for precog_core::Error {
    fn from(err: BusError) -> Self {
        precog_core::Error::TransientInfra(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// StreamBus
// ---------------------------------------------------------------------------

/// The replicated-log seam between dispatcher and workers.
///
/// Claim semantics: a message returned by [`read_group`](Self::read_group)
/// is pending for that consumer until [`ack`](Self::ack)ed. Unacked
/// messages survive consumer crashes and become eligible for
/// [`reclaim_stale`](Self::reclaim_stale) once their idle time passes the
/// threshold.
#[async_trait]
pub trait StreamBus: Send + Sync {
    /// Create the consumer group if it does not exist yet. Idempotent.
    async fn ensure_group(&self) -> Result<(), BusError>;

    /// Append a payload to the `jobs` log; returns the broker message id.
    async fn enqueue(&self, payload: &JobPayload) -> Result<String, BusError>;

    /// Block up to `block_ms` for at most `count` new messages, marking
    /// them pending for `consumer`.
    async fn read_group(
        &self,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<BusMessage>, BusError>;

    /// Remove the pending marker for a claimed message.
    async fn ack(&self, id: &str) -> Result<(), BusError>;

    /// Append a record to the dead-letter log; returns the broker id.
    async fn enqueue_dead_letter(&self, letter: &DeadLetter) -> Result<String, BusError>;

    /// Most recent dead letters, newest first, at most `limit`.
    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, BusError>;

    /// Claim messages pending longer than `min_idle_ms` (from any consumer)
    /// for `consumer`, so a live worker can finish work a dead one dropped.
    async fn reclaim_stale(
        &self,
        consumer: &str,
        min_idle_ms: u64,
    ) -> Result<Vec<BusMessage>, BusError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_roundtrip() {
        let payload = JobPayload {
            job_id: Uuid::nil(),
            precog: "schema".into(),
            task: "analyze".into(),
            context: BTreeMap::from([("url".to_string(), json!("https://nrlc.ai/"))]),
        };
        let raw = serde_json::to_string(&payload).unwrap();
        let back: JobPayload = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn dead_letter_carries_payload_and_error() {
        let letter = DeadLetter {
            payload: JobPayload {
                job_id: Uuid::nil(),
                precog: "schema".into(),
                task: "analyze".into(),
                context: BTreeMap::new(),
            },
            error: "processor error: boom".into(),
            failed_at: Utc::now(),
        };
        let raw = serde_json::to_string(&letter).unwrap();
        let back: DeadLetter = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.payload.precog, "schema");
        assert!(back.error.contains("boom"));
    }
}
