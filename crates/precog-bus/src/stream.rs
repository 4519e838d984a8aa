// SPDX-License-Identifier: MIT OR Apache-2.0
//! Redis Streams implementation of [`StreamBus`].
//!
//! Layout on the wire: the `jobs` stream carries one `payload` field per
//! entry (the JSON-encoded [`JobPayload`]); `jobs_dlq` carries one `record`
//! field per entry (the JSON-encoded [`DeadLetter`]). The consumer group is
//! created with `MKSTREAM` so a fresh deployment needs no manual setup.

use crate::{
    BusError, BusMessage, CONSUMER_GROUP, DLQ_STREAM, DeadLetter, JOBS_STREAM, JobPayload,
    StreamBus,
};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamRangeReply, StreamReadOptions,
    StreamReadReply,
};
use tracing::{debug, warn};

/// [`StreamBus`] backed by Redis Streams.
#[derive(Clone)]
pub struct RedisStreamBus {
    manager: ConnectionManager,
}

impl RedisStreamBus {
    /// Connect to Redis and return the bus handle.
    ///
    /// The connection manager reconnects transparently; transient network
    /// failures surface as [`BusError::Redis`] on the affected call only.
    pub async fn connect(redis_url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    fn message_from_entry(entry: &StreamId) -> Result<BusMessage, BusError> {
        let raw = entry
            .map
            .get("payload")
            .ok_or_else(|| BusError::Malformed(format!("entry {} missing payload", entry.id)))?;
        let raw: String = redis::from_redis_value(raw)?;
        Ok(BusMessage {
            id: entry.id.clone(),
            payload: decode_payload(&raw)?,
        })
    }
}

pub(crate) fn decode_payload(raw: &str) -> Result<JobPayload, BusError> {
    Ok(serde_json::from_str(raw)?)
}

#[async_trait]
impl StreamBus for RedisStreamBus {
    async fn ensure_group(&self) -> Result<(), BusError> {
        let mut conn = self.conn();
        let created: Result<String, redis::RedisError> = conn
            .xgroup_create_mkstream(JOBS_STREAM, CONSUMER_GROUP, "$")
            .await;
        match created {
            Ok(_) => {
                debug!(group = CONSUMER_GROUP, stream = JOBS_STREAM, "consumer group created");
                Ok(())
            }
            // Group already exists: idempotent startup.
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn enqueue(&self, payload: &JobPayload) -> Result<String, BusError> {
        let raw = serde_json::to_string(payload)?;
        let mut conn = self.conn();
        let id: String = conn.xadd(JOBS_STREAM, "*", &[("payload", raw)]).await?;
        debug!(job_id = %payload.job_id, message_id = %id, "job enqueued");
        Ok(id)
    }

    async fn read_group(
        &self,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<BusMessage>, BusError> {
        let opts = StreamReadOptions::default()
            .group(CONSUMER_GROUP, consumer)
            .count(count)
            .block(block_ms as usize);
        let mut conn = self.conn();
        let reply: StreamReadReply = conn.xread_options(&[JOBS_STREAM], &[">"], &opts).await?;

        let mut out = Vec::new();
        for key in &reply.keys {
            for entry in &key.ids {
                match Self::message_from_entry(entry) {
                    Ok(msg) => out.push(msg),
                    Err(e) => {
                        // Ack and drop undecodable entries rather than
                        // redelivering them forever.
                        warn!(entry = %entry.id, error = %e, "dropping malformed bus entry");
                        let _: i64 = conn
                            .xack(JOBS_STREAM, CONSUMER_GROUP, &[entry.id.as_str()])
                            .await?;
                    }
                }
            }
        }
        Ok(out)
    }

    async fn ack(&self, id: &str) -> Result<(), BusError> {
        let mut conn = self.conn();
        let _: i64 = conn.xack(JOBS_STREAM, CONSUMER_GROUP, &[id]).await?;
        Ok(())
    }

    async fn enqueue_dead_letter(&self, letter: &DeadLetter) -> Result<String, BusError> {
        let raw = serde_json::to_string(letter)?;
        let mut conn = self.conn();
        let id: String = conn.xadd(DLQ_STREAM, "*", &[("record", raw)]).await?;
        warn!(job_id = %letter.payload.job_id, message_id = %id, "job routed to DLQ");
        Ok(id)
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, BusError> {
        let mut conn = self.conn();
        let reply: StreamRangeReply = conn.xrevrange_count(DLQ_STREAM, "+", "-", limit).await?;
        let mut out = Vec::with_capacity(reply.ids.len());
        for entry in &reply.ids {
            let raw = entry
                .map
                .get("record")
                .ok_or_else(|| BusError::Malformed(format!("entry {} missing record", entry.id)))?;
            let raw: String = redis::from_redis_value(raw)?;
            out.push(serde_json::from_str(&raw)?);
        }
        Ok(out)
    }

    async fn reclaim_stale(
        &self,
        consumer: &str,
        min_idle_ms: u64,
    ) -> Result<Vec<BusMessage>, BusError> {
        let opts = StreamAutoClaimOptions::default().count(100);
        let mut conn = self.conn();
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                JOBS_STREAM,
                CONSUMER_GROUP,
                consumer,
                min_idle_ms as usize,
                "0-0",
                opts,
            )
            .await?;
        let mut out = Vec::new();
        for entry in &reply.claimed {
            out.push(Self::message_from_entry(entry)?);
        }
        if !out.is_empty() {
            debug!(consumer, reclaimed = out.len(), "stale messages reclaimed");
        }
        Ok(out)
    }

    async fn ping(&self) -> Result<(), BusError> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
