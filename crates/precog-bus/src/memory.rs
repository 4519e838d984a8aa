// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory bus with the same claim semantics as the Redis implementation.
//!
//! Used by tests and single-process deployments (no `PRECOG_REDIS_URL`).
//! State is process-local and discarded on restart, which matches the
//! durability the platform actually relies on: the store is authoritative,
//! the bus is a handoff channel.

use crate::{BusError, BusMessage, DeadLetter, JobPayload, StreamBus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

struct Pending {
    payload: JobPayload,
    #[allow(dead_code)]
    consumer: String,
    claimed_at: Instant,
}

#[derive(Default)]
struct State {
    queue: Vec<(String, JobPayload)>,
    pending: HashMap<String, Pending>,
    dead_letters: Vec<DeadLetter>,
    next_id: u64,
}

/// Process-local [`StreamBus`].
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

impl InMemoryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently claimed but not acked.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().map(|s| s.pending.len()).unwrap_or(0)
    }

    fn drain(&self, consumer: &str, count: usize) -> Vec<BusMessage> {
        let Ok(mut state) = self.state.lock() else {
            return Vec::new();
        };
        let take = count.min(state.queue.len());
        let drained: Vec<(String, JobPayload)> = state.queue.drain(..take).collect();
        let mut out = Vec::with_capacity(drained.len());
        for (id, payload) in drained {
            state.pending.insert(
                id.clone(),
                Pending {
                    payload: payload.clone(),
                    consumer: consumer.to_string(),
                    claimed_at: Instant::now(),
                },
            );
            out.push(BusMessage { id, payload });
        }
        out
    }
}

#[async_trait]
impl StreamBus for InMemoryBus {
    async fn ensure_group(&self) -> Result<(), BusError> {
        Ok(())
    }

    async fn enqueue(&self, payload: &JobPayload) -> Result<String, BusError> {
        let id = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| BusError::Malformed("bus state poisoned".into()))?;
            state.next_id += 1;
            let id = format!("{}-0", state.next_id);
            state.queue.push((id.clone(), payload.clone()));
            id
        };
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn read_group(
        &self,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<BusMessage>, BusError> {
        let deadline = Instant::now() + Duration::from_millis(block_ms);
        loop {
            let batch = self.drain(consumer, count);
            if !batch.is_empty() {
                return Ok(batch);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let _ = tokio::time::timeout(deadline - now, self.notify.notified()).await;
        }
    }

    async fn ack(&self, id: &str) -> Result<(), BusError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BusError::Malformed("bus state poisoned".into()))?;
        state.pending.remove(id);
        Ok(())
    }

    async fn enqueue_dead_letter(&self, letter: &DeadLetter) -> Result<String, BusError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BusError::Malformed("bus state poisoned".into()))?;
        state.next_id += 1;
        let id = format!("{}-0", state.next_id);
        state.dead_letters.push(letter.clone());
        Ok(id)
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, BusError> {
        let state = self
            .state
            .lock()
            .map_err(|_| BusError::Malformed("bus state poisoned".into()))?;
        Ok(state.dead_letters.iter().rev().take(limit).cloned().collect())
    }

    async fn reclaim_stale(
        &self,
        consumer: &str,
        min_idle_ms: u64,
    ) -> Result<Vec<BusMessage>, BusError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BusError::Malformed("bus state poisoned".into()))?;
        let threshold = Duration::from_millis(min_idle_ms);
        let mut out = Vec::new();
        for (id, entry) in state.pending.iter_mut() {
            if entry.claimed_at.elapsed() >= threshold {
                entry.consumer = consumer.to_string();
                entry.claimed_at = Instant::now();
                out.push(BusMessage {
                    id: id.clone(),
                    payload: entry.payload.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn ping(&self) -> Result<(), BusError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn payload(tag: &str) -> JobPayload {
        JobPayload {
            job_id: Uuid::new_v4(),
            precog: tag.into(),
            task: "analyze".into(),
            context: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn enqueue_then_read_claims_message() {
        let bus = InMemoryBus::new();
        bus.enqueue(&payload("schema")).await.unwrap();

        let batch = bus.read_group("w1", 10, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload.precog, "schema");
        assert_eq!(bus.pending_count(), 1);

        bus.ack(&batch[0].id).await.unwrap();
        assert_eq!(bus.pending_count(), 0);
    }

    #[tokio::test]
    async fn read_blocks_until_timeout_when_empty() {
        let bus = InMemoryBus::new();
        let start = Instant::now();
        let batch = bus.read_group("w1", 10, 50).await.unwrap();
        assert!(batch.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn read_wakes_on_concurrent_enqueue() {
        let bus = InMemoryBus::new();
        let reader = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.read_group("w1", 10, 5_000).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.enqueue(&payload("schema")).await.unwrap();

        let batch = reader.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn claimed_messages_are_not_redelivered() {
        let bus = InMemoryBus::new();
        bus.enqueue(&payload("a")).await.unwrap();
        bus.enqueue(&payload("b")).await.unwrap();

        let first = bus.read_group("w1", 1, 10).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = bus.read_group("w2", 10, 10).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].payload.precog, second[0].payload.precog);
    }

    #[tokio::test]
    async fn reclaim_returns_only_stale_claims() {
        let bus = InMemoryBus::new();
        bus.enqueue(&payload("stale")).await.unwrap();
        let batch = bus.read_group("w1", 10, 10).await.unwrap();
        assert_eq!(batch.len(), 1);

        // Fresh claim: nothing to reclaim at a high threshold.
        let none = bus.reclaim_stale("w2", 60_000).await.unwrap();
        assert!(none.is_empty());

        // Zero threshold: the claim is immediately reclaimable.
        let reclaimed = bus.reclaim_stale("w2", 0).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].payload.precog, "stale");
    }

    #[tokio::test]
    async fn dead_letters_are_newest_first_and_bounded() {
        let bus = InMemoryBus::new();
        for i in 0..5 {
            bus.enqueue_dead_letter(&DeadLetter {
                payload: payload(&format!("p{i}")),
                error: format!("err {i}"),
                failed_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        }
        let letters = bus.dead_letters(2).await.unwrap();
        assert_eq!(letters.len(), 2);
        assert_eq!(letters[0].error, "err 4");
        assert_eq!(letters[1].error, "err 3");
    }
}
