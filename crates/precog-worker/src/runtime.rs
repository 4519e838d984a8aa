// SPDX-License-Identifier: MIT OR Apache-2.0
//! The consume loop: claim, process, retry, dead-letter, reclaim, drain.

use crate::processor::{EventSink, ProcessorRegistry};
use precog_bus::{BusMessage, DeadLetter, StreamBus};
use precog_core::{JobStatus, event_types};
use precog_store::Store;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Retries after the initial attempt before a job is dead-lettered.
pub const MAX_RETRIES: u32 = 3;

/// Base backoff; attempt `n` sleeps `BASE_BACKOFF * 2^n`.
pub const BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Messages claimed per read.
pub const BATCH_SIZE: usize = 10;

/// Blocking-read window.
pub const BLOCK_MS: u64 = 10_000;

/// How long in-flight processors get to finish on shutdown.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the reclaimer looks for stale claims.
pub const RECLAIM_INTERVAL: Duration = Duration::from_secs(60);

/// Idle age after which another consumer's claim is taken over.
pub const RECLAIM_MIN_IDLE_MS: u64 = 300_000;

/// One worker process: a read loop plus one task per claimed message.
#[derive(Clone)]
pub struct WorkerRuntime {
    store: Store,
    bus: Arc<dyn StreamBus>,
    registry: Arc<ProcessorRegistry>,
    consumer: String,
    backoff_base: Duration,
}

impl WorkerRuntime {
    /// Build a runtime with a process-id derived consumer name.
    #[must_use]
    pub fn new(store: Store, bus: Arc<dyn StreamBus>, registry: Arc<ProcessorRegistry>) -> Self {
        Self {
            store,
            bus,
            registry,
            consumer: format!("worker-{}", std::process::id()),
            backoff_base: BASE_BACKOFF,
        }
    }

    /// Override the consumer name (tests, fixed fleets).
    #[must_use]
    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer = name.into();
        self
    }

    /// Override the backoff base (tests).
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// The consumer name registered with the bus.
    #[must_use]
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Run until `shutdown` flips to `true`.
    ///
    /// On shutdown the loop stops reading, in-flight messages get up to
    /// [`DRAIN_TIMEOUT`], and anything still unacked stays claimed on the
    /// broker, reclaimable by a surviving consumer.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.bus.ensure_group().await?;
        info!(consumer = %self.consumer, "worker started");

        let mut last_reclaim = Instant::now();
        let mut inflight: JoinSet<()> = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            if last_reclaim.elapsed() >= RECLAIM_INTERVAL {
                last_reclaim = Instant::now();
                match self.bus.reclaim_stale(&self.consumer, RECLAIM_MIN_IDLE_MS).await {
                    Ok(reclaimed) => {
                        for msg in reclaimed {
                            self.spawn_message(&mut inflight, msg);
                        }
                    }
                    Err(e) => warn!(error = %e, "reclaim pass failed"),
                }
            }

            let batch = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                read = self.bus.read_group(&self.consumer, BATCH_SIZE, BLOCK_MS) => {
                    match read {
                        Ok(batch) => batch,
                        Err(e) => {
                            warn!(error = %e, "bus read failed, backing off");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                            continue;
                        }
                    }
                }
            };

            for msg in batch {
                self.spawn_message(&mut inflight, msg);
            }
            // Bound in-flight work to the batch size before reading again.
            while inflight.len() >= BATCH_SIZE {
                let _ = inflight.join_next().await;
            }
        }

        info!(consumer = %self.consumer, inflight = inflight.len(), "worker draining");
        let drain = async {
            while inflight.join_next().await.is_some() {}
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("drain window elapsed, abandoning in-flight messages for reclaim");
            inflight.abort_all();
        }
        info!(consumer = %self.consumer, "worker stopped");
        Ok(())
    }

    fn spawn_message(&self, inflight: &mut JoinSet<()>, msg: BusMessage) {
        let runtime = self.clone();
        inflight.spawn(async move {
            if let Err(e) = runtime.handle_message(msg).await {
                error!(error = %e, "message handling failed");
            }
        });
    }

    /// Process one claimed message through the retry state machine.
    pub async fn handle_message(&self, msg: BusMessage) -> anyhow::Result<()> {
        let job_id = msg.payload.job_id;

        // Claim the job. Reclaimed messages arrive already `running`;
        // cancelled or finished jobs are acked away without work.
        let job = match self.store.get_job(job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "job missing, acking message");
                self.bus.ack(&msg.id).await?;
                return Ok(());
            }
        };
        match job.status {
            JobStatus::Pending => {
                self.store.update_status(job_id, JobStatus::Running, None).await?;
            }
            JobStatus::Running => {}
            terminal => {
                info!(job_id = %job_id, status = %terminal, "job already terminal, acking");
                self.bus.ack(&msg.id).await?;
                return Ok(());
            }
        }

        let Some(processor) = self.registry.resolve(&msg.payload.precog) else {
            let reason = format!("no processor registered for precog '{}'", msg.payload.precog);
            self.fail_job(&msg, &reason, 0).await?;
            return Ok(());
        };

        let sink = EventSink::new(self.store.clone(), job_id);
        let mut attempt: u32 = 0;
        loop {
            match processor.process(&msg.payload, &sink).await {
                Ok(completion) => {
                    sink.emit(event_types::ANSWER_COMPLETE, completion).await?;
                    self.store.update_status(job_id, JobStatus::Done, None).await?;
                    self.bus.ack(&msg.id).await?;
                    info!(job_id = %job_id, precog = %msg.payload.precog, attempt, "job done");
                    return Ok(());
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff = self.backoff_base * 2u32.pow(attempt);
                    warn!(
                        job_id = %job_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "processor failed, retrying in-process"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.fail_job(&msg, &e.to_string(), MAX_RETRIES).await?;
                    return Ok(());
                }
            }
        }
    }

    /// Terminal failure: error event, job marked `error`, DLQ record, ack.
    async fn fail_job(&self, msg: &BusMessage, reason: &str, retries: u32) -> anyhow::Result<()> {
        let job_id = msg.payload.job_id;
        let sink = EventSink::new(self.store.clone(), job_id);
        sink.emit(
            event_types::ERROR,
            json!({ "message": reason, "retries": retries }),
        )
        .await?;
        self.store
            .update_status(job_id, JobStatus::Error, Some(reason))
            .await?;
        self.bus
            .enqueue_dead_letter(&DeadLetter {
                payload: msg.payload.clone(),
                error: reason.to_string(),
                failed_at: chrono::Utc::now(),
            })
            .await?;
        self.bus.ack(&msg.id).await?;
        error!(job_id = %job_id, retries, reason, "job dead-lettered");
        Ok(())
    }
}
