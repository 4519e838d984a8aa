// SPDX-License-Identifier: MIT OR Apache-2.0
//! Live event fan-out: the shared tail loop behind SSE and NDJSON.
//!
//! Both wire formats run the same loop against one job: poll the event log
//! every 500 ms (cap 1000 per batch), heartbeat every 15 s so intermediate
//! proxies keep the connection open, close with a terminal frame when the
//! job finishes, and give up at the 5-minute hard ceiling. Client
//! disconnects surface as send failures and stop the loop.

use precog_core::{JobEvent, JobStatus, event_types};
use precog_store::Store;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

/// Event-log poll cadence.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Heartbeat cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Hard ceiling on total polling time per subscriber.
pub const HARD_CEILING: Duration = Duration::from_secs(300);

/// Maximum events fetched per poll.
pub const BATCH_LIMIT: i64 = 1000;

/// Tunable loop parameters (tests shrink the intervals).
#[derive(Clone, Copy, Debug)]
pub struct TailConfig {
    /// Poll cadence.
    pub poll_interval: Duration,
    /// Heartbeat cadence.
    pub heartbeat_interval: Duration,
    /// Total polling ceiling.
    pub hard_ceiling: Duration,
    /// Events per poll.
    pub batch_limit: i64,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            hard_ceiling: HARD_CEILING,
            batch_limit: BATCH_LIMIT,
        }
    }
}

/// One frame on a subscriber connection.
#[derive(Clone, Debug)]
pub enum Frame {
    /// A stored event from the job's log.
    Event(JobEvent),
    /// Keep-alive.
    Heartbeat,
    /// Closing frame: the job reached a non-error terminal status.
    Complete(JobStatus),
    /// Closing frame: the job failed or the poll loop errored.
    Error(String),
    /// Closing frame: the hard ceiling elapsed.
    Timeout,
}

/// Run the tail loop, pushing frames into `tx` until a closing frame is
/// sent or the receiver goes away.
pub async fn tail(store: Store, job_id: Uuid, config: TailConfig, tx: mpsc::Sender<Frame>) {
    let started = Instant::now();
    let mut last_id: i64 = 0;
    let mut last_heartbeat = Instant::now();

    loop {
        if started.elapsed() >= config.hard_ceiling {
            let _ = tx.send(Frame::Timeout).await;
            return;
        }

        if !drain_events(&store, job_id, &mut last_id, config.batch_limit, &tx).await {
            return;
        }

        match store.get_job(job_id).await {
            Ok(job) if job.status.is_terminal() => {
                // Deliver anything appended between the poll and the status
                // read, then close.
                if !drain_events(&store, job_id, &mut last_id, config.batch_limit, &tx).await {
                    return;
                }
                let closing = match job.status {
                    JobStatus::Error => {
                        Frame::Error(job.error.unwrap_or_else(|| "job failed".to_string()))
                    }
                    status => Frame::Complete(status),
                };
                let _ = tx.send(closing).await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = tx.send(Frame::Error(e.to_string())).await;
                return;
            }
        }

        if last_heartbeat.elapsed() >= config.heartbeat_interval {
            last_heartbeat = Instant::now();
            if tx.send(Frame::Heartbeat).await.is_err() {
                return;
            }
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}

/// Fetch and forward pending events; `false` means the client went away or
/// the store failed (an error frame was attempted).
async fn drain_events(
    store: &Store,
    job_id: Uuid,
    last_id: &mut i64,
    batch_limit: i64,
    tx: &mpsc::Sender<Frame>,
) -> bool {
    let events = match store.events_since(job_id, *last_id, batch_limit).await {
        Ok(events) => events,
        Err(e) => {
            let _ = tx.send(Frame::Error(e.to_string())).await;
            return false;
        }
    };
    for event in events {
        *last_id = event.id;
        if tx.send(Frame::Event(event)).await.is_err() {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Wire framing
// ---------------------------------------------------------------------------

/// Render a frame as an SSE event (`event: <type>` + `data: <json>`).
#[must_use]
pub fn frame_to_sse(frame: &Frame) -> axum::response::sse::Event {
    use axum::response::sse::Event as SseEvent;
    match frame {
        Frame::Event(ev) => SseEvent::default()
            .id(ev.id.to_string())
            .event(ev.event_type.clone())
            .data(ev.data.to_string()),
        Frame::Heartbeat => SseEvent::default().comment("keepalive"),
        Frame::Complete(status) => SseEvent::default()
            .event(event_types::COMPLETE)
            .data(json!({ "status": status }).to_string()),
        Frame::Error(message) => SseEvent::default()
            .event(event_types::ERROR)
            .data(json!({ "message": message }).to_string()),
        Frame::Timeout => SseEvent::default().event(event_types::TIMEOUT).data("{}"),
    }
}

/// Render a frame as one `\n`-terminated NDJSON line.
///
/// Stored events are flattened: the payload's fields sit next to `type`,
/// `id`, and `ts`, so clients see `{"type":"ack","job_id":…}` rather than a
/// nested envelope. The server never emits partial lines.
#[must_use]
pub fn frame_to_ndjson(frame: &Frame) -> String {
    let value = match frame {
        Frame::Event(ev) => {
            let mut obj = match &ev.data {
                Value::Object(map) => map.clone(),
                other => {
                    let mut map = serde_json::Map::new();
                    map.insert("data".into(), other.clone());
                    map
                }
            };
            obj.insert("type".into(), Value::String(ev.event_type.clone()));
            obj.insert("id".into(), Value::from(ev.id));
            obj.insert("ts".into(), Value::String(ev.ts.to_rfc3339()));
            Value::Object(obj)
        }
        Frame::Heartbeat => json!({ "type": event_types::HEARTBEAT }),
        Frame::Complete(status) => json!({ "type": event_types::COMPLETE, "status": status }),
        Frame::Error(message) => json!({ "type": event_types::ERROR, "message": message }),
        Frame::Timeout => json!({ "type": event_types::TIMEOUT }),
    };
    let mut line = value.to_string();
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn event(id: i64, event_type: &str, data: Value) -> JobEvent {
        JobEvent {
            id,
            job_id: Uuid::nil(),
            event_type: event_type.to_string(),
            data,
            ts: Utc::now(),
        }
    }

    fn fast_config() -> TailConfig {
        TailConfig {
            poll_interval: Duration::from_millis(10),
            heartbeat_interval: Duration::from_millis(40),
            hard_ceiling: Duration::from_secs(5),
            batch_limit: 1000,
        }
    }

    #[test]
    fn ndjson_flattens_event_payload() {
        let frame = Frame::Event(event(3, "ack", json!({ "job_id": "abc" })));
        let line = frame_to_ndjson(&frame);
        assert!(line.ends_with('\n'));
        let parsed: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed["type"], "ack");
        assert_eq!(parsed["job_id"], "abc");
        assert_eq!(parsed["id"], 3);
    }

    #[test]
    fn ndjson_closing_frames() {
        assert_eq!(
            frame_to_ndjson(&Frame::Heartbeat).trim(),
            r#"{"type":"heartbeat"}"#
        );
        let complete: Value =
            serde_json::from_str(frame_to_ndjson(&Frame::Complete(JobStatus::Done)).trim())
                .unwrap();
        assert_eq!(complete["type"], "complete");
        assert_eq!(complete["status"], "done");

        let timeout: Value =
            serde_json::from_str(frame_to_ndjson(&Frame::Timeout).trim()).unwrap();
        assert_eq!(timeout["type"], "timeout");
    }

    #[tokio::test]
    async fn tail_delivers_events_in_order_then_closes() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let job = store
            .insert_job("schema", "t", BTreeMap::new())
            .await
            .unwrap();
        for i in 0..5 {
            store
                .insert_event(job.id, "answer.delta", json!({ "i": i }))
                .await
                .unwrap();
        }
        store
            .update_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();
        store.update_status(job.id, JobStatus::Done, None).await.unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        tokio::spawn(tail(store, job.id, fast_config(), tx));

        let mut ids = Vec::new();
        let mut closed = false;
        while let Some(frame) = rx.recv().await {
            match frame {
                Frame::Event(ev) => ids.push(ev.id),
                Frame::Complete(status) => {
                    assert_eq!(status, JobStatus::Done);
                    closed = true;
                }
                Frame::Heartbeat => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
        assert!(closed);
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn tail_picks_up_late_events_before_closing() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let job = store
            .insert_job("schema", "t", BTreeMap::new())
            .await
            .unwrap();
        store
            .update_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        tokio::spawn(tail(store.clone(), job.id, fast_config(), tx));

        // Let the loop start polling, then append and finish.
        tokio::time::sleep(Duration::from_millis(30)).await;
        store
            .insert_event(job.id, "answer.complete", json!({ "ok": true }))
            .await
            .unwrap();
        store.update_status(job.id, JobStatus::Done, None).await.unwrap();

        let mut saw_complete_event = false;
        let mut saw_closing = false;
        while let Some(frame) = rx.recv().await {
            match frame {
                Frame::Event(ev) if ev.event_type == "answer.complete" => {
                    saw_complete_event = true;
                }
                Frame::Complete(_) => saw_closing = true,
                _ => {}
            }
        }
        assert!(saw_complete_event);
        assert!(saw_closing);
    }

    #[tokio::test]
    async fn failed_job_closes_with_error_frame() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let job = store
            .insert_job("schema", "t", BTreeMap::new())
            .await
            .unwrap();
        store
            .update_status(job.id, JobStatus::Running, None)
            .await
            .unwrap();
        store
            .update_status(job.id, JobStatus::Error, Some("processor blew up"))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        tokio::spawn(tail(store, job.id, fast_config(), tx));

        let mut closing = None;
        while let Some(frame) = rx.recv().await {
            if let Frame::Error(msg) = frame {
                closing = Some(msg);
            }
        }
        assert!(closing.unwrap().contains("processor blew up"));
    }

    #[tokio::test]
    async fn hard_ceiling_emits_timeout() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let job = store
            .insert_job("schema", "t", BTreeMap::new())
            .await
            .unwrap();

        let config = TailConfig {
            poll_interval: Duration::from_millis(5),
            heartbeat_interval: Duration::from_secs(60),
            hard_ceiling: Duration::from_millis(40),
            batch_limit: 1000,
        };
        let (tx, mut rx) = mpsc::channel(64);
        tokio::spawn(tail(store, job.id, config, tx));

        let mut saw_timeout = false;
        while let Some(frame) = rx.recv().await {
            if matches!(frame, Frame::Timeout) {
                saw_timeout = true;
            }
        }
        assert!(saw_timeout);
    }

    #[tokio::test]
    async fn heartbeats_flow_on_idle_jobs() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let job = store
            .insert_job("schema", "t", BTreeMap::new())
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        tokio::spawn(tail(store, job.id, fast_config(), tx));

        let mut beats = 0;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
        while beats < 2 && tokio::time::Instant::now() < deadline {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(Frame::Heartbeat)) => beats += 1,
                Ok(Some(_)) => {}
                _ => break,
            }
        }
        assert!(beats >= 2, "expected heartbeats on an idle job");
    }

    #[tokio::test]
    async fn dropped_receiver_stops_the_loop() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let job = store
            .insert_job("schema", "t", BTreeMap::new())
            .await
            .unwrap();
        store.insert_event(job.id, "ack", json!({})).await.unwrap();

        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(tail(store, job.id, fast_config(), tx));
        drop(rx);

        // The loop notices the closed channel on its next send.
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("tail loop did not stop after disconnect")
            .unwrap();
    }
}
