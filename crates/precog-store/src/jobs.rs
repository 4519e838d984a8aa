// SPDX-License-Identifier: MIT OR Apache-2.0
//! Job registry: lifecycle rows and the per-job event log.
//!
//! This module is the only writer of `jobs` and `job_events`. Event ids are
//! a per-job monotone sequence assigned inside the insert transaction, so
//! two concurrent appends to the same job can never produce duplicates.

use crate::{Store, StoreError, now_rfc3339, parse_ts};
use precog_core::{Job, JobEvent, JobStatus};
use serde_json::Value;
use sqlx::FromRow;
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

#[derive(FromRow)]
struct JobRow {
    id: String,
    precog: String,
    task: String,
    context: String,
    status: String,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn into_job(self) -> Result<Job, StoreError> {
        let context: BTreeMap<String, Value> = serde_json::from_str(&self.context)
            .map_err(|e| StoreError::Corrupt(format!("job context: {e}")))?;
        Ok(Job {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| StoreError::Corrupt(format!("job id: {e}")))?,
            precog: self.precog,
            task: self.task,
            context,
            status: JobStatus::parse(&self.status)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            error: self.error,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[derive(FromRow)]
struct EventRow {
    seq: i64,
    job_id: String,
    event_type: String,
    data: String,
    ts: String,
}

impl EventRow {
    fn into_event(self) -> Result<JobEvent, StoreError> {
        Ok(JobEvent {
            id: self.seq,
            job_id: Uuid::parse_str(&self.job_id)
                .map_err(|e| StoreError::Corrupt(format!("event job id: {e}")))?,
            event_type: self.event_type,
            data: serde_json::from_str(&self.data)
                .map_err(|e| StoreError::Corrupt(format!("event data: {e}")))?,
            ts: parse_ts(&self.ts)?,
        })
    }
}

impl Store {
    /// Create a job in `pending` and return it.
    pub async fn insert_job(
        &self,
        precog: &str,
        task: &str,
        context: BTreeMap<String, Value>,
    ) -> Result<Job, StoreError> {
        let id = Uuid::new_v4();
        let now = now_rfc3339();
        let context_json = serde_json::to_string(&context)
            .map_err(|e| StoreError::Corrupt(format!("job context: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO jobs (id, precog, task, context, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(precog)
        .bind(task)
        .bind(&context_json)
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await?;

        debug!(job_id = %id, precog, "job inserted");
        self.get_job(id).await
    }

    /// Latest snapshot of a job.
    pub async fn get_job(&self, id: Uuid) -> Result<Job, StoreError> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.ok_or_else(|| StoreError::NotFound(format!("job {id}")))?
            .into_job()
    }

    /// Transition a job's status, enforcing the monotone lifecycle.
    ///
    /// `error` must be provided iff `status` is [`JobStatus::Error`].
    pub async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<Job, StoreError> {
        let mut tx = self.pool().begin().await?;

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let current = current.ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        let from = JobStatus::parse(&current).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        if !from.can_transition_to(status) {
            return Err(StoreError::InvalidTransition { from, to: status });
        }

        let error = match status {
            JobStatus::Error => Some(error.unwrap_or("unknown error")),
            _ => None,
        };

        sqlx::query("UPDATE jobs SET status = ?, error = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(error)
            .bind(now_rfc3339())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(job_id = %id, from = %from, to = %status, "job status updated");
        self.get_job(id).await
    }

    /// Append an event to a job's log, assigning the next sequence id.
    pub async fn insert_event(
        &self,
        job_id: Uuid,
        event_type: &str,
        data: Value,
    ) -> Result<JobEvent, StoreError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM jobs WHERE id = ?")
            .bind(job_id.to_string())
            .fetch_optional(self.pool())
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("job {job_id}")));
        }

        let ts = now_rfc3339();
        let data_json = serde_json::to_string(&data)
            .map_err(|e| StoreError::Corrupt(format!("event data: {e}")))?;

        let mut tx = self.pool().begin().await?;
        let seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM job_events WHERE job_id = ?",
        )
        .bind(job_id.to_string())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO job_events (job_id, seq, event_type, data, ts) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(job_id.to_string())
        .bind(seq)
        .bind(event_type)
        .bind(&data_json)
        .bind(&ts)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(JobEvent {
            id: seq,
            job_id,
            event_type: event_type.to_string(),
            data,
            ts: parse_ts(&ts)?,
        })
    }

    /// Events with `id > after`, ordered by id, at most `limit`.
    pub async fn events_since(
        &self,
        job_id: Uuid,
        after: i64,
        limit: i64,
    ) -> Result<Vec<JobEvent>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT seq, job_id, event_type, data, ts
            FROM job_events
            WHERE job_id = ? AND seq > ?
            ORDER BY seq ASC
            LIMIT ?
            "#,
        )
        .bind(job_id.to_string())
        .bind(after)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// Count jobs currently in `status`.
    pub async fn count_jobs_with_status(&self, status: JobStatus) -> Result<i64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }

    /// Age in seconds of the oldest job still in `pending`, if any.
    pub async fn oldest_pending_age_seconds(&self) -> Result<Option<i64>, StoreError> {
        let oldest: Option<String> =
            sqlx::query_scalar("SELECT MIN(created_at) FROM jobs WHERE status = 'pending'")
                .fetch_one(self.pool())
                .await?;
        match oldest {
            Some(raw) => {
                let created = parse_ts(&raw)?;
                Ok(Some((chrono::Utc::now() - created).num_seconds().max(0)))
            }
            None => Ok(None),
        }
    }

    /// Seconds since the most recent event append across all jobs, if any.
    pub async fn seconds_since_last_event(&self) -> Result<Option<i64>, StoreError> {
        let latest: Option<String> = sqlx::query_scalar("SELECT MAX(ts) FROM job_events")
            .fetch_one(self.pool())
            .await?;
        match latest {
            Some(raw) => {
                let ts = parse_ts(&raw)?;
                Ok(Some((chrono::Utc::now() - ts).num_seconds().max(0)))
            }
            None => Ok(None),
        }
    }
}
