// SPDX-License-Identifier: MIT OR Apache-2.0
//! Prometheus metrics derived from the durable store at scrape time.

use precog_core::JobStatus;
use precog_store::Store;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};

/// Gauges exported on `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    processed_total: IntGauge,
    failed_total: IntGauge,
    inflight_jobs: IntGauge,
    oldest_pending_age_seconds: IntGauge,
    bus_lag_seconds: IntGauge,
}

impl Metrics {
    /// Register all gauges in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let processed_total = IntGauge::new(
            "precog_jobs_processed_total",
            "Jobs that reached the done status",
        )?;
        let failed_total =
            IntGauge::new("precog_jobs_failed_total", "Jobs that reached the error status")?;
        let inflight_jobs = IntGauge::new("precog_jobs_inflight", "Jobs currently running")?;
        let oldest_pending_age_seconds = IntGauge::new(
            "precog_oldest_pending_age_seconds",
            "Age of the oldest pending job",
        )?;
        let bus_lag_seconds = IntGauge::new(
            "precog_bus_lag_seconds",
            "Seconds since the last event append",
        )?;

        registry.register(Box::new(processed_total.clone()))?;
        registry.register(Box::new(failed_total.clone()))?;
        registry.register(Box::new(inflight_jobs.clone()))?;
        registry.register(Box::new(oldest_pending_age_seconds.clone()))?;
        registry.register(Box::new(bus_lag_seconds.clone()))?;

        Ok(Self {
            registry,
            processed_total,
            failed_total,
            inflight_jobs,
            oldest_pending_age_seconds,
            bus_lag_seconds,
        })
    }

    /// Refresh gauge values from the store and render the exposition text.
    pub async fn render(&self, store: &Store) -> Result<String, precog_core::Error> {
        self.processed_total
            .set(store.count_jobs_with_status(JobStatus::Done).await.map_err(precog_core::Error::from)?);
        self.failed_total
            .set(store.count_jobs_with_status(JobStatus::Error).await.map_err(precog_core::Error::from)?);
        self.inflight_jobs
            .set(store.count_jobs_with_status(JobStatus::Running).await.map_err(precog_core::Error::from)?);
        self.oldest_pending_age_seconds.set(
            store
                .oldest_pending_age_seconds()
                .await
                .map_err(precog_core::Error::from)?
                .unwrap_or(0),
        );
        self.bus_lag_seconds.set(
            store
                .seconds_since_last_event()
                .await
                .map_err(precog_core::Error::from)?
                .unwrap_or(0),
        );

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| precog_core::Error::TransientInfra(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| precog_core::Error::TransientInfra(e.to_string()))
    }
}
