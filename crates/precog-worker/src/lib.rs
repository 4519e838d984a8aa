// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! precog-worker
#![deny(unsafe_code)]

mod ingest_processor;
mod processor;
mod runtime;

pub use ingest_processor::IngestProcessor;
pub use processor::{EventSink, PrecogProcessor, ProcessorRegistry};
pub use runtime::{
    BASE_BACKOFF, BATCH_SIZE, BLOCK_MS, DRAIN_TIMEOUT, MAX_RETRIES, RECLAIM_INTERVAL,
    RECLAIM_MIN_IDLE_MS, WorkerRuntime,
};
