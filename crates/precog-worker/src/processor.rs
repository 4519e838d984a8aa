// SPDX-License-Identifier: MIT OR Apache-2.0
//! The processor seam: pluggable precog handlers and the event sink.

use async_trait::async_trait;
use precog_bus::JobPayload;
use precog_store::{Store, StoreError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Handle a processor uses to append events to its job's log.
///
/// Bound to one job; event ordering is the registry's per-job sequence.
#[derive(Clone)]
pub struct EventSink {
    store: Store,
    job_id: Uuid,
}

impl EventSink {
    /// Bind a sink to a job.
    #[must_use]
    pub fn new(store: Store, job_id: Uuid) -> Self {
        Self { store, job_id }
    }

    /// Append one event.
    pub async fn emit(&self, event_type: &str, data: Value) -> Result<(), StoreError> {
        self.store.insert_event(self.job_id, event_type, data).await?;
        Ok(())
    }

    /// The job this sink is bound to.
    #[must_use]
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }
}

// ---------------------------------------------------------------------------
// PrecogProcessor
// ---------------------------------------------------------------------------

/// A precog handler.
///
/// The return value becomes the payload of the `answer.complete` event the
/// runtime appends on success.
#[async_trait]
pub trait PrecogProcessor: Send + Sync {
    /// Process one job, emitting intermediate events through `sink`.
    async fn process(&self, payload: &JobPayload, sink: &EventSink) -> anyhow::Result<Value>;
}

// ---------------------------------------------------------------------------
// ProcessorRegistry
// ---------------------------------------------------------------------------

/// Registry of processors keyed by precog tag.
///
/// Resolution is exact-match first, then namespace prefix: a processor
/// registered as `home` also handles `home.safety` and `home.*` tags.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn PrecogProcessor>>,
}

impl ProcessorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor under a tag, replacing any previous entry.
    pub fn register(&mut self, tag: impl Into<String>, processor: impl PrecogProcessor + 'static) {
        self.processors.insert(tag.into(), Arc::new(processor));
    }

    /// Resolve the processor for a precog tag.
    #[must_use]
    pub fn resolve(&self, tag: &str) -> Option<Arc<dyn PrecogProcessor>> {
        if let Some(found) = self.processors.get(tag) {
            return Some(Arc::clone(found));
        }
        // Longest registered namespace prefix wins.
        let mut best: Option<(&String, &Arc<dyn PrecogProcessor>)> = None;
        for (name, processor) in &self.processors {
            if tag.starts_with(name.as_str()) && tag[name.len()..].starts_with('.') {
                match best {
                    Some((current, _)) if current.len() >= name.len() => {}
                    _ => best = Some((name, processor)),
                }
            }
        }
        best.map(|(_, p)| Arc::clone(p))
    }

    /// Sorted list of registered tags.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        v.sort();
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl PrecogProcessor for Named {
        async fn process(&self, _payload: &JobPayload, _sink: &EventSink) -> anyhow::Result<Value> {
            Ok(json!({ "processor": self.0 }))
        }
    }

    #[test]
    fn exact_match_wins() {
        let mut registry = ProcessorRegistry::new();
        registry.register("home", Named("home"));
        registry.register("home.safety", Named("home.safety"));

        assert!(registry.resolve("home.safety").is_some());
        assert!(registry.resolve("home").is_some());
    }

    #[test]
    fn namespace_prefix_matches() {
        let mut registry = ProcessorRegistry::new();
        registry.register("home", Named("home"));

        assert!(registry.resolve("home.safety").is_some());
        assert!(registry.resolve("home.inspection.roof").is_some());
        // "homestead" is not in the "home" namespace.
        assert!(registry.resolve("homestead").is_none());
        assert!(registry.resolve("massage").is_none());
    }

    #[test]
    fn longest_prefix_is_preferred() {
        let mut registry = ProcessorRegistry::new();
        registry.register("home", Named("home"));
        registry.register("home.safety", Named("home.safety"));

        // Exact miss, two candidate prefixes: the longer one wins.
        assert!(registry.resolve("home.safety.gas").is_some());
        let mut tags = registry.tags();
        tags.sort();
        assert_eq!(tags, vec!["home", "home.safety"]);
    }
}
