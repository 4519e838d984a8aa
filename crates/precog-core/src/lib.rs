// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! precog-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract for the Precogs oracle platform.
//!
//! If you only take one dependency, take this one.

/// Environment-driven platform configuration.
pub mod config;
/// Boundary error taxonomy shared by all components.
pub mod error;
/// Citation-grade facts, triples, and evidence anchors.
pub mod fact;
/// Jobs, the status machine, and the per-job event log envelope.
pub mod job;
/// Quality-tier derivation from anchor coverage and protocol alignment.
pub mod tier;

pub use config::PlatformConfig;
pub use error::Error;
pub use fact::{Crouton, EvidenceAnchor, EvidenceType, Triple};
pub use job::{Job, JobEvent, JobStatus};
pub use tier::{Tier, TierInputs};

use sha2::{Digest, Sha256};

/// Protocol version stamped on facts, mirrors, and status reports.
pub const PROTOCOL_VERSION: &str = "1.1";

/// Markdown mirror format version carried in frontmatter.
pub const MARKDOWN_VERSION: &str = "1.1";

/// Well-known event type names carried on the per-job event log.
///
/// Processors may emit additional, namespaced types; these are the names the
/// platform itself produces and the fan-out layer understands.
pub mod event_types {
    /// Job accepted and enqueued; first frame of every stream.
    pub const ACK: &str = "ack";
    /// A grounding citation chunk surfaced while answering.
    pub const GROUNDING_CHUNK: &str = "grounding.chunk";
    /// Intermediate model reasoning.
    pub const THINKING: &str = "thinking";
    /// Incremental answer text.
    pub const ANSWER_DELTA: &str = "answer.delta";
    /// The full answer, emitted once by the worker on success.
    pub const ANSWER_COMPLETE: &str = "answer.complete";
    /// Closing frame: the job reached a terminal status.
    pub const COMPLETE: &str = "complete";
    /// Closing frame: the job failed, or the poll loop itself errored.
    pub const ERROR: &str = "error";
    /// Idle-connection keep-alive frame.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Closing frame: the subscriber hit the hard polling ceiling.
    pub const TIMEOUT: &str = "timeout";
}

/// Compute the lowercase hex SHA-256 digest of `input`.
///
/// This is the one hashing primitive the whole platform uses: extraction
/// text hashes, fragment hashes, fact identity, and mirror content hashes.
///
/// # Examples
///
/// ```
/// let h = precog_core::sha256_hex("hello");
/// assert_eq!(h.len(), 64);
/// assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
#[must_use]
pub fn sha256_hex(input: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_ref());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex("precog"), sha256_hex("precog"));
        assert_ne!(sha256_hex("precog"), sha256_hex("precogs"));
    }

    #[test]
    fn protocol_versions_align() {
        assert_eq!(PROTOCOL_VERSION, "1.1");
        assert_eq!(MARKDOWN_VERSION, "1.1");
    }
}
