// SPDX-License-Identifier: MIT OR Apache-2.0
//! Citation-grade facts ("croutons") and their evidence anchors.
//!
//! A crouton is an atomic, citeable assertion extracted from a page. Text
//! facts carry an anchor binding their supporting text to exact character
//! offsets in the canonical extraction; structured-data facts carry a JSON
//! pointer into the harvested item instead and are never anchorable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Triple
// ---------------------------------------------------------------------------

/// The subject / predicate / object core of a fact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    /// Entity the fact is about (an `@id` or a derived identifier).
    pub subject: String,
    /// The property being asserted.
    pub predicate: String,
    /// The asserted value, stringified.
    pub object: String,
}

// ---------------------------------------------------------------------------
// EvidenceType
// ---------------------------------------------------------------------------

/// How a fact's evidence was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// Anchored to a literal substring of the canonical extraction.
    TextExtraction,
    /// Harvested from JSON-LD, microdata, or RDFa; not anchorable.
    StructuredData,
    /// Provenance unknown (legacy rows only).
    Unknown,
}

impl EvidenceType {
    /// Stable wire name (matches the serde representation).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextExtraction => "text_extraction",
            Self::StructuredData => "structured_data",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stable wire name back into an evidence type.
    pub fn parse(s: &str) -> Result<Self, crate::Error> {
        match s {
            "text_extraction" => Ok(Self::TextExtraction),
            "structured_data" => Ok(Self::StructuredData),
            "unknown" => Ok(Self::Unknown),
            other => Err(crate::Error::Validation(format!(
                "unknown evidence type '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EvidenceAnchor
// ---------------------------------------------------------------------------

/// Binds a fact's supporting text to a specific canonical extraction.
///
/// The invariant proved by the validator: slicing the canonical extraction
/// at `[char_start, char_end)` yields the supporting text, whose SHA-256 is
/// `fragment_hash`, inside the extraction identified by
/// `extraction_text_hash`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceAnchor {
    /// Start offset (character index) in the canonical extraction.
    pub char_start: usize,
    /// End offset (exclusive).
    pub char_end: usize,
    /// SHA-256 of the supporting text.
    pub fragment_hash: String,
    /// SHA-256 of the whole canonical extraction the offsets refer to.
    pub extraction_text_hash: String,
}

// ---------------------------------------------------------------------------
// Crouton
// ---------------------------------------------------------------------------

/// An atomic, citeable fact extracted from a page.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Crouton {
    /// Unique identity; equal to [`Crouton::fact_id`].
    pub crouton_id: String,

    /// Domain the fact belongs to.
    pub domain: String,

    /// URL of the page it was extracted from.
    pub source_url: String,

    /// Stable slot identity: "the fact about this subject and predicate on
    /// this URL", constant across text revisions.
    pub slot_id: String,

    /// Deterministic identity of this revision's content.
    pub fact_id: String,

    /// Revision counter, starting at 1.
    pub revision: i64,

    /// `fact_id` of the revision this one replaced, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_fact_id: Option<String>,

    /// The asserted triple.
    pub triple: Triple,

    /// Human-readable rendering of the fact.
    pub text: String,

    /// Literal substring of the canonical extraction backing the fact.
    /// Present iff `evidence_type` is [`EvidenceType::TextExtraction`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supporting_text: Option<String>,

    /// Anchor into the canonical extraction.
    /// Present iff `evidence_type` is [`EvidenceType::TextExtraction`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_anchor: Option<EvidenceAnchor>,

    /// How the evidence was obtained.
    pub evidence_type: EvidenceType,

    /// JSON pointer into the structured item this fact came from.
    /// Present iff `evidence_type` is [`EvidenceType::StructuredData`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    /// `true` when the fact has no anchor (all non-text facts).
    pub anchor_missing: bool,

    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,

    /// Timestamp of the last upsert touching this row.
    pub updated_at: DateTime<Utc>,
}

impl Crouton {
    /// Render the fact for NDJSON publication.
    ///
    /// The wire schema flattens the triple's object next to the triple and
    /// omits null optionals.
    #[must_use]
    pub fn to_ndjson_value(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("fact_id".into(), Value::String(self.fact_id.clone()));
        obj.insert("slot_id".into(), Value::String(self.slot_id.clone()));
        obj.insert(
            "triple".into(),
            serde_json::to_value(&self.triple).unwrap_or(Value::Null),
        );
        obj.insert("object".into(), Value::String(self.triple.object.clone()));
        obj.insert("source_url".into(), Value::String(self.source_url.clone()));
        if let Some(st) = &self.supporting_text {
            obj.insert("supporting_text".into(), Value::String(st.clone()));
        }
        if let Some(anchor) = &self.evidence_anchor {
            obj.insert(
                "evidence_anchor".into(),
                serde_json::to_value(anchor).unwrap_or(Value::Null),
            );
        }
        obj.insert(
            "evidence_type".into(),
            Value::String(self.evidence_type.as_str().to_string()),
        );
        obj.insert("anchor_missing".into(), Value::Bool(self.anchor_missing));
        if let Some(path) = &self.source_path {
            obj.insert("source_path".into(), Value::String(path.clone()));
        }
        obj.insert("revision".into(), Value::from(self.revision));
        obj.insert(
            "updated_at".into(),
            Value::String(self.updated_at.to_rfc3339()),
        );
        Value::Object(obj)
    }
}

// ---------------------------------------------------------------------------
// Deterministic identity
// ---------------------------------------------------------------------------

/// Compute the stable slot identity for a subject/predicate on a URL.
///
/// `slot_id = sha256(domain | source_url | subject | predicate)`, with `|`
/// as the literal separator.
#[must_use]
pub fn slot_id(domain: &str, source_url: &str, subject: &str, predicate: &str) -> String {
    crate::sha256_hex(format!("{domain}|{source_url}|{subject}|{predicate}"))
}

/// Compute the revision identity for a slot's content.
///
/// `fact_id = sha256(slot_id | object | fragment_hash_or_null)`; facts with
/// no anchor hash the literal string `null` in the final position, so a text
/// revision always produces a new `fact_id` while the slot stays stable.
#[must_use]
pub fn fact_id(slot_id: &str, object: &str, fragment_hash: Option<&str>) -> String {
    let fragment = fragment_hash.unwrap_or("null");
    crate::sha256_hex(format!("{slot_id}|{object}|{fragment}"))
}
