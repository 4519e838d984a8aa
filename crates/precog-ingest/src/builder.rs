// SPDX-License-Identifier: MIT OR Apache-2.0
//! Crouton assembly: deterministic identity for atomized and harvested facts.

use crate::atomize::{TextFact, sentence_stem};
use crate::structured::StructuredItem;
use chrono::Utc;
use precog_core::{Crouton, EvidenceAnchor, EvidenceType, Triple, fact};

/// Confidence assigned to anchored text facts.
const TEXT_CONFIDENCE: f64 = 0.75;

/// Confidence assigned to declared structured data.
const STRUCTURED_CONFIDENCE: f64 = 0.9;

/// Predicate for a sentence: `claim:` plus a stem digest, so tail edits
/// keep the slot while a new sentence gets a new one.
#[must_use]
pub fn claim_predicate(sentence: &str) -> String {
    let stem = sentence_stem(sentence);
    format!("claim:{}", &precog_core::sha256_hex(stem)[..12])
}

/// Build croutons for validated text facts.
#[must_use]
pub fn text_croutons(
    domain: &str,
    source_url: &str,
    extraction_text_hash: &str,
    facts: &[TextFact],
) -> Vec<Crouton> {
    facts
        .iter()
        .map(|tf| {
            let predicate = claim_predicate(&tf.sentence);
            let slot = fact::slot_id(domain, source_url, domain, &predicate);
            let id = fact::fact_id(&slot, &tf.sentence, Some(&tf.fragment_hash));
            Crouton {
                crouton_id: id.clone(),
                domain: domain.to_string(),
                source_url: source_url.to_string(),
                slot_id: slot,
                fact_id: id,
                revision: 1,
                previous_fact_id: None,
                triple: Triple {
                    subject: domain.to_string(),
                    predicate,
                    object: tf.sentence.clone(),
                },
                text: tf.sentence.clone(),
                supporting_text: Some(tf.sentence.clone()),
                evidence_anchor: Some(EvidenceAnchor {
                    char_start: tf.char_start,
                    char_end: tf.char_end,
                    fragment_hash: tf.fragment_hash.clone(),
                    extraction_text_hash: extraction_text_hash.to_string(),
                }),
                evidence_type: EvidenceType::TextExtraction,
                source_path: None,
                anchor_missing: false,
                confidence: TEXT_CONFIDENCE,
                updated_at: Utc::now(),
            }
        })
        .collect()
}

fn type_slug(item: &StructuredItem) -> String {
    item.item_type
        .as_deref()
        .map(|t| {
            t.rsplit(['/', ':'])
                .next()
                .unwrap_or(t)
                .to_lowercase()
        })
        .unwrap_or_else(|| "item".to_string())
}

/// Subject for a structured item: its `@id`, or one derived from the source
/// URL, the item type, and the item's position on the page.
#[must_use]
pub fn structured_subject(source_url: &str, item: &StructuredItem, index: usize) -> String {
    match &item.id {
        Some(id) if !id.is_empty() => id.clone(),
        _ => format!("{source_url}#{}-{index}", type_slug(item)),
    }
}

/// Build croutons for harvested structured data.
#[must_use]
pub fn structured_croutons(
    domain: &str,
    source_url: &str,
    items: &[StructuredItem],
) -> Vec<Crouton> {
    let mut out = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let subject = structured_subject(source_url, item, index);
        for prop in &item.properties {
            let slot = fact::slot_id(domain, source_url, &subject, &prop.predicate);
            let id = fact::fact_id(&slot, &prop.value, None);
            out.push(Crouton {
                crouton_id: id.clone(),
                domain: domain.to_string(),
                source_url: source_url.to_string(),
                slot_id: slot,
                fact_id: id,
                revision: 1,
                previous_fact_id: None,
                triple: Triple {
                    subject: subject.clone(),
                    predicate: prop.predicate.clone(),
                    object: prop.value.clone(),
                },
                text: format!("{}: {}", prop.predicate, prop.value),
                supporting_text: None,
                evidence_anchor: None,
                evidence_type: EvidenceType::StructuredData,
                source_path: Some(prop.pointer.clone()),
                anchor_missing: true,
                confidence: STRUCTURED_CONFIDENCE,
                updated_at: Utc::now(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::StructuredProperty;

    fn text_fact(sentence: &str) -> TextFact {
        TextFact {
            sentence: sentence.to_string(),
            char_start: 0,
            char_end: sentence.chars().count(),
            fragment_hash: precog_core::sha256_hex(sentence),
            section_index: 0,
        }
    }

    #[test]
    fn text_croutons_satisfy_anchor_invariants() {
        let facts = text_croutons(
            "nrlc.ai",
            "https://nrlc.ai/",
            "exthash",
            &[text_fact("NRLC operates an oracle platform for answers.")],
        );
        assert_eq!(facts.len(), 1);
        let f = &facts[0];
        assert_eq!(f.evidence_type, EvidenceType::TextExtraction);
        assert!(!f.anchor_missing);
        assert!(f.supporting_text.is_some());
        let anchor = f.evidence_anchor.as_ref().unwrap();
        assert_eq!(anchor.extraction_text_hash, "exthash");
        assert_eq!(f.crouton_id, f.fact_id);
    }

    #[test]
    fn structured_croutons_are_pure() {
        let item = StructuredItem {
            context: Some("https://schema.org".into()),
            item_type: Some("Organization".into()),
            id: None,
            source: "json-ld",
            properties: vec![StructuredProperty {
                pointer: "/name".into(),
                predicate: "name".into(),
                value: "NRLC".into(),
            }],
        };
        let facts = structured_croutons("nrlc.ai", "https://nrlc.ai/", &[item]);
        assert_eq!(facts.len(), 1);
        let f = &facts[0];
        assert_eq!(f.evidence_type, EvidenceType::StructuredData);
        assert!(f.anchor_missing);
        assert!(f.supporting_text.is_none());
        assert!(f.evidence_anchor.is_none());
        assert_eq!(f.source_path.as_deref(), Some("/name"));
        assert_eq!(f.triple.subject, "https://nrlc.ai/#organization-0");
    }

    #[test]
    fn declared_id_wins_over_derived_subject() {
        let item = StructuredItem {
            context: None,
            item_type: Some("Organization".into()),
            id: Some("https://nrlc.ai/#org".into()),
            source: "json-ld",
            properties: vec![StructuredProperty {
                pointer: "/name".into(),
                predicate: "name".into(),
                value: "NRLC".into(),
            }],
        };
        let facts = structured_croutons("nrlc.ai", "https://nrlc.ai/", &[item]);
        assert_eq!(facts[0].triple.subject, "https://nrlc.ai/#org");
    }

    #[test]
    fn same_stem_same_slot_different_fact_id() {
        let a = text_croutons(
            "d",
            "u",
            "h",
            &[text_fact("The starter plan costs 49 dollars per month today.")],
        );
        let b = text_croutons(
            "d",
            "u",
            "h",
            &[text_fact("The starter plan costs 49 dollars per month, billed annually.")],
        );
        assert_eq!(a[0].slot_id, b[0].slot_id);
        assert_ne!(a[0].fact_id, b[0].fact_id);
    }
}
