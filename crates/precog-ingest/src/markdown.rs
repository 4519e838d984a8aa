// SPDX-License-Identifier: MIT OR Apache-2.0
//! Markdown mirror generation.

use precog_core::{Crouton, EvidenceType};
use url::Url;

/// Derive the mirror path from a source URL: the pathname with leading and
/// trailing slashes stripped; the empty path maps to `index`.
#[must_use]
pub fn derived_path(source_url: &str) -> String {
    let pathname = Url::parse(source_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| source_url.to_string());
    let trimmed = pathname.trim_matches('/');
    if trimmed.is_empty() {
        "index".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Render the mirror document for one page.
///
/// Layout: frontmatter, the citation-grade text-fact section with one
/// evidence block per fact, and the structured-data section listing
/// non-anchorable metadata with its source pointers.
#[must_use]
pub fn render_mirror(domain: &str, source_url: &str, facts: &[Crouton]) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("markdown_version: \"{}\"\n", precog_core::MARKDOWN_VERSION));
    out.push_str(&format!("protocol_version: \"{}\"\n", precog_core::PROTOCOL_VERSION));
    out.push_str(&format!("domain: {domain}\n"));
    out.push_str(&format!("source_url: {source_url}\n"));
    out.push_str("---\n\n");
    out.push_str(&format!("# {domain} — {}\n\n", derived_path(source_url)));

    out.push_str("## Facts (Text Extraction) — Citation-Grade\n\n");
    let mut text_facts: Vec<&Crouton> = facts
        .iter()
        .filter(|f| f.evidence_type == EvidenceType::TextExtraction)
        .collect();
    text_facts.sort_by_key(|f| {
        f.evidence_anchor
            .as_ref()
            .map(|a| a.char_start)
            .unwrap_or(usize::MAX)
    });
    if text_facts.is_empty() {
        out.push_str("_No anchored text facts._\n");
    }
    for fact in &text_facts {
        out.push_str(&format!("- {}\n", fact.text));
        out.push_str(&format!("  - fact_id: `{}`\n", fact.fact_id));
        if let Some(anchor) = &fact.evidence_anchor {
            out.push_str(&format!(
                "  - evidence: chars [{}, {}), fragment `{}`, extraction `{}`\n",
                anchor.char_start, anchor.char_end, anchor.fragment_hash, anchor.extraction_text_hash
            ));
        }
    }

    out.push_str("\n## Metadata (Structured Data) — Not Anchorable\n\n");
    let structured: Vec<&Crouton> = facts
        .iter()
        .filter(|f| f.evidence_type == EvidenceType::StructuredData)
        .collect();
    if structured.is_empty() {
        out.push_str("_No structured data._\n");
    }
    for fact in &structured {
        let pointer = fact.source_path.as_deref().unwrap_or("");
        out.push_str(&format!(
            "- {}: {} (`{}`)\n",
            fact.triple.predicate, fact.triple.object, pointer
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use precog_core::{EvidenceAnchor, Triple, fact, sha256_hex};

    fn text_fact(sentence: &str, start: usize) -> Crouton {
        let slot = fact::slot_id("nrlc.ai", "https://nrlc.ai/", "nrlc.ai", "claim:x");
        let fragment = sha256_hex(sentence);
        let id = fact::fact_id(&slot, sentence, Some(&fragment));
        Crouton {
            crouton_id: id.clone(),
            domain: "nrlc.ai".into(),
            source_url: "https://nrlc.ai/".into(),
            slot_id: slot,
            fact_id: id,
            revision: 1,
            previous_fact_id: None,
            triple: Triple {
                subject: "nrlc.ai".into(),
                predicate: "claim:x".into(),
                object: sentence.into(),
            },
            text: sentence.into(),
            supporting_text: Some(sentence.into()),
            evidence_anchor: Some(EvidenceAnchor {
                char_start: start,
                char_end: start + sentence.chars().count(),
                fragment_hash: fragment,
                extraction_text_hash: sha256_hex("canonical"),
            }),
            evidence_type: EvidenceType::TextExtraction,
            source_path: None,
            anchor_missing: false,
            confidence: 0.8,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn derived_path_strips_slashes() {
        assert_eq!(derived_path("https://nrlc.ai/"), "index");
        assert_eq!(derived_path("https://nrlc.ai"), "index");
        assert_eq!(derived_path("https://nrlc.ai/pricing/"), "pricing");
        assert_eq!(derived_path("https://nrlc.ai/docs/api"), "docs/api");
    }

    #[test]
    fn mirror_carries_frontmatter_and_sections() {
        let facts = vec![text_fact("NRLC operates an oracle platform for answers.", 0)];
        let doc = render_mirror("nrlc.ai", "https://nrlc.ai/", &facts);
        assert!(doc.starts_with("---\n"));
        assert!(doc.contains("markdown_version: \"1.1\""));
        assert!(doc.contains("## Facts (Text Extraction) — Citation-Grade"));
        assert!(doc.contains("## Metadata (Structured Data) — Not Anchorable"));
        assert!(doc.contains("NRLC operates an oracle platform"));
        assert!(doc.contains("evidence: chars [0, 45)"));
    }

    #[test]
    fn text_facts_render_in_anchor_order() {
        let facts = vec![
            text_fact("Second sentence in document order goes here.", 100),
            text_fact("First sentence in document order goes here..", 10),
        ];
        let doc = render_mirror("nrlc.ai", "https://nrlc.ai/", &facts);
        let first = doc.find("First sentence").unwrap();
        let second = doc.find("Second sentence").unwrap();
        assert!(first < second);
    }

    #[test]
    fn empty_sections_are_marked() {
        let doc = render_mirror("nrlc.ai", "https://nrlc.ai/", &[]);
        assert!(doc.contains("_No anchored text facts._"));
        assert!(doc.contains("_No structured data._"));
    }
}
