// SPDX-License-Identifier: MIT OR Apache-2.0
//! Quality-tier derivation.
//!
//! A domain's tier is a coarse quality label computed from anchor coverage
//! and protocol version alignment. The ladder is strict:
//! `best_effort < citation_grade < full_protocol`.

use serde::{Deserialize, Serialize};

/// Minimum anchored text facts for the citation-grade tier.
pub const CITATION_GRADE_MIN_TEXT_FACTS: u64 = 10;

/// Minimum anchored share of text facts for the citation-grade tier.
pub const CITATION_GRADE_MIN_COVERAGE: f64 = 0.95;

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Coarse quality label for a domain's published truth substrate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Baseline: facts exist but coverage or volume is insufficient.
    BestEffort,
    /// At least 10 text facts, 95 % of them anchored.
    CitationGrade,
    /// Citation-grade plus protocol-1.1 mirrors, facts, and a non-empty graph.
    FullProtocol,
}

impl Tier {
    /// Stable wire name (matches the serde representation).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BestEffort => "best_effort",
            Self::CitationGrade => "citation_grade",
            Self::FullProtocol => "full_protocol",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TierInputs
// ---------------------------------------------------------------------------

/// Everything the tier rule looks at.
#[derive(Clone, Debug, Default)]
pub struct TierInputs {
    /// Count of facts with `evidence_type = text_extraction`.
    pub facts_text_extraction: u64,
    /// Count of text facts carrying a valid anchor.
    pub anchored_text_facts: u64,
    /// Markdown format version of the active mirrors, if any exist.
    pub markdown_version: Option<String>,
    /// Facts protocol version, if any facts exist.
    pub facts_version: Option<String>,
    /// Whether the entity graph has at least one node.
    pub graph_nonempty: bool,
}

impl TierInputs {
    /// Anchored share of text facts; `0.0` when there are none.
    #[must_use]
    pub fn anchor_coverage(&self) -> f64 {
        if self.facts_text_extraction == 0 {
            return 0.0;
        }
        self.anchored_text_facts as f64 / self.facts_text_extraction as f64
    }

    /// Apply the tier rule.
    #[must_use]
    pub fn tier(&self) -> Tier {
        let citation_grade = self.facts_text_extraction >= CITATION_GRADE_MIN_TEXT_FACTS
            && self.anchor_coverage() >= CITATION_GRADE_MIN_COVERAGE;
        if !citation_grade {
            return Tier::BestEffort;
        }
        let aligned = self.markdown_version.as_deref() == Some(crate::MARKDOWN_VERSION)
            && self.facts_version.as_deref() == Some(crate::PROTOCOL_VERSION);
        if aligned && self.graph_nonempty {
            Tier::FullProtocol
        } else {
            Tier::CitationGrade
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_inputs() -> TierInputs {
        TierInputs {
            facts_text_extraction: 20,
            anchored_text_facts: 20,
            markdown_version: Some("1.1".into()),
            facts_version: Some("1.1".into()),
            graph_nonempty: true,
        }
    }

    #[test]
    fn empty_domain_is_best_effort() {
        assert_eq!(TierInputs::default().tier(), Tier::BestEffort);
    }

    #[test]
    fn nine_facts_is_not_citation_grade() {
        let inputs = TierInputs {
            facts_text_extraction: 9,
            anchored_text_facts: 9,
            ..Default::default()
        };
        assert_eq!(inputs.tier(), Tier::BestEffort);
    }

    #[test]
    fn ten_fully_anchored_facts_is_citation_grade() {
        let inputs = TierInputs {
            facts_text_extraction: 10,
            anchored_text_facts: 10,
            ..Default::default()
        };
        assert_eq!(inputs.tier(), Tier::CitationGrade);
    }

    #[test]
    fn coverage_below_threshold_drops_to_best_effort() {
        let inputs = TierInputs {
            facts_text_extraction: 100,
            anchored_text_facts: 94,
            ..Default::default()
        };
        assert_eq!(inputs.tier(), Tier::BestEffort);

        let at_threshold = TierInputs {
            facts_text_extraction: 100,
            anchored_text_facts: 95,
            ..Default::default()
        };
        assert_eq!(at_threshold.tier(), Tier::CitationGrade);
    }

    #[test]
    fn full_protocol_requires_everything() {
        assert_eq!(full_inputs().tier(), Tier::FullProtocol);

        let mut missing_graph = full_inputs();
        missing_graph.graph_nonempty = false;
        assert_eq!(missing_graph.tier(), Tier::CitationGrade);

        let mut old_markdown = full_inputs();
        old_markdown.markdown_version = Some("1.0".into());
        assert_eq!(old_markdown.tier(), Tier::CitationGrade);

        let mut no_facts_version = full_inputs();
        no_facts_version.facts_version = None;
        assert_eq!(no_facts_version.tier(), Tier::CitationGrade);
    }

    #[test]
    fn tier_ordering_matches_ladder() {
        assert!(Tier::BestEffort < Tier::CitationGrade);
        assert!(Tier::CitationGrade < Tier::FullProtocol);
    }
}
