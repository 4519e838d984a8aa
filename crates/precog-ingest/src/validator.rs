// SPDX-License-Identifier: MIT OR Apache-2.0
//! The anchor validator: proves every stored text fact is a literal
//! substring of the canonical extraction.

use crate::extract::slice_chars;
use precog_core::Crouton;
use serde::Serialize;

/// Pass-rate threshold and minimum passed count for the citation-grade
/// verdict on a single URL.
pub const CITATION_GRADE_PASS_RATE: f64 = 0.95;
/// Minimum passed facts for the citation-grade verdict.
pub const CITATION_GRADE_MIN_PASSED: usize = 10;

/// Why a fact failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Slicing the extraction did not reproduce the supporting text.
    SliceMismatch,
    /// The recomputed hash differs from the stored fragment hash.
    HashMismatch,
    /// The fact claims text evidence but carries no anchor.
    NoAnchor,
}

/// One failed fact, with expected/actual hashes for debugging.
#[derive(Clone, Debug, Serialize)]
pub struct FailedExample {
    /// Identity of the failing fact.
    pub fact_id: String,
    /// Stored fragment hash.
    pub expected_hash: Option<String>,
    /// Hash recomputed from the slice.
    pub actual_hash: Option<String>,
    /// Why it failed.
    pub reason: FailureReason,
}

/// Validation report for one URL.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationReport {
    /// Text facts examined.
    pub facts_validated: usize,
    /// Facts whose anchors held.
    pub facts_passed: usize,
    /// `facts_passed / facts_validated`; `0.0` when nothing was validated.
    pub pass_rate: f64,
    /// Whether the URL meets the citation-grade bar.
    pub citation_grade: bool,
    /// Up to three failures, for diagnosis.
    pub failed_examples: Vec<FailedExample>,
}

/// Validate stored text facts against the canonical extraction.
#[must_use]
pub fn validate(canonical_extracted_text: &str, facts: &[Crouton]) -> ValidationReport {
    let mut passed = 0usize;
    let mut failed_examples = Vec::new();

    for fact in facts {
        let (supporting, anchor) = match (&fact.supporting_text, &fact.evidence_anchor) {
            (Some(s), Some(a)) => (s, a),
            _ => {
                if failed_examples.len() < 3 {
                    failed_examples.push(FailedExample {
                        fact_id: fact.fact_id.clone(),
                        expected_hash: None,
                        actual_hash: None,
                        reason: FailureReason::NoAnchor,
                    });
                }
                continue;
            }
        };

        let slice = slice_chars(canonical_extracted_text, anchor.char_start, anchor.char_end);
        if &slice != supporting {
            if failed_examples.len() < 3 {
                failed_examples.push(FailedExample {
                    fact_id: fact.fact_id.clone(),
                    expected_hash: Some(anchor.fragment_hash.clone()),
                    actual_hash: Some(precog_core::sha256_hex(&slice)),
                    reason: FailureReason::SliceMismatch,
                });
            }
            continue;
        }

        let recomputed = precog_core::sha256_hex(&slice);
        if recomputed != anchor.fragment_hash {
            if failed_examples.len() < 3 {
                failed_examples.push(FailedExample {
                    fact_id: fact.fact_id.clone(),
                    expected_hash: Some(anchor.fragment_hash.clone()),
                    actual_hash: Some(recomputed),
                    reason: FailureReason::HashMismatch,
                });
            }
            continue;
        }

        passed += 1;
    }

    let validated = facts.len();
    let pass_rate = if validated == 0 {
        0.0
    } else {
        passed as f64 / validated as f64
    };

    ValidationReport {
        facts_validated: validated,
        facts_passed: passed,
        pass_rate,
        citation_grade: pass_rate >= CITATION_GRADE_PASS_RATE
            && passed >= CITATION_GRADE_MIN_PASSED,
        failed_examples,
    }
}
