// SPDX-License-Identifier: MIT OR Apache-2.0
//! Text-fact atomization.
//!
//! Each section is split into sentences; candidates in the 40–240 character
//! band containing a high-signal pattern are anchored by locating them in
//! the canonical text. The anchor is hard-validated before a fact is
//! emitted: re-slicing must reproduce the sentence and its hash. A
//! candidate that fails validation is skipped, never stored.

use crate::extract::{CanonicalExtraction, char_index_of, slice_chars};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Minimum candidate sentence length (characters).
pub const MIN_SENTENCE_CHARS: usize = 40;

/// Maximum candidate sentence length (characters).
pub const MAX_SENTENCE_CHARS: usize = 240;

static ASSERTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(is|are|was|were|has|have|had|provides?|offers?|supports?|enables?|delivers?|includes?|serves?|operates?|builds?|helps?|costs?|anchors?|validates?|specializ(es|e)|located|founded|certified|licensed|launched|powers?|runs?|uses?|stores?|guarantees?|requires?|returns?)\b",
    )
    .expect("static regex")
});

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-zA-Z]+ [A-Z][a-zA-Z]+\b|\b[A-Z]{2,}\b").expect("static regex"));

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// A sentence that survived filtering and anchor validation.
#[derive(Clone, Debug)]
pub struct TextFact {
    /// The sentence, exactly as it appears in the canonical text.
    pub sentence: String,
    /// Start offset (character index) in the canonical text.
    pub char_start: usize,
    /// End offset (exclusive).
    pub char_end: usize,
    /// SHA-256 of the sentence.
    pub fragment_hash: String,
    /// Index of the section the sentence came from.
    pub section_index: usize,
}

/// Counters the QA gate consumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AtomizeStats {
    /// Sentences seen across all sections.
    pub sentences_total: usize,
    /// Sentences passing the length and signal filters.
    pub candidates: usize,
    /// Candidates emitted with a validated anchor.
    pub anchored: usize,
}

// ---------------------------------------------------------------------------
// Sentence splitting
// ---------------------------------------------------------------------------

/// Split text into sentences.
///
/// Line breaks always end a sentence (lines are block boundaries from
/// extraction); within a line, a `.`, `!`, or `?` followed by whitespace
/// and an uppercase letter, digit, or quote ends one.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line == "—" {
            continue;
        }
        let chars: Vec<char> = line.chars().collect();
        let mut start = 0usize;
        let mut i = 0usize;
        while i < chars.len() {
            if matches!(chars[i], '.' | '!' | '?') {
                let mut j = i + 1;
                while j < chars.len() && matches!(chars[j], '.' | '!' | '?' | '"' | '\'' | ')') {
                    j += 1;
                }
                let at_end = j >= chars.len();
                let splits = at_end
                    || (chars[j].is_whitespace()
                        && chars[j + 1..]
                            .iter()
                            .find(|c| !c.is_whitespace())
                            .is_some_and(|c| {
                                c.is_uppercase() || c.is_ascii_digit() || matches!(c, '"' | '\'')
                            }));
                if splits {
                    let sentence: String = chars[start..j].iter().collect();
                    let sentence = sentence.trim().to_string();
                    if !sentence.is_empty() {
                        out.push(sentence);
                    }
                    start = j;
                    i = j;
                    continue;
                }
            }
            i += 1;
        }
        let tail: String = chars[start..].iter().collect();
        let tail = tail.trim().to_string();
        if !tail.is_empty() {
            out.push(tail);
        }
    }
    out
}

/// Returns `true` if the sentence carries an extractable assertion.
#[must_use]
pub fn is_high_signal(sentence: &str) -> bool {
    ASSERTION_RE.is_match(sentence)
        || ENTITY_RE.is_match(sentence)
        || sentence.chars().any(|c| c.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Atomization
// ---------------------------------------------------------------------------

/// Atomize an extraction into anchored text facts.
#[must_use]
pub fn atomize(extraction: &CanonicalExtraction) -> (Vec<TextFact>, AtomizeStats) {
    let mut facts = Vec::new();
    let mut stats = AtomizeStats::default();

    for (section_index, section) in extraction.sections.iter().enumerate() {
        let section_text = extraction.section_text(section);
        for sentence in split_sentences(&section_text) {
            stats.sentences_total += 1;

            let len = sentence.chars().count();
            if !(MIN_SENTENCE_CHARS..=MAX_SENTENCE_CHARS).contains(&len) {
                continue;
            }
            if !is_high_signal(&sentence) {
                continue;
            }
            stats.candidates += 1;

            let Some(char_start) = char_index_of(&extraction.text, &sentence) else {
                continue;
            };
            let char_end = char_start + len;
            let supporting = slice_chars(&extraction.text, char_start, char_end);
            let fragment_hash = precog_core::sha256_hex(&supporting);

            // Hard validation: the slice must reproduce the sentence and the
            // recomputed hash must match. An anchor that fails here is a bug
            // in extraction, not data to publish.
            if supporting != sentence || fragment_hash != precog_core::sha256_hex(&sentence) {
                debug!(char_start, char_end, "anchor validation failed, skipping sentence");
                continue;
            }

            stats.anchored += 1;
            facts.push(TextFact {
                sentence,
                char_start,
                char_end,
                fragment_hash,
                section_index,
            });
        }
    }

    (facts, stats)
}

/// Stable slot stem for a sentence: its first six lowercased words.
///
/// Keying the slot on the stem keeps a lightly edited sentence in the same
/// slot (producing a revision) while a genuinely new sentence gets a new
/// slot.
#[must_use]
pub fn sentence_stem(sentence: &str) -> String {
    sentence
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .take(6)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;

    fn fixture() -> CanonicalExtraction {
        extract(
            r#"
            <html><body>
              <h1>NRLC Research</h1>
              <p>NRLC operates an oracle platform for citation-grade answers. It is fast.</p>
              <p>The platform anchors every stored fact to exact character offsets in text.</p>
              <p>Short line.</p>
              <p>The starter plan costs 49 dollars per month and includes the validator.</p>
            </body></html>
            "#,
        )
    }

    #[test]
    fn splits_on_terminal_punctuation() {
        let sentences =
            split_sentences("First sentence here. Second one follows! Third asks? Done.");
        assert_eq!(sentences.len(), 4);
        assert_eq!(sentences[0], "First sentence here.");
        assert_eq!(sentences[2], "Third asks?");
    }

    #[test]
    fn does_not_split_decimals_or_abbreviations() {
        let sentences = split_sentences("The plan costs 49.99 dollars per month for e.g. teams.");
        assert_eq!(sentences.len(), 1);
    }

    #[test]
    fn length_band_filters_candidates() {
        let (facts, stats) = atomize(&fixture());
        assert!(stats.sentences_total > facts.len());
        for fact in &facts {
            let len = fact.sentence.chars().count();
            assert!((MIN_SENTENCE_CHARS..=MAX_SENTENCE_CHARS).contains(&len));
        }
        // "Short line." and "It is fast." are under the minimum.
        assert!(!facts.iter().any(|f| f.sentence.contains("Short line")));
    }

    #[test]
    fn anchors_slice_back_to_sentences() {
        let extraction = fixture();
        let (facts, stats) = atomize(&extraction);
        assert!(!facts.is_empty());
        assert_eq!(stats.anchored, facts.len());

        for fact in &facts {
            let sliced =
                crate::extract::slice_chars(&extraction.text, fact.char_start, fact.char_end);
            assert_eq!(sliced, fact.sentence);
            assert_eq!(precog_core::sha256_hex(&sliced), fact.fragment_hash);
        }
    }

    #[test]
    fn high_signal_requires_assertion_entity_or_number() {
        assert!(is_high_signal("The platform provides anchored citations."));
        assert!(is_high_signal("Prices start at 49 dollars"));
        assert!(is_high_signal("NRLC Research works on oracles"));
        assert!(!is_high_signal("thinking about things quietly"));
    }

    #[test]
    fn stem_is_stable_under_tail_edits() {
        let a = sentence_stem("The starter plan costs 49 dollars per month.");
        let b = sentence_stem("The starter plan costs 49 dollars per year, billed annually.");
        assert_eq!(a, b);
        assert_ne!(a, sentence_stem("A completely different sentence stem here."));
    }

    #[test]
    fn empty_extraction_atomizes_to_nothing() {
        let extraction = extract("<html><body></body></html>");
        let (facts, stats) = atomize(&extraction);
        assert!(facts.is_empty());
        assert_eq!(stats, AtomizeStats::default());
    }
}
