// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical text extraction.
//!
//! The extraction is deterministic: strip non-content elements, partition
//! the remaining text by heading hierarchy into sections, scrub boilerplate
//! lines, and concatenate sections with a fixed separator. All anchor
//! offsets in the platform are character indices into this one string.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Separator between sections in the canonical text.
pub const SECTION_SEPARATOR: &str = "\n\n—\n\n";

/// Identifier stored on snapshots for this extractor.
pub const EXTRACTION_METHOD: &str = "sections-v1";

/// Elements whose subtrees never contribute content.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "aside", "noscript", "template", "head", "svg", "iframe",
];

/// Elements that delimit text blocks (one line each).
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "li", "blockquote", "pre", "td", "th", "dt", "dd",
    "figcaption", "tr", "ul", "ol", "table", "body", "header",
];

static CTA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(sign up|sign in|log in|login|subscribe|learn more|read more|contact us|get started|get a quote|book now|try it free|start free trial|join now|buy now|add to cart|follow us|skip to content|accept all cookies|cookie settings|privacy policy|terms of service|all rights reserved)\b",
    )
    .expect("static regex")
});

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One heading-delimited section with its absolute offsets.
#[derive(Clone, Debug)]
pub struct Section {
    /// Heading text, `None` for content before the first heading.
    pub heading: Option<String>,
    /// Start offset (character index) in the canonical text.
    pub char_start: usize,
    /// End offset (exclusive).
    pub char_end: usize,
}

/// The canonical extraction of one page.
#[derive(Clone, Debug)]
pub struct CanonicalExtraction {
    /// The canonical text; the sole reference for anchor validation.
    pub text: String,
    /// SHA-256 of `text`.
    pub text_hash: String,
    /// Extractor identifier.
    pub method: String,
    /// Sections with absolute offsets into `text`.
    pub sections: Vec<Section>,
}

impl CanonicalExtraction {
    /// The text of one section, sliced out of the canonical string.
    #[must_use]
    pub fn section_text(&self, section: &Section) -> String {
        slice_chars(&self.text, section.char_start, section.char_end)
    }
}

// ---------------------------------------------------------------------------
// Character-offset helpers
// ---------------------------------------------------------------------------

/// Slice `s` by character indices (offsets are chars, not bytes).
#[must_use]
pub fn slice_chars(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Character index of the first occurrence of `needle` in `haystack`.
#[must_use]
pub fn char_index_of(haystack: &str, needle: &str) -> Option<usize> {
    let byte_idx = haystack.find(needle)?;
    Some(haystack[..byte_idx].chars().count())
}

/// Collapse runs of whitespace to single spaces and trim.
#[must_use]
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RawSection {
    heading: Option<String>,
    lines: Vec<String>,
}

struct Walker {
    sections: Vec<RawSection>,
    buffer: String,
}

impl Walker {
    fn new() -> Self {
        Self {
            sections: vec![RawSection::default()],
            buffer: String::new(),
        }
    }

    fn flush(&mut self) {
        let line = collapse_whitespace(&self.buffer);
        self.buffer.clear();
        if !line.is_empty() {
            if let Some(section) = self.sections.last_mut() {
                section.lines.push(line);
            }
        }
    }

    fn start_section(&mut self, heading: String) {
        self.flush();
        self.sections.push(RawSection {
            heading: Some(heading),
            lines: Vec::new(),
        });
    }

    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                self.buffer.push_str(text);
                self.buffer.push(' ');
                continue;
            }
            let Some(child_el) = ElementRef::wrap(child) else {
                continue;
            };
            let tag = child_el.value().name();
            if SKIP_TAGS.contains(&tag) {
                continue;
            }
            if matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
                let heading = collapse_whitespace(&child_el.text().collect::<String>());
                if !heading.is_empty() {
                    self.start_section(heading);
                }
                continue;
            }
            if BLOCK_TAGS.contains(&tag) {
                self.flush();
                self.walk(child_el);
                self.flush();
            } else {
                self.walk(child_el);
            }
        }
    }
}

/// Anchor texts of same-site links, used to scrub nav lines.
fn internal_link_texts(document: &Html) -> HashSet<String> {
    let selector = Selector::parse("a[href]").expect("static selector");
    let mut texts = HashSet::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let internal = href.starts_with('/') || href.starts_with('#') || !href.contains("://");
        if internal {
            let text = collapse_whitespace(&anchor.text().collect::<String>());
            if !text.is_empty() {
                texts.insert(text.to_lowercase());
            }
        }
    }
    texts
}

fn looks_like_nav_label(line: &str) -> bool {
    line.chars().count() < 30 && !line.contains(['.', '!', '?'])
}

/// Drop CTA lines, lines matching internal link texts, and clusters of
/// three or more consecutive nav-label lines.
fn scrub_lines(lines: Vec<String>, link_texts: &HashSet<String>) -> Vec<String> {
    let kept: Vec<String> = lines
        .into_iter()
        .filter(|line| {
            if link_texts.contains(&line.to_lowercase()) {
                return false;
            }
            !(line.chars().count() < 80 && CTA_RE.is_match(line))
        })
        .collect();

    // Remove nav-label clusters.
    let mut out = Vec::with_capacity(kept.len());
    let mut i = 0;
    while i < kept.len() {
        if looks_like_nav_label(&kept[i]) {
            let mut j = i;
            while j < kept.len() && looks_like_nav_label(&kept[j]) {
                j += 1;
            }
            if j - i < 3 {
                out.extend(kept[i..j].iter().cloned());
            }
            i = j;
        } else {
            out.push(kept[i].clone());
            i += 1;
        }
    }
    out
}

/// Produce the canonical extraction for a page.
#[must_use]
pub fn extract(html: &str) -> CanonicalExtraction {
    let document = Html::parse_document(html);
    let link_texts = internal_link_texts(&document);

    let mut walker = Walker::new();
    walker.walk(document.root_element());
    walker.flush();

    let mut assembled: Vec<(Option<String>, String)> = Vec::new();
    for raw in walker.sections {
        let lines = scrub_lines(raw.lines, &link_texts);
        let mut parts: Vec<String> = Vec::new();
        if let Some(h) = &raw.heading {
            parts.push(h.clone());
        }
        parts.extend(lines);
        let body = parts.join("\n");
        if !collapse_whitespace(&body).is_empty() {
            assembled.push((raw.heading, body));
        }
    }

    let mut text = String::new();
    let mut sections = Vec::with_capacity(assembled.len());
    let mut cursor = 0usize;
    for (idx, (heading, body)) in assembled.iter().enumerate() {
        if idx > 0 {
            text.push_str(SECTION_SEPARATOR);
            cursor += SECTION_SEPARATOR.chars().count();
        }
        let len = body.chars().count();
        sections.push(Section {
            heading: heading.clone(),
            char_start: cursor,
            char_end: cursor + len,
        });
        text.push_str(body);
        cursor += len;
    }

    let text_hash = precog_core::sha256_hex(&text);
    CanonicalExtraction {
        text,
        text_hash,
        method: EXTRACTION_METHOD.to_string(),
        sections,
    }
}
