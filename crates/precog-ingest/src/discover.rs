// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mirror discovery: how a page declares its authoritative Markdown mirror.
//!
//! Two declaration channels are inspected: an HTML
//! `<link rel="alternate" type="text/markdown">` element and an HTTP `Link`
//! response header with `rel="alternate"`.

use crate::fetch::FetchedPage;
use precog_store::DiscoveryMethod;
use scraper::{Html, Selector};

/// What discovery found on a page.
#[derive(Clone, Debug)]
pub struct DiscoveryProof {
    /// `href` of the HTML alternate link, if present.
    pub alternate_href: Option<String>,
    /// Mirror URL from the HTTP `Link` header, if present.
    pub header_href: Option<String>,
    /// The mirror URL discovery settled on (HTML wins over header).
    pub discovered_mirror_url: Option<String>,
    /// Which channels declared the mirror.
    pub method: DiscoveryMethod,
}

/// Extract the target of a `Link` header entry with `rel="alternate"`.
fn alternate_from_link_header(header: &str) -> Option<String> {
    for part in header.split(',') {
        let part = part.trim();
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        if !(target.starts_with('<') && target.ends_with('>')) {
            continue;
        }
        let is_alternate = segments.any(|seg| {
            let seg = seg.trim().to_lowercase();
            seg == "rel=alternate" || seg == "rel=\"alternate\""
        });
        if is_alternate {
            return Some(target[1..target.len() - 1].to_string());
        }
    }
    None
}

fn alternate_from_html(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"link[rel="alternate"][type="text/markdown"]"#)
        .expect("static selector");
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::to_string)
}

/// Inspect a fetched page for mirror declarations.
#[must_use]
pub fn inspect(page: &FetchedPage) -> DiscoveryProof {
    let alternate_href = alternate_from_html(&page.html);
    let header_href = page
        .link_header
        .as_deref()
        .and_then(alternate_from_link_header);

    let method = match (&alternate_href, &header_href) {
        (Some(_), Some(_)) => DiscoveryMethod::Both,
        (Some(_), None) => DiscoveryMethod::HtmlLink,
        (None, Some(_)) => DiscoveryMethod::HttpLink,
        (None, None) => DiscoveryMethod::None,
    };

    DiscoveryProof {
        discovered_mirror_url: alternate_href.clone().or_else(|| header_href.clone()),
        alternate_href,
        header_href,
        method,
    }
}
