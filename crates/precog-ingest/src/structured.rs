// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured-data harvest: JSON-LD, microdata, and RDFa.
//!
//! Each harvested item is normalized to `{@context, @type, fields…}` and
//! flattened into scalar properties with a JSON pointer recording where in
//! the item the value came from. Structured facts are never anchorable;
//! the pointer is their only provenance.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// One scalar property of a harvested item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructuredProperty {
    /// JSON pointer into the normalized item (e.g. `/address/streetAddress`).
    pub pointer: String,
    /// Property name with nesting joined by dots, numeric indices dropped.
    pub predicate: String,
    /// Stringified value.
    pub value: String,
}

/// A normalized structured-data item.
#[derive(Clone, Debug)]
pub struct StructuredItem {
    /// `@context`, when declared.
    pub context: Option<String>,
    /// `@type` (first entry when the source declares several).
    pub item_type: Option<String>,
    /// `@id`, when declared; otherwise subjects are derived by the caller.
    pub id: Option<String>,
    /// Which syntax produced the item.
    pub source: &'static str,
    /// Flattened scalar properties.
    pub properties: Vec<StructuredProperty>,
}

fn sel(selector: &str) -> Selector {
    Selector::parse(selector).expect("static selector")
}

// ---------------------------------------------------------------------------
// JSON-LD
// ---------------------------------------------------------------------------

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn flatten_value(
    value: &Value,
    pointer: &str,
    predicate_path: &[&str],
    out: &mut Vec<StructuredProperty>,
) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if key.starts_with('@') {
                    continue;
                }
                let pointer = format!("{pointer}/{key}");
                let mut path = predicate_path.to_vec();
                path.push(key);
                flatten_value(nested, &pointer, &path, out);
            }
        }
        Value::Array(items) => {
            for (idx, nested) in items.iter().enumerate() {
                let pointer = format!("{pointer}/{idx}");
                flatten_value(nested, &pointer, predicate_path, out);
            }
        }
        other => {
            if let Some(rendered) = scalar_to_string(other) {
                out.push(StructuredProperty {
                    pointer: pointer.to_string(),
                    predicate: predicate_path.join("."),
                    value: rendered,
                });
            }
        }
    }
}

fn first_type(value: &Value) -> Option<String> {
    match value.get("@type") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(arr)) => arr.first().and_then(scalar_to_string),
        _ => None,
    }
}

fn normalize_jsonld_item(value: &Value) -> Option<StructuredItem> {
    let map = value.as_object()?;
    let mut properties = Vec::new();
    flatten_value(value, "", &[], &mut properties);
    if properties.is_empty() {
        return None;
    }
    Some(StructuredItem {
        context: map.get("@context").and_then(scalar_to_string),
        item_type: first_type(value),
        id: map.get("@id").and_then(scalar_to_string),
        source: "json-ld",
        properties,
    })
}

fn harvest_jsonld(document: &Html) -> Vec<StructuredItem> {
    let selector = sel(r#"script[type="application/ld+json"]"#);
    let mut items = Vec::new();
    for script in document.select(&selector) {
        let raw: String = script.text().collect();
        let Ok(parsed) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        let roots: Vec<&Value> = match &parsed {
            Value::Array(arr) => arr.iter().collect(),
            Value::Object(map) => match map.get("@graph") {
                Some(Value::Array(graph)) => graph.iter().collect(),
                _ => vec![&parsed],
            },
            _ => continue,
        };
        for root in roots {
            if let Some(item) = normalize_jsonld_item(root) {
                items.push(item);
            }
        }
    }
    items
}

// ---------------------------------------------------------------------------
// Microdata
// ---------------------------------------------------------------------------

fn element_value(el: ElementRef<'_>) -> String {
    if let Some(content) = el.value().attr("content") {
        return content.trim().to_string();
    }
    if let Some(href) = el.value().attr("href") {
        return href.trim().to_string();
    }
    crate::extract::collapse_whitespace(&el.text().collect::<String>())
}

/// Nearest ancestor (or self) carrying `attr`.
fn scope_of<'a>(el: ElementRef<'a>, attr: &str) -> Option<ElementRef<'a>> {
    let mut node = Some(*el);
    while let Some(current) = node {
        if let Some(element) = ElementRef::wrap(current) {
            if element.value().attr(attr).is_some() {
                return Some(element);
            }
        }
        node = current.parent();
    }
    None
}

fn harvest_microdata(document: &Html) -> Vec<StructuredItem> {
    let scope_sel = sel("[itemscope]");
    let prop_sel = sel("[itemprop]");
    let mut items = Vec::new();

    for scope in document.select(&scope_sel) {
        let mut properties = Vec::new();
        for prop in scope.select(&prop_sel) {
            // Only direct properties: the property's nearest enclosing
            // itemscope must be this scope.
            let owner = prop
                .parent()
                .and_then(|p| ElementRef::wrap(p))
                .and_then(|p| scope_of(p, "itemscope"));
            if owner.map(|o| o.id()) != Some(scope.id()) {
                continue;
            }
            let Some(name) = prop.value().attr("itemprop") else {
                continue;
            };
            let value = element_value(prop);
            if value.is_empty() {
                continue;
            }
            properties.push(StructuredProperty {
                pointer: format!("/{name}"),
                predicate: name.to_string(),
                value,
            });
        }
        if properties.is_empty() {
            continue;
        }
        items.push(StructuredItem {
            context: None,
            item_type: scope.value().attr("itemtype").map(str::to_string),
            id: scope.value().attr("itemid").map(str::to_string),
            source: "microdata",
            properties,
        });
    }
    items
}

// ---------------------------------------------------------------------------
// RDFa
// ---------------------------------------------------------------------------

fn harvest_rdfa(document: &Html) -> Vec<StructuredItem> {
    let scope_sel = sel("[typeof]");
    let prop_sel = sel("[property]");
    let mut items = Vec::new();

    for scope in document.select(&scope_sel) {
        let mut properties = Vec::new();
        for prop in scope.select(&prop_sel) {
            let owner = prop
                .parent()
                .and_then(|p| ElementRef::wrap(p))
                .and_then(|p| scope_of(p, "typeof"));
            if owner.map(|o| o.id()) != Some(scope.id()) {
                continue;
            }
            let Some(name) = prop.value().attr("property") else {
                continue;
            };
            let value = element_value(prop);
            if value.is_empty() {
                continue;
            }
            properties.push(StructuredProperty {
                pointer: format!("/{name}"),
                predicate: name.to_string(),
                value,
            });
        }
        if properties.is_empty() {
            continue;
        }
        items.push(StructuredItem {
            context: scope.value().attr("vocab").map(str::to_string),
            item_type: scope.value().attr("typeof").map(str::to_string),
            id: scope.value().attr("resource").map(str::to_string),
            source: "rdfa",
            properties,
        });
    }
    items
}

/// Harvest all structured data from a page, in source order:
/// JSON-LD first, then microdata, then RDFa.
#[must_use]
pub fn harvest(html: &str) -> Vec<StructuredItem> {
    let document = Html::parse_document(html);
    let mut items = harvest_jsonld(&document);
    items.extend(harvest_microdata(&document));
    items.extend(harvest_rdfa(&document));
    items
}
