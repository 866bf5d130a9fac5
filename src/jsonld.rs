//! JSON-LD extraction and reconciliation.
//!
//! Blocks come from the parsed DOM, from a raw-HTML pass and, when a browser
//! tier rendered the page, from the live DOM. They are merged by canonical
//! JSON so the same block found twice is kept once. Pages without any block
//! get a synthesized `WebPage` stand-in built from the page structure.

use std::collections::HashSet;

use scraper::{ElementRef, Html};
use serde_json::{Map, Value, json};
use url::Url;

use crate::page::Extractors;

const FALLBACK_SECTIONS: usize = 5;
const FALLBACK_LISTS: usize = 3;
const FALLBACK_ITEMS: usize = 10;
const FALLBACK_IMAGES: usize = 5;
const FALLBACK_PARAGRAPHS: usize = 2;

/// Reconciled structured data of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredData {
    pub blocks: Vec<Value>,
    pub used_fallback: bool,
}

impl StructuredData {
    pub fn has_structured_data(&self) -> bool {
        !self.used_fallback
    }
}

/// Parses one script body; malformed or empty bodies are dropped.
pub fn parse_block(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) | Err(_) => None,
        Ok(value) => Some(value),
    }
}

/// Scans `<script>` elements whose `type` contains `ld+json`, any case.
pub fn scan_document(document: &Html, extractors: &Extractors) -> Vec<Value> {
    document
        .select(&extractors.script)
        .filter(|script| {
            script
                .attr("type")
                .is_some_and(|kind| kind.to_lowercase().contains("ld+json"))
        })
        .filter_map(|script| parse_block(&script.text().collect::<String>()))
        .collect()
}

/// Regex pass over the raw markup, for blocks the HTML parser misplaces.
pub fn scan_raw_html(html: &str, extractors: &Extractors) -> Vec<Value> {
    extractors
        .raw_json_ld
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .filter_map(|body| parse_block(body.as_str()))
        .collect()
}

/// Key-sorted serialization; two blocks are the same iff these strings are equal.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&sorted(value)).unwrap_or_default()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), sorted(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Concatenates the lists, keeping the first occurrence of every block.
pub fn merge_blocks<I>(lists: I) -> Vec<Value>
where
    I: IntoIterator<Item = Vec<Value>>,
{
    let mut seen = HashSet::new();

    lists
        .into_iter()
        .flatten()
        .filter(|block| !block.is_null())
        .filter(|block| seen.insert(canonical_json(block)))
        .collect()
}

/// Full extraction for one page.
pub fn extract(
    document: &Html,
    raw_html: &str,
    rendered: Option<&[Value]>,
    page: &Url,
    extractors: &Extractors,
) -> StructuredData {
    let blocks = merge_blocks([
        scan_document(document, extractors),
        scan_raw_html(raw_html, extractors),
        rendered.map(<[Value]>::to_vec).unwrap_or_default(),
    ]);

    if blocks.is_empty() {
        StructuredData {
            blocks: vec![fallback_block(document, page, extractors)],
            used_fallback: true,
        }
    } else {
        StructuredData {
            blocks,
            used_fallback: false,
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Structural approximation of a page that ships no JSON-LD.
pub fn fallback_block(document: &Html, page: &Url, extractors: &Extractors) -> Value {
    let name = document
        .select(&extractors.h1)
        .map(element_text)
        .find(|text| !text.is_empty())
        .unwrap_or_default();

    let meta_description = document
        .select(&extractors.meta_description)
        .filter_map(|meta| meta.attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_owned);

    let description = meta_description.unwrap_or_else(|| {
        document
            .select(&extractors.paragraph)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .take(FALLBACK_PARAGRAPHS)
            .collect::<Vec<_>>()
            .join(" ")
    });

    let sections: Vec<String> = document
        .select(&extractors.h2)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .take(FALLBACK_SECTIONS)
        .collect();

    let items: Vec<String> = document
        .select(&extractors.lists)
        .take(FALLBACK_LISTS)
        .flat_map(|list| {
            list.children()
                .filter_map(ElementRef::wrap)
                .filter(|child| child.value().name() == "li")
                .map(element_text)
                .collect::<Vec<_>>()
        })
        .filter(|text| !text.is_empty())
        .take(FALLBACK_ITEMS)
        .collect();

    let images: Vec<Value> = document
        .select(&extractors.image)
        .filter_map(|img| {
            let src = img.attr("src")?;
            let url = page.join(src.trim()).ok()?;
            Some(json!({
                "url": url.as_str(),
                "alt": img.attr("alt").unwrap_or_default().trim(),
            }))
        })
        .take(FALLBACK_IMAGES)
        .collect();

    json!({
        "@context": "https://schema.org",
        "@type": "WebPage",
        "url": page.as_str(),
        "name": name,
        "description": description,
        "sections": sections,
        "items": items,
        "images": images,
    })
}
