//! Candidate-link harvesting.
//!
//! No single extraction method finds every link on modern sites, so links are
//! pulled from five independent sources and unioned:
//! anchors, `data-href` attributes, page Markdown, links returned by rendered-DOM
//! scripts, and whatever link list the fetch engine supplied natively.

use std::collections::{BTreeSet, HashSet};

use scraper::Html;
use url::Url;

use crate::{
    filter::{DomainFilter, FilteredLink, Rejection},
    normalize::{NormalizedUrl, normalize},
    page::Extractors,
};

/// Markdown shorter than this carries no useful links.
const MIN_MARKDOWN_LEN: usize = 100;

/// Outcome of resolving a page's candidate links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Harvest {
    /// Crawlable, normalized, deduplicated, sorted.
    pub links: Vec<NormalizedUrl>,
    pub filtered: usize,
    pub excluded: Vec<FilteredLink>,
    pub self_links: usize,
}

pub fn anchor_links(document: &Html, extractors: &Extractors) -> Vec<String> {
    document
        .select(&extractors.anchor)
        .filter_map(|anchor| anchor.attr("href"))
        .map(|href| href.trim().to_owned())
        .filter(|href| !href.is_empty())
        .collect()
}

pub fn data_href_links(document: &Html, extractors: &Extractors) -> Vec<String> {
    document
        .select(&extractors.data_href)
        .filter_map(|element| element.attr("data-href"))
        .map(str::trim)
        .filter(|href| looks_like_link(href))
        .map(str::to_owned)
        .collect()
}

fn looks_like_link(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') {
        return false;
    }

    href.starts_with("http") || href.starts_with('/') || !href.contains(char::is_whitespace)
}

pub fn markdown_links(markdown: &str, extractors: &Extractors) -> Vec<String> {
    if markdown.len() < MIN_MARKDOWN_LEN {
        return Vec::new();
    }

    let mut links: Vec<String> = extractors
        .markdown_link
        .captures_iter(markdown)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|target| target.starts_with("http") || target.starts_with('/'))
        .map(str::to_owned)
        .collect();

    links.extend(
        extractors
            .bare_url
            .find_iter(markdown)
            .map(|m| m.as_str().to_owned()),
    );

    links
}

/// Keeps only the URL-looking strings of a script's result.
pub fn script_links(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| value.starts_with("http") || value.starts_with('/'))
        .map(str::to_owned)
        .collect()
}

/// True set union of every source; no source wins over another.
pub fn union<I, S>(sources: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: IntoIterator<Item = String>,
{
    sources.into_iter().flatten().collect()
}

/// Resolves candidates against the page URL, filters them and drops self-links.
pub fn resolve(page: &Url, candidates: HashSet<String>, filter: &DomainFilter) -> Harvest {
    let current = normalize(page.as_str());
    let mut harvest = Harvest::default();
    let mut links = BTreeSet::new();

    for href in candidates {
        if href.is_empty() {
            continue;
        }

        let Ok(full) = page.join(&href) else {
            harvest.filtered += 1;
            continue;
        };

        match filter.check(&full) {
            Ok(()) => {
                let link = normalize(full.as_str());
                if link == current {
                    harvest.self_links += 1;
                } else {
                    links.insert(link);
                }
            }
            Err(Rejection::Excluded(entry)) => {
                harvest.filtered += 1;
                harvest.excluded.push(entry);
            }
            Err(Rejection::OffDomain) => harvest.filtered += 1,
        }
    }

    harvest.excluded.sort_by(|a, b| a.url.cmp(&b.url));
    harvest.links = links.into_iter().collect();
    harvest
}
