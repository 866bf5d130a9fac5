use std::collections::HashSet;

use serde::Serialize;
use url::Url;

use crate::normalize::netloc;

/// Substrings that mark a link as non-crawlable: binary assets and pseudo-schemes.
pub const EXCLUDE_PATTERNS: [&str; 12] = [
    ".pdf",
    ".jpg",
    ".jpeg",
    ".png",
    ".gif",
    ".zip",
    ".doc",
    ".docx",
    "tel:",
    "mailto:",
    "javascript:",
    "void(0)",
];

/// A link dropped because it matched an exclusion pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilteredLink {
    pub url: String,
    pub pattern: String,
}

/// Every host spelling that counts as "inside the crawl".
///
/// Built once per run from the primary host and the sibling hosts, each expanded
/// to `{host, bare, www.bare}` so `www.` never needs special-casing afterwards.
#[derive(Debug, Clone, Default)]
pub struct DomainSet(HashSet<String>);

impl DomainSet {
    pub fn new(primary: &str, siblings: &[String]) -> Self {
        let mut set = HashSet::new();

        for host in std::iter::once(primary).chain(siblings.iter().map(String::as_str)) {
            let host = host.trim().to_lowercase();
            if host.is_empty() {
                continue;
            }

            let bare = host.strip_prefix("www.").unwrap_or(&host).to_owned();
            set.insert(format!("www.{}", bare));
            set.insert(bare);
            set.insert(host);
        }

        DomainSet(set)
    }

    pub fn contains(&self, host: &str) -> bool {
        self.0.contains(&host.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn belongs_to_crawl(url: &Url, domains: &DomainSet) -> bool {
    domains.contains(&netloc(url))
}

/// Case-insensitive substring match; returns the first pattern hit.
pub fn is_excluded<'p>(url: &str, patterns: &[&'p str]) -> Option<&'p str> {
    let lower = url.to_lowercase();
    patterns.iter().find(|pattern| lower.contains(*pattern)).copied()
}

/// Why a resolved link was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Excluded(FilteredLink),
    OffDomain,
}

/// Domain set plus exclusion list, shared read-only by every fetch of a run.
#[derive(Debug, Clone)]
pub struct DomainFilter {
    domains: DomainSet,
    patterns: Vec<&'static str>,
}

impl DomainFilter {
    pub fn new(primary: &str, siblings: &[String]) -> Self {
        DomainFilter {
            domains: DomainSet::new(primary, siblings),
            patterns: EXCLUDE_PATTERNS.to_vec(),
        }
    }

    pub fn domains(&self) -> &DomainSet {
        &self.domains
    }

    /// A link is crawlable iff it is not excluded and belongs to the domain set.
    pub fn check(&self, url: &Url) -> Result<(), Rejection> {
        if let Some(pattern) = is_excluded(url.as_str(), &self.patterns) {
            return Err(Rejection::Excluded(FilteredLink {
                url: url.to_string(),
                pattern: pattern.to_owned(),
            }));
        }

        if belongs_to_crawl(url, &self.domains) {
            Ok(())
        } else {
            Err(Rejection::OffDomain)
        }
    }
}

/// Accepts `blog.example.com`, `https://blog.example.com/` or `Blog.Example.com/x`.
pub fn sibling_host(raw: &str) -> String {
    let raw = raw.trim();

    if let Ok(url) = Url::parse(raw)
        && url.has_host()
    {
        return netloc(&url);
    }

    raw.split('/')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}
