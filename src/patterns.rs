use serde::{Serialize, Serializer};
use url::Url;

use crate::page::PageRecord;

pub const ROOT_GROUP: &str = "Home";

/// Pages sharing their first meaningful path segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternGroup {
    pub name: String,
    pub count: usize,
    /// Serialized as the sample URLs only.
    #[serde(serialize_with = "sample_urls")]
    pub samples: Vec<PageRecord>,
}

fn sample_urls<S: Serializer>(samples: &[PageRecord], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(samples.iter().map(|page| page.url.as_str()))
}

fn is_locale(segment: &str) -> bool {
    segment.len() == 2 && segment.chars().all(|c| c.is_ascii_alphabetic())
}

/// Group key for a page URL: the first path segment, skipping a leading
/// two-letter locale when another segment follows it.
pub fn group_key(url: &str) -> String {
    let path = Url::parse(url)
        .map(|parsed| parsed.path().to_owned())
        .unwrap_or_else(|_| url.to_owned());
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [] => String::from(ROOT_GROUP),
        [first, second, ..] if is_locale(first) => (*second).to_owned(),
        [first, ..] => (*first).to_owned(),
    }
}

/// Groups pages in first-seen order, keeping at most `sample_limit` samples per group.
pub fn analyze_patterns(pages: &[PageRecord], sample_limit: usize) -> Vec<PatternGroup> {
    let mut groups: Vec<PatternGroup> = Vec::new();

    for page in pages {
        let key = group_key(&page.url);

        let group = match groups.iter().position(|group| group.name == key) {
            Some(idx) => &mut groups[idx],
            None => {
                groups.push(PatternGroup {
                    name: key,
                    count: 0,
                    samples: Vec::new(),
                });
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };

        group.count += 1;
        if group.samples.len() < sample_limit {
            group.samples.push(page.clone());
        }
    }

    groups
}
