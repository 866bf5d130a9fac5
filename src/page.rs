use owo_colors::OwoColorize;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::{
    error::{Res, ResExt},
    fetch::Fetched,
    filter::DomainFilter,
    harvest::{self, Harvest},
    jsonld,
    markdown::{to_fit_markdown, to_markdown},
    normalize::NormalizedUrl,
};

/// `html_content` is cut to this many bytes; `html_full_size` keeps the real size.
pub const HTML_CONTENT_LIMIT: usize = 200_000;

const TITLE_LIMIT: usize = 40;
const TITLE_SEPARATORS: [&str; 6] = [" - ", " | ", " : ", " — ", " – ", " · "];
const LOCALE_SEGMENTS: [&str; 5] = ["fr", "en", "de", "es", "www"];

/// Selectors and patterns compiled once per run and shared by every page.
pub struct Extractors {
    pub anchor: Selector,
    pub data_href: Selector,
    pub title: Selector,
    pub h1: Selector,
    pub h2: Selector,
    pub lists: Selector,
    pub paragraph: Selector,
    pub image: Selector,
    pub meta_description: Selector,
    pub script: Selector,
    pub markdown_link: Regex,
    pub bare_url: Regex,
    pub raw_json_ld: Regex,
}

pub(crate) fn selector(css: &'static str, tag: &str) -> Res<Selector> {
    Selector::parse(css).with_context(format_args!(
        "Failed to parse selector for HTML '{}' tag: {}",
        tag,
        css.yellow()
    ))
}

fn pattern(source: &'static str, what: &str) -> Res<Regex> {
    Regex::new(source)
        .map_err(|err| err.to_string())
        .with_context(format_args!("Failed to compile {} pattern: {}", what, source.yellow()))
}

impl Extractors {
    pub fn new() -> Res<Self> {
        Ok(Extractors {
            anchor: selector("a[href]", "anchor")?,
            data_href: selector("[data-href]", "data-href")?,
            title: selector("title", "title")?,
            h1: selector("h1", "h1")?,
            h2: selector("h2", "h2")?,
            lists: selector("ul, ol", "list")?,
            paragraph: selector("p", "paragraph")?,
            image: selector("img[src]", "image")?,
            meta_description: selector(r#"meta[name="description"]"#, "meta description")?,
            script: selector("script[type]", "script")?,
            markdown_link: pattern(r"\]\s*\(\s*([^)\s]+)\s*\)", "Markdown link")?,
            bare_url: pattern(r#"https?://[^\s\]\)"'>]+"#, "bare URL")?,
            raw_json_ld: pattern(
                r#"(?is)<script[^>]+type=["']application/ld\+json["'][^>]*>(.*?)</script>"#,
                "JSON-LD script",
            )?,
        })
    }
}

/// Fields only a concurrent-mode run exposes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtendedFields {
    pub markdown: String,
    pub fit_markdown: String,
    pub html_full_size: usize,
    #[serde(rename = "crawl4ai_success")]
    pub render_success: bool,
}

/// One crawled page. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub links: Vec<NormalizedUrl>,
    pub description: String,
    pub h1: String,
    /// Seconds.
    pub response_time: f64,
    pub html_content: String,
    pub last_modified: String,
    pub has_structured_data: bool,
    pub json_ld: Vec<Value>,
    pub h2_count: usize,
    pub lists_count: usize,
    #[serde(rename = "fallback_used")]
    pub used_fallback_extraction: bool,
    #[serde(flatten)]
    pub extended: Option<ExtendedFields>,
}

fn first_text(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn truncate(html: &str, limit: usize) -> String {
    if html.len() <= limit {
        return html.to_owned();
    }

    let mut end = limit;
    while !html.is_char_boundary(end) {
        end -= 1;
    }
    html[..end].to_owned()
}

/// Builds the record for a fetched page and harvests its outbound links.
///
/// `url` is the page's own (queued) URL; relative links resolve against it.
pub fn build_record(
    url: &Url,
    fetched: &Fetched,
    filter: &DomainFilter,
    extractors: &Extractors,
    extended: bool,
) -> (PageRecord, Harvest) {
    let document = Html::parse_document(&fetched.html);

    let raw_title = first_text(&document, &extractors.title);
    let h1 = first_text(&document, &extractors.h1);
    let title = clean_title(&raw_title, &h1, url);

    let description = document
        .select(&extractors.meta_description)
        .filter_map(|meta| meta.attr("content"))
        .map(|content| content.trim().to_owned())
        .next()
        .unwrap_or_default();

    let markdown = to_markdown(&fetched.html);

    let candidates = harvest::union([
        harvest::anchor_links(&document, extractors),
        harvest::data_href_links(&document, extractors),
        harvest::markdown_links(&markdown, extractors),
        harvest::script_links(&fetched.script_links),
        fetched.native_links.clone(),
    ]);
    let links = harvest::resolve(url, candidates, filter);

    let structured = jsonld::extract(
        &document,
        &fetched.html,
        fetched.rendered_json_ld.as_deref(),
        url,
        extractors,
    );

    let extended = extended.then(|| ExtendedFields {
        fit_markdown: to_fit_markdown(&fetched.html),
        markdown,
        html_full_size: fetched.html.len(),
        render_success: true,
    });

    let record = PageRecord {
        url: url.to_string(),
        title,
        links: links.links.clone(),
        description,
        h1,
        response_time: fetched.response_time.as_secs_f64(),
        html_content: truncate(&fetched.html, HTML_CONTENT_LIMIT),
        last_modified: fetched.last_modified.clone().unwrap_or_default(),
        has_structured_data: structured.has_structured_data(),
        h2_count: document.select(&extractors.h2).count(),
        lists_count: document.select(&extractors.lists).count(),
        used_fallback_extraction: structured.used_fallback,
        json_ld: structured.blocks,
        extended,
    };

    (record, links)
}

/// Picks a short human title from the H1, the `<title>` or the URL path.
pub fn clean_title(title: &str, h1: &str, url: &Url) -> String {
    let domain_label = url
        .host_str()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .split('.')
        .next()
        .unwrap_or_default()
        .to_lowercase();

    let is_useful = |text: &str| {
        if text.chars().count() < 3 {
            return false;
        }
        let squashed = text.to_lowercase().replace([' ', '-'], "");
        !(squashed.contains(&domain_label)
            && squashed.chars().count() < domain_label.chars().count() + 5)
    };

    let mut text = if h1.chars().count() > 10 {
        h1.to_owned()
    } else if title.chars().count() > 5 {
        title.to_owned()
    } else {
        String::new()
    };

    if let Some(separator) = TITLE_SEPARATORS.iter().find(|sep| text.contains(*sep)) {
        let best = text
            .split(separator)
            .map(str::trim)
            .filter(|part| is_useful(*part))
            .max_by_key(|part| part.chars().count())
            .map(str::to_owned);

        if let Some(best) = best {
            text = best;
        }
    }

    if !is_useful(&text) {
        let segment = url
            .path()
            .split('/')
            .filter(|segment| !segment.is_empty() && !LOCALE_SEGMENTS.contains(segment))
            .next_back();

        text = match segment {
            Some(segment) => title_case(&segment.replace(['-', '_'], " ")),
            None => return String::from("Home"),
        };
    }

    let text = text.trim();
    if text.chars().count() > TITLE_LIMIT {
        format!("{}..", text.chars().take(TITLE_LIMIT).collect::<String>())
    } else {
        text.to_owned()
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use url::Url;

    use crate::{
        error::{Res, ResExt},
        fetch::{Fetched, Tier},
        filter::DomainFilter,
        page::{Extractors, HTML_CONTENT_LIMIT, build_record, clean_title, truncate},
    };

    #[test]
    fn test_clean_title_prefers_long_h1() -> Res<()> {
        let url = Url::parse("https://acme.com/tools").context("Failed to parse URL for testing")?;

        assert_eq!(clean_title("Acme", "Professional garden tools", &url), "Professional garden tools");
        assert_eq!(clean_title("Garden tools | Acme", "Tools", &url), "Garden tools");

        Ok(())
    }

    #[test]
    fn test_clean_title_falls_back_to_path() -> Res<()> {
        let url = Url::parse("https://acme.com/fr/garden-tools_sale").context("Failed to parse URL for testing")?;
        assert_eq!(clean_title("Acme", "", &url), "Garden Tools Sale");

        let root = Url::parse("https://acme.com/").context("Failed to parse URL for testing")?;
        assert_eq!(clean_title("", "", &root), "Home");

        let locale_root = Url::parse("https://acme.com/en/").context("Failed to parse URL for testing")?;
        assert_eq!(clean_title("ACME - Acme", "", &locale_root), "Home");

        Ok(())
    }

    #[test]
    fn test_clean_title_counts_characters_not_bytes() -> Res<()> {
        let url = Url::parse("https://acme.com/lampes").context("Failed to parse URL for testing")?;

        assert_eq!(clean_title("Acme ééé", "", &url), "Lampes");

        Ok(())
    }

    #[test]
    fn test_clean_title_truncates() -> Res<()> {
        let url = Url::parse("https://acme.com/").context("Failed to parse URL for testing")?;
        let long = "A remarkably long heading that keeps going well past forty characters";

        assert_eq!(clean_title("", long, &url), "A remarkably long heading that keeps goi..");

        Ok(())
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let html = "é".repeat(HTML_CONTENT_LIMIT);
        let cut = truncate(&html, HTML_CONTENT_LIMIT);

        assert!(cut.len() <= HTML_CONTENT_LIMIT);
        assert_eq!(cut.len() % 2, 0);
    }

    #[test]
    fn test_build_record() -> Res<()> {
        let extractors = Extractors::new()?;
        let filter = DomainFilter::new("example.com", &[]);
        let url = Url::parse("https://example.com/shop").context("Failed to parse URL for testing")?;

        let mut fetched = Fetched::new(
            Tier::Direct,
            r#"
<html>
  <head>
    <title>Shop | Example</title>
    <meta name="description" content="  All our products ">
    <script type="application/ld+json">{"@type": "Store", "name": "Example"}</script>
  </head>
  <body>
    <h1>Everything in stock</h1>
    <h2>New</h2><h2>Sale</h2>
    <ul><li><a href="/shop/new">New</a></li></ul>
    <ol><li><a href="https://example.com/shop?page=2">Next</a></li></ol>
    <a href="/shop/">Self</a>
  </body>
</html>
            "#,
            Duration::from_millis(250),
        );
        fetched.script_links = vec![String::from("https://example.com/cart")];

        let (record, harvest) = build_record(&url, &fetched, &filter, &extractors, false);

        assert_eq!(record.url, "https://example.com/shop");
        assert_eq!(record.title, "Everything in stock");
        assert_eq!(record.description, "All our products");
        assert_eq!(record.h1, "Everything in stock");
        assert_eq!(record.h2_count, 2);
        assert_eq!(record.lists_count, 2);
        assert_eq!(record.response_time, 0.25);
        assert!(record.has_structured_data);
        assert!(!record.used_fallback_extraction);
        assert_eq!(record.json_ld, vec![json!({"@type": "Store", "name": "Example"})]);
        assert_eq!(
            record.links,
            vec!["https://example.com/cart", "https://example.com/shop/new"]
        );
        assert!(record.extended.is_none());
        assert_eq!(harvest.self_links, 2);

        Ok(())
    }

    #[test]
    fn test_build_record_extended_fields() -> Res<()> {
        let extractors = Extractors::new()?;
        let filter = DomainFilter::new("example.com", &[]);
        let url = Url::parse("https://example.com/").context("Failed to parse URL for testing")?;
        let fetched = Fetched::new(Tier::Direct, "<html><body><p>Plain page</p></body></html>", Duration::ZERO);

        let (record, _) = build_record(&url, &fetched, &filter, &extractors, true);

        assert!(record.used_fallback_extraction);
        assert_eq!(record.json_ld.len(), 1);
        let Some(extended) = record.extended.as_ref() else {
            panic!("extended fields missing");
        };
        assert_eq!(extended.markdown, "Plain page");
        assert_eq!(extended.html_full_size, fetched.html.len());

        let line = serde_json::to_value(&record).context("Failed to serialize record")?;
        assert_eq!(line["fallback_used"], true);
        assert_eq!(line["crawl4ai_success"], true);
        assert_eq!(line["fit_markdown"], "Plain page");

        Ok(())
    }
}
