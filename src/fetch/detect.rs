//! Single-page-app detection on the seed page fetched before the crawl.

use scraper::Html;

use crate::{error::Res, page::selector};

const SCRIPT_SRC_MARKERS: [&str; 6] = ["_nuxt/", "__next/", "webpack", "vite", "/build/", ".module."];

const TEXT_MARKERS: [(&str, &str); 6] = [
    ("_nuxt", "Nuxt.js marker"),
    ("__next", "Next.js marker"),
    ("data-reactroot", "React root attribute"),
    ("data-reactid", "React id attribute"),
    ("<div id=\"root\">", "React mount point"),
    ("<div id=\"app\">", "Vue mount point"),
];

/// Names the first single-page-app signal found in `html`, if any.
pub fn spa_signal(html: &str) -> Res<Option<&'static str>> {
    let document = Html::parse_document(html);

    if document
        .select(&selector("script[type]", "script")?)
        .any(|script| script.attr("type").is_some_and(|kind| kind.trim().eq_ignore_ascii_case("module")))
    {
        return Ok(Some("ES module script"));
    }

    for script in document.select(&selector("script[src]", "script")?) {
        let src = script.attr("src").unwrap_or_default().to_lowercase();
        if let Some(marker) = SCRIPT_SRC_MARKERS.iter().find(|marker| src.contains(*marker)) {
            return Ok(Some(*marker));
        }
    }

    if document.select(&selector("link[rel]", "link")?).any(|link| {
        link.attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("modulepreload")))
    }) {
        return Ok(Some("modulepreload link"));
    }

    let lowered = html.to_lowercase();
    Ok(TEXT_MARKERS
        .iter()
        .find(|(marker, _)| lowered.contains(marker))
        .map(|(_, signal)| *signal))
}
