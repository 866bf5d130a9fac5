//! Page Markdown, rendered by `htmd`.
//!
//! `to_markdown` keeps the whole body; `to_fit_markdown` also drops page chrome
//! (navigation, header, footer, asides, forms) so only the core content remains.

use htmd::HtmlToMarkdown;

const ALWAYS_SKIPPED: [&str; 7] = [
    "head", "script", "style", "noscript", "template", "svg", "iframe",
];

const CHROME: [&str; 5] = ["nav", "header", "footer", "aside", "form"];

fn render(html: &str, skipped: Vec<&str>) -> String {
    HtmlToMarkdown::builder()
        .skip_tags(skipped)
        .build()
        .convert(html)
        .map(|markdown| markdown.trim().to_owned())
        .unwrap_or_default()
}

pub fn to_markdown(html: &str) -> String {
    render(html, ALWAYS_SKIPPED.to_vec())
}

pub fn to_fit_markdown(html: &str) -> String {
    render(html, ALWAYS_SKIPPED.iter().chain(CHROME.iter()).copied().collect())
}
