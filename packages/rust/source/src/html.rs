//! HTML-to-text conversion for fetched web pages.
//!
//! Picks the main content container, converts it to Markdown with `htmd`,
//! then normalizes whitespace. Markdown is kept as the text format because
//! the stage agents read it well and it preserves headings and lists.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

/// Tags whose content is never part of the readable text.
const SKIP_TAGS: [&str; 6] = ["script", "style", "nav", "iframe", "noscript", "svg"];

/// Content containers, tried in priority order.
const CONTENT_SELECTORS: [&str; 7] = [
    "article .markdown",
    ".vp-doc",
    ".markdown-section",
    "[role=\"main\"]",
    "article",
    "main",
    ".content",
];

/// A converted page.
pub(crate) struct PageText {
    pub text: String,
    pub title: Option<String>,
}

/// Convert a full HTML document to readable text.
///
/// Fails only when `htmd` rejects the content; callers fall back to
/// [`plain_text`] in that case.
pub(crate) fn to_text(html: &str) -> Result<PageText, String> {
    let doc = Html::parse_document(html);
    let title = extract_title(&doc);
    let content_html = extract_content_html(&doc).unwrap_or_else(|| html.to_string());

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let markdown = converter
        .convert(&content_html)
        .map_err(|e| format!("htmd conversion failed: {e}"))?;

    debug!(raw_len = markdown.len(), "htmd conversion complete");

    Ok(PageText {
        text: normalize_whitespace(&markdown),
        title,
    })
}

/// Visible text of the document body without any Markdown structure.
pub(crate) fn plain_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let text = doc.root_element().text().collect::<Vec<_>>().join(" ");
    normalize_whitespace(&text)
}

/// Inner HTML of the first matching content container, or the body.
fn extract_content_html(doc: &Html) -> Option<String> {
    for sel_str in CONTENT_SELECTORS.iter().chain(std::iter::once(&"body")) {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return Some(el.inner_html());
            }
        }
    }
    None
}

/// `<title>` text, falling back to the first `<h1>`.
fn extract_title(doc: &Html) -> Option<String> {
    ["title", "h1"].iter().find_map(|sel_str| {
        let selector = Selector::parse(sel_str).ok()?;
        let text = doc
            .select(&selector)
            .next()?
            .text()
            .collect::<String>()
            .trim()
            .to_string();
        (!text.is_empty()).then_some(text)
    })
}

/// Trim trailing spaces and collapse runs of blank lines.
fn normalize_whitespace(text: &str) -> String {
    static TRAILING_WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)[ \t]+$").expect("valid regex"));
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let trimmed = TRAILING_WS_RE.replace_all(text, "");
    MULTI_BLANK_RE
        .replace_all(&trimmed, "\n\n")
        .trim()
        .to_string()
}
