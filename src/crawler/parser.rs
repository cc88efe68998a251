//! HTML link enumeration
//!
//! Collects the raw `href` values a page links to. Resolution against the
//! crawl's base URL, scoping and canonicalization happen afterwards in
//! [`normalize_and_filter`](crate::url::normalize_and_filter).

use scraper::{Html, Selector};
use std::collections::HashSet;

/// Returns every followable raw link in `html`, in document order
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links (same-page anchors)
///
/// Duplicate hrefs are reported once.
///
/// # Example
///
/// ```
/// use krill::crawler::parse_links;
///
/// let html = r#"<a href="/a">A</a><a href="mailto:x@y.z">mail</a><a href="/a">again</a>"#;
/// assert_eq!(parse_links(html), vec!["/a".to_string()]);
/// ```
pub fn parse_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let mut push = |href: &str| {
        let href = href.trim();
        if is_followable(href) && seen.insert(href.to_string()) {
            links.push(href.to_string());
        }
    };

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    links
}

fn is_followable(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') {
        return false;
    }

    let lowered = href.get(..11).unwrap_or(href).to_ascii_lowercase();
    !(lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:"))
}
