use crate::config::CrawlSettings;
use crate::url::canonicalize;

/// Turns a raw discovered link into a canonical in-scope URL, or rejects it
///
/// # Steps (order matters)
///
/// 1. Strip the query string unless `allow_query_parameters`, then the
///    fragment unless `allow_hash_parameters`
/// 2. Resolve a relative link against `base_url`, adding a `/` between them
///    only when neither side already has one
/// 3. Reject links that do not contain `base_url` (the crawl is single-site)
/// 4. Canonicalize; reject on failure
/// 5. Reject if any exclude keyword occurs in the canonical URL
/// 6. If include keywords are set, reject unless one of them occurs
///
/// Keywords are matched as substrings of the canonical URL, case included.
/// The function is pure: the same inputs always give the same answer, and a
/// canonical in-scope URL maps to itself.
///
/// # Examples
///
/// ```
/// use krill::config::CrawlSettings;
/// use krill::url::normalize_and_filter;
///
/// let settings = CrawlSettings::new("http://x.test/");
/// assert_eq!(
///     normalize_and_filter("/docs/?page=2", "http://x.test/", &settings),
///     Some("http://x.test/docs".to_string())
/// );
/// assert_eq!(normalize_and_filter("http://other.test/", "http://x.test/", &settings), None);
/// ```
pub fn normalize_and_filter(
    raw_link: &str,
    base_url: &str,
    settings: &CrawlSettings,
) -> Option<String> {
    let mut link = raw_link.trim();

    if !settings.allow_query_parameters {
        if let Some((head, _)) = link.split_once('?') {
            link = head;
        }
    }
    if !settings.allow_hash_parameters {
        if let Some((head, _)) = link.split_once('#') {
            link = head;
        }
    }
    if link.is_empty() {
        return None;
    }

    let resolved = resolve_against_base(link, base_url);

    if !resolved.contains(base_url) {
        tracing::trace!(link = %resolved, "Skipping link outside the base url");
        return None;
    }

    let canonical = canonicalize(&resolved).ok()?;
    if canonical.is_empty() {
        return None;
    }

    if let Some(keyword) = settings
        .keywords_to_exclude
        .iter()
        .find(|k| canonical.contains(k.as_str()))
    {
        tracing::trace!(link = %canonical, keyword = %keyword, "Skipping excluded link");
        return None;
    }

    if !settings.keywords_to_include.is_empty()
        && !settings
            .keywords_to_include
            .iter()
            .any(|k| canonical.contains(k.as_str()))
    {
        return None;
    }

    Some(canonical)
}

/// Returns `link` as-is when absolute, otherwise glued onto `base_url`
fn resolve_against_base(link: &str, base_url: &str) -> String {
    if has_http_scheme(link) {
        return link.to_string();
    }

    // Protocol-relative links borrow the base scheme
    if link.starts_with("//") {
        let scheme = base_url.split_once(':').map(|(s, _)| s).unwrap_or("http");
        return format!("{}:{}", scheme, link);
    }

    if base_url.ends_with('/') || link.starts_with('/') {
        format!("{}{}", base_url, link)
    } else {
        format!("{}/{}", base_url, link)
    }
}

fn has_http_scheme(link: &str) -> bool {
    let lowered = link.get(..8).unwrap_or(link).to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}
