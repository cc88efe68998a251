use crate::UrlError;
use url::Url;

/// Characters that never need percent-encoding (RFC 3986 "unreserved")
fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

/// Converts a URL into the canonical form used as a store key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase scheme and host, drop the default port
/// 3. Normalize path:
///    - Remove dot segments (. and ..) and duplicate slashes
///    - Decode unnecessarily percent-encoded characters, uppercase the rest
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 4. Drop an empty query string, sort the remaining query pairs
///
/// Fragments are kept; whether they survive is decided by the link filter
/// before canonicalization. Canonicalizing a canonical URL returns it
/// unchanged.
///
/// # Examples
///
/// ```
/// use krill::url::canonicalize;
///
/// let url = canonicalize("HTTP://Example.COM:80/a/./b/../c/").unwrap();
/// assert_eq!(url, "http://example.com/a/c");
/// ```
pub fn canonicalize(url_str: &str) -> Result<String, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    // Host casing and default ports are already normalized by the parser
    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    if let Some(query) = url.query() {
        let query = normalize_query(query);
        if query.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&query));
        }
    }

    let canonical = url.to_string();
    if canonical.is_empty() {
        return Err(UrlError::Malformed(url_str.to_string()));
    }
    Ok(canonical)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut normalized_segments: Vec<String> = Vec::new();

    for segment in path.split('/') {
        match segment {
            // Empty segments come from duplicate slashes
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(normalize_escapes(segment)),
        }
    }

    // Joining never yields a trailing slash, which drops it for non-root paths
    format!("/{}", normalized_segments.join("/"))
}

/// Decodes percent-escapes of unreserved characters and uppercases the others
fn normalize_escapes(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = String::with_capacity(segment.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = &segment[i + 1..i + 3];
            if let Ok(value) = u8::from_str_radix(hex, 16) {
                if is_unreserved(value) {
                    out.push(value as char);
                } else {
                    out.push('%');
                    out.push_str(&hex.to_ascii_uppercase());
                }
                i += 3;
                continue;
            }
        }
        // Only ASCII reaches here: the url crate percent-encodes everything else
        out.push(bytes[i] as char);
        i += 1;
    }

    out
}

/// Drops empty pairs and sorts the rest, keeping each pair's raw encoding
fn normalize_query(query: &str) -> String {
    let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
    pairs.sort_unstable();
    pairs.join("&")
}
