//! Canonical request construction for Signature Version 4.
//!
//! ```text
//! METHOD\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Everything except the RFC 3986 unreserved characters is encoded.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Assemble the canonical request.
///
/// ```
/// use shoebox_auth::canonical::build_canonical_request;
///
/// let canonical = build_canonical_request(
///     "PUT",
///     "/bucket/a b.txt",
///     "",
///     &[("host", "localhost:9444")],
///     &["host"],
///     "UNSIGNED-PAYLOAD",
/// );
/// assert!(canonical.starts_with("PUT\n/bucket/a%20b.txt\n\nhost:localhost:9444\n"));
/// ```
#[must_use]
pub fn build_canonical_request(
    method: &str,
    uri: &str,
    query_string: &str,
    headers: &[(&str, &str)],
    signed_headers: &[&str],
    payload_hash: &str,
) -> String {
    let canonical_uri = build_canonical_uri(uri);
    let canonical_query = build_canonical_query_string(query_string);
    let canonical_headers = build_canonical_headers(headers, signed_headers);
    let signed = build_signed_headers_string(signed_headers);

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n\n{signed}\n{payload_hash}"
    )
}

/// Encode each path segment, keeping the `/` separators.
///
/// Segments are decoded before encoding so an already-encoded path and its
/// raw form produce the same canonical URI.
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/')
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            utf8_percent_encode(&decoded, URI_ENCODE_SET).to_string()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Sort query parameters by name, then value.
///
/// Values are kept exactly as they appear on the wire: clients disagree on
/// which reserved characters to encode and the signature covers their choice.
#[must_use]
pub fn build_canonical_query_string(query: &str) -> String {
    let mut params: Vec<(&str, &str)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|param| param.split_once('=').unwrap_or((param, "")))
        .collect();
    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Render `name:value` lines for the signed headers, sorted by name.
///
/// Repeated headers are comma-joined and runs of whitespace collapse to one
/// space. No trailing newline.
#[must_use]
pub fn build_canonical_headers(headers: &[(&str, &str)], signed_headers: &[&str]) -> String {
    let mut header_map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = collapse_whitespace(value.trim());
        header_map
            .entry(name.to_lowercase())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    let mut sorted: Vec<&str> = signed_headers.to_vec();
    sorted.sort_unstable();

    sorted
        .iter()
        .filter_map(|name| header_map.get(*name).map(|value| format!("{name}:{value}")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sorted, `;`-joined header names.
#[must_use]
pub fn build_signed_headers_string(signed_headers: &[&str]) -> String {
    let mut sorted: Vec<&str> = signed_headers.to_vec();
    sorted.sort_unstable();
    sorted.join(";")
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
            }
            prev_was_space = true;
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_normalize_root_path() {
        assert_eq!(build_canonical_uri(""), "/");
        assert_eq!(build_canonical_uri("/"), "/");
    }

    #[test]
    fn test_should_encode_reserved_characters_per_segment() {
        assert_eq!(
            build_canonical_uri("/bucket/photos/a b+c.jpg"),
            "/bucket/photos/a%20b%2Bc.jpg"
        );
    }

    #[test]
    fn test_should_not_double_encode() {
        assert_eq!(
            build_canonical_uri("/bucket/a%20b"),
            build_canonical_uri("/bucket/a b")
        );
    }

    #[test]
    fn test_should_sort_query_and_fill_empty_values() {
        assert_eq!(
            build_canonical_query_string("uploads&prefix=a&delimiter=%2F"),
            "delimiter=%2F&prefix=a&uploads="
        );
        assert_eq!(build_canonical_query_string(""), "");
    }

    #[test]
    fn test_should_merge_and_trim_header_values() {
        let headers = [
            ("X-Amz-Meta-Tag", "  a   b "),
            ("x-amz-meta-tag", "c"),
            ("Host", "localhost"),
            ("User-Agent", "ignored"),
        ];
        let result = build_canonical_headers(&headers, &["x-amz-meta-tag", "host"]);
        assert_eq!(result, "host:localhost\nx-amz-meta-tag:a b,c");
    }

    #[test]
    fn test_should_sort_signed_header_names() {
        assert_eq!(
            build_signed_headers_string(&["x-amz-date", "host", "content-md5"]),
            "content-md5;host;x-amz-date"
        );
    }
}
