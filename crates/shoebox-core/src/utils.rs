//! Request parameter parsing shared by the operation handlers.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;

use crate::error::{S3ServiceError, S3ServiceResult};

// ---------------------------------------------------------------------------
// Range parsing
// ---------------------------------------------------------------------------

/// Parse a single `Range: bytes=` value into an inclusive `(start, end)` pair.
///
/// Supports `bytes=N-M`, `bytes=N-` and `bytes=-N`. The end is clamped to the
/// last byte of the object.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidRange`] for multi-range, malformed or
/// unsatisfiable values.
pub fn parse_range_header(range: &str, content_length: u64) -> S3ServiceResult<(u64, u64)> {
    let range = range
        .trim()
        .strip_prefix("bytes=")
        .ok_or(S3ServiceError::InvalidRange)?;

    if content_length == 0 || range.contains(',') {
        return Err(S3ServiceError::InvalidRange);
    }

    let (first, last) = range.split_once('-').ok_or(S3ServiceError::InvalidRange)?;
    let parse = |s: &str| s.trim().parse::<u64>().map_err(|_| S3ServiceError::InvalidRange);

    match (first.is_empty(), last.is_empty()) {
        (true, false) => {
            let n = parse(last)?;
            if n == 0 {
                return Err(S3ServiceError::InvalidRange);
            }
            Ok((content_length.saturating_sub(n), content_length - 1))
        }
        (false, true) => {
            let start = parse(first)?;
            if start >= content_length {
                return Err(S3ServiceError::InvalidRange);
            }
            Ok((start, content_length - 1))
        }
        (false, false) => {
            let start = parse(first)?;
            let end = parse(last)?;
            if start > end || start >= content_length {
                return Err(S3ServiceError::InvalidRange);
            }
            Ok((start, end.min(content_length - 1)))
        }
        (true, true) => Err(S3ServiceError::InvalidRange),
    }
}

// ---------------------------------------------------------------------------
// Continuation tokens
// ---------------------------------------------------------------------------

/// Encode a key as an opaque V2 continuation token.
#[must_use]
pub fn encode_continuation_token(key: &str) -> String {
    BASE64_STANDARD.encode(key.as_bytes())
}

/// Decode a V2 continuation token back to a key.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidArgument`] if the token is not base64
/// of UTF-8 text.
pub fn decode_continuation_token(token: &str) -> S3ServiceResult<String> {
    let bytes = BASE64_STANDARD
        .decode(token)
        .map_err(|_| S3ServiceError::invalid_argument("Invalid continuation token"))?;
    String::from_utf8(bytes)
        .map_err(|_| S3ServiceError::invalid_argument("Continuation token contains invalid UTF-8"))
}

// ---------------------------------------------------------------------------
// Copy source parsing
// ---------------------------------------------------------------------------

/// Parse `x-amz-copy-source` into bucket and key.
///
/// The value is URL-decoded, a leading `/` removed and the rest split on the
/// first `/`. A `?versionId=` suffix is ignored.
///
/// ```
/// use shoebox_core::utils::parse_copy_source;
///
/// let (bucket, key) = parse_copy_source("/src/dir%2Fa%20b.txt").unwrap();
/// assert_eq!(bucket, "src");
/// assert_eq!(key, "dir/a b.txt");
/// ```
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidArgument`] when the bucket or key is
/// missing or the value is not UTF-8 once decoded.
pub fn parse_copy_source(source: &str) -> S3ServiceResult<(String, String)> {
    let source = source.split_once("?versionId=").map_or(source, |(p, _)| p);
    let decoded = percent_encoding::percent_decode_str(source)
        .decode_utf8()
        .map_err(|_| S3ServiceError::invalid_argument("Invalid copy source: not UTF-8"))?;
    let path = decoded.strip_prefix('/').unwrap_or(&decoded);

    match path.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_owned(), key.to_owned()))
        }
        _ => Err(S3ServiceError::invalid_argument(
            "Invalid copy source: must be in the format bucket/key",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_closed_range() {
        assert_eq!(parse_range_header("bytes=0-4", 10).ok(), Some((0, 4)));
        assert_eq!(parse_range_header("bytes=5-100", 10).ok(), Some((5, 9)));
    }

    #[test]
    fn test_should_parse_open_and_suffix_ranges() {
        assert_eq!(parse_range_header("bytes=3-", 10).ok(), Some((3, 9)));
        assert_eq!(parse_range_header("bytes=-3", 10).ok(), Some((7, 9)));
        assert_eq!(parse_range_header("bytes=-30", 10).ok(), Some((0, 9)));
    }

    #[test]
    fn test_should_reject_unsatisfiable_ranges() {
        for value in ["bytes=10-", "bytes=5-2", "bytes=-0", "items=0-1", "bytes=0-1,3-4", "bytes=-"] {
            assert!(
                matches!(parse_range_header(value, 10), Err(S3ServiceError::InvalidRange)),
                "{value}"
            );
        }
        assert!(parse_range_header("bytes=0-0", 0).is_err());
    }

    #[test]
    fn test_should_round_trip_continuation_token() {
        let token = encode_continuation_token("photos/ü.jpg");
        assert_eq!(
            decode_continuation_token(&token).expect("valid token"),
            "photos/ü.jpg"
        );
        assert!(decode_continuation_token("!!!").is_err());
    }

    #[test]
    fn test_should_parse_copy_source_variants() {
        assert_eq!(
            parse_copy_source("bucket/key").ok(),
            Some(("bucket".to_owned(), "key".to_owned()))
        );
        assert_eq!(
            parse_copy_source("/bucket/a/b/c?versionId=3").ok(),
            Some(("bucket".to_owned(), "a/b/c".to_owned()))
        );
        assert_eq!(
            parse_copy_source("%2Fbucket%2Fkey").ok(),
            Some(("bucket".to_owned(), "key".to_owned()))
        );
    }

    #[test]
    fn test_should_reject_incomplete_copy_source() {
        assert!(parse_copy_source("bucket").is_err());
        assert!(parse_copy_source("/bucket/").is_err());
        assert!(parse_copy_source("//key").is_err());
    }
}
