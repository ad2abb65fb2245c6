//! MD5 helpers for ETags and `Content-MD5`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};

use crate::error::{S3ServiceError, S3ServiceResult};

/// Hex MD5 of `data`.
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Quoted hex MD5, as sent in the `ETag` header.
#[must_use]
pub fn compute_etag(data: &[u8]) -> String {
    quote_etag(&compute_md5(data))
}

/// Wrap a hex digest in double quotes.
#[must_use]
pub fn quote_etag(hex: &str) -> String {
    format!("\"{hex}\"")
}

/// Remove surrounding double quotes from an ETag.
#[must_use]
pub fn strip_etag_quotes(etag: &str) -> &str {
    etag.trim_matches('"')
}

/// Decode a `Content-MD5` header into lowercase hex.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidDigest`] unless the value is base64 of
/// exactly 16 bytes.
pub fn decode_content_md5(value: &str) -> S3ServiceResult<String> {
    let bytes = STANDARD
        .decode(value.trim())
        .map_err(|_| S3ServiceError::InvalidDigest)?;
    if bytes.len() != 16 {
        return Err(S3ServiceError::InvalidDigest);
    }
    Ok(hex::encode(bytes))
}
