//! Legacy signature verification (HMAC-SHA1).
//!
//! ```text
//! StringToSign = METHOD + "\n" +
//!                Content-MD5 + "\n" +
//!                Content-Type + "\n" +
//!                DATE + "\n" +
//!                CanonicalizedAmzHeaders +
//!                CanonicalizedResource
//! Signature    = Base64(HMAC-SHA1(secret, StringToSign))
//! ```
//!
//! `DATE` is `x-amz-date` when sent, else `Date`, else the `Expires` query
//! parameter of a query-signed URL. The amz header block covers every
//! `x-amz-*` header except `x-amz-date`.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use hmac::{Hmac, KeyInit, Mac};
use percent_encoding::percent_decode_str;
use sha1::Sha1;
use tracing::debug;

use crate::credentials::CredentialProvider;
use crate::error::AuthError;
use crate::sigv4::{AuthResult, signatures_match};

type HmacSha1 = Hmac<Sha1>;

/// Query parameters that are part of the signed resource.
const SUB_RESOURCES: &[&str] = &[
    "acl",
    "cors",
    "delete",
    "lifecycle",
    "location",
    "logging",
    "notification",
    "partNumber",
    "policy",
    "requestPayment",
    "response-cache-control",
    "response-content-disposition",
    "response-content-encoding",
    "response-content-language",
    "response-content-type",
    "response-expires",
    "tagging",
    "uploadId",
    "uploads",
    "versionId",
    "versioning",
    "versions",
    "website",
];

/// A legacy signature claim, from the header or the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacySignature {
    /// The claimed access key.
    pub access_key_id: String,
    /// The claimed Base64 signature.
    pub signature: String,
    /// Epoch seconds from the `Expires` query parameter, for query-signed URLs.
    pub expires: Option<String>,
}

/// Whether an `Authorization` value has the legacy `AWS key:sig` shape.
#[must_use]
pub fn is_sigv2(auth_header: &str) -> bool {
    auth_header.starts_with("AWS ") && !auth_header.starts_with("AWS4-")
}

/// Parse `AWS <access key>:<signature>`.
///
/// # Errors
///
/// Returns [`AuthError::InvalidAuthHeader`] if either half is missing.
pub fn parse_sigv2_header(header: &str) -> Result<LegacySignature, AuthError> {
    let rest = header
        .strip_prefix("AWS ")
        .ok_or(AuthError::InvalidAuthHeader)?;
    let (access_key_id, signature) = rest.split_once(':').ok_or(AuthError::InvalidAuthHeader)?;
    if access_key_id.is_empty() || signature.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(LegacySignature {
        access_key_id: access_key_id.to_owned(),
        signature: signature.to_owned(),
        expires: None,
    })
}

/// Parse the `AWSAccessKeyId`, `Signature` and `Expires` query parameters.
///
/// Returns `Ok(None)` when no `Signature` parameter is present.
///
/// # Errors
///
/// Returns [`AuthError::MissingQueryParam`] if `Signature` is present but a
/// companion parameter is not.
pub fn parse_sigv2_query(query: &str) -> Result<Option<LegacySignature>, AuthError> {
    let mut access_key_id = None;
    let mut signature = None;
    let mut expires = None;
    for (key, value) in query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|p| p.split_once('=').unwrap_or((p, "")))
    {
        let value = || percent_decode_str(value).decode_utf8_lossy().into_owned();
        match key {
            "AWSAccessKeyId" => access_key_id = Some(value()),
            "Signature" => signature = Some(value()),
            "Expires" => expires = Some(value()),
            _ => {}
        }
    }

    let Some(signature) = signature else {
        return Ok(None);
    };
    Ok(Some(LegacySignature {
        access_key_id: access_key_id
            .ok_or_else(|| AuthError::MissingQueryParam("AWSAccessKeyId".to_owned()))?,
        signature,
        expires: Some(expires.ok_or_else(|| AuthError::MissingQueryParam("Expires".to_owned()))?),
    }))
}

/// Verify a legacy signature as if the request had been sent to `path`.
///
/// # Errors
///
/// Returns [`AuthError::RequestExpired`] for a lapsed query signature,
/// [`AuthError::AccessKeyNotFound`] or [`AuthError::SignatureDoesNotMatch`].
pub fn verify_sigv2(
    parts: &http::request::Parts,
    path: &str,
    claim: &LegacySignature,
    credential_provider: &dyn CredentialProvider,
) -> Result<AuthResult, AuthError> {
    if let Some(expires) = &claim.expires {
        check_expiration(expires)?;
    }
    let secret_key = credential_provider.get_secret_key(&claim.access_key_id)?;
    let string_to_sign = build_string_to_sign(parts, path, claim.expires.as_deref());
    let expected = compute_sigv2_signature(&secret_key, &string_to_sign);

    if signatures_match(&claim.signature, &expected) {
        Ok(AuthResult {
            access_key_id: claim.access_key_id.clone(),
            region: String::new(),
            signed_headers: Vec::new(),
        })
    } else {
        debug!(path, string_to_sign = ?string_to_sign, "legacy signature mismatch");
        Err(AuthError::SignatureDoesNotMatch)
    }
}

/// Build the legacy string to sign for `path`.
#[must_use]
pub fn build_string_to_sign(
    parts: &http::request::Parts,
    path: &str,
    expires: Option<&str>,
) -> String {
    let method = parts.method.as_str();
    let content_md5 = header_value(parts, "content-md5");
    let content_type = header_value(parts, "content-type");
    let date = match (header_value(parts, "x-amz-date"), expires) {
        (amz, _) if !amz.is_empty() => amz,
        (_, Some(expires)) => expires,
        _ => header_value(parts, "date"),
    };
    let amz_headers = build_canonicalized_amz_headers(parts);
    let resource = build_canonicalized_resource(path, parts.uri.query().unwrap_or(""));

    format!("{method}\n{content_md5}\n{content_type}\n{date}\n{amz_headers}{resource}")
}

/// `Base64(HMAC-SHA1(secret, string_to_sign))`.
#[must_use]
pub fn compute_sigv2_signature(secret_key: &str, string_to_sign: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret_key.as_bytes()).expect("HMAC can accept any key length");
    mac.update(string_to_sign.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

fn build_canonicalized_amz_headers(parts: &http::request::Parts) -> String {
    let mut amz_headers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, value) in &parts.headers {
        let name = name.as_str();
        if name.starts_with("x-amz-") && name != "x-amz-date" {
            amz_headers
                .entry(name)
                .or_default()
                .push(value.to_str().unwrap_or("").trim());
        }
    }

    amz_headers
        .iter()
        .map(|(name, values)| format!("{name}:{}\n", values.join(",")))
        .collect()
}

fn build_canonicalized_resource(path: &str, query: &str) -> String {
    let mut sub_params: Vec<(&str, Option<String>)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|param| match param.split_once('=') {
            Some((k, v)) => {
                let decoded = percent_decode_str(v).decode_utf8_lossy().into_owned();
                (k, (!decoded.is_empty()).then_some(decoded))
            }
            None => (param, None),
        })
        .filter(|(k, _)| SUB_RESOURCES.contains(k))
        .collect();
    if sub_params.is_empty() {
        return path.to_owned();
    }
    sub_params.sort_by(|a, b| a.0.cmp(b.0));

    let joined = sub_params
        .iter()
        .map(|(k, v)| match v {
            Some(v) => format!("{k}={v}"),
            None => (*k).to_owned(),
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{joined}")
}

fn check_expiration(expires: &str) -> Result<(), AuthError> {
    let expires: i64 = expires
        .parse()
        .map_err(|_| AuthError::MissingQueryParam("Expires (invalid integer)".to_owned()))?;
    if Utc::now().timestamp() > expires {
        return Err(AuthError::RequestExpired);
    }
    Ok(())
}

fn header_value<'a>(parts: &'a http::request::Parts, name: &str) -> &'a str {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}
