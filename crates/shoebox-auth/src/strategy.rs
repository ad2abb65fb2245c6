//! Per-request choice of signing scheme.

use tracing::debug;

use crate::credentials::CredentialProvider;
use crate::error::AuthError;
use crate::presigned::{
    ParsedPresignedParams, is_presigned, parse_presigned_params, verify_presigned,
};
use crate::sigv2::{
    LegacySignature, is_sigv2, parse_sigv2_header, parse_sigv2_query, verify_sigv2,
};
use crate::sigv4::{
    AuthResult, ParsedAuth, SUPPORTED_ALGORITHM, parse_authorization_header, verify_sigv4,
};

/// The signature a request claims, chosen by the shape of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureScheme {
    /// `Authorization: AWS key:signature`.
    Legacy(LegacySignature),
    /// `Authorization: AWS4-HMAC-SHA256 ...`.
    V4(ParsedAuth),
    /// `?AWSAccessKeyId=&Expires=&Signature=`.
    PresignedLegacy(LegacySignature),
    /// `?X-Amz-Algorithm=...&X-Amz-Signature=`.
    PresignedV4(ParsedPresignedParams),
}

impl SignatureScheme {
    /// Inspect the request and return the claimed scheme, or `None` for an
    /// unsigned request.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when a signature is present but malformed.
    pub fn detect(parts: &http::request::Parts) -> Result<Option<Self>, AuthError> {
        if let Some(header) = parts.headers.get(http::header::AUTHORIZATION) {
            let header = header.to_str().map_err(|_| AuthError::InvalidAuthHeader)?;
            if is_sigv2(header) {
                return parse_sigv2_header(header).map(|c| Some(Self::Legacy(c)));
            }
            if header.starts_with(SUPPORTED_ALGORITHM) {
                return parse_authorization_header(header).map(|p| Some(Self::V4(p)));
            }
            return Err(AuthError::InvalidAuthHeader);
        }

        let query = parts.uri.query().unwrap_or("");
        if is_presigned(query) {
            return parse_presigned_params(query).map(|p| Some(Self::PresignedV4(p)));
        }
        Ok(parse_sigv2_query(query)?.map(Self::PresignedLegacy))
    }

    /// Short scheme name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Legacy(_) => "legacy",
            Self::V4(_) => "v4",
            Self::PresignedLegacy(_) => "presigned-legacy",
            Self::PresignedV4(_) => "presigned-v4",
        }
    }

    /// The access key the request claims to be signed with.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        match self {
            Self::Legacy(c) | Self::PresignedLegacy(c) => &c.access_key_id,
            Self::V4(p) => &p.access_key_id,
            Self::PresignedV4(p) => &p.access_key_id,
        }
    }

    /// Verify the claim as if the request had been sent to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SignatureDoesNotMatch`] on a mismatch, or the
    /// scheme-specific error for missing headers, unknown keys or expiry.
    pub fn verify(
        &self,
        parts: &http::request::Parts,
        path: &str,
        provider: &dyn CredentialProvider,
    ) -> Result<AuthResult, AuthError> {
        match self {
            Self::Legacy(c) | Self::PresignedLegacy(c) => verify_sigv2(parts, path, c, provider),
            Self::V4(p) => verify_sigv4(parts, path, p, provider),
            Self::PresignedV4(p) => verify_presigned(parts, path, p, provider),
        }
    }
}

/// Paths a signature may have been computed over: the request path and,
/// when it starts with `legacy_prefix`, the path with the prefix removed.
#[must_use]
pub fn candidate_paths<'a>(path: &'a str, legacy_prefix: Option<&str>) -> Vec<&'a str> {
    let mut paths = vec![path];
    if let Some(stripped) = legacy_prefix
        .filter(|p| !p.is_empty())
        .and_then(|prefix| path.strip_prefix(prefix))
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
    {
        paths.push(if stripped.is_empty() { "/" } else { stripped });
    }
    paths
}

/// Authenticate a request.
///
/// Returns `Ok(None)` for an unsigned request and `Ok(Some(_))` when the
/// claimed signature verifies against any candidate path.
///
/// # Errors
///
/// Returns [`AuthError::SignatureDoesNotMatch`] if no candidate path
/// verifies, or the first non-mismatch error encountered.
pub fn authenticate(
    parts: &http::request::Parts,
    provider: &dyn CredentialProvider,
    legacy_prefix: Option<&str>,
) -> Result<Option<AuthResult>, AuthError> {
    let Some(scheme) = SignatureScheme::detect(parts)? else {
        return Ok(None);
    };

    for path in candidate_paths(parts.uri.path(), legacy_prefix) {
        match scheme.verify(parts, path, provider) {
            Ok(result) => {
                debug!(
                    scheme = scheme.name(),
                    path,
                    access_key_id = %result.access_key_id,
                    "signature verified"
                );
                return Ok(Some(result));
            }
            Err(AuthError::SignatureDoesNotMatch) => {}
            Err(e) => return Err(e),
        }
    }
    Err(AuthError::SignatureDoesNotMatch)
}
