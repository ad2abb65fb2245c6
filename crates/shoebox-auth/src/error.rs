//! Authentication failures.

/// Errors raised while verifying a request signature.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header was present.
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header could not be parsed.
    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    /// The header names an algorithm other than `AWS4-HMAC-SHA256`.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A header listed in `SignedHeaders` is absent.
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// The credential scope is not `AKID/date/region/service/aws4_request`.
    #[error("Invalid credential format")]
    InvalidCredential,

    /// The access key is unknown to the credential provider.
    #[error("Access key not found: {0}")]
    AccessKeyNotFound(String),

    /// The computed signature differs from the claimed one.
    #[error("Signature does not match")]
    SignatureDoesNotMatch,

    /// A presigned request is past its expiry.
    #[error("Request has expired")]
    RequestExpired,

    /// A presigned request lacks a required query parameter.
    #[error("Missing required query parameter: {0}")]
    MissingQueryParam(String),
}

impl AuthError {
    /// Whether the request carried credentials that simply failed to match,
    /// as opposed to a malformed or expired request.
    #[must_use]
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(self, Self::SignatureDoesNotMatch | Self::AccessKeyNotFound(_))
    }
}
