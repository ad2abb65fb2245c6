//! S3 error codes and the wire-level error type.
//!
//! Every failure that reaches a client is an [`S3Error`]: a code from the closed
//! [`S3ErrorCode`] set, the HTTP status that code maps to, a message and, when
//! known, the `/bucket/key` resource the request addressed.

use std::fmt;

/// S3 error codes produced by Shoebox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum S3ErrorCode {
    /// The request was not authorized.
    AccessDenied,
    /// The `Content-MD5` did not match the received bytes.
    BadDigest,
    /// Fewer bytes arrived than the request declared.
    IncompleteBody,
    /// An unexpected server-side failure.
    #[default]
    InternalError,
    /// A request argument was invalid.
    InvalidArgument,
    /// The bucket name is not acceptable.
    InvalidBucketName,
    /// The `Content-MD5` header could not be decoded.
    InvalidDigest,
    /// A part listed in a completion request was never uploaded.
    InvalidPart,
    /// The requested byte range cannot be served.
    InvalidRange,
    /// The request is not valid for the addressed resource.
    InvalidRequest,
    /// The XML request body could not be parsed.
    MalformedXML,
    /// The HTTP method is not allowed on the addressed resource.
    MethodNotAllowed,
    /// The bucket does not exist.
    NoSuchBucket,
    /// The bucket has no policy.
    NoSuchBucketPolicy,
    /// The key does not exist.
    NoSuchKey,
    /// The bucket has no lifecycle configuration.
    NoSuchLifecycleConfiguration,
    /// The multipart upload is unknown, completed or aborted.
    NoSuchUpload,
    /// The operation is recognized but not supported.
    NotImplemented,
    /// The request signature did not verify.
    SignatureDoesNotMatch,
}

impl S3ErrorCode {
    /// Returns the error code as it appears in `<Code>`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::BadDigest => "BadDigest",
            Self::IncompleteBody => "IncompleteBody",
            Self::InternalError => "InternalError",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidBucketName => "InvalidBucketName",
            Self::InvalidDigest => "InvalidDigest",
            Self::InvalidPart => "InvalidPart",
            Self::InvalidRange => "InvalidRange",
            Self::InvalidRequest => "InvalidRequest",
            Self::MalformedXML => "MalformedXML",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::NoSuchBucket => "NoSuchBucket",
            Self::NoSuchBucketPolicy => "NoSuchBucketPolicy",
            Self::NoSuchKey => "NoSuchKey",
            Self::NoSuchLifecycleConfiguration => "NoSuchLifecycleConfiguration",
            Self::NoSuchUpload => "NoSuchUpload",
            Self::NotImplemented => "NotImplemented",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
        }
    }

    /// Returns the fixed HTTP status for this error.
    #[must_use]
    #[allow(clippy::match_same_arms)]
    pub fn default_status_code(&self) -> http::StatusCode {
        match self {
            Self::AccessDenied | Self::SignatureDoesNotMatch => http::StatusCode::FORBIDDEN,
            Self::BadDigest
            | Self::IncompleteBody
            | Self::InvalidArgument
            | Self::InvalidBucketName
            | Self::InvalidDigest
            | Self::InvalidPart
            | Self::InvalidRequest
            | Self::MalformedXML => http::StatusCode::BAD_REQUEST,
            Self::InvalidRange => http::StatusCode::RANGE_NOT_SATISFIABLE,
            Self::MethodNotAllowed => http::StatusCode::METHOD_NOT_ALLOWED,
            Self::NoSuchBucket
            | Self::NoSuchBucketPolicy
            | Self::NoSuchKey
            | Self::NoSuchLifecycleConfiguration
            | Self::NoSuchUpload => http::StatusCode::NOT_FOUND,
            Self::NotImplemented => http::StatusCode::NOT_IMPLEMENTED,
            Self::InternalError => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the default human-readable message.
    #[must_use]
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::AccessDenied => "Access Denied",
            Self::BadDigest => "The Content-MD5 you specified did not match what we received.",
            Self::IncompleteBody => {
                "You did not provide the number of bytes specified by the Content-Length HTTP header."
            }
            Self::InternalError => "We encountered an internal error. Please try again.",
            Self::InvalidArgument => "Invalid Argument",
            Self::InvalidBucketName => "The specified bucket is not valid.",
            Self::InvalidDigest => "The Content-MD5 you specified is not valid.",
            Self::InvalidPart => "One or more of the specified parts could not be found.",
            Self::InvalidRange => "The requested range is not satisfiable",
            Self::InvalidRequest => "Invalid Request",
            Self::MalformedXML => {
                "The XML you provided was not well-formed or did not validate against our published schema."
            }
            Self::MethodNotAllowed => "The specified method is not allowed against this resource.",
            Self::NoSuchBucket => "The specified bucket does not exist",
            Self::NoSuchBucketPolicy => "The bucket policy does not exist",
            Self::NoSuchKey => "The specified key does not exist.",
            Self::NoSuchLifecycleConfiguration => "The lifecycle configuration does not exist",
            Self::NoSuchUpload => "The specified upload does not exist.",
            Self::NotImplemented => {
                "A header you provided implies functionality that is not implemented."
            }
            Self::SignatureDoesNotMatch => {
                "The request signature we calculated does not match the signature you provided."
            }
        }
    }
}

impl fmt::Display for S3ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An S3 error response.
#[derive(Debug)]
pub struct S3Error {
    /// The error code.
    pub code: S3ErrorCode,
    /// A human-readable error message.
    pub message: String,
    /// The resource that caused the error.
    pub resource: Option<String>,
    /// The HTTP status code.
    pub status_code: http::StatusCode,
    /// The underlying source error, if any.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for S3Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S3Error({}): {}", self.code, self.message)
    }
}

impl std::error::Error for S3Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl S3Error {
    /// Create an error carrying the code's default message.
    #[must_use]
    pub fn new(code: S3ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Create an error with a custom message.
    #[must_use]
    pub fn with_message(code: S3ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status_code: code.default_status_code(),
            message: message.into(),
            code,
            resource: None,
            source: None,
        }
    }

    /// Set the resource that caused this error.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Set the source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Whether this error rejects the caller rather than reporting a failure.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.code,
            S3ErrorCode::AccessDenied | S3ErrorCode::SignatureDoesNotMatch
        )
    }

    /// Create a NoSuchBucket error.
    #[must_use]
    pub fn no_such_bucket(bucket_name: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::NoSuchBucket).with_resource(bucket_name)
    }

    /// Create a NoSuchKey error.
    #[must_use]
    pub fn no_such_key(key: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::NoSuchKey).with_resource(key)
    }

    /// Create a NoSuchUpload error.
    #[must_use]
    pub fn no_such_upload(upload_id: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::NoSuchUpload).with_resource(upload_id)
    }

    /// Create an AccessDenied error.
    #[must_use]
    pub fn access_denied(resource: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::AccessDenied).with_resource(resource)
    }

    /// Create an InternalError error.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::InternalError, message)
    }

    /// Create an InvalidArgument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::InvalidArgument, message)
    }

    /// Create an InvalidRequest error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::InvalidRequest, message)
    }

    /// Create a MalformedXML error.
    #[must_use]
    pub fn malformed_xml(detail: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::MalformedXML, detail)
    }

    /// Create a MethodNotAllowed error.
    #[must_use]
    pub fn method_not_allowed(method: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::MethodNotAllowed).with_resource(method)
    }

    /// Create a NotImplemented error.
    #[must_use]
    pub fn not_implemented(detail: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::NotImplemented).with_resource(detail)
    }

    /// Create a SignatureDoesNotMatch error.
    #[must_use]
    pub fn signature_does_not_match(detail: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::SignatureDoesNotMatch, detail)
    }
}

/// Create an S3Error from an error code.
///
/// # Examples
///
/// ```
/// use shoebox_model::s3_error;
/// use shoebox_model::error::S3ErrorCode;
///
/// let err = s3_error!(NoSuchBucket);
/// assert_eq!(err.code, S3ErrorCode::NoSuchBucket);
///
/// let err = s3_error!(NoSuchKey, "The key does not exist");
/// assert_eq!(err.message, "The key does not exist");
/// ```
#[macro_export]
macro_rules! s3_error {
    ($code:ident) => {
        $crate::error::S3Error::new($crate::error::S3ErrorCode::$code)
    };
    ($code:ident, $msg:expr) => {
        $crate::error::S3Error::with_message($crate::error::S3ErrorCode::$code, $msg)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_closed_set_to_fixed_statuses() {
        let cases = [
            (S3ErrorCode::AccessDenied, 403),
            (S3ErrorCode::BadDigest, 400),
            (S3ErrorCode::IncompleteBody, 400),
            (S3ErrorCode::InternalError, 500),
            (S3ErrorCode::InvalidDigest, 400),
            (S3ErrorCode::InvalidRequest, 400),
            (S3ErrorCode::NoSuchBucket, 404),
            (S3ErrorCode::NoSuchBucketPolicy, 404),
            (S3ErrorCode::NoSuchKey, 404),
            (S3ErrorCode::NoSuchLifecycleConfiguration, 404),
            (S3ErrorCode::NoSuchUpload, 404),
            (S3ErrorCode::SignatureDoesNotMatch, 403),
        ];
        for (code, status) in cases {
            assert_eq!(code.default_status_code().as_u16(), status, "{code}");
        }
    }

    #[test]
    fn test_should_build_error_with_resource() {
        let err = S3Error::no_such_key("/b/k");
        assert_eq!(err.code, S3ErrorCode::NoSuchKey);
        assert_eq!(err.status_code, http::StatusCode::NOT_FOUND);
        assert_eq!(err.resource.as_deref(), Some("/b/k"));
        assert_eq!(err.message, "The specified key does not exist.");
    }

    #[test]
    fn test_should_classify_rejections() {
        assert!(s3_error!(AccessDenied).is_rejection());
        assert!(s3_error!(SignatureDoesNotMatch).is_rejection());
        assert!(!s3_error!(NoSuchKey).is_rejection());
    }

    #[test]
    fn test_should_display_code_and_message() {
        let err = s3_error!(BadDigest, "digest mismatch");
        assert_eq!(err.to_string(), "S3Error(BadDigest): digest mismatch");
    }
}
