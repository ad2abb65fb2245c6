//! Store-level error types.
//!
//! [`S3ServiceError`] covers every failure the object store, the multipart
//! manager and the provider operations can produce. Each variant maps onto a
//! wire [`S3Error`] code through the [`From`] implementation.
//!
//! # Usage
//!
//! ```
//! use shoebox_core::error::S3ServiceError;
//! use shoebox_model::{S3Error, S3ErrorCode};
//!
//! let err = S3ServiceError::NoSuchBucket {
//!     bucket: "my-bucket".to_owned(),
//! };
//! let s3_err: S3Error = err.into();
//! assert_eq!(s3_err.code, S3ErrorCode::NoSuchBucket);
//! ```

use shoebox_model::{S3Error, S3ErrorCode};

/// Shoebox service error type.
#[derive(Debug, thiserror::Error)]
pub enum S3ServiceError {
    // -----------------------------------------------------------------------
    // Bucket errors
    // -----------------------------------------------------------------------
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The bucket name is not usable as a directory name.
    #[error("The specified bucket is not valid: {name} ({reason})")]
    InvalidBucketName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// No lifecycle rules are ever stored.
    #[error("The lifecycle configuration does not exist")]
    NoSuchLifecycleConfiguration,

    /// No bucket policies are ever stored.
    #[error("The bucket policy does not exist")]
    NoSuchBucketPolicy,

    // -----------------------------------------------------------------------
    // Object / key errors
    // -----------------------------------------------------------------------
    /// The specified key does not exist.
    #[error("The specified key does not exist: {key}")]
    NoSuchKey {
        /// The key that was not found.
        key: String,
    },

    /// The requested range cannot be served.
    #[error("The requested range is not satisfiable")]
    InvalidRange,

    // -----------------------------------------------------------------------
    // Integrity errors
    // -----------------------------------------------------------------------
    /// `Content-MD5` is not base64 of a 16 byte digest.
    #[error("The Content-MD5 you specified is not valid")]
    InvalidDigest,

    /// The computed MD5 differs from `Content-MD5`.
    #[error("The Content-MD5 you specified did not match what we received")]
    BadDigest,

    /// The body ended before the declared length.
    #[error("Received {received} of {expected} declared bytes")]
    IncompleteBody {
        /// Declared length.
        expected: u64,
        /// Bytes actually read.
        received: u64,
    },

    // -----------------------------------------------------------------------
    // Multipart errors
    // -----------------------------------------------------------------------
    /// The upload id is unknown, completed or aborted.
    #[error("The specified upload does not exist: {upload_id}")]
    NoSuchUpload {
        /// The upload id that was not found.
        upload_id: String,
    },

    /// A listed part was never uploaded.
    #[error("One or more of the specified parts could not be found: part {part_number}")]
    InvalidPart {
        /// The first missing part.
        part_number: u32,
    },

    // -----------------------------------------------------------------------
    // Request errors
    // -----------------------------------------------------------------------
    /// A request parameter is out of range or malformed.
    #[error("{message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// A request document could not be parsed.
    #[error("The XML you provided was not well-formed: {message}")]
    MalformedXml {
        /// Parser detail.
        message: String,
    },

    /// The caller may not perform the operation.
    #[error("Access Denied")]
    AccessDenied,

    /// The feature exists in S3 but not here.
    #[error("{message}")]
    NotImplemented {
        /// Description of the missing feature.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Internal errors
    // -----------------------------------------------------------------------
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl S3ServiceError {
    /// Shorthand for [`S3ServiceError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// The wire error code for this error.
    #[must_use]
    pub fn code(&self) -> S3ErrorCode {
        match self {
            Self::NoSuchBucket { .. } => S3ErrorCode::NoSuchBucket,
            Self::InvalidBucketName { .. } => S3ErrorCode::InvalidBucketName,
            Self::NoSuchLifecycleConfiguration => S3ErrorCode::NoSuchLifecycleConfiguration,
            Self::NoSuchBucketPolicy => S3ErrorCode::NoSuchBucketPolicy,
            Self::NoSuchKey { .. } => S3ErrorCode::NoSuchKey,
            Self::InvalidRange => S3ErrorCode::InvalidRange,
            Self::InvalidDigest => S3ErrorCode::InvalidDigest,
            Self::BadDigest => S3ErrorCode::BadDigest,
            Self::IncompleteBody { .. } => S3ErrorCode::IncompleteBody,
            Self::NoSuchUpload { .. } => S3ErrorCode::NoSuchUpload,
            Self::InvalidPart { .. } => S3ErrorCode::InvalidPart,
            Self::InvalidArgument { .. } => S3ErrorCode::InvalidArgument,
            Self::MalformedXml { .. } => S3ErrorCode::MalformedXML,
            Self::AccessDenied => S3ErrorCode::AccessDenied,
            Self::NotImplemented { .. } => S3ErrorCode::NotImplemented,
            Self::Io(_) | Self::Internal(_) => S3ErrorCode::InternalError,
        }
    }

    /// Convert into the wire error.
    #[must_use]
    pub fn into_s3_error(self) -> S3Error {
        self.into()
    }
}

impl From<S3ServiceError> for S3Error {
    fn from(err: S3ServiceError) -> Self {
        let code = err.code();
        match err {
            // Filesystem paths stay out of client responses.
            S3ServiceError::Io(e) => {
                tracing::error!(error = %e, "filesystem operation failed");
                S3Error::new(code).with_source(e)
            }
            S3ServiceError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                S3Error::new(code)
            }
            other => S3Error::with_message(code, other.to_string()),
        }
    }
}

/// Convenience result type for store operations.
pub type S3ServiceResult<T> = Result<T, S3ServiceError>;

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    #[test]
    fn test_should_convert_no_such_bucket_to_s3_error() {
        let err: S3Error = S3ServiceError::NoSuchBucket {
            bucket: "b".to_owned(),
        }
        .into();
        assert_eq!(err.code, S3ErrorCode::NoSuchBucket);
        assert_eq!(err.status_code, StatusCode::NOT_FOUND);
        assert!(err.message.contains('b'));
    }

    #[test]
    fn test_should_convert_integrity_errors() {
        let err = S3ServiceError::BadDigest.into_s3_error();
        assert_eq!(err.code, S3ErrorCode::BadDigest);
        assert_eq!(err.status_code, StatusCode::BAD_REQUEST);

        let err = S3ServiceError::IncompleteBody {
            expected: 10,
            received: 4,
        }
        .into_s3_error();
        assert_eq!(err.code, S3ErrorCode::IncompleteBody);
        assert_eq!(err.message, "Received 4 of 10 declared bytes");
    }

    #[test]
    fn test_should_convert_stub_sub_resource_errors() {
        assert_eq!(
            S3ServiceError::NoSuchLifecycleConfiguration
                .into_s3_error()
                .status_code,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            S3ServiceError::NoSuchBucketPolicy.into_s3_error().code,
            S3ErrorCode::NoSuchBucketPolicy
        );
    }

    #[test]
    fn test_should_hide_io_details() {
        let io = std::io::Error::other("/secret/path");
        let err = S3ServiceError::from(io).into_s3_error();
        assert_eq!(err.code, S3ErrorCode::InternalError);
        assert!(!err.message.contains("/secret/path"));
    }

    #[test]
    fn test_should_map_range_to_416() {
        let err = S3ServiceError::InvalidRange.into_s3_error();
        assert_eq!(err.status_code, StatusCode::RANGE_NOT_SATISFIABLE);
    }
}
