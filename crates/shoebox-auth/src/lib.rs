//! Request authentication for Shoebox.
//!
//! Two signing families are accepted, each either in the `Authorization`
//! header or in presigned query parameters:
//!
//! - the legacy scheme, `Base64(HMAC-SHA1(secret, string-to-sign))`
//! - Signature Version 4, the HMAC-SHA256 chain over a canonical request
//!
//! [`SignatureScheme::detect`] picks the scheme from the request shape and
//! [`authenticate`] verifies it against the direct request path and, when
//! the service is mounted under a legacy prefix, the prefix-stripped path.
//!
//! ```rust
//! use shoebox_auth::{StaticCredentialProvider, authenticate};
//!
//! let provider = StaticCredentialProvider::single("AKID", "secret");
//! let (parts, ()) = http::Request::get("http://localhost/b/k")
//!     .body(())
//!     .unwrap()
//!     .into_parts();
//!
//! // Unsigned requests authenticate to no principal.
//! assert!(authenticate(&parts, &provider, Some("/s3")).unwrap().is_none());
//! ```

pub mod canonical;
pub mod credentials;
pub mod error;
pub mod presigned;
pub mod sigv2;
pub mod sigv4;
pub mod strategy;

pub use credentials::{CredentialProvider, StaticCredentialProvider};
pub use error::AuthError;
pub use sigv4::{AuthResult, hash_payload};
pub use strategy::{SignatureScheme, authenticate};
