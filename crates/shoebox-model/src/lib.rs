//! Shared S3 vocabulary for Shoebox.
//!
//! - [`error`]: the closed set of S3 error codes and the wire-level [`S3Error`]
//! - [`operations`]: every operation the dispatcher can route to
//! - [`types`]: request and response documents exchanged as XML

pub mod error;
pub mod operations;
pub mod types;

pub use error::{S3Error, S3ErrorCode};
pub use operations::S3Operation;
