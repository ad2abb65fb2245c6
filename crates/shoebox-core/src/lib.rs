//! Filesystem-backed S3 engine for Shoebox.
//!
//! # Architecture
//!
//! ```text
//! shoebox-http (routing, auth, XML)
//!        |
//!        v
//! ShoeboxS3 (handle_* operations)
//!        |
//!        +--> ObjectStore (bucket directories, sidecars, migration)
//!        +--> MultipartManager (staging directories, assembly)
//!        +--> CallLog (recent requests)
//! ```

pub mod calllog;
pub mod checksums;
pub mod config;
pub mod error;
pub mod keys;
pub mod multipart;
pub mod ops;
pub mod properties;
pub mod provider;
pub mod store;
pub mod utils;

pub use config::S3Config;
pub use error::{S3ServiceError, S3ServiceResult};
pub use provider::ShoeboxS3;
