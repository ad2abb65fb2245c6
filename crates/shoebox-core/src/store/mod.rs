//! Filesystem-backed object store.
//!
//! Layout under the data root:
//!
//! ```text
//! <root>/
//!   <bucket>/
//!     $version                     format marker (decimal)
//!     $public                      present iff the bucket is public
//!     <encode(key)>                object data
//!     $<encode(key)>.properties    object properties sidecar
//! ```
//!
//! Visibility is cached per store instance and updated synchronously by
//! [`Bucket::set_visibility`]. Legacy bucket directories are migrated the
//! first time this instance touches them.

mod bucket;
mod listing;
pub mod migration;
mod object;

use std::path::{Path, PathBuf};

use dashmap::{DashMap, DashSet};

pub use bucket::Bucket;
pub use listing::{ListEntry, ListPage, ListQuery, ObjectEntry};
pub use object::{StoredObject, WriteResult};
pub(crate) use object::{CHUNK_SIZE, StreamWriteError, write_stream};

use crate::error::{S3ServiceError, S3ServiceResult};

/// Bucket visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Only signed requests may read.
    Private,
    /// Anyone may read.
    Public,
}

/// Root of all bucket directories.
#[derive(Debug)]
pub struct ObjectStore {
    root: PathBuf,
    pub(crate) visibility: DashMap<String, bool>,
    pub(crate) migrated: DashSet<String>,
}

impl ObjectStore {
    /// Open the store, creating the root directory if needed.
    ///
    /// # Errors
    ///
    /// Any I/O error creating the directory.
    pub async fn open(root: impl Into<PathBuf>) -> S3ServiceResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            visibility: DashMap::new(),
            migrated: DashSet::new(),
        })
    }

    /// The data root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every bucket directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Any I/O error reading the root.
    pub async fn list_buckets(&self) -> S3ServiceResult<Vec<Bucket<'_>>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_bucket_name(name).is_ok() {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort_unstable();
        Ok(names.iter().map(|n| Bucket::new(self, n)).collect())
    }

    /// Handle to a bucket, which may not exist.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::InvalidBucketName`] when the name cannot be a
    /// directory name under the root.
    pub fn bucket(&self, name: &str) -> S3ServiceResult<Bucket<'_>> {
        validate_bucket_name(name)?;
        Ok(Bucket::new(self, name))
    }
}

/// Reject names that are empty, could escape the data root, or collide with
/// reserved paths such as `/_health`.
///
/// # Errors
///
/// [`S3ServiceError::InvalidBucketName`].
pub fn validate_bucket_name(name: &str) -> S3ServiceResult<()> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        "must start with a letter or digit"
    } else if name.contains("..") {
        "must not contain '..'"
    } else if name.contains('/') || name.contains('\\') {
        "must not contain path separators"
    } else {
        return Ok(());
    };
    Err(S3ServiceError::InvalidBucketName {
        name: name.to_owned(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_create_root_on_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("nested/root");
        let store = ObjectStore::open(&root).await.expect("open");
        assert!(root.is_dir());
        assert!(store.list_buckets().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_should_list_bucket_directories_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ObjectStore::open(dir.path()).await.expect("open");
        for name in ["zeta", "alpha", "mid"] {
            store.bucket(name).expect("valid").create().await.expect("create");
        }
        tokio::fs::write(dir.path().join("stray-file"), b"").await.expect("write");

        let names: Vec<String> = store
            .list_buckets()
            .await
            .expect("list")
            .iter()
            .map(|b| b.name().to_owned())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_should_reject_invalid_bucket_names() {
        for name in ["", ".", "..", "a..b", "a/b", "a\\b", "_health", "-b"] {
            assert!(
                matches!(
                    validate_bucket_name(name),
                    Err(S3ServiceError::InvalidBucketName { .. })
                ),
                "{name:?}"
            );
        }
        assert!(validate_bucket_name("my.bucket-1").is_ok());
    }
}
