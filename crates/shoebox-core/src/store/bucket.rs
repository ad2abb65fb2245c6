//! Bucket directory handle.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{S3ServiceError, S3ServiceResult};
use crate::keys;

use super::listing::{self, ListPage, ListQuery};
use super::migration::{self, CURRENT_VERSION, PUBLIC_MARKER, sidecar_name};
use super::object::StoredObject;
use super::{ObjectStore, Visibility};

/// Handle to a bucket directory that may not exist yet.
#[derive(Debug, Clone)]
pub struct Bucket<'a> {
    store: &'a ObjectStore,
    name: String,
    path: PathBuf,
}

impl<'a> Bucket<'a> {
    pub(super) fn new(store: &'a ObjectStore, name: &str) -> Self {
        Self {
            store,
            name: name.to_owned(),
            path: store.root().join(name),
        }
    }

    /// The bucket name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bucket directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory exists.
    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .is_ok_and(|m| m.is_dir())
    }

    /// Fail with [`S3ServiceError::NoSuchBucket`] unless the bucket exists,
    /// migrating it on first touch.
    ///
    /// # Errors
    ///
    /// `NoSuchBucket` or a migration I/O error.
    pub async fn require(&self) -> S3ServiceResult<()> {
        if !self.exists().await {
            return Err(S3ServiceError::NoSuchBucket {
                bucket: self.name.clone(),
            });
        }
        self.ensure_migrated().await
    }

    /// Create the directory. Creating an existing bucket is a no-op.
    ///
    /// Returns whether the directory was newly created.
    ///
    /// # Errors
    ///
    /// Any I/O error.
    pub async fn create(&self) -> S3ServiceResult<bool> {
        if self.exists().await {
            self.ensure_migrated().await?;
            return Ok(false);
        }
        tokio::fs::create_dir_all(&self.path).await?;
        migration::write_version(&self.path, CURRENT_VERSION).await?;
        self.store.migrated.insert(self.name.clone());
        info!(bucket = %self.name, "bucket created");
        Ok(true)
    }

    /// Remove the bucket and everything in it.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or an I/O error.
    pub async fn delete(&self) -> S3ServiceResult<()> {
        let result = tokio::fs::remove_dir_all(&self.path).await;
        self.store.visibility.remove(&self.name);
        self.store.migrated.remove(&self.name);
        match result {
            Ok(()) => {
                info!(bucket = %self.name, "bucket deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(S3ServiceError::NoSuchBucket {
                bucket: self.name.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Directory creation time, falling back to modification time.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] when the directory is missing.
    pub async fn creation_date(&self) -> S3ServiceResult<DateTime<Utc>> {
        let meta = tokio::fs::metadata(&self.path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                S3ServiceError::NoSuchBucket {
                    bucket: self.name.clone(),
                }
            } else {
                e.into()
            }
        })?;
        let time = meta.created().or_else(|_| meta.modified())?;
        Ok(DateTime::<Utc>::from(time))
    }

    /// Whether anonymous reads are allowed. A missing bucket is private.
    ///
    /// # Errors
    ///
    /// A migration I/O error.
    pub async fn is_public(&self) -> S3ServiceResult<bool> {
        if let Some(cached) = self.store.visibility.get(&self.name) {
            return Ok(*cached);
        }
        if !self.exists().await {
            return Ok(false);
        }
        self.ensure_migrated().await?;
        let public = tokio::fs::try_exists(self.path.join(PUBLIC_MARKER)).await?;
        self.store.visibility.insert(self.name.clone(), public);
        Ok(public)
    }

    /// Persist the visibility and update the cache before returning.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or an I/O error.
    pub async fn set_visibility(&self, visibility: Visibility) -> S3ServiceResult<()> {
        self.require().await?;
        let marker = self.path.join(PUBLIC_MARKER);
        let public = visibility == Visibility::Public;
        if public {
            tokio::fs::write(&marker, b"").await?;
        } else if let Err(e) = tokio::fs::remove_file(&marker).await {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        self.store.visibility.insert(self.name.clone(), public);
        debug!(bucket = %self.name, ?visibility, "visibility updated");
        Ok(())
    }

    /// One page of objects.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or an I/O error.
    pub async fn list_objects(&self, query: &ListQuery) -> S3ServiceResult<ListPage> {
        self.require().await?;
        listing::list(&self.path, query).await
    }

    /// Whether the bucket holds no objects.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or an I/O error.
    pub async fn is_empty(&self) -> S3ServiceResult<bool> {
        self.require().await?;
        Ok(listing::sorted_keys(&self.path).await?.is_empty())
    }

    /// Handle to an object in this bucket.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::InvalidArgument`] for an empty key or one whose
    /// encoded file names would exceed [`keys::MAX_FILE_NAME_LEN`].
    pub fn object(&self, key: &str) -> S3ServiceResult<StoredObject> {
        if key.is_empty() {
            return Err(S3ServiceError::invalid_argument("Object key must not be empty"));
        }
        if sidecar_name(&keys::encode(key)).len() > keys::MAX_FILE_NAME_LEN {
            return Err(S3ServiceError::invalid_argument(
                "Object key is too long to store once encoded",
            ));
        }
        Ok(StoredObject::new(&self.path, key))
    }

    /// Migrate the directory once per store instance.
    ///
    /// # Errors
    ///
    /// Any I/O error during migration.
    pub async fn ensure_migrated(&self) -> S3ServiceResult<()> {
        if self.store.migrated.contains(&self.name) {
            return Ok(());
        }
        migration::migrate(&self.path).await?;
        self.store.migrated.insert(self.name.clone());
        Ok(())
    }
}
