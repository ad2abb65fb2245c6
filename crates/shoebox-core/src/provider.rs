//! The Shoebox S3 provider.
//!
//! [`ShoeboxS3`] owns the object store, the multipart manager and the call
//! log. Individual S3 operations are implemented in the [`crate::ops`]
//! submodules as `handle_*` methods; the server binary bridges them to the
//! HTTP layer.

use std::sync::Arc;

use shoebox_model::types::Owner;
use tracing::info;

use crate::calllog::CallLog;
use crate::config::S3Config;
use crate::error::{S3ServiceError, S3ServiceResult};
use crate::multipart::MultipartManager;
use crate::store::{Bucket, ObjectStore, Visibility};

/// The main S3 provider.
///
/// All fields are `Arc`-wrapped for cheap cloning across connection tasks.
#[derive(Debug, Clone)]
pub struct ShoeboxS3 {
    /// Bucket directories and objects.
    pub(crate) store: Arc<ObjectStore>,
    /// In-flight multipart uploads.
    pub(crate) multipart: Arc<MultipartManager>,
    /// Recent requests.
    pub(crate) call_log: Arc<CallLog>,
    /// Provider configuration.
    pub(crate) config: Arc<S3Config>,
}

impl ShoeboxS3 {
    /// Open the data and multipart roots described by `config`.
    ///
    /// # Errors
    ///
    /// Any I/O error creating the directories or purging stale staging.
    pub async fn open(config: S3Config) -> S3ServiceResult<Self> {
        let store = ObjectStore::open(&config.data_dir).await?;
        let multipart = MultipartManager::open(&config.multipart_dir).await?;
        info!(
            data_dir = %config.data_dir.display(),
            multipart_dir = %config.multipart_dir.display(),
            "object store opened"
        );
        Ok(Self {
            store: Arc::new(store),
            multipart: Arc::new(multipart),
            call_log: Arc::new(CallLog::new(config.call_log_capacity)),
            config: Arc::new(config),
        })
    }

    /// The object store.
    #[must_use]
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// The multipart manager.
    #[must_use]
    pub fn multipart(&self) -> &MultipartManager {
        &self.multipart
    }

    /// The call log.
    #[must_use]
    pub fn call_log(&self) -> &CallLog {
        &self.call_log
    }

    /// The provider configuration.
    #[must_use]
    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// The owner reported for every bucket and object.
    #[must_use]
    pub fn owner(&self) -> Owner {
        Owner {
            id: self.config.owner_id.clone(),
            display_name: self.config.owner_name.clone(),
        }
    }

    /// Whether anonymous callers may access `bucket`.
    ///
    /// Missing buckets and invalid names are private.
    ///
    /// # Errors
    ///
    /// A migration I/O error.
    pub async fn is_bucket_public(&self, bucket: &str) -> S3ServiceResult<bool> {
        match self.store.bucket(bucket) {
            Ok(b) => b.is_public().await,
            Err(_) => Ok(false),
        }
    }

    /// Make a bucket public or private.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or an I/O error.
    pub async fn set_bucket_visibility(
        &self,
        bucket: &str,
        visibility: Visibility,
    ) -> S3ServiceResult<()> {
        self.store.bucket(bucket)?.set_visibility(visibility).await
    }

    /// An existing, migrated bucket.
    pub(crate) async fn existing_bucket(&self, name: &str) -> S3ServiceResult<Bucket<'_>> {
        let bucket = self.store.bucket(name)?;
        bucket.require().await?;
        Ok(bucket)
    }

    /// A bucket that may receive objects, auto-created when configured.
    pub(crate) async fn writable_bucket(&self, name: &str) -> S3ServiceResult<Bucket<'_>> {
        let bucket = self.store.bucket(name)?;
        if !bucket.exists().await {
            if !self.config.auto_create_buckets {
                return Err(S3ServiceError::NoSuchBucket {
                    bucket: name.to_owned(),
                });
            }
            if bucket.create().await? {
                info!(bucket = %name, "bucket auto-created on first write");
            }
        }
        bucket.ensure_migrated().await?;
        Ok(bucket)
    }
}
