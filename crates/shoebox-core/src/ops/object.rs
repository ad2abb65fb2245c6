//! Object operation handlers.
//!
//! Implements put, get, head, delete, copy, bulk delete and object ACLs.

use std::io;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use shoebox_model::types::{
    AccessControlPolicy, CopyObjectResult, Delete, DeleteError, DeleteResult, DeletedObject,
};
use tracing::debug;

use crate::checksums::{decode_content_md5, quote_etag};
use crate::error::{S3ServiceError, S3ServiceResult};
use crate::properties::{self, Properties};
use crate::provider::ShoeboxS3;
use crate::utils::{parse_copy_source, parse_range_header};

use super::{build_acl, is_public_canned_acl};

/// Parameters of `PUT /bucket/key`.
#[derive(Debug, Clone, Default)]
pub struct PutObjectInput {
    /// Target bucket.
    pub bucket: String,
    /// Target key.
    pub key: String,
    /// Headers captured into the sidecar.
    pub properties: Properties,
    /// `Content-MD5`, base64.
    pub content_md5: Option<String>,
    /// Declared decoded body length.
    pub content_length: Option<u64>,
}

/// Parameters of a copy (`PUT` with `x-amz-copy-source`).
#[derive(Debug, Clone, Default)]
pub struct CopyObjectInput {
    /// Target bucket.
    pub bucket: String,
    /// Target key.
    pub key: String,
    /// Raw `x-amz-copy-source` value.
    pub copy_source: String,
    /// `x-amz-metadata-directive: REPLACE`.
    pub replace_metadata: bool,
    /// Headers captured from the copy request, used with `REPLACE`.
    pub properties: Properties,
}

/// Attributes served by `HEAD` and `GET`.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// The object key.
    pub key: String,
    /// Full object size.
    pub size: u64,
    /// Quoted ETag.
    pub etag: String,
    /// Data file modification time.
    pub last_modified: DateTime<Utc>,
    /// Stored properties.
    pub properties: Properties,
}

/// An open data file with the number of bytes to send from it.
#[derive(Debug)]
pub struct ObjectBody {
    /// File positioned at the first byte to send.
    pub file: tokio::fs::File,
    /// Bytes to send.
    pub len: u64,
}

/// Result of `GET /bucket/key`.
#[derive(Debug)]
pub struct GetObjectOutput {
    /// Object attributes.
    pub info: ObjectInfo,
    /// Body to stream.
    pub body: ObjectBody,
    /// Inclusive byte range served, for `206` responses.
    pub range: Option<(u64, u64)>,
}

impl ShoeboxS3 {
    /// Store an object from a streamed body.
    ///
    /// Returns the quoted ETag.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::InvalidDigest`], [`S3ServiceError::BadDigest`],
    /// [`S3ServiceError::IncompleteBody`], [`S3ServiceError::NoSuchBucket`]
    /// when auto-create is off, or an I/O error.
    pub async fn handle_put_object<S>(&self, input: PutObjectInput, body: S) -> S3ServiceResult<String>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        let expected_md5 = input
            .content_md5
            .as_deref()
            .map(decode_content_md5)
            .transpose()?;

        let bucket = self.writable_bucket(&input.bucket).await?;
        let object = bucket.object(&input.key)?;

        let written = object
            .write(body, input.content_length, expected_md5.as_deref())
            .await?;

        let mut props = input.properties;
        props.set(properties::ETAG, written.md5_hex.clone());
        object.commit_properties(&props).await?;

        debug!(
            bucket = %input.bucket,
            key = %input.key,
            size = written.size,
            etag = %written.md5_hex,
            "put_object completed"
        );
        Ok(written.etag())
    }

    /// Attributes of an object.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or [`S3ServiceError::NoSuchKey`].
    pub async fn handle_head_object(&self, bucket: &str, key: &str) -> S3ServiceResult<ObjectInfo> {
        let object = self.existing_bucket(bucket).await?.object(key)?;
        let size = object.size().await?;
        let last_modified = object.last_modified().await?;
        let etag = object.etag().await?;
        let properties = object.properties().await?;
        Ok(ObjectInfo {
            key: key.to_owned(),
            size,
            etag: quote_etag(&etag),
            last_modified,
            properties,
        })
    }

    /// Open an object for streaming, optionally restricted to one range.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`], [`S3ServiceError::NoSuchKey`] or
    /// [`S3ServiceError::InvalidRange`].
    pub async fn handle_get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<&str>,
    ) -> S3ServiceResult<GetObjectOutput> {
        let info = self.handle_head_object(bucket, key).await?;
        let range = range
            .map(|r| parse_range_header(r, info.size))
            .transpose()?;
        let (offset, len) = range.map_or((0, info.size), |(start, end)| (start, end - start + 1));

        let object = self.store.bucket(bucket)?.object(key)?;
        let file = object.open(offset).await?;

        debug!(bucket, key, offset, len, "get_object completed");
        Ok(GetObjectOutput {
            info,
            body: ObjectBody { file, len },
            range,
        })
    }

    /// Delete an object. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or an I/O error.
    pub async fn handle_delete_object(&self, bucket: &str, key: &str) -> S3ServiceResult<()> {
        let object = self.existing_bucket(bucket).await?.object(key)?;
        let existed = object.delete().await?;
        debug!(bucket, key, existed, "delete_object completed");
        Ok(())
    }

    /// `POST /bucket?delete`.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`]. Per-key failures are reported in
    /// the result.
    pub async fn handle_delete_objects(
        &self,
        bucket: &str,
        request: Delete,
    ) -> S3ServiceResult<DeleteResult> {
        let b = self.existing_bucket(bucket).await?;
        let mut result = DeleteResult::default();

        for ident in request.objects {
            let outcome = match b.object(&ident.key) {
                Ok(object) => object.delete().await.map(|_| ()),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) if request.quiet => {}
                Ok(()) => result.deleted.push(DeletedObject { key: ident.key }),
                Err(e) => {
                    let err = e.into_s3_error();
                    result.errors.push(DeleteError {
                        key: ident.key,
                        code: err.code.as_str().to_owned(),
                        message: err.message,
                    });
                }
            }
        }

        debug!(
            bucket,
            deleted = result.deleted.len(),
            errors = result.errors.len(),
            "delete_objects completed"
        );
        Ok(result)
    }

    /// Copy an object, keeping its properties unless `REPLACE` was asked.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::InvalidArgument`] for a malformed source,
    /// [`S3ServiceError::NoSuchBucket`] / [`S3ServiceError::NoSuchKey`] for a
    /// missing source, or [`S3ServiceError::InvalidArgument`] when copying an
    /// object onto itself without replacing its metadata.
    pub async fn handle_copy_object(
        &self,
        input: CopyObjectInput,
    ) -> S3ServiceResult<CopyObjectResult> {
        let (src_bucket, src_key) = parse_copy_source(&input.copy_source)?;
        if src_bucket == input.bucket && src_key == input.key && !input.replace_metadata {
            return Err(S3ServiceError::invalid_argument(
                "This copy request is illegal because it is trying to copy an object to itself \
                 without changing the object's metadata.",
            ));
        }

        let source = self.existing_bucket(&src_bucket).await?.object(&src_key)?;
        let etag = source.etag().await?;
        let target = self.writable_bucket(&input.bucket).await?.object(&input.key)?;

        source.copy_to(&target).await?;
        if input.replace_metadata {
            let mut props = input.properties;
            props.set(properties::ETAG, etag.clone());
            if source.data_path() == target.data_path() {
                target.store_properties(&props).await?;
            } else {
                target.commit_properties(&props).await?;
            }
        }

        let last_modified = target.last_modified().await?;
        debug!(
            from = %format!("{src_bucket}/{src_key}"),
            to = %format!("{}/{}", input.bucket, input.key),
            "copy_object completed"
        );
        Ok(CopyObjectResult {
            last_modified,
            e_tag: quote_etag(&etag),
        })
    }

    /// `GET /bucket/key?acl`. Public when the bucket is public or the object
    /// was stored with a public canned ACL.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or [`S3ServiceError::NoSuchKey`].
    pub async fn handle_get_object_acl(
        &self,
        bucket: &str,
        key: &str,
    ) -> S3ServiceResult<AccessControlPolicy> {
        let b = self.existing_bucket(bucket).await?;
        let object = b.object(key)?;
        if !object.exists().await {
            return Err(S3ServiceError::NoSuchKey {
                key: key.to_owned(),
            });
        }
        let props = object.properties().await?;
        let public = b.is_public().await?
            || props.get(properties::AMZ_ACL).is_some_and(is_public_canned_acl);
        Ok(build_acl(self.owner(), public))
    }

    /// `PUT /bucket/key?acl`. The canned ACL is stored as a property.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or [`S3ServiceError::NoSuchKey`].
    pub async fn handle_put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        canned_acl: Option<&str>,
    ) -> S3ServiceResult<()> {
        let object = self.existing_bucket(bucket).await?.object(key)?;
        if !object.exists().await {
            return Err(S3ServiceError::NoSuchKey {
                key: key.to_owned(),
            });
        }
        let mut props = object.properties().await?;
        match canned_acl {
            Some(acl) => props.set(properties::AMZ_ACL, acl),
            None => {
                props.remove(properties::AMZ_ACL);
            }
        }
        object.store_properties(&props).await
    }
}
