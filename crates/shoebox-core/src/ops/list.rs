//! List operation handlers.
//!
//! Implements `ListObjects` (v1), `ListObjectsV2` and `ListMultipartUploads`.

use shoebox_model::types::{
    ListBucketResult, ListBucketV2Result, ListMultipartUploadsResult, MultipartUploadSummary,
    ObjectSummary, Owner,
};
use tracing::debug;

use crate::checksums::quote_etag;
use crate::error::S3ServiceResult;
use crate::provider::ShoeboxS3;
use crate::store::{ListPage, ListQuery};
use crate::utils::{decode_continuation_token, encode_continuation_token};

/// Default and maximum number of keys returned in one listing.
pub const DEFAULT_MAX_KEYS: usize = 1000;

/// Parameters of `GET /bucket`.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsInput {
    /// Target bucket.
    pub bucket: String,
    /// `prefix`.
    pub prefix: Option<String>,
    /// `marker`.
    pub marker: Option<String>,
    /// `delimiter`.
    pub delimiter: Option<String>,
    /// `max-keys`.
    pub max_keys: Option<usize>,
}

/// Parameters of `GET /bucket?list-type=2`.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsV2Input {
    /// Target bucket.
    pub bucket: String,
    /// `prefix`.
    pub prefix: Option<String>,
    /// `delimiter`.
    pub delimiter: Option<String>,
    /// `max-keys`.
    pub max_keys: Option<usize>,
    /// `continuation-token`.
    pub continuation_token: Option<String>,
    /// `start-after`.
    pub start_after: Option<String>,
    /// `fetch-owner`.
    pub fetch_owner: bool,
}

fn to_summaries(page: &ListPage, owner: Option<&Owner>) -> Vec<ObjectSummary> {
    page.objects()
        .map(|o| ObjectSummary {
            key: o.key.clone(),
            last_modified: o.last_modified,
            e_tag: quote_etag(&o.etag),
            size: o.size,
            owner: owner.cloned(),
        })
        .collect()
}

impl ShoeboxS3 {
    /// List objects (v1 API).
    ///
    /// # Errors
    ///
    /// [`crate::S3ServiceError::NoSuchBucket`] or an I/O error.
    pub async fn handle_list_objects(
        &self,
        input: ListObjectsInput,
    ) -> S3ServiceResult<ListBucketResult> {
        let bucket = self.existing_bucket(&input.bucket).await?;
        let max_keys = input.max_keys.unwrap_or(DEFAULT_MAX_KEYS).min(DEFAULT_MAX_KEYS);
        let query = ListQuery {
            prefix: input.prefix.clone().unwrap_or_default(),
            marker: input.marker.clone().unwrap_or_default(),
            delimiter: input.delimiter.clone(),
            limit: max_keys,
        };

        let page = bucket.list_objects(&query).await?;
        let owner = self.owner();

        debug!(
            bucket = %input.bucket,
            prefix = %query.prefix,
            marker = %query.marker,
            count = page.entries.len(),
            is_truncated = page.is_truncated,
            "list_objects completed"
        );

        Ok(ListBucketResult {
            contents: to_summaries(&page, Some(&owner)),
            common_prefixes: page.common_prefixes().map(str::to_owned).collect(),
            name: input.bucket,
            prefix: query.prefix,
            marker: query.marker,
            // S3 only reports NextMarker when a delimiter is in play.
            next_marker: page.next_marker.filter(|_| query.delimiter.is_some()),
            max_keys,
            delimiter: query.delimiter,
            is_truncated: page.is_truncated,
        })
    }

    /// List objects (v2 API with continuation tokens).
    ///
    /// # Errors
    ///
    /// [`crate::S3ServiceError::NoSuchBucket`],
    /// [`crate::S3ServiceError::InvalidArgument`] for a bad token, or an I/O
    /// error.
    pub async fn handle_list_objects_v2(
        &self,
        input: ListObjectsV2Input,
    ) -> S3ServiceResult<ListBucketV2Result> {
        let bucket = self.existing_bucket(&input.bucket).await?;
        let max_keys = input.max_keys.unwrap_or(DEFAULT_MAX_KEYS).min(DEFAULT_MAX_KEYS);

        let decoded_token = input
            .continuation_token
            .as_deref()
            .map(decode_continuation_token)
            .transpose()?;
        let marker = decoded_token
            .or_else(|| input.start_after.clone())
            .unwrap_or_default();

        let query = ListQuery {
            prefix: input.prefix.clone().unwrap_or_default(),
            marker,
            delimiter: input.delimiter.clone(),
            limit: max_keys,
        };
        let page = bucket.list_objects(&query).await?;
        let owner = input.fetch_owner.then(|| self.owner());

        debug!(
            bucket = %input.bucket,
            prefix = %query.prefix,
            count = page.entries.len(),
            is_truncated = page.is_truncated,
            "list_objects_v2 completed"
        );

        Ok(ListBucketV2Result {
            contents: to_summaries(&page, owner.as_ref()),
            common_prefixes: page.common_prefixes().map(str::to_owned).collect(),
            key_count: page.entries.len(),
            next_continuation_token: page.next_marker.as_deref().map(encode_continuation_token),
            name: input.bucket,
            prefix: query.prefix,
            start_after: input.start_after,
            continuation_token: input.continuation_token,
            max_keys,
            delimiter: query.delimiter,
            is_truncated: page.is_truncated,
        })
    }

    /// `GET /bucket?uploads`.
    ///
    /// # Errors
    ///
    /// [`crate::S3ServiceError::NoSuchBucket`].
    pub async fn handle_list_multipart_uploads(
        &self,
        bucket: &str,
    ) -> S3ServiceResult<ListMultipartUploadsResult> {
        self.existing_bucket(bucket).await?;
        let uploads = self
            .multipart
            .list_uploads(bucket)
            .into_iter()
            .map(|u| MultipartUploadSummary {
                key: u.key,
                upload_id: u.upload_id.to_string(),
                initiated: u.initiated,
            })
            .collect();
        Ok(ListMultipartUploadsResult {
            bucket: bucket.to_owned(),
            owner: self.owner(),
            uploads,
        })
    }
}
