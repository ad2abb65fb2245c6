//! Bucket operation handlers.
//!
//! Implements bucket CRUD, `location`, `acl`, and the stub sub-resources
//! (`cors`, `lifecycle`, `policy`, `requestPayment`) that are accepted but
//! never stored.

use shoebox_model::types::{
    AccessControlPolicy, BucketSummary, CorsConfiguration, ListAllMyBucketsResult,
    LocationConstraint, RequestPaymentConfiguration,
};
use tracing::debug;

use crate::error::{S3ServiceError, S3ServiceResult};
use crate::provider::ShoeboxS3;
use crate::store::Visibility;

use super::{build_acl, is_public_canned_acl};

impl ShoeboxS3 {
    /// List every bucket.
    ///
    /// # Errors
    ///
    /// Any I/O error reading the data root.
    pub async fn handle_list_buckets(&self) -> S3ServiceResult<ListAllMyBucketsResult> {
        let mut buckets = Vec::new();
        for bucket in self.store.list_buckets().await? {
            let creation_date = bucket.creation_date().await?;
            buckets.push(BucketSummary {
                name: bucket.name().to_owned(),
                creation_date,
            });
        }
        debug!(count = buckets.len(), "list_buckets completed");
        Ok(ListAllMyBucketsResult {
            owner: self.owner(),
            buckets,
        })
    }

    /// Create a bucket; creating an existing bucket succeeds.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::InvalidBucketName`] or an I/O error.
    pub async fn handle_create_bucket(&self, bucket: &str) -> S3ServiceResult<()> {
        let created = self.store.bucket(bucket)?.create().await?;
        debug!(bucket, created, "create_bucket completed");
        Ok(())
    }

    /// Delete a bucket and all of its objects.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or an I/O error.
    pub async fn handle_delete_bucket(&self, bucket: &str) -> S3ServiceResult<()> {
        self.store.bucket(bucket)?.delete().await?;
        for upload in self.multipart.list_uploads(bucket) {
            self.multipart.abort(upload.upload_id).await?;
        }
        debug!(bucket, "delete_bucket completed");
        Ok(())
    }

    /// Check that a bucket exists.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`].
    pub async fn handle_head_bucket(&self, bucket: &str) -> S3ServiceResult<()> {
        self.existing_bucket(bucket).await?;
        Ok(())
    }

    /// `GET ?location`. Always the empty (default) constraint.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`].
    pub async fn handle_get_bucket_location(
        &self,
        bucket: &str,
    ) -> S3ServiceResult<LocationConstraint> {
        self.existing_bucket(bucket).await?;
        Ok(LocationConstraint::default())
    }

    /// `GET ?acl` on a bucket.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`].
    pub async fn handle_get_bucket_acl(&self, bucket: &str) -> S3ServiceResult<AccessControlPolicy> {
        let b = self.existing_bucket(bucket).await?;
        Ok(build_acl(self.owner(), b.is_public().await?))
    }

    /// `PUT ?acl` on a bucket. Canned ACLs other than `private`,
    /// `public-read` and `public-read-write` are accepted and ignored.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or an I/O error.
    pub async fn handle_put_bucket_acl(
        &self,
        bucket: &str,
        canned_acl: Option<&str>,
    ) -> S3ServiceResult<()> {
        let b = self.existing_bucket(bucket).await?;
        let visibility = match canned_acl {
            Some(acl) if is_public_canned_acl(acl) => Visibility::Public,
            Some("private") => Visibility::Private,
            other => {
                debug!(bucket, acl = ?other, "ignoring unsupported bucket acl");
                return Ok(());
            }
        };
        b.set_visibility(visibility).await?;
        debug!(bucket, ?visibility, "put_bucket_acl completed");
        Ok(())
    }

    /// `GET ?cors`. Always an empty configuration.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`].
    pub async fn handle_get_bucket_cors(&self, bucket: &str) -> S3ServiceResult<CorsConfiguration> {
        self.existing_bucket(bucket).await?;
        Ok(CorsConfiguration)
    }

    /// `GET ?lifecycle`. No rules are ever stored.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or
    /// [`S3ServiceError::NoSuchLifecycleConfiguration`].
    pub async fn handle_get_bucket_lifecycle(&self, bucket: &str) -> S3ServiceResult<()> {
        self.existing_bucket(bucket).await?;
        Err(S3ServiceError::NoSuchLifecycleConfiguration)
    }

    /// `GET ?policy`. No policies are ever stored.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] or [`S3ServiceError::NoSuchBucketPolicy`].
    pub async fn handle_get_bucket_policy(&self, bucket: &str) -> S3ServiceResult<()> {
        self.existing_bucket(bucket).await?;
        Err(S3ServiceError::NoSuchBucketPolicy)
    }

    /// `GET ?requestPayment`. The owner always pays.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`].
    pub async fn handle_get_bucket_request_payment(
        &self,
        bucket: &str,
    ) -> S3ServiceResult<RequestPaymentConfiguration> {
        self.existing_bucket(bucket).await?;
        Ok(RequestPaymentConfiguration {
            payer: "BucketOwner".to_owned(),
        })
    }

    /// Writes and deletes of `cors`, `lifecycle`, `policy` and
    /// `requestPayment`: accepted once the bucket is known, then discarded.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`].
    pub async fn handle_accept_bucket_config(
        &self,
        bucket: &str,
        resource: &str,
    ) -> S3ServiceResult<()> {
        self.existing_bucket(bucket).await?;
        debug!(bucket, resource, "bucket configuration accepted and discarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use shoebox_model::types::Grantee;

    use super::*;
    use crate::provider::tests::provider;

    #[tokio::test]
    async fn test_should_create_list_and_delete_buckets() {
        let (_dir, s3) = provider().await;
        s3.handle_create_bucket("beta").await.expect("create");
        s3.handle_create_bucket("alpha").await.expect("create");
        s3.handle_create_bucket("alpha").await.expect("idempotent");

        let listed = s3.handle_list_buckets().await.expect("list");
        let names: Vec<_> = listed.buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(listed.owner.display_name, "Shoebox");

        s3.handle_delete_bucket("alpha").await.expect("delete");
        assert!(matches!(
            s3.handle_head_bucket("alpha").await,
            Err(S3ServiceError::NoSuchBucket { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_reject_invalid_bucket_name() {
        let (_dir, s3) = provider().await;
        assert!(matches!(
            s3.handle_create_bucket("a..b").await,
            Err(S3ServiceError::InvalidBucketName { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_toggle_visibility_through_acl() {
        let (_dir, s3) = provider().await;
        s3.handle_create_bucket("b").await.expect("create");

        let acl = s3.handle_get_bucket_acl("b").await.expect("acl");
        assert_eq!(acl.grants.len(), 1);

        s3.handle_put_bucket_acl("b", Some("public-read")).await.expect("put");
        assert!(s3.is_bucket_public("b").await.expect("public"));
        let acl = s3.handle_get_bucket_acl("b").await.expect("acl");
        assert!(matches!(acl.grants[1].grantee, Grantee::Group { .. }));

        s3.handle_put_bucket_acl("b", Some("authenticated-read")).await.expect("ignored");
        assert!(s3.is_bucket_public("b").await.expect("still public"));

        s3.handle_put_bucket_acl("b", Some("private")).await.expect("put");
        assert!(!s3.is_bucket_public("b").await.expect("private"));
    }

    #[tokio::test]
    async fn test_should_answer_stub_sub_resources() {
        let (_dir, s3) = provider().await;
        s3.handle_create_bucket("b").await.expect("create");

        assert!(s3.handle_get_bucket_location("b").await.expect("location").region.is_none());
        assert!(s3.handle_get_bucket_cors("b").await.is_ok());
        assert!(matches!(
            s3.handle_get_bucket_lifecycle("b").await,
            Err(S3ServiceError::NoSuchLifecycleConfiguration)
        ));
        assert!(matches!(
            s3.handle_get_bucket_policy("b").await,
            Err(S3ServiceError::NoSuchBucketPolicy)
        ));
        assert_eq!(
            s3.handle_get_bucket_request_payment("b").await.expect("payer").payer,
            "BucketOwner"
        );
        s3.handle_accept_bucket_config("b", "cors").await.expect("accepted");
        assert!(matches!(
            s3.handle_accept_bucket_config("missing", "policy").await,
            Err(S3ServiceError::NoSuchBucket { .. })
        ));
    }
}
