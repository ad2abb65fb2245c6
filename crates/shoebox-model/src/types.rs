//! XML document types exchanged with S3 clients.
#![allow(missing_docs)]

use chrono::{DateTime, Utc};

/// S3 Owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Owner {
    pub id: String,
    pub display_name: String,
}

/// A bucket entry inside `ListAllMyBucketsResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSummary {
    pub name: String,
    pub creation_date: DateTime<Utc>,
}

/// Response body of `ListBuckets`.
#[derive(Debug, Clone, Default)]
pub struct ListAllMyBucketsResult {
    pub owner: Owner,
    pub buckets: Vec<BucketSummary>,
}

/// An object entry inside a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    /// Quoted hex MD5.
    pub e_tag: String,
    pub size: u64,
    pub owner: Option<Owner>,
}

/// Response body of `ListObjects`.
#[derive(Debug, Clone, Default)]
pub struct ListBucketResult {
    pub name: String,
    pub prefix: String,
    pub marker: String,
    pub next_marker: Option<String>,
    pub max_keys: usize,
    pub delimiter: Option<String>,
    pub is_truncated: bool,
    pub contents: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
}

/// Response body of `ListObjectsV2`.
#[derive(Debug, Clone, Default)]
pub struct ListBucketV2Result {
    pub name: String,
    pub prefix: String,
    pub start_after: Option<String>,
    pub continuation_token: Option<String>,
    pub next_continuation_token: Option<String>,
    pub key_count: usize,
    pub max_keys: usize,
    pub delimiter: Option<String>,
    pub is_truncated: bool,
    pub contents: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
}

/// Response body of `CreateMultipartUpload`.
#[derive(Debug, Clone, Default)]
pub struct InitiateMultipartUploadResult {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

/// Response body of `CompleteMultipartUpload`.
#[derive(Debug, Clone, Default)]
pub struct CompleteMultipartUploadResult {
    pub location: String,
    pub bucket: String,
    pub key: String,
    pub e_tag: String,
}

/// A staged part inside `ListPartsResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartSummary {
    pub part_number: u32,
    pub last_modified: DateTime<Utc>,
    pub e_tag: String,
    pub size: u64,
}

/// Response body of `ListParts`.
#[derive(Debug, Clone, Default)]
pub struct ListPartsResult {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub owner: Owner,
    pub part_number_marker: u32,
    pub next_part_number_marker: Option<u32>,
    pub max_parts: usize,
    pub is_truncated: bool,
    pub parts: Vec<PartSummary>,
}

/// An in-flight upload inside `ListMultipartUploadsResult`.
#[derive(Debug, Clone)]
pub struct MultipartUploadSummary {
    pub key: String,
    pub upload_id: String,
    pub initiated: DateTime<Utc>,
}

/// Response body of `ListMultipartUploads`.
#[derive(Debug, Clone, Default)]
pub struct ListMultipartUploadsResult {
    pub bucket: String,
    pub owner: Owner,
    pub uploads: Vec<MultipartUploadSummary>,
}

/// Response body of `CopyObject`.
#[derive(Debug, Clone)]
pub struct CopyObjectResult {
    pub last_modified: DateTime<Utc>,
    pub e_tag: String,
}

/// A successfully deleted key inside `DeleteResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedObject {
    pub key: String,
}

/// A failed key inside `DeleteResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteError {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// Response body of `DeleteObjects`.
#[derive(Debug, Clone, Default)]
pub struct DeleteResult {
    pub deleted: Vec<DeletedObject>,
    pub errors: Vec<DeleteError>,
}

/// Who a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grantee {
    CanonicalUser(Owner),
    Group { uri: String },
}

/// A single ACL grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub grantee: Grantee,
    pub permission: String,
}

/// Response body of the `acl` sub-resource.
#[derive(Debug, Clone, Default)]
pub struct AccessControlPolicy {
    pub owner: Owner,
    pub grants: Vec<Grant>,
}

/// Response body of the `requestPayment` sub-resource.
#[derive(Debug, Clone)]
pub struct RequestPaymentConfiguration {
    pub payer: String,
}

/// Response body of the `location` sub-resource.
#[derive(Debug, Clone, Default)]
pub struct LocationConstraint {
    pub region: Option<String>,
}

/// Response body of the `cors` sub-resource. Always empty.
#[derive(Debug, Clone, Default)]
pub struct CorsConfiguration;

/// A part reference inside a completion request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub e_tag: Option<String>,
}

/// Request body of `CompleteMultipartUpload`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedMultipartUpload {
    pub parts: Vec<CompletedPart>,
}

/// A key inside a bulk delete request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectIdentifier {
    pub key: String,
}

/// Request body of `DeleteObjects`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delete {
    pub objects: Vec<ObjectIdentifier>,
    pub quiet: bool,
}

/// The group URI granting access to everyone.
pub const ALL_USERS_GROUP: &str = "http://acs.amazonaws.com/groups/global/AllUsers";
