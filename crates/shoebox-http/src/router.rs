//! S3 request routing: legacy prefix handling and operation identification.
//!
//! The [`S3Router`] maps incoming HTTP requests to S3 operations by examining:
//!
//! - The URI path, after removing the optional legacy prefix (`/s3` by default)
//! - The HTTP method (GET, PUT, DELETE, POST, HEAD)
//! - Query parameters naming a multipart upload or a bucket sub-resource
//! - The `x-amz-copy-source` header, which turns a `PUT` into a copy
//!
//! Bucket sub-resources are looked up in an explicit registry,
//! [`SubResource::REGISTRY`], before the default bucket operations apply.

use http::Method;
use percent_encoding::percent_decode_str;
use shoebox_model::error::{S3Error, S3ErrorCode};
use shoebox_model::operations::S3Operation;

/// Query parameter that lets unsigned requests through on private buckets.
pub const BYPASS_PARAM: &str = "noAuth";

/// Bucket configuration sub-resources answered by fixed handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubResource {
    /// `?acl`
    Acl,
    /// `?cors`
    Cors,
    /// `?lifecycle`
    Lifecycle,
    /// `?policy`
    Policy,
    /// `?requestPayment`
    RequestPayment,
    /// `?delete`
    Delete,
    /// `?location`
    Location,
}

impl SubResource {
    /// Query parameter names in lookup order.
    pub const REGISTRY: &'static [(&'static str, SubResource)] = &[
        ("acl", Self::Acl),
        ("cors", Self::Cors),
        ("lifecycle", Self::Lifecycle),
        ("policy", Self::Policy),
        ("requestPayment", Self::RequestPayment),
        ("delete", Self::Delete),
        ("location", Self::Location),
    ];

    /// The first registered sub-resource named in `params`.
    #[must_use]
    pub fn lookup(params: &[(String, String)]) -> Option<Self> {
        Self::REGISTRY
            .iter()
            .find(|(name, _)| query_has_key(params, name))
            .map(|(_, sub)| *sub)
    }

    /// The query parameter naming this sub-resource.
    #[must_use]
    pub fn name(self) -> &'static str {
        Self::REGISTRY
            .iter()
            .find(|(_, sub)| *sub == self)
            .map_or("", |(name, _)| name)
    }

    /// The bucket-level operation for `method` on this sub-resource.
    fn bucket_operation(self, method: &Method) -> Option<S3Operation> {
        let op = match (self, method.as_str()) {
            (Self::Acl, "GET") => S3Operation::GetBucketAcl,
            (Self::Acl, "PUT") => S3Operation::PutBucketAcl,
            (Self::Cors, "GET") => S3Operation::GetBucketCors,
            (Self::Cors, "PUT") => S3Operation::PutBucketCors,
            (Self::Cors, "DELETE") => S3Operation::DeleteBucketCors,
            (Self::Lifecycle, "GET") => S3Operation::GetBucketLifecycle,
            (Self::Lifecycle, "PUT") => S3Operation::PutBucketLifecycle,
            (Self::Lifecycle, "DELETE") => S3Operation::DeleteBucketLifecycle,
            (Self::Policy, "GET") => S3Operation::GetBucketPolicy,
            (Self::Policy, "PUT") => S3Operation::PutBucketPolicy,
            (Self::Policy, "DELETE") => S3Operation::DeleteBucketPolicy,
            (Self::RequestPayment, "GET") => S3Operation::GetBucketRequestPayment,
            (Self::RequestPayment, "PUT") => S3Operation::PutBucketRequestPayment,
            (Self::Delete, "POST") => S3Operation::DeleteObjects,
            (Self::Location, "GET") => S3Operation::GetBucketLocation,
            _ => return None,
        };
        Some(op)
    }
}

/// Configuration for S3 request routing.
#[derive(Debug, Clone, Default)]
pub struct S3Router {
    /// Path prefix stripped before routing, e.g. `/s3`.
    legacy_prefix: Option<String>,
}

/// The result of routing an HTTP request to an S3 operation.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    /// The resolved bucket name, if any.
    pub bucket: Option<String>,
    /// The resolved object key, if any.
    pub key: Option<String>,
    /// The identified S3 operation.
    pub operation: S3Operation,
    /// Parsed query parameters from the request URI.
    pub query_params: Vec<(String, String)>,
    /// The bucket path ended with `/` and named no key (`/bucket/`).
    pub trailing_slash: bool,
}

impl RoutingContext {
    /// Whether the query string contains `name`, with or without a value.
    #[must_use]
    pub fn has_query(&self, name: &str) -> bool {
        query_has_key(&self.query_params, name)
    }

    /// The value of query parameter `name`.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        query_value(&self.query_params, name)
    }

    /// Whether the request asked to skip the anonymous access check.
    #[must_use]
    pub fn bypass_requested(&self) -> bool {
        self.has_query(BYPASS_PARAM)
    }

    /// The `/bucket/key` path used as `Resource` in error documents.
    #[must_use]
    pub fn resource(&self) -> String {
        match (&self.bucket, &self.key) {
            (Some(bucket), Some(key)) => format!("/{bucket}/{key}"),
            (Some(bucket), None) => format!("/{bucket}"),
            _ => "/".to_owned(),
        }
    }
}

impl S3Router {
    /// Create a router. An empty or `/` prefix disables prefix stripping.
    #[must_use]
    pub fn new(legacy_prefix: Option<&str>) -> Self {
        let legacy_prefix = legacy_prefix
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty())
            .map(|p| {
                if p.starts_with('/') {
                    p.to_owned()
                } else {
                    format!("/{p}")
                }
            });
        Self { legacy_prefix }
    }

    /// The normalized legacy prefix, if enabled.
    #[must_use]
    pub fn legacy_prefix(&self) -> Option<&str> {
        self.legacy_prefix.as_deref()
    }

    /// Remove the legacy prefix from `path` when it is a whole leading segment.
    #[must_use]
    pub fn strip_prefix<'a>(&self, path: &'a str) -> &'a str {
        let Some(prefix) = self.legacy_prefix.as_deref() else {
            return path;
        };
        match path.strip_prefix(prefix) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }

    /// Resolve an HTTP request to a routing context containing the identified S3 operation.
    ///
    /// # Errors
    ///
    /// Returns `MethodNotAllowed` when the method is not valid for the
    /// addressed resource.
    pub fn resolve<B>(&self, req: &http::Request<B>) -> Result<RoutingContext, S3Error> {
        let method = req.method();
        let uri = req.uri();
        let query_params = parse_query_params(uri.query().unwrap_or(""));

        let path = self.strip_prefix(uri.path());
        let (bucket, key, trailing_slash) = parse_path(path);

        let operation = identify_operation(
            method,
            bucket.as_deref(),
            key.as_deref(),
            &query_params,
            req.headers(),
        )?;

        Ok(RoutingContext {
            bucket,
            key,
            operation,
            query_params,
            trailing_slash,
        })
    }
}

/// Parse the URI path into an optional bucket, optional key and whether a
/// bucket-only path ended with `/`.
///
/// Path format: `/{bucket}`, `/{bucket}/` or `/{bucket}/{key...}`
fn parse_path(path: &str) -> (Option<String>, Option<String>, bool) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return (None, None, false);
    }

    match trimmed.split_once('/') {
        Some((bucket, "")) => (Some(decode_uri_component(bucket)), None, true),
        Some((bucket, key)) => (
            Some(decode_uri_component(bucket)),
            Some(decode_uri_component(key)),
            false,
        ),
        None => (Some(decode_uri_component(trimmed)), None, false),
    }
}

/// Decode a percent-encoded URI component.
fn decode_uri_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Parse a query string into key-value pairs.
fn parse_query_params(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode_query_component(k), decode_query_component(v)),
            None => (decode_query_component(pair), String::new()),
        })
        .collect()
}

fn decode_query_component(s: &str) -> String {
    decode_uri_component(&s.replace('+', " "))
}

fn query_has_key(params: &[(String, String)], key: &str) -> bool {
    params.iter().any(|(k, _)| k == key)
}

fn query_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Identify the S3 operation from the HTTP method, path structure, query params, and headers.
fn identify_operation(
    method: &Method,
    bucket: Option<&str>,
    key: Option<&str>,
    params: &[(String, String)],
    headers: &http::HeaderMap,
) -> Result<S3Operation, S3Error> {
    match (bucket, key) {
        (None, _) if *method == Method::GET => Ok(S3Operation::ListBuckets),
        (None, _) => Err(S3Error::with_message(
            S3ErrorCode::MethodNotAllowed,
            "Only GET is allowed at the service level",
        )),
        (Some(_), None) => identify_bucket_operation(method, params),
        (Some(_), Some(_)) => identify_object_operation(method, params, headers),
    }
}

/// Identify a bucket-level operation (bucket present, no key).
fn identify_bucket_operation(
    method: &Method,
    params: &[(String, String)],
) -> Result<S3Operation, S3Error> {
    if let Some(sub) = SubResource::lookup(params) {
        return sub
            .bucket_operation(method)
            .ok_or_else(|| S3Error::method_not_allowed(format!("{method} ?{}", sub.name())));
    }

    match *method {
        Method::GET if query_has_key(params, "uploads") => Ok(S3Operation::ListMultipartUploads),
        Method::GET if query_value(params, "list-type") == Some("2") => {
            Ok(S3Operation::ListObjectsV2)
        }
        Method::GET => Ok(S3Operation::ListObjects),
        Method::HEAD => Ok(S3Operation::HeadBucket),
        Method::PUT => Ok(S3Operation::CreateBucket),
        Method::DELETE => Ok(S3Operation::DeleteBucket),
        _ => Err(S3Error::method_not_allowed(method.as_str())),
    }
}

/// Identify an object-level operation (bucket and key present).
fn identify_object_operation(
    method: &Method,
    params: &[(String, String)],
    headers: &http::HeaderMap,
) -> Result<S3Operation, S3Error> {
    let upload_id = query_has_key(params, "uploadId");

    match *method {
        Method::PUT if upload_id && query_has_key(params, "partNumber") => {
            return Ok(S3Operation::UploadPart);
        }
        Method::POST if query_has_key(params, "uploads") => {
            return Ok(S3Operation::CreateMultipartUpload);
        }
        Method::POST if upload_id => return Ok(S3Operation::CompleteMultipartUpload),
        Method::GET if upload_id => return Ok(S3Operation::ListParts),
        Method::DELETE if upload_id => return Ok(S3Operation::AbortMultipartUpload),
        _ => {}
    }

    if SubResource::lookup(params) == Some(SubResource::Acl) {
        return match *method {
            Method::GET => Ok(S3Operation::GetObjectAcl),
            Method::PUT => Ok(S3Operation::PutObjectAcl),
            _ => Err(S3Error::method_not_allowed(format!("{method} ?acl"))),
        };
    }

    match *method {
        Method::PUT if headers.contains_key("x-amz-copy-source") => Ok(S3Operation::CopyObject),
        Method::GET => Ok(S3Operation::GetObject),
        Method::HEAD => Ok(S3Operation::HeadObject),
        Method::PUT => Ok(S3Operation::PutObject),
        Method::DELETE => Ok(S3Operation::DeleteObject),
        _ => Err(S3Error::method_not_allowed(method.as_str())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(method: Method, uri: &str) -> Result<RoutingContext, S3Error> {
        let req = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .expect("valid request");
        S3Router::new(Some("/s3")).resolve(&req)
    }

    fn op(method: Method, uri: &str) -> S3Operation {
        route(method, uri).expect("routable").operation
    }

    #[test]
    fn test_should_route_service_level() {
        assert_eq!(op(Method::GET, "/"), S3Operation::ListBuckets);
        assert_eq!(op(Method::GET, "/s3"), S3Operation::ListBuckets);
        assert_eq!(op(Method::GET, "/s3/"), S3Operation::ListBuckets);
        let err = route(Method::PUT, "/").unwrap_err();
        assert_eq!(err.code, S3ErrorCode::MethodNotAllowed);
    }

    #[test]
    fn test_should_strip_legacy_prefix_only_on_segment_boundary() {
        let router = S3Router::new(Some("/s3/"));
        assert_eq!(router.legacy_prefix(), Some("/s3"));
        assert_eq!(router.strip_prefix("/s3/b/k"), "/b/k");
        assert_eq!(router.strip_prefix("/s3"), "/");
        assert_eq!(router.strip_prefix("/s3x/k"), "/s3x/k");
        assert_eq!(S3Router::new(Some("/")).strip_prefix("/s3/b"), "/s3/b");
        assert_eq!(S3Router::new(Some("s3")).legacy_prefix(), Some("/s3"));
    }

    #[test]
    fn test_should_route_bucket_defaults() {
        assert_eq!(op(Method::GET, "/b"), S3Operation::ListObjects);
        assert_eq!(op(Method::GET, "/s3/b?prefix=a&marker=a1"), S3Operation::ListObjects);
        assert_eq!(op(Method::GET, "/b?list-type=2"), S3Operation::ListObjectsV2);
        assert_eq!(op(Method::GET, "/b?uploads"), S3Operation::ListMultipartUploads);
        assert_eq!(op(Method::HEAD, "/b"), S3Operation::HeadBucket);
        assert_eq!(op(Method::PUT, "/b"), S3Operation::CreateBucket);
        assert_eq!(op(Method::DELETE, "/b/"), S3Operation::DeleteBucket);
        assert_eq!(
            route(Method::POST, "/b").unwrap_err().code,
            S3ErrorCode::MethodNotAllowed
        );
    }

    #[test]
    fn test_should_consult_sub_resource_registry_first() {
        assert_eq!(op(Method::GET, "/b?acl"), S3Operation::GetBucketAcl);
        assert_eq!(op(Method::PUT, "/b?acl"), S3Operation::PutBucketAcl);
        assert_eq!(op(Method::GET, "/b?cors"), S3Operation::GetBucketCors);
        assert_eq!(op(Method::DELETE, "/b?cors"), S3Operation::DeleteBucketCors);
        assert_eq!(op(Method::GET, "/b?lifecycle"), S3Operation::GetBucketLifecycle);
        assert_eq!(op(Method::PUT, "/b?policy"), S3Operation::PutBucketPolicy);
        assert_eq!(
            op(Method::GET, "/b?requestPayment"),
            S3Operation::GetBucketRequestPayment
        );
        assert_eq!(op(Method::POST, "/b?delete"), S3Operation::DeleteObjects);
        assert_eq!(op(Method::GET, "/b?location"), S3Operation::GetBucketLocation);
        // The registry wins over list parameters.
        assert_eq!(op(Method::GET, "/b?acl&list-type=2"), S3Operation::GetBucketAcl);
        assert_eq!(
            route(Method::POST, "/b?location").unwrap_err().code,
            S3ErrorCode::MethodNotAllowed
        );
    }

    #[test]
    fn test_should_route_multipart_operations() {
        assert_eq!(op(Method::POST, "/b/k?uploads"), S3Operation::CreateMultipartUpload);
        assert_eq!(
            op(Method::PUT, "/b/k?partNumber=1&uploadId=1"),
            S3Operation::UploadPart
        );
        assert_eq!(
            op(Method::POST, "/b/k?uploadId=1"),
            S3Operation::CompleteMultipartUpload
        );
        assert_eq!(op(Method::GET, "/b/k?uploadId=1"), S3Operation::ListParts);
        assert_eq!(
            op(Method::DELETE, "/b/k?uploadId=1"),
            S3Operation::AbortMultipartUpload
        );
    }

    #[test]
    fn test_should_route_object_operations() {
        assert_eq!(op(Method::GET, "/b/k"), S3Operation::GetObject);
        assert_eq!(op(Method::HEAD, "/b/k"), S3Operation::HeadObject);
        assert_eq!(op(Method::PUT, "/b/k"), S3Operation::PutObject);
        assert_eq!(op(Method::DELETE, "/b/k"), S3Operation::DeleteObject);
        assert_eq!(op(Method::GET, "/b/k?acl"), S3Operation::GetObjectAcl);
        assert_eq!(op(Method::PUT, "/b/k?acl"), S3Operation::PutObjectAcl);

        let req = http::Request::builder()
            .method(Method::PUT)
            .uri("/b/k")
            .header("x-amz-copy-source", "/src/key")
            .body(())
            .expect("valid request");
        let ctx = S3Router::default().resolve(&req).unwrap();
        assert_eq!(ctx.operation, S3Operation::CopyObject);
    }

    #[test]
    fn test_should_decode_bucket_and_key() {
        let ctx = route(Method::GET, "/s3/b/dir/a%20b%2Fc.txt").unwrap();
        assert_eq!(ctx.bucket.as_deref(), Some("b"));
        assert_eq!(ctx.key.as_deref(), Some("dir/a b/c.txt"));
        assert_eq!(ctx.resource(), "/b/dir/a b/c.txt");
        assert!(!ctx.trailing_slash);

        let ctx = route(Method::GET, "/b/dir/").unwrap();
        assert_eq!(ctx.key.as_deref(), Some("dir/"));
    }

    #[test]
    fn test_should_flag_trailing_slash_on_bucket_path() {
        let ctx = route(Method::HEAD, "/b/").unwrap();
        assert!(ctx.trailing_slash);
        assert_eq!(ctx.key, None);
        assert!(!route(Method::HEAD, "/b").unwrap().trailing_slash);
    }

    #[test]
    fn test_should_parse_query_params() {
        let ctx = route(Method::GET, "/b?prefix=a%2Fb&delimiter=%2F&noAuth").unwrap();
        assert_eq!(ctx.query("prefix"), Some("a/b"));
        assert_eq!(ctx.query("delimiter"), Some("/"));
        assert!(ctx.bypass_requested());
        assert!(!route(Method::GET, "/b").unwrap().bypass_requested());
    }

    #[test]
    fn test_should_name_sub_resources() {
        for (name, sub) in SubResource::REGISTRY {
            assert_eq!(sub.name(), *name);
        }
    }
}
