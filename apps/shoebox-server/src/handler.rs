//! S3 handler bridging the HTTP dispatcher to the filesystem store.
//!
//! [`ShoeboxHandler`] decides whether the caller may touch the target
//! bucket, extracts the operation's inputs from the request, calls the
//! matching `handle_*` method on [`ShoeboxS3`] and renders the result.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue};
use shoebox_core::calllog::{CallOutcome, CallRecord};
use shoebox_core::ops::list::{ListObjectsInput, ListObjectsV2Input};
use shoebox_core::ops::multipart::UploadPartInput;
use shoebox_core::ops::object::{CopyObjectInput, ObjectInfo, PutObjectInput};
use shoebox_core::properties::{self, Properties};
use shoebox_core::{S3ServiceError, ShoeboxS3};
use shoebox_http::codec::strip_aws_chunked_encoding;
use shoebox_http::dispatch::{CallSummary, Caller, HandlerFuture, S3Handler};
use shoebox_http::request::{RequestBody, collect_body, declared_content_length, header_str};
use shoebox_http::response::{build_response, empty_response, xml_response};
use shoebox_http::{RoutingContext, S3ResponseBody};
use shoebox_model::S3Operation;
use shoebox_model::error::S3Error;
use shoebox_model::types::{CompletedMultipartUpload, Delete};
use shoebox_xml::{S3Deserialize, from_xml};
use tracing::debug;

/// `Content-Type` served for objects stored without one.
const DEFAULT_CONTENT_TYPE: &str = "binary/octet-stream";

/// Stored properties echoed on `GET` and `HEAD`, besides `Content-Type`.
const SERVED_PROPERTIES: &[&str] = &[
    properties::CACHE_CONTROL,
    properties::CONTENT_DISPOSITION,
    properties::CONTENT_ENCODING,
    properties::CONTENT_LANGUAGE,
    properties::EXPIRES,
];

/// Query parameters overriding response headers on signed `GET` and `HEAD`.
const RESPONSE_OVERRIDES: &[(&str, &str)] = &[
    ("response-content-type", properties::CONTENT_TYPE),
    ("response-content-language", properties::CONTENT_LANGUAGE),
    ("response-expires", properties::EXPIRES),
    ("response-cache-control", properties::CACHE_CONTROL),
    ("response-content-disposition", properties::CONTENT_DISPOSITION),
    ("response-content-encoding", properties::CONTENT_ENCODING),
];

/// Operation name logged for requests that matched no operation.
const UNROUTED: &str = "Unrouted";

/// Wrapper that implements [`S3Handler`] by delegating to [`ShoeboxS3`].
#[derive(Debug, Clone)]
pub struct ShoeboxHandler(pub ShoeboxS3);

impl S3Handler for ShoeboxHandler {
    fn handle_operation(
        &self,
        op: S3Operation,
        parts: http::request::Parts,
        body: RequestBody,
        ctx: RoutingContext,
        caller: Caller,
    ) -> HandlerFuture {
        let provider = self.0.clone();
        Box::pin(async move {
            authorize(&provider, &ctx, &caller).await?;
            if let Some(response) = missing_bucket_root(&provider, op, &ctx).await {
                return Ok(response);
            }
            dispatch(&provider, op, parts, body, &ctx, &caller).await
        })
    }

    fn observe(&self, call: &CallSummary<'_>) {
        let outcome = match call.error {
            None => CallOutcome::Success,
            Some(err) if err.is_rejection() => CallOutcome::Rejected,
            Some(_) => CallOutcome::Error,
        };
        self.0.call_log().record(CallRecord {
            timestamp: Utc::now(),
            operation: call.operation.map_or(UNROUTED, |op| op.as_str()).to_owned(),
            bucket: call.ctx.and_then(|ctx| ctx.bucket.clone()),
            key: call.ctx.and_then(|ctx| ctx.key.clone()),
            outcome,
            status: call.status.as_u16(),
            duration_ms: u64::try_from(call.elapsed.as_millis()).unwrap_or(u64::MAX),
            message: call.error.map(|e| e.message.clone()).unwrap_or_default(),
        });
    }
}

/// Signed and bypass callers pass. Anonymous callers pass when anonymous
/// access is enabled or the target bucket is public.
async fn authorize(
    provider: &ShoeboxS3,
    ctx: &RoutingContext,
    caller: &Caller,
) -> Result<(), S3Error> {
    if !matches!(caller, Caller::Anonymous) || provider.config().allow_anonymous {
        return Ok(());
    }
    if let Some(bucket) = ctx.bucket.as_deref() {
        if provider.is_bucket_public(bucket).await? {
            return Ok(());
        }
    }
    debug!(resource = %ctx.resource(), "anonymous request to private resource");
    Err(S3Error::access_denied(ctx.resource()))
}

/// `GET` or `HEAD` of `/bucket/` for a bucket that does not exist answers
/// an empty `200`.
async fn missing_bucket_root(
    provider: &ShoeboxS3,
    op: S3Operation,
    ctx: &RoutingContext,
) -> Option<http::Response<S3ResponseBody>> {
    let probing = matches!(
        op,
        S3Operation::HeadBucket | S3Operation::ListObjects | S3Operation::ListObjectsV2
    );
    if !probing || !ctx.trailing_slash {
        return None;
    }
    let bucket = ctx.bucket.as_deref()?;
    match provider.handle_head_bucket(bucket).await {
        Err(S3ServiceError::NoSuchBucket { .. }) => Some(empty_response(http::StatusCode::OK)),
        _ => None,
    }
}

#[allow(clippy::too_many_lines)]
async fn dispatch(
    provider: &ShoeboxS3,
    op: S3Operation,
    mut parts: http::request::Parts,
    body: RequestBody,
    ctx: &RoutingContext,
    caller: &Caller,
) -> Result<http::Response<S3ResponseBody>, S3Error> {
    strip_aws_chunked_encoding(&mut parts.headers);
    let headers = &parts.headers;
    let bucket = ctx.bucket.clone().unwrap_or_default();
    let key = ctx.key.clone().unwrap_or_default();

    match op {
        // --- Service / bucket operations ---
        S3Operation::ListBuckets => {
            xml_response("ListAllMyBucketsResult", &provider.handle_list_buckets().await?)
        }
        S3Operation::CreateBucket => {
            provider.handle_create_bucket(&bucket).await?;
            if let Some(acl) = header_str(headers, properties::AMZ_ACL) {
                provider.handle_put_bucket_acl(&bucket, Some(acl)).await?;
            }
            build_response(
                http::Response::builder().header(http::header::LOCATION, format!("/{bucket}")),
                S3ResponseBody::empty(),
            )
        }
        S3Operation::DeleteBucket => {
            provider.handle_delete_bucket(&bucket).await?;
            Ok(empty_response(http::StatusCode::NO_CONTENT))
        }
        S3Operation::HeadBucket => {
            provider.handle_head_bucket(&bucket).await?;
            Ok(empty_response(http::StatusCode::OK))
        }

        // --- Listing ---
        S3Operation::ListObjects => {
            let input = ListObjectsInput {
                bucket,
                prefix: query_owned(ctx, "prefix"),
                marker: query_owned(ctx, "marker"),
                delimiter: query_owned(ctx, "delimiter"),
                max_keys: parse_query(ctx, "max-keys")?,
            };
            xml_response("ListBucketResult", &provider.handle_list_objects(input).await?)
        }
        S3Operation::ListObjectsV2 => {
            let input = ListObjectsV2Input {
                bucket,
                prefix: query_owned(ctx, "prefix"),
                delimiter: query_owned(ctx, "delimiter"),
                max_keys: parse_query(ctx, "max-keys")?,
                continuation_token: query_owned(ctx, "continuation-token"),
                start_after: query_owned(ctx, "start-after"),
                fetch_owner: ctx.query("fetch-owner") == Some("true"),
            };
            xml_response(
                "ListBucketResult",
                &provider.handle_list_objects_v2(input).await?,
            )
        }
        S3Operation::ListMultipartUploads => xml_response(
            "ListMultipartUploadsResult",
            &provider.handle_list_multipart_uploads(&bucket).await?,
        ),

        // --- Bucket sub-resources ---
        S3Operation::GetBucketLocation => xml_response(
            "LocationConstraint",
            &provider.handle_get_bucket_location(&bucket).await?,
        ),
        S3Operation::GetBucketAcl => xml_response(
            "AccessControlPolicy",
            &provider.handle_get_bucket_acl(&bucket).await?,
        ),
        S3Operation::PutBucketAcl => {
            provider
                .handle_put_bucket_acl(&bucket, header_str(headers, properties::AMZ_ACL))
                .await?;
            Ok(empty_response(http::StatusCode::OK))
        }
        S3Operation::GetBucketCors => xml_response(
            "CORSConfiguration",
            &provider.handle_get_bucket_cors(&bucket).await?,
        ),
        S3Operation::GetBucketLifecycle => {
            provider.handle_get_bucket_lifecycle(&bucket).await?;
            Ok(empty_response(http::StatusCode::OK))
        }
        S3Operation::GetBucketPolicy => {
            provider.handle_get_bucket_policy(&bucket).await?;
            Ok(empty_response(http::StatusCode::OK))
        }
        S3Operation::GetBucketRequestPayment => xml_response(
            "RequestPaymentConfiguration",
            &provider.handle_get_bucket_request_payment(&bucket).await?,
        ),
        S3Operation::PutBucketCors
        | S3Operation::PutBucketLifecycle
        | S3Operation::PutBucketPolicy
        | S3Operation::PutBucketRequestPayment => {
            provider.handle_accept_bucket_config(&bucket, op.as_str()).await?;
            Ok(empty_response(http::StatusCode::OK))
        }
        S3Operation::DeleteBucketCors
        | S3Operation::DeleteBucketLifecycle
        | S3Operation::DeleteBucketPolicy => {
            provider.handle_accept_bucket_config(&bucket, op.as_str()).await?;
            Ok(empty_response(http::StatusCode::NO_CONTENT))
        }
        S3Operation::DeleteObjects => {
            let request: Delete = parse_xml_body(body).await?;
            xml_response(
                "DeleteResult",
                &provider.handle_delete_objects(&bucket, request).await?,
            )
        }

        // --- Objects ---
        S3Operation::PutObject => {
            let input = PutObjectInput {
                bucket,
                key,
                properties: capture_properties(headers),
                content_md5: header_str(headers, "content-md5").map(str::to_owned),
                content_length: declared_content_length(headers),
            };
            let etag = provider.handle_put_object(input, body).await?;
            etag_response(&etag)
        }
        S3Operation::GetObject => {
            let range = header_str(headers, http::header::RANGE.as_str());
            let output = provider.handle_get_object(&bucket, &key, range).await?;
            let status = if output.range.is_some() {
                http::StatusCode::PARTIAL_CONTENT
            } else {
                http::StatusCode::OK
            };
            let mut response = build_response(
                http::Response::builder()
                    .status(status)
                    .header(CONTENT_LENGTH, output.body.len),
                S3ResponseBody::from_file(output.body.file, output.body.len),
            )?;
            if let Some((start, end)) = output.range {
                insert_header(
                    response.headers_mut(),
                    http::header::CONTENT_RANGE.as_str(),
                    &format!("bytes {start}-{end}/{}", output.info.size),
                );
            }
            apply_object_headers(response.headers_mut(), &output.info, ctx, caller.is_signed());
            Ok(response)
        }
        S3Operation::HeadObject => {
            let info = provider.handle_head_object(&bucket, &key).await?;
            let mut response = build_response(
                http::Response::builder().header(CONTENT_LENGTH, info.size),
                S3ResponseBody::empty(),
            )?;
            apply_object_headers(response.headers_mut(), &info, ctx, caller.is_signed());
            Ok(response)
        }
        S3Operation::CopyObject => {
            let input = CopyObjectInput {
                bucket,
                key,
                copy_source: header_str(headers, "x-amz-copy-source")
                    .unwrap_or_default()
                    .to_owned(),
                replace_metadata: header_str(headers, "x-amz-metadata-directive")
                    .is_some_and(|d| d.eq_ignore_ascii_case("REPLACE")),
                properties: capture_properties(headers),
            };
            xml_response(
                "CopyObjectResult",
                &provider.handle_copy_object(input).await?,
            )
        }
        S3Operation::DeleteObject => {
            provider.handle_delete_object(&bucket, &key).await?;
            Ok(empty_response(http::StatusCode::NO_CONTENT))
        }
        S3Operation::GetObjectAcl => xml_response(
            "AccessControlPolicy",
            &provider.handle_get_object_acl(&bucket, &key).await?,
        ),
        S3Operation::PutObjectAcl => {
            provider
                .handle_put_object_acl(&bucket, &key, header_str(headers, properties::AMZ_ACL))
                .await?;
            Ok(empty_response(http::StatusCode::OK))
        }

        // --- Multipart ---
        S3Operation::CreateMultipartUpload => xml_response(
            "InitiateMultipartUploadResult",
            &provider
                .handle_create_multipart_upload(&bucket, &key, capture_properties(headers))
                .await?,
        ),
        S3Operation::UploadPart => {
            let input = UploadPartInput {
                bucket,
                key,
                upload_id: query_owned(ctx, "uploadId").unwrap_or_default(),
                part_number: query_owned(ctx, "partNumber").unwrap_or_default(),
                content_md5: header_str(headers, "content-md5").map(str::to_owned),
                content_length: declared_content_length(headers),
            };
            let etag = provider.handle_upload_part(input, body).await?;
            etag_response(&etag)
        }
        S3Operation::CompleteMultipartUpload => {
            let request: CompletedMultipartUpload = parse_xml_body(body).await?;
            let upload_id = ctx.query("uploadId").unwrap_or_default();
            xml_response(
                "CompleteMultipartUploadResult",
                &provider
                    .handle_complete_multipart_upload(&bucket, &key, upload_id, request)
                    .await?,
            )
        }
        S3Operation::ListParts => {
            let upload_id = ctx.query("uploadId").unwrap_or_default();
            let result = provider
                .handle_list_parts(
                    &bucket,
                    &key,
                    upload_id,
                    parse_query(ctx, "part-number-marker")?,
                    parse_query(ctx, "max-parts")?,
                )
                .await?;
            xml_response("ListPartsResult", &result)
        }
        S3Operation::AbortMultipartUpload => {
            let upload_id = ctx.query("uploadId").unwrap_or_default();
            provider
                .handle_abort_multipart_upload(&bucket, &key, upload_id)
                .await?;
            Ok(empty_response(http::StatusCode::NO_CONTENT))
        }
    }
}

/// A non-empty query parameter, owned.
fn query_owned(ctx: &RoutingContext, name: &str) -> Option<String> {
    ctx.query(name)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Parse a numeric query parameter.
fn parse_query<T: FromStr>(ctx: &RoutingContext, name: &str) -> Result<Option<T>, S3Error> {
    ctx.query(name)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse()
                .map_err(|_| S3Error::invalid_argument(format!("Invalid value for {name}: {v}")))
        })
        .transpose()
}

async fn parse_xml_body<T: S3Deserialize>(body: RequestBody) -> Result<T, S3Error> {
    let bytes = collect_body(body).await?;
    from_xml(&bytes).map_err(|e| S3Error::malformed_xml(e.to_string()))
}

/// Request headers kept with the object: the stored set plus user metadata.
fn capture_properties(headers: &http::HeaderMap) -> Properties {
    let mut props = Properties::new();
    for name in properties::STORED_HEADERS {
        if let Some(value) = header_str(headers, name) {
            props.set(*name, value);
        }
    }
    for (name, value) in headers {
        if name.as_str().starts_with(properties::AMZ_META_PREFIX) {
            if let Ok(value) = value.to_str() {
                props.set(name.as_str(), value);
            }
        }
    }
    props
}

fn etag_response(etag: &str) -> Result<http::Response<S3ResponseBody>, S3Error> {
    build_response(
        http::Response::builder().header(http::header::ETAG, etag),
        S3ResponseBody::empty(),
    )
}

/// Headers describing a stored object on `GET` and `HEAD`.
///
/// The `response-*` query overrides apply to signed requests only.
fn apply_object_headers(
    headers: &mut http::HeaderMap,
    info: &ObjectInfo,
    ctx: &RoutingContext,
    signed: bool,
) {
    let props = &info.properties;
    insert_header(
        headers,
        CONTENT_TYPE.as_str(),
        props.get(properties::CONTENT_TYPE).unwrap_or(DEFAULT_CONTENT_TYPE),
    );
    insert_header(headers, http::header::ETAG.as_str(), &info.etag);
    insert_header(
        headers,
        http::header::LAST_MODIFIED.as_str(),
        &http_date(&info.last_modified),
    );
    insert_header(headers, http::header::ACCEPT_RANGES.as_str(), "bytes");

    for name in SERVED_PROPERTIES {
        if let Some(value) = props.get(name) {
            insert_header(headers, name, value);
        }
    }
    for (name, value) in props.metadata() {
        insert_header(headers, name, value);
    }
    if !signed {
        return;
    }
    for (param, header) in RESPONSE_OVERRIDES {
        if let Some(value) = ctx.query(param) {
            insert_header(headers, header, value);
        }
    }
}

/// Insert a header, skipping names or values HTTP cannot carry.
fn insert_header(headers: &mut http::HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        headers.insert(name, value);
    }
}

/// RFC 1123 date, as used by `Last-Modified`.
fn http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
