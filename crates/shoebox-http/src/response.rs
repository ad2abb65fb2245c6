//! HTTP response builders.
//!
//! Every XML document goes out with `Content-Type: application/xml` and the
//! S3 namespace; failures become flat `<Error>` documents whose status is
//! taken from the error code.

use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use shoebox_model::error::S3Error;
use shoebox_xml::S3Serialize;

use crate::body::S3ResponseBody;

/// `Content-Type` of every XML response.
pub const XML_CONTENT_TYPE: &str = "application/xml";

/// Serialize `value` under `root` and wrap it in a `200 OK` response.
///
/// # Errors
///
/// Returns `InternalError` if serialization fails.
pub fn xml_response<T: S3Serialize>(
    root: &str,
    value: &T,
) -> Result<http::Response<S3ResponseBody>, S3Error> {
    let xml = shoebox_xml::to_xml(root, value).map_err(|e| {
        S3Error::internal_error(format!("Failed to serialize {root}")).with_source(e)
    })?;
    build_response(
        http::Response::builder()
            .status(http::StatusCode::OK)
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .header(CONTENT_LENGTH, xml.len()),
        S3ResponseBody::from_xml(xml),
    )
}

/// A response with no body.
#[must_use]
pub fn empty_response(status: http::StatusCode) -> http::Response<S3ResponseBody> {
    let mut response = http::Response::new(S3ResponseBody::empty());
    *response.status_mut() = status;
    response
}

/// Finish a response builder.
///
/// # Errors
///
/// Returns `InternalError` if a header set on the builder was invalid.
pub fn build_response(
    builder: http::response::Builder,
    body: S3ResponseBody,
) -> Result<http::Response<S3ResponseBody>, S3Error> {
    builder
        .body(body)
        .map_err(|e| S3Error::internal_error(format!("Failed to build response: {e}")))
}

/// Set an optional header on a response builder if the value is `Some` and
/// a valid header value.
#[must_use]
pub fn set_optional_header(
    builder: http::response::Builder,
    name: &str,
    value: Option<&str>,
) -> http::response::Builder {
    match value.and_then(|v| HeaderValue::from_str(v).ok()) {
        Some(hv) => builder.header(name, hv),
        None => builder,
    }
}

/// Convert an S3Error into an HTTP error response with an XML body.
#[must_use]
pub fn error_to_response(err: &S3Error, request_id: &str) -> http::Response<S3ResponseBody> {
    let xml = shoebox_xml::error_to_xml(
        err.code.as_str(),
        &err.message,
        err.resource.as_deref(),
        request_id,
    );

    http::Response::builder()
        .status(err.status_code)
        .header(CONTENT_TYPE, XML_CONTENT_TYPE)
        .header(CONTENT_LENGTH, xml.len())
        .body(S3ResponseBody::from_xml(xml))
        .unwrap_or_else(|_| empty_response(http::StatusCode::INTERNAL_SERVER_ERROR))
}
