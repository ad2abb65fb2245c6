//! Request body streaming and header helpers.
//!
//! Object payloads are never collected up front: the service hands the
//! handler a [`RequestBody`], a stream of `Bytes` chunks in the order they
//! arrive, with `aws-chunked` framing already removed. Small XML documents
//! (`CompleteMultipartUpload`, `DeleteObjects`) are gathered with
//! [`collect_body`].

use std::io;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use http_body_util::BodyExt;
use shoebox_model::error::{S3Error, S3ErrorCode};

use crate::codec::{AwsChunkedStream, is_aws_chunked};

/// A streamed request body.
pub type RequestBody = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Largest XML request document accepted.
pub const MAX_XML_BODY: usize = 2 * 1024 * 1024;

/// Turn any HTTP body into a [`RequestBody`], decoding aws-chunked framing
/// when the headers announce it.
pub fn body_stream<B>(headers: &http::HeaderMap, body: B) -> RequestBody
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let raw = body.into_data_stream().map_err(io::Error::other);
    if is_aws_chunked(headers) {
        Box::pin(AwsChunkedStream::new(raw))
    } else {
        Box::pin(raw)
    }
}

/// An empty request body.
#[must_use]
pub fn empty_body() -> RequestBody {
    Box::pin(futures::stream::empty())
}

/// Gather a small request body into memory.
///
/// # Errors
///
/// `IncompleteBody` if the body fails mid-stream and `InvalidRequest` if it
/// exceeds [`MAX_XML_BODY`].
pub async fn collect_body(mut body: RequestBody) -> Result<Bytes, S3Error> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| {
            S3Error::with_message(S3ErrorCode::IncompleteBody, e.to_string()).with_source(e)
        })?;
        if buf.len() + chunk.len() > MAX_XML_BODY {
            return Err(S3Error::invalid_request("Request document is too large"));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// A header value as a string, ignoring non-UTF-8 values.
#[must_use]
pub fn header_str<'a>(headers: &'a http::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// The decoded payload length: `x-amz-decoded-content-length` for
/// aws-chunked bodies, otherwise `Content-Length`.
#[must_use]
pub fn declared_content_length(headers: &http::HeaderMap) -> Option<u64> {
    header_str(headers, "x-amz-decoded-content-length")
        .or_else(|| header_str(headers, http::header::CONTENT_LENGTH.as_str()))
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use http_body_util::Full;

    use super::*;

    #[tokio::test]
    async fn test_should_stream_plain_body() {
        let headers = http::HeaderMap::new();
        let body = body_stream(&headers, Full::new(Bytes::from_static(b"hello")));
        assert_eq!(collect_body(body).await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_should_decode_aws_chunked_body() {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_ENCODING,
            "aws-chunked".parse().unwrap(),
        );
        let framed = b"2;chunk-signature=x\r\nhi\r\n0;chunk-signature=y\r\n\r\n";
        let body = body_stream(&headers, Full::new(Bytes::from_static(framed)));
        assert_eq!(collect_body(body).await.unwrap(), Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn test_should_report_broken_body_as_incomplete() {
        let body: RequestBody = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]));
        let err = collect_body(body).await.unwrap_err();
        assert_eq!(err.code, S3ErrorCode::IncompleteBody);
    }

    #[tokio::test]
    async fn test_should_collect_empty_body() {
        assert!(collect_body(empty_body()).await.unwrap().is_empty());
    }

    #[test]
    fn test_should_prefer_decoded_content_length() {
        let mut headers = http::HeaderMap::new();
        assert_eq!(declared_content_length(&headers), None);
        headers.insert(http::header::CONTENT_LENGTH, "120".parse().unwrap());
        assert_eq!(declared_content_length(&headers), Some(120));
        headers.insert("x-amz-decoded-content-length", "5".parse().unwrap());
        assert_eq!(declared_content_length(&headers), Some(5));
    }
}
