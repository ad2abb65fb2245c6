//! Streaming decoder for AWS chunked transfer encoding.
//!
//! When S3 clients send a body with `Content-Encoding: aws-chunked` (or a
//! `STREAMING-*` payload hash) the payload is wrapped in a signed framing:
//!
//! ```text
//! <hex-size>;chunk-signature=<sig>\r\n
//! <data>\r\n
//! 0;chunk-signature=<sig>\r\n
//! [trailer headers\r\n]
//! \r\n
//! ```
//!
//! [`AwsChunkedStream`] strips that framing while the body is still arriving,
//! so object data reaches the disk without being buffered whole.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use futures::Stream;
use http::header::HeaderMap;

/// Upper bound on a chunk header line, signature included.
const MAX_HEADER_LINE: usize = 4096;

/// Return `true` if the request uses AWS chunked transfer encoding.
///
/// Detection checks:
/// - `Content-Encoding` header contains `aws-chunked`, OR
/// - `x-amz-content-sha256` starts with `STREAMING-`
#[must_use]
pub fn is_aws_chunked(headers: &HeaderMap) -> bool {
    let chunked_encoding = headers
        .get(http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|s| s.contains("aws-chunked"));
    let streaming_hash = headers
        .get("x-amz-content-sha256")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|s| s.starts_with("STREAMING-"));
    chunked_encoding || streaming_hash
}

/// Remove `aws-chunked` from the `Content-Encoding` header.
///
/// The encoding describes the transfer, not the object, and must not be
/// stored with it. If `aws-chunked` was the only value the header is removed.
pub fn strip_aws_chunked_encoding(headers: &mut HeaderMap) {
    let Some(value) = headers
        .get(http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
    else {
        return;
    };

    let remaining: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("aws-chunked"))
        .collect();

    if remaining.is_empty() {
        headers.remove(http::header::CONTENT_ENCODING);
    } else if let Ok(new_val) = http::header::HeaderValue::from_str(&remaining.join(", ")) {
        headers.insert(http::header::CONTENT_ENCODING, new_val);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    /// Waiting for a `<hex-size>[;ext]\r\n` line.
    Header,
    /// Inside a chunk with this many payload bytes left.
    Data(u64),
    /// Expecting the `\r\n` that closes a chunk.
    DataEnd,
    /// Past the terminating zero-size chunk; trailers are ignored.
    Done,
}

/// Incremental aws-chunked parser.
#[derive(Debug)]
struct ChunkDecoder {
    buf: BytesMut,
    state: ChunkState,
}

impl ChunkDecoder {
    fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            state: ChunkState::Header,
        }
    }

    fn push(&mut self, data: &[u8]) {
        if self.state != ChunkState::Done {
            self.buf.extend_from_slice(data);
        }
    }

    /// Next decoded payload slice, or `None` when more input is needed.
    fn next_payload(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            match self.state {
                ChunkState::Header => {
                    let Some(line_end) = find_crlf(&self.buf) else {
                        if self.buf.len() > MAX_HEADER_LINE {
                            return Err(malformed("chunk header line too long"));
                        }
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&self.buf[..line_end])?;
                    self.buf.advance(line_end + 2);
                    if size == 0 {
                        self.state = ChunkState::Done;
                        self.buf.clear();
                        return Ok(None);
                    }
                    self.state = ChunkState::Data(size);
                }
                ChunkState::Data(left) => {
                    if self.buf.is_empty() {
                        return Ok(None);
                    }
                    let available = self.buf.len();
                    let take = usize::try_from(left).map_or(available, |l| l.min(available));
                    let payload = self.buf.split_to(take).freeze();
                    let left = left - payload.len() as u64;
                    self.state = if left == 0 {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data(left)
                    };
                    return Ok(Some(payload));
                }
                ChunkState::DataEnd => {
                    if self.buf.len() < 2 {
                        return Ok(None);
                    }
                    if &self.buf[..2] != b"\r\n" {
                        return Err(malformed("chunk data not terminated by CRLF"));
                    }
                    self.buf.advance(2);
                    self.state = ChunkState::Header;
                }
                ChunkState::Done => return Ok(None),
            }
        }
    }

    /// Called once the underlying body has ended.
    fn finish(&mut self) -> io::Result<()> {
        if self.state == ChunkState::Done {
            return Ok(());
        }
        self.state = ChunkState::Done;
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "aws-chunked body ended before the final chunk",
        ))
    }
}

fn parse_chunk_size(line: &[u8]) -> io::Result<u64> {
    let line = std::str::from_utf8(line).map_err(|_| malformed("chunk header is not UTF-8"))?;
    let size = line.split(';').next().unwrap_or("").trim();
    u64::from_str_radix(size, 16).map_err(|_| malformed("invalid chunk size"))
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn malformed(reason: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("malformed aws-chunked body: {reason}"),
    )
}

pin_project_lite::pin_project! {
    /// A body stream with aws-chunked framing removed.
    #[derive(Debug)]
    pub struct AwsChunkedStream<S> {
        #[pin]
        inner: S,
        decoder: ChunkDecoder,
        inner_done: bool,
        finished: bool,
    }
}

impl<S> AwsChunkedStream<S> {
    /// Wrap a framed body stream.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: ChunkDecoder::new(),
            inner_done: false,
            finished: false,
        }
    }
}

impl<S> Stream for AwsChunkedStream<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.finished {
            return Poll::Ready(None);
        }

        loop {
            match this.decoder.next_payload() {
                Ok(Some(payload)) => return Poll::Ready(Some(Ok(payload))),
                Ok(None) => {}
                Err(e) => {
                    *this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }

            if *this.inner_done {
                *this.finished = true;
                return Poll::Ready(this.decoder.finish().err().map(Err));
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => this.decoder.push(&data),
                Poll::Ready(Some(Err(e))) => {
                    *this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => *this.inner_done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, TryStreamExt, stream};

    use super::*;

    fn decode(pieces: Vec<&'static [u8]>) -> io::Result<Vec<u8>> {
        let inner = stream::iter(pieces.into_iter().map(|p| Ok(Bytes::from_static(p))));
        tokio_test::block_on(AwsChunkedStream::new(inner).try_fold(
            Vec::new(),
            |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            },
        ))
    }

    const SIGNED: &[u8] = b"5;chunk-signature=abc\r\nhello\r\n\
        6;chunk-signature=def\r\n world\r\n\
        0;chunk-signature=000\r\n\r\n";

    #[test]
    fn test_should_decode_single_buffer() {
        assert_eq!(decode(vec![SIGNED]).unwrap(), b"hello world");
    }

    #[test]
    fn test_should_decode_across_arbitrary_splits() {
        for split in 1..SIGNED.len() {
            let (a, b) = SIGNED.split_at(split);
            assert_eq!(decode(vec![a, b]).unwrap(), b"hello world", "split at {split}");
        }
    }

    #[test]
    fn test_should_decode_unsigned_chunks_with_trailer() {
        let body: &[u8] = b"3\r\nabc\r\n0\r\nx-amz-checksum-crc32:AAAAAA==\r\n\r\n";
        assert_eq!(decode(vec![body]).unwrap(), b"abc");
    }

    #[test]
    fn test_should_fail_on_truncated_body() {
        let err = decode(vec![b"5;chunk-signature=abc\r\nhel"]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_should_fail_on_invalid_size() {
        let err = decode(vec![b"zz\r\nabc\r\n"]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_should_fail_on_missing_chunk_terminator() {
        let err = decode(vec![b"3\r\nabcXX0\r\n\r\n"]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_should_end_after_error() {
        let inner = stream::iter(vec![Ok(Bytes::from_static(b"zz\r\n"))]);
        let mut decoded = AwsChunkedStream::new(inner);
        tokio_test::block_on(async {
            assert!(decoded.next().await.unwrap().is_err());
            assert!(decoded.next().await.is_none());
        });
    }

    #[test]
    fn test_should_detect_aws_chunked() {
        let mut headers = HeaderMap::new();
        assert!(!is_aws_chunked(&headers));
        headers.insert(
            "x-amz-content-sha256",
            "STREAMING-AWS4-HMAC-SHA256-PAYLOAD".parse().unwrap(),
        );
        assert!(is_aws_chunked(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_ENCODING,
            "aws-chunked,gzip".parse().unwrap(),
        );
        assert!(is_aws_chunked(&headers));
    }

    #[test]
    fn test_should_strip_aws_chunked_encoding() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_ENCODING,
            "aws-chunked,gzip".parse().unwrap(),
        );
        strip_aws_chunked_encoding(&mut headers);
        assert_eq!(headers.get(http::header::CONTENT_ENCODING).unwrap(), "gzip");

        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_ENCODING, "aws-chunked".parse().unwrap());
        strip_aws_chunked_encoding(&mut headers);
        assert!(headers.get(http::header::CONTENT_ENCODING).is_none());
    }
}
