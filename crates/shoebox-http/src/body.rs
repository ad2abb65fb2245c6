//! S3 response body types supporting buffered, file-backed and empty modes.
//!
//! - **Buffered**: XML payloads, error bodies and other small responses.
//! - **File**: object data read from an open data file in 64 KiB frames, so
//!   large objects are never held in memory.
//! - **Empty**: 204 responses, `HEAD` responses and header-only writes.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::Full;
use tokio::io::{AsyncRead, ReadBuf};

/// Size of each frame read from an object file.
pub const FILE_FRAME_SIZE: usize = 64 * 1024;

/// S3 response body.
///
/// Implements [`http_body::Body`] so it can be used directly with hyper responses.
#[derive(Debug, Default)]
pub enum S3ResponseBody {
    /// Buffered body for small responses.
    Buffered(Full<Bytes>),
    /// Object data streamed from disk.
    File(FileBody),
    /// Empty body.
    #[default]
    Empty,
}

impl S3ResponseBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Create a buffered body from an XML byte vector.
    #[must_use]
    pub fn from_xml(xml: Vec<u8>) -> Self {
        Self::Buffered(Full::new(Bytes::from(xml)))
    }

    /// Stream `len` bytes from `file`, starting at its current position.
    #[must_use]
    pub fn from_file(file: tokio::fs::File, len: u64) -> Self {
        Self::File(FileBody::new(file, len))
    }
}

impl http_body::Body for S3ResponseBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::File(file) => file
                .poll_data(cx)
                .map(|opt| opt.map(|r| r.map(http_body::Frame::data))),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::File(file) => file.remaining == 0,
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::File(file) => http_body::SizeHint::with_exact(file.remaining),
            Self::Empty => http_body::SizeHint::with_exact(0),
        }
    }
}

/// A bounded read of an open object file.
#[derive(Debug)]
pub struct FileBody {
    file: tokio::fs::File,
    remaining: u64,
    scratch: Vec<u8>,
}

impl FileBody {
    fn new(file: tokio::fs::File, len: u64) -> Self {
        Self {
            file,
            remaining: len,
            scratch: Vec::new(),
        }
    }

    fn poll_data(&mut self, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        if self.remaining == 0 {
            return Poll::Ready(None);
        }

        let want =
            usize::try_from(self.remaining).map_or(FILE_FRAME_SIZE, |r| r.min(FILE_FRAME_SIZE));
        if self.scratch.len() < want {
            self.scratch.resize(want, 0);
        }

        let mut buf = ReadBuf::new(&mut self.scratch[..want]);
        match Pin::new(&mut self.file).poll_read(cx, &mut buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
            Poll::Ready(Ok(())) => {
                let filled = buf.filled();
                if filled.is_empty() {
                    // The file shrank after the length was taken.
                    self.remaining = 0;
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "object file ended before the announced length",
                    ))));
                }
                let chunk = Bytes::copy_from_slice(filled);
                self.remaining -= chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
        }
    }
}
