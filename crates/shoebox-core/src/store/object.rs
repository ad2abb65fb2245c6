//! A single stored object: data file plus properties sidecar.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{S3ServiceError, S3ServiceResult};
use crate::keys;
use crate::properties::{self, Properties};

use super::migration::sidecar_name;

/// Read buffer used when hashing or copying files.
pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// WriteResult
// ---------------------------------------------------------------------------

/// Outcome of streaming a body to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// Unquoted hex MD5 of the written bytes.
    pub md5_hex: String,
    /// Number of bytes written.
    pub size: u64,
}

impl WriteResult {
    /// The quoted ETag.
    #[must_use]
    pub fn etag(&self) -> String {
        crate::checksums::quote_etag(&self.md5_hex)
    }
}

/// Why [`write_stream`] stopped.
#[derive(Debug)]
pub(crate) enum StreamWriteError {
    /// The body stream failed after `received` bytes.
    Body { error: io::Error, received: u64 },
    /// The destination file failed.
    File(io::Error),
}

/// Copy every chunk of `body` into `file`, hashing as it goes.
pub(crate) async fn write_stream<S>(
    file: &mut tokio::fs::File,
    mut body: S,
) -> Result<WriteResult, StreamWriteError>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    let mut hasher = Md5::new();
    let mut size = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|error| StreamWriteError::Body {
            error,
            received: size,
        })?;
        hasher.update(&chunk);
        file.write_all(&chunk).await.map_err(StreamWriteError::File)?;
        size += chunk.len() as u64;
    }
    file.flush().await.map_err(StreamWriteError::File)?;
    Ok(WriteResult {
        md5_hex: hex::encode(hasher.finalize()),
        size,
    })
}

/// Hex MD5 of a file, read in [`CHUNK_SIZE`] blocks.
pub(crate) async fn md5_file(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// StoredObject
// ---------------------------------------------------------------------------

/// Handle to an object that may or may not exist yet.
#[derive(Debug, Clone)]
pub struct StoredObject {
    key: String,
    data_path: PathBuf,
    props_path: PathBuf,
}

impl StoredObject {
    pub(crate) fn new(bucket_dir: &Path, key: &str) -> Self {
        let encoded = keys::encode(key);
        Self {
            key: key.to_owned(),
            props_path: bucket_dir.join(sidecar_name(&encoded)),
            data_path: bucket_dir.join(encoded),
        }
    }

    /// The object key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Path of the data file.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Whether the data file exists.
    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.data_path)
            .await
            .is_ok_and(|m| m.is_file())
    }

    async fn metadata(&self) -> S3ServiceResult<std::fs::Metadata> {
        match tokio::fs::metadata(&self.data_path).await {
            Ok(m) if m.is_file() => Ok(m),
            Ok(_) => Err(self.not_found()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(self.not_found()),
            Err(e) => Err(e.into()),
        }
    }

    fn not_found(&self) -> S3ServiceError {
        S3ServiceError::NoSuchKey {
            key: self.key.clone(),
        }
    }

    /// Size of the data file in bytes.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchKey`] when the object does not exist.
    pub async fn size(&self) -> S3ServiceResult<u64> {
        Ok(self.metadata().await?.len())
    }

    /// Modification time of the data file.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchKey`] when the object does not exist.
    pub async fn last_modified(&self) -> S3ServiceResult<DateTime<Utc>> {
        let modified = self.metadata().await?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }

    /// Stored properties; empty when the sidecar is missing.
    ///
    /// # Errors
    ///
    /// Any I/O error other than a missing sidecar.
    pub async fn properties(&self) -> S3ServiceResult<Properties> {
        Ok(Properties::load(&self.props_path).await?.unwrap_or_default())
    }

    /// Replace the sidecar. Concurrent writers race; the last rename wins.
    ///
    /// # Errors
    ///
    /// Any I/O error.
    pub async fn store_properties(&self, props: &Properties) -> S3ServiceResult<()> {
        props.save(&self.props_path).await?;
        Ok(())
    }

    /// Store the properties of a freshly written object.
    ///
    /// An object whose sidecar cannot be written is deleted again, so no data
    /// file is left without its properties.
    ///
    /// # Errors
    ///
    /// Any I/O error writing the sidecar.
    pub async fn commit_properties(&self, props: &Properties) -> S3ServiceResult<()> {
        match self.store_properties(props).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.discard(&e).await;
                Err(e)
            }
        }
    }

    /// Unquoted hex ETag, computed and persisted when the sidecar lacks one.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchKey`] when the object does not exist.
    pub async fn etag(&self) -> S3ServiceResult<String> {
        let mut props = self.properties().await?;
        if let Some(etag) = props.get(properties::ETAG) {
            return Ok(etag.to_owned());
        }
        let md5 = match md5_file(&self.data_path).await {
            Ok(md5) => md5,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(self.not_found()),
            Err(e) => return Err(e.into()),
        };
        debug!(key = %self.key, etag = %md5, "backfilling etag");
        props.set(properties::ETAG, md5.clone());
        self.store_properties(&props).await?;
        Ok(md5)
    }

    /// Remove the data file and the sidecar.
    ///
    /// Returns whether the data file existed.
    ///
    /// # Errors
    ///
    /// Any I/O error removing the data file.
    pub async fn delete(&self) -> S3ServiceResult<bool> {
        let existed = match tokio::fs::remove_file(&self.data_path).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = tokio::fs::remove_file(&self.props_path).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(key = %self.key, error = %e, "failed to remove properties sidecar");
            }
        }
        Ok(existed)
    }

    /// Stream `body` into the data file.
    ///
    /// The object is deleted again when the body is shorter than
    /// `expected_len` or its MD5 differs from `expected_md5` (hex).
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::IncompleteBody`], [`S3ServiceError::BadDigest`], or
    /// an I/O error.
    pub async fn write<S>(
        &self,
        body: S,
        expected_len: Option<u64>,
        expected_md5: Option<&str>,
    ) -> S3ServiceResult<WriteResult>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        let mut file = tokio::fs::File::create(&self.data_path).await?;
        let outcome = write_stream(&mut file, body).await;
        drop(file);

        let failure = match outcome {
            Ok(result) => match (expected_len, expected_md5) {
                (Some(expected), _) if result.size < expected => S3ServiceError::IncompleteBody {
                    expected,
                    received: result.size,
                },
                (_, Some(md5)) if !md5.eq_ignore_ascii_case(&result.md5_hex) => {
                    S3ServiceError::BadDigest
                }
                _ => return Ok(result),
            },
            Err(StreamWriteError::Body { error, received }) => match expected_len {
                Some(expected) => {
                    debug!(key = %self.key, error = %error, "request body ended early");
                    S3ServiceError::IncompleteBody { expected, received }
                }
                None => S3ServiceError::Io(error),
            },
            Err(StreamWriteError::File(e)) => S3ServiceError::Io(e),
        };

        self.discard(&failure).await;
        Err(failure)
    }

    async fn discard(&self, reason: &S3ServiceError) {
        warn!(key = %self.key, error = %reason, "discarding rejected upload");
        if let Err(e) = self.delete().await {
            warn!(key = %self.key, error = %e, "failed to discard rejected upload");
        }
    }

    /// Open the data file positioned at `offset`.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchKey`] when the object does not exist.
    pub async fn open(&self, offset: u64) -> S3ServiceResult<tokio::fs::File> {
        let mut file = match tokio::fs::File::open(&self.data_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(self.not_found()),
            Err(e) => return Err(e.into()),
        };
        if offset > 0 {
            file.seek(io::SeekFrom::Start(offset)).await?;
        }
        Ok(file)
    }

    /// Read the whole object into memory. Intended for small objects.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchKey`] when the object does not exist.
    pub async fn read_all(&self) -> S3ServiceResult<Vec<u8>> {
        let mut file = self.open(0).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Copy the data file and sidecar onto `target`.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchKey`] when this object does not exist.
    pub async fn copy_to(&self, target: &StoredObject) -> S3ServiceResult<()> {
        if self.data_path == target.data_path {
            return Ok(());
        }
        match tokio::fs::copy(&self.data_path, &target.data_path).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(self.not_found()),
            Err(e) => return Err(e.into()),
        }
        let props = self.properties().await?;
        target.commit_properties(&props).await
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;
    use crate::checksums::compute_md5;

    fn body(chunks: &[&'static [u8]]) -> impl Stream<Item = io::Result<Bytes>> + Unpin {
        stream::iter(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_should_write_and_read_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let obj = StoredObject::new(dir.path(), "a/b c.txt");

        let result = obj
            .write(body(&[b"hel", b"lo"]), Some(5), None)
            .await
            .expect("write");

        assert_eq!(result.size, 5);
        assert_eq!(result.md5_hex, compute_md5(b"hello"));
        assert!(dir.path().join("a%2Fb%20c.txt").exists());
        assert_eq!(obj.read_all().await.expect("read"), b"hello");
        assert_eq!(obj.size().await.expect("size"), 5);
    }

    #[tokio::test]
    async fn test_should_delete_object_on_bad_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let obj = StoredObject::new(dir.path(), "k");

        let err = obj
            .write(body(&[b"hello"]), None, Some(&compute_md5(b"other")))
            .await
            .expect_err("digest mismatch");

        assert!(matches!(err, S3ServiceError::BadDigest));
        assert!(!obj.exists().await);
    }

    #[tokio::test]
    async fn test_should_delete_object_on_short_body() {
        let dir = tempfile::tempdir().expect("tempdir");
        let obj = StoredObject::new(dir.path(), "k");

        let err = obj
            .write(body(&[b"hel"]), Some(5), None)
            .await
            .expect_err("short body");

        assert!(matches!(
            err,
            S3ServiceError::IncompleteBody {
                expected: 5,
                received: 3
            }
        ));
        assert!(!obj.exists().await);
    }

    #[tokio::test]
    async fn test_should_treat_body_error_as_incomplete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let obj = StoredObject::new(dir.path(), "k");
        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "reset")),
        ]);

        let err = obj.write(failing, Some(4), None).await.expect_err("reset");
        assert!(matches!(err, S3ServiceError::IncompleteBody { received: 2, .. }));
        assert!(!obj.exists().await);
    }

    #[tokio::test]
    async fn test_should_backfill_missing_etag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let obj = StoredObject::new(dir.path(), "k");
        tokio::fs::write(obj.data_path(), b"hello").await.expect("write");

        assert_eq!(obj.etag().await.expect("etag"), compute_md5(b"hello"));
        let props = obj.properties().await.expect("props");
        assert_eq!(props.get(properties::ETAG), Some(compute_md5(b"hello").as_str()));
    }

    #[tokio::test]
    async fn test_should_report_missing_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let obj = StoredObject::new(dir.path(), "missing");
        assert!(matches!(obj.size().await, Err(S3ServiceError::NoSuchKey { .. })));
        assert!(matches!(obj.etag().await, Err(S3ServiceError::NoSuchKey { .. })));
        assert!(!obj.delete().await.expect("delete"));
    }

    #[tokio::test]
    async fn test_should_open_at_offset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let obj = StoredObject::new(dir.path(), "k");
        tokio::fs::write(obj.data_path(), b"0123456789").await.expect("write");

        let mut file = obj.open(6).await.expect("open");
        let mut rest = String::new();
        file.read_to_string(&mut rest).await.expect("read");
        assert_eq!(rest, "6789");
    }

    #[tokio::test]
    async fn test_should_copy_data_and_properties() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = StoredObject::new(dir.path(), "src");
        let dst = StoredObject::new(dir.path(), "dst");
        src.write(body(&[b"data"]), None, None).await.expect("write");
        let mut props = Properties::new();
        props.set("x-amz-meta-k", "v");
        src.store_properties(&props).await.expect("props");

        src.copy_to(&dst).await.expect("copy");

        assert_eq!(dst.read_all().await.expect("read"), b"data");
        assert_eq!(dst.properties().await.expect("props"), props);
    }

    #[tokio::test]
    async fn test_should_discard_object_when_properties_cannot_be_stored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let obj = StoredObject::new(dir.path(), "k");
        obj.write(body(&[b"data"]), None, None).await.expect("write");
        std::fs::create_dir(dir.path().join(sidecar_name("k"))).expect("occupy sidecar");

        let mut props = Properties::new();
        props.set(properties::ETAG, compute_md5(b"data"));
        assert!(obj.commit_properties(&props).await.is_err());
        assert!(!obj.exists().await);
    }
}
