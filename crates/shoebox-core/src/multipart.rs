//! Multipart upload manager.
//!
//! Each upload gets a decimal id from a per-instance counter starting at 1
//! and a staging directory `<root>/<id>/` holding one file per part, named by
//! its decimal part number. Completion concatenates the parts in ascending
//! order into `<root>/<id>/assembled` and renames it onto the target object.
//!
//! Active uploads live in a [`DashMap`] owned by the manager. Removing the
//! entry is the point of no return for `complete`, so two concurrent
//! completions of the same id produce exactly one object.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::Stream;
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{S3ServiceError, S3ServiceResult};
use crate::properties::{self, Properties};
use crate::store::{CHUNK_SIZE, StoredObject, StreamWriteError, WriteResult, write_stream};

/// Smallest valid part number.
pub const MIN_PART_NUMBER: u32 = 1;
/// Largest valid part number.
pub const MAX_PART_NUMBER: u32 = 10_000;

const ASSEMBLED_FILE: &str = "assembled";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// State of one in-flight upload.
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Target bucket.
    pub bucket: String,
    /// Target key.
    pub key: String,
    /// Properties applied to the assembled object.
    pub properties: Properties,
    /// When the upload was initiated.
    pub initiated: DateTime<Utc>,
    /// Hex MD5 of each staged part.
    pub part_etags: BTreeMap<u32, String>,
}

/// A staged part as reported by [`MultipartManager::list_parts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    /// Part number.
    pub part_number: u32,
    /// Part size in bytes.
    pub size: u64,
    /// Unquoted hex MD5.
    pub etag: String,
    /// When the part was written.
    pub last_modified: DateTime<Utc>,
}

/// One page of parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartsPage {
    /// Parts in ascending order.
    pub parts: Vec<PartInfo>,
    /// More parts remain after this page.
    pub is_truncated: bool,
    /// Marker for the next page, when truncated.
    pub next_part_number_marker: Option<u32>,
}

/// An in-flight upload as reported by [`MultipartManager::list_uploads`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    /// Upload id.
    pub upload_id: u64,
    /// Target key.
    pub key: String,
    /// When the upload was initiated.
    pub initiated: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Owner of all staging directories under the multipart root.
#[derive(Debug)]
pub struct MultipartManager {
    root: PathBuf,
    next_id: AtomicU64,
    uploads: DashMap<u64, UploadSession>,
}

impl MultipartManager {
    /// Open the manager, purging staging left over by a previous process.
    ///
    /// # Errors
    ///
    /// Any I/O error creating or listing the root.
    pub async fn open(root: impl Into<PathBuf>) -> S3ServiceResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => debug!(path = %path.display(), "purged stale multipart staging"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to purge stale staging"),
            }
        }

        Ok(Self {
            root,
            next_id: AtomicU64::new(1),
            uploads: DashMap::new(),
        })
    }

    fn staging_dir(&self, upload_id: u64) -> PathBuf {
        self.root.join(upload_id.to_string())
    }

    fn no_such_upload(upload_id: u64) -> S3ServiceError {
        S3ServiceError::NoSuchUpload {
            upload_id: upload_id.to_string(),
        }
    }

    /// Start an upload and return its id.
    ///
    /// # Errors
    ///
    /// Any I/O error creating the staging directory.
    pub async fn initiate(
        &self,
        bucket: &str,
        key: &str,
        properties: Properties,
    ) -> S3ServiceResult<u64> {
        let upload_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tokio::fs::create_dir_all(self.staging_dir(upload_id)).await?;
        self.uploads.insert(
            upload_id,
            UploadSession {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                properties,
                initiated: Utc::now(),
                part_etags: BTreeMap::new(),
            },
        );
        info!(upload_id, bucket, key, "multipart upload initiated");
        Ok(upload_id)
    }

    /// Snapshot of an active upload.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchUpload`].
    pub fn session(&self, upload_id: u64) -> S3ServiceResult<UploadSession> {
        self.uploads
            .get(&upload_id)
            .map(|s| s.clone())
            .ok_or_else(|| Self::no_such_upload(upload_id))
    }

    /// Stage one part and return its hex MD5.
    ///
    /// Re-uploading a part number replaces the earlier part. A short body or
    /// a digest mismatch leaves any earlier part in place.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::InvalidArgument`] for part numbers outside
    /// `1..=10000`, [`S3ServiceError::NoSuchUpload`] if the upload is not
    /// active, [`S3ServiceError::IncompleteBody`],
    /// [`S3ServiceError::BadDigest`], or an I/O error.
    pub async fn upload_part<S>(
        &self,
        upload_id: u64,
        part_number: u32,
        body: S,
        expected_len: Option<u64>,
        expected_md5: Option<&str>,
    ) -> S3ServiceResult<WriteResult>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        if !(MIN_PART_NUMBER..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(S3ServiceError::invalid_argument(format!(
                "Part number must be an integer between {MIN_PART_NUMBER} and {MAX_PART_NUMBER}, inclusive"
            )));
        }
        if !self.uploads.contains_key(&upload_id) {
            return Err(Self::no_such_upload(upload_id));
        }

        let dir = self.staging_dir(upload_id);
        let tmp = dir.join(format!("$tmp-{}", uuid::Uuid::new_v4()));
        let mut file = match tokio::fs::File::create(&tmp).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Self::no_such_upload(upload_id));
            }
            Err(e) => return Err(e.into()),
        };
        let outcome = write_stream(&mut file, body).await;
        drop(file);

        let result = match (outcome, expected_len) {
            (Ok(r), Some(expected)) if r.size < expected => Err(S3ServiceError::IncompleteBody {
                expected,
                received: r.size,
            }),
            (Ok(r), _) if expected_md5.is_some_and(|m| !m.eq_ignore_ascii_case(&r.md5_hex)) => {
                Err(S3ServiceError::BadDigest)
            }
            (Ok(r), _) => Ok(r),
            (Err(StreamWriteError::Body { received, .. }), Some(expected)) => {
                Err(S3ServiceError::IncompleteBody { expected, received })
            }
            (Err(StreamWriteError::Body { error, .. }), None) => Err(S3ServiceError::Io(error)),
            (Err(StreamWriteError::File(e)), _) => Err(S3ServiceError::Io(e)),
        };

        let result = match result {
            Ok(r) => r,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e);
            }
        };

        let part_path = dir.join(part_number.to_string());
        if let Err(e) = tokio::fs::rename(&tmp, &part_path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(if e.kind() == io::ErrorKind::NotFound {
                Self::no_such_upload(upload_id)
            } else {
                e.into()
            });
        }

        match self.uploads.get_mut(&upload_id) {
            Some(mut session) => {
                session.part_etags.insert(part_number, result.md5_hex.clone());
            }
            None => return Err(Self::no_such_upload(upload_id)),
        }

        debug!(upload_id, part_number, size = result.size, "part uploaded");
        Ok(result)
    }

    /// Parts with numbers greater than `marker`, at most `max_parts`.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchUpload`] or an I/O error.
    pub async fn list_parts(
        &self,
        upload_id: u64,
        marker: u32,
        max_parts: usize,
    ) -> S3ServiceResult<PartsPage> {
        let session = self.session(upload_id)?;
        let dir = self.staging_dir(upload_id);

        let mut page = PartsPage::default();
        for (&part_number, etag) in session.part_etags.range(marker.saturating_add(1)..) {
            if page.parts.len() == max_parts {
                page.is_truncated = true;
                break;
            }
            let meta = match tokio::fs::metadata(dir.join(part_number.to_string())).await {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            page.parts.push(PartInfo {
                part_number,
                size: meta.len(),
                etag: etag.clone(),
                last_modified: DateTime::<Utc>::from(meta.modified()?),
            });
        }
        if page.is_truncated {
            page.next_part_number_marker = page.parts.last().map(|p| p.part_number);
        }
        Ok(page)
    }

    /// Assemble the listed parts onto `target`.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchUpload`] if the upload is not active (including
    /// when another completion won the race), [`S3ServiceError::InvalidPart`]
    /// if a listed part was never staged, [`S3ServiceError::MalformedXml`] for
    /// an empty part list, or an I/O error. On `InvalidPart` and I/O errors
    /// the upload stays active.
    pub async fn complete(
        &self,
        upload_id: u64,
        part_numbers: &[u32],
        target: &StoredObject,
    ) -> S3ServiceResult<WriteResult> {
        let (_, session) = self
            .uploads
            .remove(&upload_id)
            .ok_or_else(|| Self::no_such_upload(upload_id))?;

        let mut numbers = part_numbers.to_vec();
        numbers.sort_unstable();
        numbers.dedup();

        match self.assemble(upload_id, &numbers, target, &session).await {
            Ok(result) => {
                let dir = self.staging_dir(upload_id);
                if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                    warn!(upload_id, error = %e, "failed to remove multipart staging");
                }
                info!(
                    upload_id,
                    bucket = %session.bucket,
                    key = %session.key,
                    parts = numbers.len(),
                    size = result.size,
                    "multipart upload completed"
                );
                Ok(result)
            }
            Err(e) => {
                self.uploads.insert(upload_id, session);
                Err(e)
            }
        }
    }

    async fn assemble(
        &self,
        upload_id: u64,
        numbers: &[u32],
        target: &StoredObject,
        session: &UploadSession,
    ) -> S3ServiceResult<WriteResult> {
        if numbers.is_empty() {
            return Err(S3ServiceError::MalformedXml {
                message: "You must specify at least one part".to_owned(),
            });
        }

        let dir = self.staging_dir(upload_id);
        for &n in numbers {
            if !tokio::fs::try_exists(dir.join(n.to_string())).await? {
                return Err(S3ServiceError::InvalidPart { part_number: n });
            }
        }

        let assembled = dir.join(ASSEMBLED_FILE);
        let result = concatenate(&dir, numbers, &assembled).await?;
        move_file(&assembled, target.data_path()).await?;

        let mut props = session.properties.clone();
        props.set(properties::ETAG, result.md5_hex.clone());
        target.commit_properties(&props).await?;
        Ok(result)
    }

    /// Discard an upload. Unknown ids are accepted.
    ///
    /// # Errors
    ///
    /// Any I/O error other than a missing staging directory.
    pub async fn abort(&self, upload_id: u64) -> S3ServiceResult<()> {
        let existed = self.uploads.remove(&upload_id).is_some();
        if let Err(e) = tokio::fs::remove_dir_all(self.staging_dir(upload_id)).await {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        debug!(upload_id, existed, "multipart upload aborted");
        Ok(())
    }

    /// Active uploads targeting `bucket`, ordered by key then id.
    #[must_use]
    pub fn list_uploads(&self, bucket: &str) -> Vec<UploadInfo> {
        let mut uploads: Vec<UploadInfo> = self
            .uploads
            .iter()
            .filter(|e| e.value().bucket == bucket)
            .map(|e| UploadInfo {
                upload_id: *e.key(),
                key: e.value().key.clone(),
                initiated: e.value().initiated,
            })
            .collect();
        uploads.sort_by(|a, b| a.key.cmp(&b.key).then(a.upload_id.cmp(&b.upload_id)));
        uploads
    }
}

async fn concatenate(dir: &Path, numbers: &[u32], out: &Path) -> io::Result<WriteResult> {
    let mut output = tokio::fs::File::create(out).await?;
    let mut hasher = Md5::new();
    let mut size = 0u64;
    let mut buf = vec![0u8; CHUNK_SIZE];
    for n in numbers {
        let mut part = tokio::fs::File::open(dir.join(n.to_string())).await?;
        loop {
            let read = part.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
            output.write_all(&buf[..read]).await?;
            size += read as u64;
        }
    }
    output.flush().await?;
    Ok(WriteResult {
        md5_hex: hex::encode(hasher.finalize()),
        size,
    })
}

/// Rename, falling back to copy and delete across filesystems.
async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        warn!(path = %from.display(), error = %e, "failed to remove assembled file after copy");
    }
    Ok(())
}
