//! Multipart upload handlers.
//!
//! Upload ids are decimal strings on the wire. An id that does not parse, is
//! not active, or belongs to a different bucket or key is reported as
//! `NoSuchUpload`.

use std::io;

use bytes::Bytes;
use futures::Stream;
use shoebox_model::types::{
    CompleteMultipartUploadResult, CompletedMultipartUpload, InitiateMultipartUploadResult,
    ListPartsResult, PartSummary,
};
use tracing::debug;

use crate::checksums::{decode_content_md5, quote_etag, strip_etag_quotes};
use crate::error::{S3ServiceError, S3ServiceResult};
use crate::multipart::UploadSession;
use crate::properties::Properties;
use crate::provider::ShoeboxS3;

/// Default and maximum number of parts returned by `ListParts`.
pub const DEFAULT_MAX_PARTS: usize = 1000;

/// Parameters of `PUT /bucket/key?partNumber=&uploadId=`.
#[derive(Debug, Clone, Default)]
pub struct UploadPartInput {
    /// Target bucket.
    pub bucket: String,
    /// Target key.
    pub key: String,
    /// `uploadId`.
    pub upload_id: String,
    /// `partNumber`.
    pub part_number: String,
    /// `Content-MD5`, base64.
    pub content_md5: Option<String>,
    /// Declared decoded body length.
    pub content_length: Option<u64>,
}

/// Parse a wire upload id.
fn parse_upload_id(upload_id: &str) -> S3ServiceResult<u64> {
    upload_id
        .parse()
        .map_err(|_| S3ServiceError::NoSuchUpload {
            upload_id: upload_id.to_owned(),
        })
}

fn parse_part_number(part_number: &str) -> S3ServiceResult<u32> {
    part_number.parse().map_err(|_| {
        S3ServiceError::invalid_argument(format!("Invalid part number: {part_number}"))
    })
}

impl ShoeboxS3 {
    /// The active session for `upload_id`, checked against the request target.
    fn matching_session(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> S3ServiceResult<(u64, UploadSession)> {
        let id = parse_upload_id(upload_id)?;
        let session = self.multipart.session(id)?;
        if session.bucket != bucket || session.key != key {
            return Err(S3ServiceError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            });
        }
        Ok((id, session))
    }

    /// `POST /bucket/key?uploads`.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchBucket`] when auto-create is off, or an I/O
    /// error.
    pub async fn handle_create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        properties: Properties,
    ) -> S3ServiceResult<InitiateMultipartUploadResult> {
        self.writable_bucket(bucket).await?.object(key)?;
        let upload_id = self.multipart.initiate(bucket, key, properties).await?;
        Ok(InitiateMultipartUploadResult {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            upload_id: upload_id.to_string(),
        })
    }

    /// Stage one part. Returns the quoted ETag.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchUpload`], [`S3ServiceError::InvalidArgument`],
    /// [`S3ServiceError::InvalidDigest`], [`S3ServiceError::BadDigest`],
    /// [`S3ServiceError::IncompleteBody`], or an I/O error.
    pub async fn handle_upload_part<S>(
        &self,
        input: UploadPartInput,
        body: S,
    ) -> S3ServiceResult<String>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        let part_number = parse_part_number(&input.part_number)?;
        let expected_md5 = input
            .content_md5
            .as_deref()
            .map(decode_content_md5)
            .transpose()?;
        let (id, _) = self.matching_session(&input.bucket, &input.key, &input.upload_id)?;
        self.writable_bucket(&input.bucket).await?;

        let written = self
            .multipart
            .upload_part(
                id,
                part_number,
                body,
                input.content_length,
                expected_md5.as_deref(),
            )
            .await?;
        Ok(written.etag())
    }

    /// `POST /bucket/key?uploadId=`.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchUpload`], [`S3ServiceError::InvalidPart`] when
    /// a part is missing or its ETag differs from the staged one,
    /// [`S3ServiceError::MalformedXml`] for an empty part list, or an I/O
    /// error.
    pub async fn handle_complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        request: CompletedMultipartUpload,
    ) -> S3ServiceResult<CompleteMultipartUploadResult> {
        let (id, session) = self.matching_session(bucket, key, upload_id)?;

        for part in &request.parts {
            let staged = session.part_etags.get(&part.part_number);
            let mismatch = match (&part.e_tag, staged) {
                (_, None) => true,
                (Some(claimed), Some(staged)) => {
                    !strip_etag_quotes(claimed).eq_ignore_ascii_case(staged)
                }
                (None, Some(_)) => false,
            };
            if mismatch {
                return Err(S3ServiceError::InvalidPart {
                    part_number: part.part_number,
                });
            }
        }

        let target = self.writable_bucket(bucket).await?.object(key)?;
        let numbers: Vec<u32> = request.parts.iter().map(|p| p.part_number).collect();
        let written = self.multipart.complete(id, &numbers, &target).await?;

        debug!(bucket, key, upload_id, size = written.size, "complete_multipart_upload completed");
        Ok(CompleteMultipartUploadResult {
            location: format!("/{bucket}/{key}"),
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            e_tag: written.etag(),
        })
    }

    /// `GET /bucket/key?uploadId=`.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchUpload`] or an I/O error.
    pub async fn handle_list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number_marker: Option<u32>,
        max_parts: Option<usize>,
    ) -> S3ServiceResult<ListPartsResult> {
        let (id, _) = self.matching_session(bucket, key, upload_id)?;
        let marker = part_number_marker.unwrap_or(0);
        let max_parts = max_parts.unwrap_or(DEFAULT_MAX_PARTS).min(DEFAULT_MAX_PARTS);
        let page = self.multipart.list_parts(id, marker, max_parts).await?;

        Ok(ListPartsResult {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            upload_id: upload_id.to_owned(),
            owner: self.owner(),
            part_number_marker: marker,
            next_part_number_marker: page.next_part_number_marker,
            max_parts,
            is_truncated: page.is_truncated,
            parts: page
                .parts
                .into_iter()
                .map(|p| PartSummary {
                    part_number: p.part_number,
                    last_modified: p.last_modified,
                    e_tag: quote_etag(&p.etag),
                    size: p.size,
                })
                .collect(),
        })
    }

    /// `DELETE /bucket/key?uploadId=`. Aborting an unknown numeric id succeeds.
    ///
    /// # Errors
    ///
    /// [`S3ServiceError::NoSuchUpload`] for an id belonging to another
    /// object or not a number, or an I/O error.
    pub async fn handle_abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> S3ServiceResult<()> {
        let id = parse_upload_id(upload_id)?;
        if let Ok(session) = self.multipart.session(id) {
            if session.bucket != bucket || session.key != key {
                return Err(S3ServiceError::NoSuchUpload {
                    upload_id: upload_id.to_owned(),
                });
            }
        }
        self.multipart.abort(id).await
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use shoebox_model::types::CompletedPart;

    use super::*;
    use crate::checksums::compute_etag;
    use crate::provider::tests::provider;

    fn body(data: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> + Unpin {
        stream::iter(vec![Ok(Bytes::from_static(data))])
    }

    fn part_input(upload_id: &str, part_number: u32) -> UploadPartInput {
        UploadPartInput {
            bucket: "b".to_owned(),
            key: "k".to_owned(),
            upload_id: upload_id.to_owned(),
            part_number: part_number.to_string(),
            ..UploadPartInput::default()
        }
    }

    fn completion(parts: &[(u32, Option<&str>)]) -> CompletedMultipartUpload {
        CompletedMultipartUpload {
            parts: parts
                .iter()
                .map(|(n, etag)| CompletedPart {
                    part_number: *n,
                    e_tag: etag.map(str::to_owned),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_should_run_full_multipart_flow() {
        let (_dir, s3) = provider().await;
        let init = s3
            .handle_create_multipart_upload("b", "k", Properties::new())
            .await
            .expect("init");
        assert_eq!(init.upload_id, "1");

        let etag1 = s3
            .handle_upload_part(part_input("1", 1), body(b"AA"))
            .await
            .expect("part 1");
        s3.handle_upload_part(part_input("1", 2), body(b"BB"))
            .await
            .expect("part 2");

        let parts = s3
            .handle_list_parts("b", "k", "1", None, None)
            .await
            .expect("list parts");
        assert_eq!(parts.parts.len(), 2);
        assert_eq!(parts.parts[0].e_tag, etag1);

        let done = s3
            .handle_complete_multipart_upload("b", "k", "1", completion(&[(1, Some(&etag1)), (2, None)]))
            .await
            .expect("complete");
        assert_eq!(done.e_tag, compute_etag(b"AABB"));
        assert_eq!(done.location, "/b/k");

        let object = s3.store().bucket("b").expect("valid").object("k").expect("key");
        assert_eq!(object.read_all().await.expect("read"), b"AABB");
    }

    #[tokio::test]
    async fn test_should_reject_mismatched_part_etag() {
        let (_dir, s3) = provider().await;
        s3.handle_create_multipart_upload("b", "k", Properties::new())
            .await
            .expect("init");
        s3.handle_upload_part(part_input("1", 1), body(b"AA"))
            .await
            .expect("part");

        let err = s3
            .handle_complete_multipart_upload("b", "k", "1", completion(&[(1, Some("\"beef\""))]))
            .await
            .expect_err("mismatch");
        assert!(matches!(err, S3ServiceError::InvalidPart { part_number: 1 }));
        assert!(s3.multipart().session(1).is_ok());
    }

    #[tokio::test]
    async fn test_should_reject_foreign_or_garbage_upload_ids() {
        let (_dir, s3) = provider().await;
        s3.handle_create_multipart_upload("b", "k", Properties::new())
            .await
            .expect("init");

        let mut wrong_key = part_input("1", 1);
        wrong_key.key = "other".to_owned();
        assert!(matches!(
            s3.handle_upload_part(wrong_key, body(b"x")).await,
            Err(S3ServiceError::NoSuchUpload { .. })
        ));
        assert!(matches!(
            s3.handle_upload_part(part_input("abc", 1), body(b"x")).await,
            Err(S3ServiceError::NoSuchUpload { .. })
        ));
        assert!(matches!(
            s3.handle_upload_part(part_input("1", 0), body(b"x")).await,
            Err(S3ServiceError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_abort_and_forget_upload() {
        let (_dir, s3) = provider().await;
        s3.handle_create_multipart_upload("b", "k", Properties::new())
            .await
            .expect("init");
        s3.handle_abort_multipart_upload("b", "k", "1").await.expect("abort");
        s3.handle_abort_multipart_upload("b", "k", "1").await.expect("again");

        assert!(matches!(
            s3.handle_complete_multipart_upload("b", "k", "1", completion(&[(1, None)])).await,
            Err(S3ServiceError::NoSuchUpload { .. })
        ));
    }
}
