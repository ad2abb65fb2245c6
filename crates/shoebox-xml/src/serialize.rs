//! Response document serialization.
//!
//! Every document is written with an XML declaration and a root element
//! carrying the S3 namespace. Booleans are lowercase and timestamps are
//! ISO 8601 with millisecond precision (`2006-02-03T16:45:09.000Z`).

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};
use shoebox_model::types::{
    AccessControlPolicy, BucketSummary, CompleteMultipartUploadResult, CopyObjectResult,
    CorsConfiguration, DeleteError, DeleteResult, DeletedObject, Grant, Grantee,
    InitiateMultipartUploadResult, ListAllMyBucketsResult, ListBucketResult, ListBucketV2Result,
    ListMultipartUploadsResult, ListPartsResult, LocationConstraint, MultipartUploadSummary,
    ObjectSummary, Owner, PartSummary, RequestPaymentConfiguration,
};

use crate::error::XmlError;

/// The S3 XML namespace.
pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Writes a value as child content of the current element.
///
/// The root element and namespace are written by [`to_xml`].
pub trait S3Serialize {
    /// Serialize this value into `writer`.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the underlying writer fails.
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()>;
}

/// Serialize `value` as a complete document rooted at `root_element`.
///
/// # Errors
///
/// Returns `XmlError` if writing fails.
pub fn to_xml<T: S3Serialize>(root_element: &str, value: &T) -> Result<Vec<u8>, XmlError> {
    let mut buf = Vec::with_capacity(512);
    let mut writer = Writer::new(&mut buf);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer
        .create_element(root_element)
        .with_attribute(("xmlns", S3_NAMESPACE))
        .write_inner_content(|w| value.serialize_xml(w))?;

    Ok(buf)
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

fn write_optional_text<W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    value: Option<&str>,
) -> io::Result<()> {
    if let Some(v) = value {
        write_text_element(writer, tag, v)?;
    }
    Ok(())
}

fn write_bool<W: Write>(writer: &mut Writer<W>, tag: &str, value: bool) -> io::Result<()> {
    write_text_element(writer, tag, if value { "true" } else { "false" })
}

fn write_number<W: Write, N: ToString>(
    writer: &mut Writer<W>,
    tag: &str,
    value: N,
) -> io::Result<()> {
    write_text_element(writer, tag, &value.to_string())
}

fn write_timestamp<W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    value: &DateTime<Utc>,
) -> io::Result<()> {
    write_text_element(writer, tag, &format_timestamp(value))
}

/// Format a timestamp the way S3 listings do.
#[must_use]
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn write_common_prefixes<W: Write>(writer: &mut Writer<W>, prefixes: &[String]) -> io::Result<()> {
    for prefix in prefixes {
        writer
            .create_element("CommonPrefixes")
            .write_inner_content(|w| write_text_element(w, "Prefix", prefix))?;
    }
    Ok(())
}

impl S3Serialize for Owner {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Owner").write_inner_content(|w| {
            write_text_element(w, "ID", &self.id)?;
            write_text_element(w, "DisplayName", &self.display_name)?;
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for BucketSummary {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Bucket").write_inner_content(|w| {
            write_text_element(w, "Name", &self.name)?;
            write_timestamp(w, "CreationDate", &self.creation_date)?;
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for ListAllMyBucketsResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        self.owner.serialize_xml(writer)?;
        writer.create_element("Buckets").write_inner_content(|w| {
            for bucket in &self.buckets {
                bucket.serialize_xml(w)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for ObjectSummary {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Contents").write_inner_content(|w| {
            write_text_element(w, "Key", &self.key)?;
            write_timestamp(w, "LastModified", &self.last_modified)?;
            write_text_element(w, "ETag", &self.e_tag)?;
            write_number(w, "Size", self.size)?;
            if let Some(owner) = &self.owner {
                owner.serialize_xml(w)?;
            }
            write_text_element(w, "StorageClass", "STANDARD")?;
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for ListBucketResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Name", &self.name)?;
        write_text_element(writer, "Prefix", &self.prefix)?;
        write_text_element(writer, "Marker", &self.marker)?;
        write_optional_text(writer, "NextMarker", self.next_marker.as_deref())?;
        write_number(writer, "MaxKeys", self.max_keys)?;
        write_optional_text(writer, "Delimiter", self.delimiter.as_deref())?;
        write_bool(writer, "IsTruncated", self.is_truncated)?;
        for object in &self.contents {
            object.serialize_xml(writer)?;
        }
        write_common_prefixes(writer, &self.common_prefixes)
    }
}

impl S3Serialize for ListBucketV2Result {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Name", &self.name)?;
        write_text_element(writer, "Prefix", &self.prefix)?;
        write_optional_text(writer, "StartAfter", self.start_after.as_deref())?;
        write_optional_text(
            writer,
            "ContinuationToken",
            self.continuation_token.as_deref(),
        )?;
        write_optional_text(
            writer,
            "NextContinuationToken",
            self.next_continuation_token.as_deref(),
        )?;
        write_number(writer, "KeyCount", self.key_count)?;
        write_number(writer, "MaxKeys", self.max_keys)?;
        write_optional_text(writer, "Delimiter", self.delimiter.as_deref())?;
        write_bool(writer, "IsTruncated", self.is_truncated)?;
        for object in &self.contents {
            object.serialize_xml(writer)?;
        }
        write_common_prefixes(writer, &self.common_prefixes)
    }
}

impl S3Serialize for InitiateMultipartUploadResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Bucket", &self.bucket)?;
        write_text_element(writer, "Key", &self.key)?;
        write_text_element(writer, "UploadId", &self.upload_id)
    }
}

impl S3Serialize for CompleteMultipartUploadResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Location", &self.location)?;
        write_text_element(writer, "Bucket", &self.bucket)?;
        write_text_element(writer, "Key", &self.key)?;
        write_text_element(writer, "ETag", &self.e_tag)
    }
}

impl S3Serialize for PartSummary {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Part").write_inner_content(|w| {
            write_number(w, "PartNumber", self.part_number)?;
            write_timestamp(w, "LastModified", &self.last_modified)?;
            write_text_element(w, "ETag", &self.e_tag)?;
            write_number(w, "Size", self.size)?;
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for ListPartsResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Bucket", &self.bucket)?;
        write_text_element(writer, "Key", &self.key)?;
        write_text_element(writer, "UploadId", &self.upload_id)?;
        self.owner.serialize_xml(writer)?;
        write_text_element(writer, "StorageClass", "STANDARD")?;
        write_number(writer, "PartNumberMarker", self.part_number_marker)?;
        if let Some(next) = self.next_part_number_marker {
            write_number(writer, "NextPartNumberMarker", next)?;
        }
        write_number(writer, "MaxParts", self.max_parts)?;
        write_bool(writer, "IsTruncated", self.is_truncated)?;
        for part in &self.parts {
            part.serialize_xml(writer)?;
        }
        Ok(())
    }
}

fn write_upload<W: Write>(
    writer: &mut Writer<W>,
    upload: &MultipartUploadSummary,
    owner: &Owner,
) -> io::Result<()> {
    writer.create_element("Upload").write_inner_content(|w| {
        write_text_element(w, "Key", &upload.key)?;
        write_text_element(w, "UploadId", &upload.upload_id)?;
        owner.serialize_xml(w)?;
        write_text_element(w, "StorageClass", "STANDARD")?;
        write_timestamp(w, "Initiated", &upload.initiated)?;
        Ok(())
    })?;
    Ok(())
}

impl S3Serialize for ListMultipartUploadsResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Bucket", &self.bucket)?;
        write_text_element(writer, "KeyMarker", "")?;
        write_text_element(writer, "UploadIdMarker", "")?;
        write_number(writer, "MaxUploads", 1000)?;
        write_bool(writer, "IsTruncated", false)?;
        for upload in &self.uploads {
            write_upload(writer, upload, &self.owner)?;
        }
        Ok(())
    }
}

impl S3Serialize for CopyObjectResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_timestamp(writer, "LastModified", &self.last_modified)?;
        write_text_element(writer, "ETag", &self.e_tag)
    }
}

impl S3Serialize for DeletedObject {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer
            .create_element("Deleted")
            .write_inner_content(|w| write_text_element(w, "Key", &self.key))?;
        Ok(())
    }
}

impl S3Serialize for DeleteError {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Error").write_inner_content(|w| {
            write_text_element(w, "Key", &self.key)?;
            write_text_element(w, "Code", &self.code)?;
            write_text_element(w, "Message", &self.message)?;
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for DeleteResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        for deleted in &self.deleted {
            deleted.serialize_xml(writer)?;
        }
        for error in &self.errors {
            error.serialize_xml(writer)?;
        }
        Ok(())
    }
}

impl S3Serialize for Grantee {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        let kind = match self {
            Self::CanonicalUser(_) => "CanonicalUser",
            Self::Group { .. } => "Group",
        };
        writer
            .create_element("Grantee")
            .with_attribute(("xmlns:xsi", XSI_NAMESPACE))
            .with_attribute(("xsi:type", kind))
            .write_inner_content(|w| match self {
                Self::CanonicalUser(owner) => {
                    write_text_element(w, "ID", &owner.id)?;
                    write_text_element(w, "DisplayName", &owner.display_name)
                }
                Self::Group { uri } => write_text_element(w, "URI", uri),
            })?;
        Ok(())
    }
}

impl S3Serialize for Grant {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Grant").write_inner_content(|w| {
            self.grantee.serialize_xml(w)?;
            write_text_element(w, "Permission", &self.permission)
        })?;
        Ok(())
    }
}

impl S3Serialize for AccessControlPolicy {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        self.owner.serialize_xml(writer)?;
        writer
            .create_element("AccessControlList")
            .write_inner_content(|w| {
                for grant in &self.grants {
                    grant.serialize_xml(w)?;
                }
                Ok(())
            })?;
        Ok(())
    }
}

impl S3Serialize for RequestPaymentConfiguration {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Payer", &self.payer)
    }
}

impl S3Serialize for LocationConstraint {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        if let Some(region) = &self.region {
            writer.write_event(Event::Text(BytesText::new(region)))?;
        }
        Ok(())
    }
}

impl S3Serialize for CorsConfiguration {
    fn serialize_xml<W: Write>(&self, _writer: &mut Writer<W>) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use shoebox_model::types::ALL_USERS_GROUP;

    use super::*;

    fn to_string<T: S3Serialize>(root: &str, value: &T) -> String {
        let bytes = to_xml(root, value).expect("serialize");
        String::from_utf8(bytes).expect("valid UTF-8")
    }

    fn owner() -> Owner {
        Owner {
            id: "shoebox".to_owned(),
            display_name: "Shoebox".to_owned(),
        }
    }

    #[test]
    fn test_should_write_declaration_and_namespace() {
        let xml = to_string("CORSConfiguration", &CorsConfiguration);

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(&format!("<CORSConfiguration xmlns=\"{S3_NAMESPACE}\">")));
    }

    #[test]
    fn test_should_format_timestamp_with_millis() {
        let ts = Utc.with_ymd_and_hms(2009, 10, 12, 17, 50, 30).unwrap();
        assert_eq!(format_timestamp(&ts), "2009-10-12T17:50:30.000Z");
    }

    #[test]
    fn test_should_serialize_bucket_listing() {
        let result = ListAllMyBucketsResult {
            owner: owner(),
            buckets: vec![BucketSummary {
                name: "photos".to_owned(),
                creation_date: Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap(),
            }],
        };
        let xml = to_string("ListAllMyBucketsResult", &result);

        assert!(xml.contains("<Owner><ID>shoebox</ID><DisplayName>Shoebox</DisplayName></Owner>"));
        assert!(xml.contains(
            "<Buckets><Bucket><Name>photos</Name><CreationDate>2020-01-02T03:04:05.000Z</CreationDate></Bucket></Buckets>"
        ));
    }

    #[test]
    fn test_should_serialize_object_listing_with_prefixes() {
        let result = ListBucketResult {
            name: "b".to_owned(),
            prefix: "a/".to_owned(),
            max_keys: 2,
            delimiter: Some("/".to_owned()),
            is_truncated: true,
            next_marker: Some("a/k&1".to_owned()),
            contents: vec![ObjectSummary {
                key: "a/k&1".to_owned(),
                last_modified: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                e_tag: "\"abc\"".to_owned(),
                size: 5,
                owner: None,
            }],
            common_prefixes: vec!["a/sub/".to_owned()],
            ..ListBucketResult::default()
        };
        let xml = to_string("ListBucketResult", &result);

        assert!(xml.contains("<Marker></Marker>"));
        assert!(xml.contains("<NextMarker>a/k&amp;1</NextMarker>"));
        assert!(xml.contains("<MaxKeys>2</MaxKeys>"));
        assert!(xml.contains("<IsTruncated>true</IsTruncated>"));
        assert!(xml.contains("<Key>a/k&amp;1</Key>"));
        assert!(xml.contains("<Size>5</Size>"));
        assert!(xml.contains("<CommonPrefixes><Prefix>a/sub/</Prefix></CommonPrefixes>"));
    }

    #[test]
    fn test_should_serialize_v2_listing_key_count() {
        let result = ListBucketV2Result {
            name: "b".to_owned(),
            key_count: 0,
            max_keys: 1000,
            continuation_token: Some("dG9rZW4=".to_owned()),
            ..ListBucketV2Result::default()
        };
        let xml = to_string("ListBucketResult", &result);

        assert!(xml.contains("<KeyCount>0</KeyCount>"));
        assert!(xml.contains("<ContinuationToken>dG9rZW4=</ContinuationToken>"));
        assert!(!xml.contains("NextContinuationToken"));
    }

    #[test]
    fn test_should_serialize_acl_with_group_grant() {
        let policy = AccessControlPolicy {
            owner: owner(),
            grants: vec![
                Grant {
                    grantee: Grantee::CanonicalUser(owner()),
                    permission: "FULL_CONTROL".to_owned(),
                },
                Grant {
                    grantee: Grantee::Group {
                        uri: ALL_USERS_GROUP.to_owned(),
                    },
                    permission: "READ".to_owned(),
                },
            ],
        };
        let xml = to_string("AccessControlPolicy", &policy);

        assert!(xml.contains("xsi:type=\"CanonicalUser\""));
        assert!(xml.contains("xsi:type=\"Group\""));
        assert!(xml.contains(&format!("<URI>{ALL_USERS_GROUP}</URI>")));
        assert!(xml.contains("<Permission>READ</Permission>"));
    }

    #[test]
    fn test_should_serialize_location_constraint_text() {
        let xml = to_string(
            "LocationConstraint",
            &LocationConstraint {
                region: Some("eu-west-1".to_owned()),
            },
        );
        assert!(xml.contains(">eu-west-1</LocationConstraint>"));

        let empty = to_string("LocationConstraint", &LocationConstraint::default());
        assert!(empty.contains("LocationConstraint"));
        assert!(!empty.contains("eu-west-1"));
    }

    #[test]
    fn test_should_serialize_delete_result() {
        let result = DeleteResult {
            deleted: vec![DeletedObject {
                key: "a".to_owned(),
            }],
            errors: vec![DeleteError {
                key: "b".to_owned(),
                code: "AccessDenied".to_owned(),
                message: "Access Denied".to_owned(),
            }],
        };
        let xml = to_string("DeleteResult", &result);

        assert!(xml.contains("<Deleted><Key>a</Key></Deleted>"));
        assert!(xml.contains("<Error><Key>b</Key><Code>AccessDenied</Code>"));
    }
}
