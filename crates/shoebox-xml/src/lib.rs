//! XML serialization and deserialization for Shoebox S3 documents.
//!
//! Responses follow the RestXml conventions of the S3 API: an XML declaration,
//! a root element in the `http://s3.amazonaws.com/doc/2006-03-01/` namespace,
//! lowercase booleans and ISO 8601 timestamps with millisecond precision.
//! Errors are the flat `<Error>` document without a wrapper.

pub mod deserialize;
pub mod error;
pub mod serialize;

pub use deserialize::{S3Deserialize, from_xml};
pub use error::{XmlError, error_to_xml};
pub use serialize::{S3_NAMESPACE, S3Serialize, to_xml};
