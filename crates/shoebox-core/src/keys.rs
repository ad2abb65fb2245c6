//! Mapping between object keys and data file names.
//!
//! Every byte except ASCII alphanumerics and `-` `_` `.` `~` is
//! percent-encoded. The keys `.` and `..` additionally encode their dots so
//! no key can name the bucket directory or its parent.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Bytes that stay literal in a file name.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Longest file name the store creates, in bytes (`NAME_MAX` on common
/// filesystems).
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Encode an object key into a file name.
///
/// ```
/// use shoebox_core::keys::encode;
///
/// assert_eq!(encode("photos/2024 a.jpg"), "photos%2F2024%20a.jpg");
/// assert_eq!(encode(".."), "%2E%2E");
/// ```
#[must_use]
pub fn encode(key: &str) -> String {
    match key {
        "." => "%2E".to_owned(),
        ".." => "%2E%2E".to_owned(),
        _ => utf8_percent_encode(key, KEY_ENCODE_SET).to_string(),
    }
}

/// Decode a file name back into its key.
///
/// Returns `None` when `name` is not exactly what [`encode`] would produce
/// for some key: invalid escapes, non-UTF-8 results, lower-case hex digits or
/// bytes that should have been escaped.
#[must_use]
pub fn decode(name: &str) -> Option<String> {
    let decoded = percent_decode_str(name).decode_utf8().ok()?;
    (encode(&decoded) == name).then(|| decoded.into_owned())
}

/// Whether a directory entry is a control file rather than an object.
#[must_use]
pub fn is_control_name(name: &str) -> bool {
    name.starts_with('$')
}
