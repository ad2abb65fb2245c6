//! Sidecar properties files.
//!
//! A sidecar is UTF-8 text: a `#` comment line followed by one `name=value`
//! pair per line. Backslash, newline and carriage return are escaped as
//! `\\`, `\n` and `\r`; an `=` inside a name is written as `\=`. Values may
//! contain a literal `=` because only the first unescaped one separates.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

/// `Content-Type` of the object.
pub const CONTENT_TYPE: &str = "content-type";
/// `Content-MD5` the object was uploaded with.
pub const CONTENT_MD5: &str = "content-md5";
/// Hex MD5 of the data file.
pub const ETAG: &str = "etag";
/// `Cache-Control`.
pub const CACHE_CONTROL: &str = "cache-control";
/// `Content-Disposition`.
pub const CONTENT_DISPOSITION: &str = "content-disposition";
/// `Content-Encoding`.
pub const CONTENT_ENCODING: &str = "content-encoding";
/// `Content-Language`.
pub const CONTENT_LANGUAGE: &str = "content-language";
/// `Expires`.
pub const EXPIRES: &str = "expires";
/// Canned ACL of the object.
pub const AMZ_ACL: &str = "x-amz-acl";
/// Prefix of user metadata entries.
pub const AMZ_META_PREFIX: &str = "x-amz-meta-";

/// Request headers captured into the sidecar on write.
pub const STORED_HEADERS: &[&str] = &[
    CONTENT_TYPE,
    CONTENT_MD5,
    CACHE_CONTROL,
    CONTENT_DISPOSITION,
    CONTENT_ENCODING,
    CONTENT_LANGUAGE,
    EXPIRES,
    AMZ_ACL,
];

const HEADER_LINE: &str = "# shoebox object properties";

/// Ordered string properties of one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a property.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Set a property, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Remove a property.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The `x-amz-meta-*` entries.
    pub fn metadata(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(k, _)| k.starts_with(AMZ_META_PREFIX))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render the file contents.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(64 + self.0.len() * 32);
        out.push_str(HEADER_LINE);
        out.push('\n');
        for (name, value) in &self.0 {
            escape_into(&mut out, name, true);
            out.push('=');
            escape_into(&mut out, value, false);
            out.push('\n');
        }
        out
    }

    /// Parse file contents. Comment, blank and malformed lines are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut props = Self::new();
        for line in text.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match split_line(line) {
                Some((name, value)) => props.set(name, value),
                None => debug!(line, "skipping malformed properties line"),
            }
        }
        props
    }

    /// Read a sidecar. A missing file yields `None`.
    ///
    /// # Errors
    ///
    /// Any I/O error other than `NotFound`.
    pub async fn load(path: &Path) -> io::Result<Option<Self>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(Self::parse(&String::from_utf8_lossy(&bytes)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace a sidecar atomically: write a `$tmp-*` sibling, then rename.
    ///
    /// # Errors
    ///
    /// Any I/O error; the temporary file is removed on failure.
    pub async fn save(&self, path: &Path) -> io::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = dir.join(format!("$tmp-{}", uuid::Uuid::new_v4()));
        let result = async {
            tokio::fs::write(&tmp, self.render()).await?;
            tokio::fs::rename(&tmp, path).await
        }
        .await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(&tmp).await {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(
                        path = %tmp.display(),
                        error = %e,
                        "failed to remove temporary properties file"
                    );
                }
            }
        }
        result
    }
}

impl FromIterator<(String, String)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn escape_into(out: &mut String, s: &str, is_name: bool) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '=' if is_name => out.push_str("\\="),
            c => out.push(c),
        }
    }
}

/// Split on the first unescaped `=` and unescape both halves.
fn split_line(line: &str) -> Option<(String, String)> {
    let mut name = String::new();
    let mut chars = line.chars();
    loop {
        match chars.next()? {
            '=' => break,
            '\\' => name.push(unescape(chars.next()?)),
            c => name.push(c),
        }
    }
    let mut value = String::new();
    while let Some(c) = chars.next() {
        if c == '\\' {
            value.push(unescape(chars.next()?));
        } else {
            value.push(c);
        }
    }
    Some((name, value))
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        'r' => '\r',
        other => other,
    }
}
