//! Ordered, paginated traversal of a bucket directory.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{S3ServiceError, S3ServiceResult};
use crate::keys;

use super::object::StoredObject;

/// Parameters of one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Only keys starting with this prefix.
    pub prefix: String,
    /// Only keys strictly greater than this one.
    pub marker: String,
    /// Group keys sharing the text up to this delimiter.
    pub delimiter: Option<String>,
    /// Maximum number of entries, each common prefix counting as one.
    pub limit: usize,
}

/// Listed object attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// The object key.
    pub key: String,
    /// Data file size.
    pub size: u64,
    /// Data file modification time.
    pub last_modified: DateTime<Utc>,
    /// Unquoted hex MD5.
    pub etag: String,
}

/// One element of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEntry {
    /// A single object.
    Object(ObjectEntry),
    /// A group of keys rolled up by the delimiter.
    CommonPrefix(String),
}

impl ListEntry {
    /// The key or prefix this entry sorts by.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Object(o) => &o.key,
            Self::CommonPrefix(p) => p,
        }
    }
}

/// One page of listing results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Entries in ascending byte order.
    pub entries: Vec<ListEntry>,
    /// More entries matched than `limit`.
    pub is_truncated: bool,
    /// The last returned entry, when truncated.
    pub next_marker: Option<String>,
}

impl ListPage {
    /// Object entries only.
    pub fn objects(&self) -> impl Iterator<Item = &ObjectEntry> {
        self.entries.iter().filter_map(|e| match e {
            ListEntry::Object(o) => Some(o),
            ListEntry::CommonPrefix(_) => None,
        })
    }

    /// Common prefixes only.
    pub fn common_prefixes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match e {
            ListEntry::CommonPrefix(p) => Some(p.as_str()),
            ListEntry::Object(_) => None,
        })
    }
}

/// Decoded keys of every data file in `dir`, sorted by UTF-8 bytes.
pub(crate) async fn sorted_keys(dir: &std::path::Path) -> S3ServiceResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if keys::is_control_name(name) || !entry.file_type().await?.is_file() {
            continue;
        }
        match keys::decode(name) {
            Some(key) => keys.push(key),
            None => debug!(name, "skipping file with non-canonical name"),
        }
    }
    keys.sort_unstable();
    Ok(keys)
}

/// Run one listing page over `dir`.
pub(crate) async fn list(dir: &std::path::Path, query: &ListQuery) -> S3ServiceResult<ListPage> {
    let keys = sorted_keys(dir).await?;
    let delimiter = query.delimiter.as_deref().filter(|d| !d.is_empty());

    let mut names: Vec<(String, bool)> = Vec::new();
    let mut is_truncated = false;

    for key in keys {
        if !key.starts_with(&query.prefix) || key.as_str() <= query.marker.as_str() {
            continue;
        }

        let rolled_up = delimiter.and_then(|d| {
            key[query.prefix.len()..]
                .find(d)
                .map(|pos| key[..query.prefix.len() + pos + d.len()].to_owned())
        });

        let (name, is_prefix) = match rolled_up {
            Some(cp) => {
                if names.last().is_some_and(|(last, _)| *last == cp)
                    || query.marker.starts_with(cp.as_str())
                {
                    continue;
                }
                (cp, true)
            }
            None => (key, false),
        };

        if names.len() == query.limit {
            is_truncated = true;
            break;
        }
        names.push((name, is_prefix));
    }

    let mut entries = Vec::with_capacity(names.len());
    for (name, is_prefix) in names {
        if is_prefix {
            entries.push(ListEntry::CommonPrefix(name));
            continue;
        }
        match describe(&StoredObject::new(dir, &name)).await {
            Ok((size, last_modified, etag)) => entries.push(ListEntry::Object(ObjectEntry {
                key: name,
                size,
                last_modified,
                etag,
            })),
            // Deleted between the scan and the stat.
            Err(S3ServiceError::NoSuchKey { .. }) => {
                debug!(key = %name, "object vanished while listing");
            }
            Err(e) => warn!(key = %name, error = %e, "skipping unreadable object in listing"),
        }
    }

    let next_marker = if is_truncated {
        entries.last().map(|e| e.name().to_owned())
    } else {
        None
    };

    Ok(ListPage {
        entries,
        is_truncated,
        next_marker,
    })
}

async fn describe(object: &StoredObject) -> S3ServiceResult<(u64, DateTime<Utc>, String)> {
    Ok((
        object.size().await?,
        object.last_modified().await?,
        object.etag().await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture(keys: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for key in keys {
            tokio::fs::write(dir.path().join(keys::encode(key)), key.as_bytes())
                .await
                .expect("write");
        }
        tokio::fs::write(dir.path().join("$version"), "2").await.expect("marker");
        dir
    }

    fn query(prefix: &str, marker: &str, limit: usize) -> ListQuery {
        ListQuery {
            prefix: prefix.to_owned(),
            marker: marker.to_owned(),
            delimiter: None,
            limit,
        }
    }

    fn names(page: &ListPage) -> Vec<&str> {
        page.entries.iter().map(ListEntry::name).collect()
    }

    #[tokio::test]
    async fn test_should_list_in_byte_order_without_control_files() {
        let dir = fixture(&["b", "a", "Z", "é", "a/b"]).await;
        let page = list(dir.path(), &query("", "", 1000)).await.expect("list");
        assert_eq!(names(&page), vec!["Z", "a", "a/b", "b", "é"]);
        assert!(!page.is_truncated);
        assert_eq!(page.next_marker, None);
    }

    #[tokio::test]
    async fn test_should_filter_prefix_and_marker() {
        let dir = fixture(&["a1", "a2", "a3", "b1"]).await;
        let page = list(dir.path(), &query("a", "a1", 1000)).await.expect("list");
        assert_eq!(names(&page), vec!["a2", "a3"]);
    }

    #[tokio::test]
    async fn test_should_truncate_only_when_more_entries_match() {
        let dir = fixture(&["k1", "k2", "k3"]).await;

        let exact = list(dir.path(), &query("", "", 3)).await.expect("list");
        assert!(!exact.is_truncated);

        let short = list(dir.path(), &query("", "", 2)).await.expect("list");
        assert!(short.is_truncated);
        assert_eq!(short.next_marker.as_deref(), Some("k2"));

        let rest = list(dir.path(), &query("", "k2", 2)).await.expect("list");
        assert_eq!(names(&rest), vec!["k3"]);
        assert!(!rest.is_truncated);
    }

    #[tokio::test]
    async fn test_should_group_common_prefixes() {
        let dir = fixture(&["a/1", "a/2", "b", "c/1"]).await;
        let mut q = query("", "", 1000);
        q.delimiter = Some("/".to_owned());

        let page = list(dir.path(), &q).await.expect("list");
        assert_eq!(page.common_prefixes().collect::<Vec<_>>(), vec!["a/", "c/"]);
        assert_eq!(page.objects().map(|o| o.key.as_str()).collect::<Vec<_>>(), vec!["b"]);

        q.limit = 1;
        let first = list(dir.path(), &q).await.expect("list");
        assert_eq!(first.next_marker.as_deref(), Some("a/"));
        q.marker = "a/".to_owned();
        let second = list(dir.path(), &q).await.expect("list");
        assert_eq!(names(&second), vec!["b"]);
    }

    #[tokio::test]
    async fn test_should_return_nothing_for_zero_limit() {
        let dir = fixture(&["k"]).await;
        let page = list(dir.path(), &query("", "", 0)).await.expect("list");
        assert!(page.entries.is_empty());
        assert!(page.is_truncated);
    }

    #[tokio::test]
    async fn test_should_skip_object_with_unreadable_properties() {
        let dir = fixture(&["a", "b", "c"]).await;
        std::fs::create_dir(dir.path().join(crate::store::migration::sidecar_name("b")))
            .expect("occupy sidecar");

        let page = list(dir.path(), &query("", "", 1000)).await.expect("list");
        assert_eq!(names(&page), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_should_be_idempotent() {
        let dir = fixture(&["x", "y", "z"]).await;
        let q = query("", "", 10);
        let first = list(dir.path(), &q).await.expect("list");
        let second = list(dir.path(), &q).await.expect("list");
        assert_eq!(first, second);
    }
}
