//! On-disk format versions of a bucket directory.
//!
//! | Version | Visibility marker | Sidecar | Data file |
//! |---------|-------------------|---------|-----------|
//! | 1 | `__public` | `__<raw key>.properties` | raw key |
//! | 2 | `$public` | `$<encoded key>.properties` | encoded key |
//!
//! The `$version` marker holds the decimal version; a missing marker means 1.
//! Migration renames each legacy file and writes the marker last, so an
//! interrupted run resumes where it stopped.

use std::io;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::keys;

/// Format written by this build.
pub const CURRENT_VERSION: u32 = 2;
/// Version marker file.
pub const VERSION_MARKER: &str = "$version";
/// Visibility marker file.
pub const PUBLIC_MARKER: &str = "$public";
/// Prefix of temporary files inside a bucket directory.
pub const TMP_PREFIX: &str = "$tmp-";

const LEGACY_PUBLIC_MARKER: &str = "__public";
const LEGACY_PREFIX: &str = "__";
const PROPERTIES_SUFFIX: &str = ".properties";

/// Sidecar file name for an encoded data file name.
#[must_use]
pub fn sidecar_name(encoded: &str) -> String {
    format!("${encoded}{PROPERTIES_SUFFIX}")
}

/// Read the format version of a bucket directory.
///
/// # Errors
///
/// Any I/O error other than a missing marker.
pub async fn read_version(dir: &Path) -> io::Result<u32> {
    match tokio::fs::read_to_string(dir.join(VERSION_MARKER)).await {
        Ok(text) => Ok(text.trim().parse().unwrap_or(1)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(1),
        Err(e) => Err(e),
    }
}

/// Record `version` unless the directory already claims a newer one.
///
/// # Errors
///
/// Any I/O error.
pub async fn write_version(dir: &Path, version: u32) -> io::Result<()> {
    if read_version(dir).await? >= version && tokio::fs::try_exists(dir.join(VERSION_MARKER)).await? {
        return Ok(());
    }
    tokio::fs::write(dir.join(VERSION_MARKER), version.to_string()).await
}

/// Bring a bucket directory up to [`CURRENT_VERSION`].
///
/// Returns whether any migration work was needed.
///
/// # Errors
///
/// Any I/O error while listing or renaming; the marker is then left
/// untouched and the next call retries.
pub async fn migrate(dir: &Path) -> io::Result<bool> {
    let version = read_version(dir).await?;
    if version >= CURRENT_VERSION {
        return Ok(false);
    }

    info!(dir = %dir.display(), from = version, to = CURRENT_VERSION, "migrating bucket");

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!(path = %entry.path().display(), "skipping non UTF-8 file name");
            continue;
        };

        if name == LEGACY_PUBLIC_MARKER {
            rename_or_discard(dir, &name, PUBLIC_MARKER).await?;
        } else if let Some(raw) = name
            .strip_prefix(LEGACY_PREFIX)
            .and_then(|rest| rest.strip_suffix(PROPERTIES_SUFFIX))
        {
            let target = sidecar_name(&data_file_name(raw));
            rename_or_discard(dir, &name, &target).await?;
        } else if name.starts_with(TMP_PREFIX) {
            remove_ignoring_missing(&dir.join(&name)).await?;
        } else if !keys::is_control_name(&name) && keys::decode(&name).is_none() {
            let target = keys::encode(&name);
            rename_or_discard(dir, &name, &target).await?;
        }
    }

    write_version(dir, CURRENT_VERSION).await?;
    Ok(true)
}

/// Version 2 name of a version 1 data file.
///
/// A raw name that already is a valid encoding is kept as is.
fn data_file_name(raw: &str) -> String {
    if keys::decode(raw).is_some() {
        raw.to_owned()
    } else {
        keys::encode(raw)
    }
}

/// Rename `from` to `to`, or delete `from` if `to` already exists.
async fn rename_or_discard(dir: &Path, from: &str, to: &str) -> io::Result<()> {
    let source = dir.join(from);
    let target = dir.join(to);
    if tokio::fs::try_exists(&target).await? {
        debug!(from, to, "target exists, discarding legacy file");
        return remove_ignoring_missing(&source).await;
    }
    match tokio::fs::rename(&source, &target).await {
        Ok(()) => {
            debug!(from, to, "renamed legacy file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

async fn remove_ignoring_missing(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn touch(dir: &Path, name: &str, contents: &str) {
        tokio::fs::write(dir.join(name), contents)
            .await
            .expect("write fixture");
    }

    async fn names(dir: &Path) -> Vec<String> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await.expect("read_dir");
        while let Some(entry) = entries.next_entry().await.expect("entry") {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
        out.sort();
        out
    }

    #[tokio::test]
    async fn test_should_treat_missing_marker_as_version_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(read_version(dir.path()).await.expect("read"), 1);
    }

    #[tokio::test]
    async fn test_should_never_lower_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_version(dir.path(), 3).await.expect("write");
        write_version(dir.path(), 2).await.expect("write");
        assert_eq!(read_version(dir.path()).await.expect("read"), 3);
    }

    #[tokio::test]
    async fn test_should_migrate_version_one_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "__public", "").await;
        touch(dir.path(), "hello world.txt", "hi").await;
        touch(dir.path(), "__hello world.txt.properties", "etag=x\n").await;
        touch(dir.path(), "plain", "p").await;
        touch(dir.path(), "__plain.properties", "etag=y\n").await;

        assert!(migrate(dir.path()).await.expect("migrate"));

        assert_eq!(
            names(dir.path()).await,
            vec![
                "$hello%20world.txt.properties",
                "$plain.properties",
                "$public",
                "$version",
                "hello%20world.txt",
                "plain",
            ]
        );
        assert_eq!(read_version(dir.path()).await.expect("read"), CURRENT_VERSION);
        assert!(!migrate(dir.path()).await.expect("second run"));
    }

    #[tokio::test]
    async fn test_should_discard_legacy_file_when_target_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Simulates a run interrupted after the first rename.
        touch(dir.path(), "$public", "").await;
        touch(dir.path(), "__public", "").await;
        touch(dir.path(), "a%20b", "new").await;
        touch(dir.path(), "a b", "old").await;

        migrate(dir.path()).await.expect("migrate");

        assert_eq!(names(dir.path()).await, vec!["$public", "$version", "a%20b"]);
        let kept = tokio::fs::read_to_string(dir.path().join("a%20b"))
            .await
            .expect("read");
        assert_eq!(kept, "new");
    }
}
