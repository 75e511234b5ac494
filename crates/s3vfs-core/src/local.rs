//! Local file-system access.
//!
//! Local disk plays two roles: it is the migration source that remote
//! content falls back to, and it hosts the temp mirror where remote objects
//! are materialized for callers that need a real file.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{trace, warn};

use crate::path::ObjectLocation;

/// One entry found while walking a local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// Path relative to the walked directory, `/`-separated.
    pub relative: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Whether `path` is an existing regular file.
pub async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

/// Whether `path` is an existing directory.
pub async fn dir_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

/// File content, `None` when the file does not exist.
pub async fn read(path: &Path) -> io::Result<Option<Bytes>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(Bytes::from(data))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Modification time of a local file or directory.
pub async fn modified(path: &Path) -> io::Result<Option<DateTime<Utc>>> {
    match tokio::fs::metadata(path).await {
        Ok(m) => Ok(Some(DateTime::<Utc>::from(m.modified()?))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Set the modification time of a local file or directory.
pub async fn set_modified(path: &Path, time: DateTime<Utc>) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || std::fs::File::open(&path)?.set_modified(time.into()))
        .await
        .map_err(io::Error::other)?
}

/// Write `data` to `path`, creating parent directories.
pub async fn write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await
}

/// Remove a file; a missing file is not an error.
pub async fn remove_file(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// List `dir`, descending into subdirectories when `recursive`.
///
/// A missing directory lists as empty. Entries come back sorted by relative
/// path.
pub async fn list_entries(dir: &Path, recursive: bool) -> io::Result<Vec<LocalEntry>> {
    let mut entries = Vec::new();
    let mut pending = vec![(dir.to_path_buf(), String::new())];

    while let Some((current, rel_prefix)) = pending.pop() {
        let mut reader = match tokio::fs::read_dir(&current).await {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = format!("{rel_prefix}{name}");
            let is_dir = entry.file_type().await?.is_dir();
            if is_dir && recursive {
                pending.push((entry.path(), format!("{relative}/")));
            }
            entries.push(LocalEntry { relative, is_dir });
        }
    }

    entries.sort_by(|a, b| a.relative.cmp(&b.relative));
    trace!(dir = %dir.display(), recursive, count = entries.len(), "listed local entries");
    Ok(entries)
}

/// Local directory where remote objects are materialized.
#[derive(Debug, Clone)]
pub struct TempMirror {
    root: PathBuf,
}

impl TempMirror {
    /// Mirror rooted at `root`, or at `<system temp>/s3vfs` when `None`.
    #[must_use]
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root: root.unwrap_or_else(|| std::env::temp_dir().join("s3vfs")),
        }
    }

    /// Root directory of the mirror.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Mirror path of an object.
    #[must_use]
    pub fn path_for(&self, loc: &ObjectLocation) -> PathBuf {
        loc.key
            .trim_end_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.join(&loc.bucket), |acc, s| acc.join(s))
    }

    /// Write `data` as the mirror copy of `loc`.
    pub async fn store(&self, loc: &ObjectLocation, data: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(loc);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    /// Remove the mirror copy of a file or directory tree.
    ///
    /// Failures are logged and swallowed.
    pub async fn remove(&self, loc: &ObjectLocation) {
        let path = self.path_for(loc);
        let result = if loc.is_directory() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => trace!(path = %path.display(), "removed mirror copy"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove mirror copy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_list_entries_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/1.txt"), "1").unwrap();
        std::fs::write(dir.path().join("a/b/2.txt"), "2").unwrap();
        std::fs::write(dir.path().join("top.txt"), "t").unwrap();

        let flat = list_entries(dir.path(), false).await.unwrap();
        assert_eq!(
            flat,
            vec![
                LocalEntry { relative: "a".to_owned(), is_dir: true },
                LocalEntry { relative: "top.txt".to_owned(), is_dir: false },
            ]
        );

        let deep: Vec<_> = list_entries(dir.path(), true)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.relative)
            .collect();
        assert_eq!(deep, vec!["a", "a/1.txt", "a/b", "a/b/2.txt", "top.txt"]);

        assert!(list_entries(&dir.path().join("missing"), true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_read_and_remove_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        assert_eq!(read(&path).await.unwrap(), None);
        std::fs::write(&path, "data").unwrap();
        assert!(file_exists(&path).await);
        assert!(!dir_exists(&path).await);
        assert_eq!(read(&path).await.unwrap().unwrap().as_ref(), b"data");
        assert!(modified(&path).await.unwrap().is_some());

        let t = DateTime::parse_from_rfc3339("2001-02-03T04:05:06Z")
            .unwrap()
            .with_timezone(&Utc);
        set_modified(&path, t).await.unwrap();
        assert_eq!(modified(&path).await.unwrap(), Some(t));

        remove_file(&path).await.unwrap();
        remove_file(&path).await.unwrap();
        assert!(!file_exists(&path).await);
    }

    #[tokio::test]
    async fn test_should_store_and_remove_mirror_copies() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = TempMirror::new(Some(dir.path().to_path_buf()));
        let loc = ObjectLocation::new("b", "a/b/c.txt");

        let path = mirror.store(&loc, b"hi").await.unwrap();
        assert_eq!(path, dir.path().join("b").join("a").join("b").join("c.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hi");

        mirror.remove(&ObjectLocation::new("b", "a/")).await;
        assert!(!path.exists());
        mirror.remove(&ObjectLocation::new("b", "a/")).await;
    }
}
