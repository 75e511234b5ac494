//! Conversions between file-system paths and object keys.
//!
//! All functions here are pure. Keys use `/` separators, never start with `/`,
//! end with `/` only for directories, and are lower-cased before remote use
//! because the store compares keys byte-for-byte while the emulated file system
//! is case-insensitive.

use std::path::{Path, PathBuf};

use crate::config::VfsConfig;

/// A key inside a specific bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
}

impl ObjectLocation {
    /// Create a location from bucket and key.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Whether the key denotes a directory (trailing `/` or the bucket root).
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    /// The same bucket with a different key.
    #[must_use]
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            bucket: self.bucket.clone(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Where a path's content is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// The path is routed to an object store bucket.
    Remote(ObjectLocation),
    /// The path is not mapped to any bucket and lives on local disk only.
    Local(PathBuf),
}

impl Backend {
    /// The bucket for remote paths.
    #[must_use]
    pub fn bucket(&self) -> Option<&str> {
        match self {
            Self::Remote(loc) => Some(&loc.bucket),
            Self::Local(_) => None,
        }
    }
}

/// Maps logical paths to object keys, buckets and local paths.
#[derive(Debug, Clone)]
pub struct PathMapper {
    local_root: PathBuf,
    root_prefix: String,
    default_bucket: Option<String>,
    /// `(directory key, bucket)`, longest key first.
    mappings: Vec<(String, String)>,
}

impl PathMapper {
    /// Build a mapper from the configured local root and bucket routes.
    #[must_use]
    pub fn new(config: &VfsConfig) -> Self {
        let root_prefix = separators_to_slash(&config.local_root.to_string_lossy())
            .trim_end_matches('/')
            .to_owned();
        let mut mapper = Self {
            local_root: config.local_root.clone(),
            root_prefix: if root_prefix == "." {
                String::new()
            } else {
                root_prefix
            },
            default_bucket: config.bucket.clone(),
            mappings: Vec::new(),
        };
        let mut mappings: Vec<(String, String)> = config
            .bucket_mappings
            .iter()
            .map(|m| (mapper.to_directory_key(&m.prefix), m.bucket.clone()))
            .collect();
        mappings.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        mapper.mappings = mappings;
        mapper
    }

    /// The local directory logical paths are rooted at.
    #[must_use]
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// Convert a path to a lower-cased object key.
    ///
    /// Applying this to its own output yields the same key.
    ///
    /// # Examples
    ///
    /// ```
    /// use s3vfs_core::config::VfsConfig;
    /// use s3vfs_core::path::PathMapper;
    ///
    /// let mapper = PathMapper::new(&VfsConfig::default());
    /// assert_eq!(mapper.to_object_key("\\Images\\Logo.PNG"), "images/logo.png");
    /// assert_eq!(mapper.to_object_key("/Images/"), "images/");
    /// ```
    #[must_use]
    pub fn to_object_key(&self, path: &str) -> String {
        self.to_raw_key(path).to_lowercase()
    }

    /// Normalize a path into key form without changing its case.
    #[must_use]
    pub fn to_raw_key(&self, path: &str) -> String {
        let path = separators_to_slash(path);
        let path = self.strip_local_root(&path);
        let is_dir = path.ends_with('/');

        let mut segments: Vec<&str> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }

        let mut key = segments.join("/");
        if is_dir && !key.is_empty() {
            key.push('/');
        }
        key
    }

    /// Convert a directory path to its marker key (always ending with `/`,
    /// empty for the root).
    #[must_use]
    pub fn to_directory_key(&self, path: &str) -> String {
        let mut key = self.to_object_key(path);
        if !key.is_empty() && !key.ends_with('/') {
            key.push('/');
        }
        key
    }

    /// Map a key back to a path on the local file system.
    #[must_use]
    pub fn to_local_path(&self, key: &str) -> PathBuf {
        let trimmed = key.trim_end_matches('/');
        if trimmed.is_empty() {
            return self.local_root.clone();
        }
        trimmed
            .split('/')
            .fold(self.local_root.clone(), |acc, segment| acc.join(segment))
    }

    /// Render a key as a logical path (`/dir/file.txt`, no trailing slash).
    #[must_use]
    pub fn to_logical_path(key: &str) -> String {
        format!("/{}", key.trim_end_matches('/'))
    }

    /// Bucket a path is routed to, or `None` when it only lives locally.
    #[must_use]
    pub fn get_bucket_name(&self, path: &str) -> Option<String> {
        let key = self.to_object_key(path);
        self.bucket_for_key(&key)
    }

    /// Bucket for an already-normalized key.
    #[must_use]
    pub fn bucket_for_key(&self, key: &str) -> Option<String> {
        self.mappings
            .iter()
            .find(|(prefix, _)| {
                key.starts_with(prefix.as_str()) || format!("{key}/") == *prefix
            })
            .map(|(_, bucket)| bucket.clone())
            .or_else(|| self.default_bucket.clone())
    }

    /// Same as [`to_raw_key`](Self::to_raw_key), always ending with `/`
    /// (empty for the root).
    #[must_use]
    pub fn to_raw_directory_key(&self, path: &str) -> String {
        let mut key = self.to_raw_key(path);
        if !key.is_empty() && !key.ends_with('/') {
            key.push('/');
        }
        key
    }

    /// Local path of `path`, keeping its case.
    #[must_use]
    pub fn local_path(&self, path: &str) -> PathBuf {
        self.to_local_path(&self.to_raw_key(path))
    }

    /// Resolve a file path to its backend.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Backend {
        let key = self.to_object_key(path);
        self.backend_for_key(path, key)
    }

    /// Resolve a directory path to its backend (key ends with `/`).
    #[must_use]
    pub fn resolve_directory(&self, path: &str) -> Backend {
        let key = self.to_directory_key(path);
        self.backend_for_key(path, key)
    }

    fn backend_for_key(&self, path: &str, key: String) -> Backend {
        match self.bucket_for_key(&key) {
            Some(bucket) => Backend::Remote(ObjectLocation { bucket, key }),
            None => Backend::Local(self.local_path(path)),
        }
    }

    fn strip_local_root<'a>(&self, path: &'a str) -> &'a str {
        if self.root_prefix.is_empty() || path.len() < self.root_prefix.len() {
            return path;
        }
        let (head, rest) = path.split_at(self.root_prefix.len());
        if head.eq_ignore_ascii_case(&self.root_prefix) && (rest.is_empty() || rest.starts_with('/'))
        {
            rest
        } else {
            path
        }
    }
}

/// Parent directory key of `key`, or `None` when the parent is the root.
#[must_use]
pub fn parent_directory_key(key: &str) -> Option<String> {
    let trimmed = key.trim_end_matches('/');
    trimmed.rfind('/').map(|idx| trimmed[..=idx].to_owned())
}

/// Last segment of a key (file or directory name).
#[must_use]
pub fn file_name(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn separators_to_slash(path: &str) -> String {
    path.replace('\\', "/")
}
