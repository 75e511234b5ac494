//! Virtual file system configuration.
//!
//! Provides [`VfsConfig`] for configuring buckets, credentials, local roots and
//! multipart limits. Values are loaded from `S3VFS_*` environment variables,
//! falling back to the standard `AWS_*` variables for credentials and region.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{VfsError, VfsResult};

/// Minimum size of every multipart part except the last (5 MiB).
pub const DEFAULT_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum size of a single multipart part (5 GiB).
pub const DEFAULT_MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Content length above which writes switch from a single PUT to multipart.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Maximum number of keys per multi-object delete request.
pub const DEFAULT_BATCH_DELETE_LIMIT: usize = 1000;

/// Prefix under which metadata sidecar objects live.
pub const DEFAULT_METADATA_PREFIX: &str = "__metadata/";

/// Routes every path under `prefix` to `bucket`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketMapping {
    /// Logical path prefix (e.g. `/media`), compared case-insensitively.
    pub prefix: String,
    /// Target bucket name.
    pub bucket: String,
}

/// Virtual file system configuration.
///
/// # Examples
///
/// ```
/// use s3vfs_core::config::VfsConfig;
///
/// let config = VfsConfig::builder().bucket("media".to_owned()).build();
/// assert_eq!(config.bucket.as_deref(), Some("media"));
/// assert_eq!(config.metadata_prefix, "__metadata/");
/// ```
#[derive(Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct VfsConfig {
    /// Default bucket for paths not covered by a [`BucketMapping`]. When `None`,
    /// unmapped paths live only on the local file system.
    #[builder(default, setter(strip_option))]
    pub bucket: Option<String>,

    /// Prefix-to-bucket routes; the longest matching prefix wins.
    #[builder(default)]
    pub bucket_mappings: Vec<BucketMapping>,

    /// Custom endpoint URL (MinIO, LocalStack, ...).
    #[builder(default, setter(strip_option))]
    pub endpoint: Option<String>,

    /// Base URL for public object links. Defaults to the virtual-hosted AWS URL.
    #[builder(default, setter(strip_option))]
    pub public_endpoint: Option<String>,

    /// Region used until the bucket's real region has been discovered.
    #[builder(default = String::from("us-east-1"))]
    pub region: String,

    /// Access key ID.
    #[builder(default, setter(strip_option))]
    pub access_key_id: Option<String>,

    /// Secret access key.
    #[serde(skip_serializing)]
    #[builder(default, setter(strip_option))]
    pub secret_access_key: Option<String>,

    /// Use path-style addressing (required by most S3 emulators).
    #[builder(default = false)]
    pub force_path_style: bool,

    /// Local directory that logical paths are rooted at.
    #[builder(default = PathBuf::from("."))]
    pub local_root: PathBuf,

    /// Local directory used to mirror remote objects (temp/cache copies).
    #[builder(default, setter(strip_option))]
    pub temp_root: Option<PathBuf>,

    /// Whether the bucket allows anonymous reads.
    #[builder(default = false)]
    pub public_read: bool,

    /// Download endpoint for non-public files.
    #[builder(default = String::from("/getfile"))]
    pub download_endpoint: String,

    /// Secret mixed into download-link hashes.
    #[serde(skip_serializing, default)]
    #[builder(default)]
    pub hash_salt: String,

    /// Minimum size of every multipart part except the last.
    #[builder(default = DEFAULT_MIN_PART_SIZE)]
    pub min_part_size: u64,

    /// Maximum size of a single multipart part.
    #[builder(default = DEFAULT_MAX_PART_SIZE)]
    pub max_part_size: u64,

    /// Content length above which writes use multipart upload.
    #[builder(default = DEFAULT_MULTIPART_THRESHOLD)]
    pub multipart_threshold: u64,

    /// Maximum keys per multi-object delete request.
    #[builder(default = DEFAULT_BATCH_DELETE_LIMIT)]
    pub batch_delete_limit: usize,

    /// Prefix of metadata sidecar objects. Must end with `/`.
    #[builder(default = String::from(DEFAULT_METADATA_PREFIX))]
    pub metadata_prefix: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl std::fmt::Debug for VfsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsConfig")
            .field("bucket", &self.bucket)
            .field("bucket_mappings", &self.bucket_mappings)
            .field("endpoint", &self.endpoint)
            .field("public_endpoint", &self.public_endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("force_path_style", &self.force_path_style)
            .field("local_root", &self.local_root)
            .field("temp_root", &self.temp_root)
            .field("public_read", &self.public_read)
            .field("download_endpoint", &self.download_endpoint)
            .field("min_part_size", &self.min_part_size)
            .field("max_part_size", &self.max_part_size)
            .field("multipart_threshold", &self.multipart_threshold)
            .field("batch_delete_limit", &self.batch_delete_limit)
            .field("metadata_prefix", &self.metadata_prefix)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl VfsConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `S3VFS_BUCKET` | *(unset: local only)* |
    /// | `S3VFS_BUCKET_MAPPINGS` | *(empty)*, format `prefix=bucket,prefix=bucket` |
    /// | `S3VFS_ENDPOINT` | *(AWS)* |
    /// | `S3VFS_PUBLIC_ENDPOINT` | *(derived)* |
    /// | `S3VFS_REGION` / `AWS_REGION` | `us-east-1` |
    /// | `S3VFS_ACCESS_KEY` / `AWS_ACCESS_KEY_ID` | *(unset)* |
    /// | `S3VFS_SECRET_KEY` / `AWS_SECRET_ACCESS_KEY` | *(unset)* |
    /// | `S3VFS_FORCE_PATH_STYLE` | `false` |
    /// | `S3VFS_LOCAL_ROOT` | `.` |
    /// | `S3VFS_TEMP_ROOT` | *(unset)* |
    /// | `S3VFS_PUBLIC_READ` | `false` |
    /// | `S3VFS_DOWNLOAD_ENDPOINT` | `/getfile` |
    /// | `S3VFS_HASH_SALT` | *(empty)* |
    /// | `S3VFS_MIN_PART_SIZE` | `5242880` |
    /// | `S3VFS_MAX_PART_SIZE` | `5368709120` |
    /// | `S3VFS_MULTIPART_THRESHOLD` | `52428800` |
    /// | `S3VFS_BATCH_DELETE_LIMIT` | `1000` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// # Examples
    ///
    /// ```
    /// use s3vfs_core::config::VfsConfig;
    ///
    /// let config = VfsConfig::from_env();
    /// assert!(!config.region.is_empty());
    /// ```
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("S3VFS_BUCKET") {
            config.bucket = non_empty(v);
        }
        if let Ok(v) = std::env::var("S3VFS_BUCKET_MAPPINGS") {
            config.bucket_mappings = parse_bucket_mappings(&v);
        }
        if let Ok(v) = std::env::var("S3VFS_ENDPOINT") {
            config.endpoint = non_empty(v);
        }
        if let Ok(v) = std::env::var("S3VFS_PUBLIC_ENDPOINT") {
            config.public_endpoint = non_empty(v);
        }
        if let Ok(v) = std::env::var("S3VFS_REGION").or_else(|_| std::env::var("AWS_REGION")) {
            config.region = v;
        }
        if let Ok(v) =
            std::env::var("S3VFS_ACCESS_KEY").or_else(|_| std::env::var("AWS_ACCESS_KEY_ID"))
        {
            config.access_key_id = non_empty(v);
        }
        if let Ok(v) =
            std::env::var("S3VFS_SECRET_KEY").or_else(|_| std::env::var("AWS_SECRET_ACCESS_KEY"))
        {
            config.secret_access_key = non_empty(v);
        }
        if let Ok(v) = std::env::var("S3VFS_FORCE_PATH_STYLE") {
            config.force_path_style = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("S3VFS_LOCAL_ROOT") {
            config.local_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("S3VFS_TEMP_ROOT") {
            config.temp_root = non_empty(v).map(PathBuf::from);
        }
        if let Ok(v) = std::env::var("S3VFS_PUBLIC_READ") {
            config.public_read = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("S3VFS_DOWNLOAD_ENDPOINT") {
            config.download_endpoint = v;
        }
        if let Ok(v) = std::env::var("S3VFS_HASH_SALT") {
            config.hash_salt = v;
        }
        if let Some(n) = parse_env_number("S3VFS_MIN_PART_SIZE") {
            config.min_part_size = n;
        }
        if let Some(n) = parse_env_number("S3VFS_MAX_PART_SIZE") {
            config.max_part_size = n;
        }
        if let Some(n) = parse_env_number("S3VFS_MULTIPART_THRESHOLD") {
            config.multipart_threshold = n;
        }
        if let Some(n) = parse_env_number::<usize>("S3VFS_BATCH_DELETE_LIMIT") {
            config.batch_delete_limit = n;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Check the configuration for values the adapters cannot work with.
    pub fn validate(&self) -> VfsResult<()> {
        if self.min_part_size == 0 {
            return Err(VfsError::Configuration(
                "min_part_size must be greater than zero".to_owned(),
            ));
        }
        if self.min_part_size > self.max_part_size {
            return Err(VfsError::Configuration(format!(
                "min_part_size ({}) exceeds max_part_size ({})",
                self.min_part_size, self.max_part_size
            )));
        }
        if self.batch_delete_limit == 0 {
            return Err(VfsError::Configuration(
                "batch_delete_limit must be greater than zero".to_owned(),
            ));
        }
        if self.metadata_prefix.is_empty() || !self.metadata_prefix.ends_with('/') {
            return Err(VfsError::Configuration(format!(
                "metadata_prefix must be non-empty and end with '/': {:?}",
                self.metadata_prefix
            )));
        }
        if let Some(mapping) = self.bucket_mappings.iter().find(|m| m.bucket.is_empty()) {
            return Err(VfsError::Configuration(format!(
                "bucket mapping for prefix {:?} has an empty bucket name",
                mapping.prefix
            )));
        }
        Ok(())
    }

    /// Every bucket this configuration routes paths to.
    #[must_use]
    pub fn buckets(&self) -> Vec<String> {
        let mut buckets: Vec<String> = self
            .bucket
            .iter()
            .chain(self.bucket_mappings.iter().map(|m| &m.bucket))
            .cloned()
            .collect();
        buckets.sort();
        buckets.dedup();
        buckets
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

/// Parse `prefix=bucket,prefix=bucket`; malformed entries are skipped.
fn parse_bucket_mappings(value: &str) -> Vec<BucketMapping> {
    value
        .split(',')
        .filter_map(|entry| {
            let (prefix, bucket) = entry.split_once('=')?;
            let bucket = bucket.trim();
            if bucket.is_empty() {
                return None;
            }
            Some(BucketMapping {
                prefix: prefix.trim().to_owned(),
                bucket: bucket.to_owned(),
            })
        })
        .collect()
}
