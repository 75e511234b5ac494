//! Storage root and units of work.
//!
//! [`S3Storage`] is long-lived: it holds the configuration, the transport
//! client and the path mapper. Each logical unit of work (a request, a CLI
//! command) calls [`S3Storage::scope`] to get a [`StorageScope`] with a fresh
//! [`ObjectCache`]. Scopes are cheap to clone and independent of each other.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::cache::ObjectCache;
use crate::config::VfsConfig;
use crate::directory::DirectoryAdapter;
use crate::error::VfsResult;
use crate::file::FileAdapter;
use crate::local::TempMirror;
use crate::object_info::S3ObjectInfo;
use crate::path::{Backend, PathMapper};
use crate::provider::ObjectInfoProvider;
use crate::store::{InMemoryObjectStore, ObjectStoreClient};

/// Long-lived entry point of the virtual file system.
///
/// # Examples
///
/// ```
/// use s3vfs_core::config::VfsConfig;
/// use s3vfs_core::storage::S3Storage;
///
/// # tokio_test::block_on(async {
/// let storage = S3Storage::in_memory(VfsConfig::builder().bucket("site".to_owned()).build()).unwrap();
/// let scope = storage.scope();
/// scope.file().write_all_text("/docs/a.txt", "hello").await.unwrap();
/// assert!(scope.directory().exists("/Docs").await.unwrap());
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct S3Storage {
    config: Arc<VfsConfig>,
    client: Arc<dyn ObjectStoreClient>,
    mapper: Arc<PathMapper>,
    mirror: TempMirror,
}

impl S3Storage {
    /// Create a storage root over `client`. The configuration is validated.
    pub fn new(config: VfsConfig, client: Arc<dyn ObjectStoreClient>) -> VfsResult<Self> {
        config.validate()?;
        let mapper = Arc::new(PathMapper::new(&config));
        let mirror = TempMirror::new(config.temp_root.clone());
        debug!(buckets = ?config.buckets(), local_root = %config.local_root.display(), "created storage");
        Ok(Self {
            config: Arc::new(config),
            client,
            mapper,
            mirror,
        })
    }

    /// Create a storage root over a fresh [`InMemoryObjectStore`].
    pub fn in_memory(config: VfsConfig) -> VfsResult<Self> {
        let store = InMemoryObjectStore::with_min_part_size(config.min_part_size);
        Self::new(config, Arc::new(store))
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// The transport client.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn ObjectStoreClient> {
        &self.client
    }

    /// Start a unit of work with an empty cache.
    #[must_use]
    pub fn scope(&self) -> StorageScope {
        StorageScope {
            provider: ObjectInfoProvider::new(
                self.client.clone(),
                Arc::new(ObjectCache::new()),
                self.config.clone(),
            ),
            mapper: self.mapper.clone(),
            mirror: self.mirror.clone(),
        }
    }
}

/// One unit of work. Everything created from a scope shares its cache.
#[derive(Debug, Clone)]
pub struct StorageScope {
    provider: ObjectInfoProvider,
    mapper: Arc<PathMapper>,
    mirror: TempMirror,
}

impl StorageScope {
    /// The provider of this scope.
    #[must_use]
    pub fn provider(&self) -> &ObjectInfoProvider {
        &self.provider
    }

    /// The path mapper.
    #[must_use]
    pub fn mapper(&self) -> &PathMapper {
        &self.mapper
    }

    /// The temp mirror.
    #[must_use]
    pub fn mirror(&self) -> &TempMirror {
        &self.mirror
    }

    /// Directory operations.
    #[must_use]
    pub fn directory(&self) -> DirectoryAdapter {
        DirectoryAdapter::new(self.clone())
    }

    /// File operations.
    #[must_use]
    pub fn file(&self) -> FileAdapter {
        FileAdapter::new(self.clone())
    }

    /// Object view of a file path; `None` for local-only paths.
    #[must_use]
    pub fn object_info(&self, path: &str) -> Option<S3ObjectInfo> {
        match self.mapper.resolve(path) {
            Backend::Remote(loc) => Some(S3ObjectInfo::new(self.provider.clone(), loc)),
            Backend::Local(_) => None,
        }
    }

    /// Object view of a directory path; `None` for local-only paths.
    #[must_use]
    pub fn directory_info(&self, path: &str) -> Option<S3ObjectInfo> {
        match self.mapper.resolve_directory(path) {
            Backend::Remote(loc) => Some(S3ObjectInfo::new(self.provider.clone(), loc)),
            Backend::Local(_) => None,
        }
    }

    /// Local path of `path` under the local root, keeping its case.
    #[must_use]
    pub fn local_path(&self, path: &str) -> PathBuf {
        self.mapper.local_path(path)
    }
}
