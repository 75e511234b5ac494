//! Hierarchical file-system emulation over S3-compatible object storage.
//!
//! Paths such as `/Media/Images/Logo.png` map to lower-cased object keys
//! (`media/images/logo.png`), directories are zero-byte marker objects whose
//! key ends in `/`, and per-object metadata lives in sidecar objects under
//! `__metadata/`. Content that has not been migrated yet is served from a
//! local directory tree, so reads and enumerations see the union of both.
//!
//! # Architecture
//!
//! ```text
//!  DirectoryAdapter / FileAdapter        (file-system style operations)
//!        |
//!        v
//!  StorageScope ---- PathMapper, TempMirror
//!        |
//!        v
//!  ObjectInfoProvider + ObjectCache       (one cache per scope)
//!        |                  \
//!        v                   MultiPartUploader
//!  dyn ObjectStoreClient                  (AWS SDK, in-memory, ...)
//! ```

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod file;
pub mod local;
pub mod metadata;
pub mod multipart;
pub mod object_info;
pub mod path;
pub mod pattern;
pub mod provider;
pub mod storage;
pub mod store;
pub mod url;

pub use config::{BucketMapping, VfsConfig};
pub use directory::{DirectoryAdapter, SearchOption};
pub use error::{StoreError, VfsError, VfsResult};
pub use file::{FileAdapter, FileMode, FileWriter};
pub use object_info::S3ObjectInfo;
pub use storage::{S3Storage, StorageScope};
pub use store::{InMemoryObjectStore, ObjectStoreClient};
