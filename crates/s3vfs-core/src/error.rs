//! Error types for the virtual file system.
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`] is produced by an [`ObjectStoreClient`](crate::store::ObjectStoreClient)
//!   implementation and describes what the remote object store answered.
//! - [`VfsError`] is what callers of the adapters see. It presents
//!   file-system-style failures (not found, directory not empty, I/O) no matter
//!   whether the failure happened locally or remotely.
//!
//! # Usage
//!
//! ```
//! use s3vfs_core::error::{StoreError, VfsError};
//!
//! let err: VfsError = StoreError::NotFound { key: "a/b.txt".to_owned() }.into();
//! assert!(err.is_not_found());
//! ```

/// Errors reported by an object-store transport.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The key (or bucket) does not exist.
    #[error("The specified key does not exist: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// The multipart upload does not exist (already completed or aborted).
    #[error("The specified upload does not exist: {upload_id}")]
    NoSuchUpload {
        /// The upload ID that was not found.
        upload_id: String,
    },

    /// One or more parts referenced on completion were never uploaded.
    #[error("One or more of the specified parts could not be found")]
    InvalidPart,

    /// Parts on completion were not in ascending order.
    #[error("The list of parts was not in ascending order")]
    InvalidPartOrder,

    /// A non-final part is below the store's minimum part size.
    #[error("Your proposed upload is smaller than the minimum allowed object size")]
    EntityTooSmall,

    /// Any other service-side rejection, kept verbatim.
    #[error("{code}: {message}")]
    Service {
        /// The service error code (e.g. `AccessDenied`).
        code: String,
        /// The service error message.
        message: String,
    },

    /// Network, credential or decoding failure.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl StoreError {
    /// Whether this error means the addressed object is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors surfaced by the file-system adapters.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    // -----------------------------------------------------------------------
    // File-system style errors
    // -----------------------------------------------------------------------
    /// The file or directory does not exist.
    #[error("Could not find a part of the path: {path}")]
    NotFound {
        /// The logical path that was not found.
        path: String,
    },

    /// The destination already exists.
    #[error("The file already exists: {path}")]
    AlreadyExists {
        /// The logical path that already exists.
        path: String,
    },

    /// A non-recursive delete hit a directory with children.
    #[error("The directory is not empty: {path}")]
    DirectoryNotEmpty {
        /// The directory that still has children.
        path: String,
    },

    /// The operation is not valid in the current state of the stores.
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation was rejected.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------
    /// Missing or invalid credentials, bucket, region or limits.
    #[error("configuration error: {0}")]
    Configuration(String),

    // -----------------------------------------------------------------------
    // Multipart protocol
    // -----------------------------------------------------------------------
    /// A part exceeds the configured maximum part size.
    #[error("Part {part_number} is {size} bytes, which exceeds the maximum part size of {max} bytes")]
    PartTooLarge {
        /// The offending part number.
        part_number: u32,
        /// Size of the part in bytes.
        size: u64,
        /// The configured maximum.
        max: u64,
    },

    /// A part number outside `1..=10000`.
    #[error("Part number must be between 1 and 10000, got {0}")]
    InvalidPartNumber(u32),

    /// Completion was requested with parts out of order.
    #[error("The list of parts was not in ascending order")]
    InvalidPartOrder,

    // -----------------------------------------------------------------------
    // Batch operations
    // -----------------------------------------------------------------------
    /// Some keys in a bulk delete could not be removed.
    #[error("Failed to delete {} object(s) under {path}: {}", failed.len(), failed.join(", "))]
    BatchDelete {
        /// The logical path whose contents were being deleted.
        path: String,
        /// The keys the store refused to delete.
        failed: Vec<String>,
    },

    // -----------------------------------------------------------------------
    // Wrapped errors
    // -----------------------------------------------------------------------
    /// Error returned by the object store, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Local file-system I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unexpected internal failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl VfsError {
    /// Shorthand for [`VfsError::InvalidOperation`].
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Whether this error means the path (or key) is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Store(e) => e.is_not_found(),
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether this error is an invalid-operation class error.
    #[must_use]
    pub fn is_invalid_operation(&self) -> bool {
        matches!(
            self,
            Self::InvalidOperation { .. } | Self::DirectoryNotEmpty { .. }
        )
    }
}

/// Convenience result type for adapter operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// Convenience result type for transport operations.
pub type StoreResult<T> = Result<T, StoreError>;
