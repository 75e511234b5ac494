//! The object-store transport seam.
//!
//! Every remote call the adapters make goes through [`ObjectStoreClient`].
//! Two implementations exist: [`InMemoryObjectStore`] (tests and local
//! experiments) and the `aws-sdk-s3` backed client in the `s3vfs-aws` crate.

pub mod memory;

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;

pub use memory::InMemoryObjectStore;

/// Maximum keys requested per list call.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Attributes returned by a HEAD request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    /// Object key.
    pub key: String,
    /// Content length in bytes.
    pub size: u64,
    /// Entity tag, as returned by the store (usually quoted).
    pub etag: String,
    /// Native last-modified timestamp.
    pub last_modified: DateTime<Utc>,
}

/// One entry of a list response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Object key.
    pub key: String,
    /// Content length in bytes.
    pub size: u64,
    /// Entity tag.
    pub etag: String,
    /// Native last-modified timestamp.
    pub last_modified: DateTime<Utc>,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Keys directly matched by the listing.
    pub objects: Vec<ObjectSummary>,
    /// Prefixes rolled up by the delimiter.
    pub common_prefixes: Vec<String>,
    /// Token for the next page; `None` on the last page.
    pub next_token: Option<String>,
}

/// A part reference used to complete a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// Part number (1-based).
    pub part_number: u32,
    /// ETag the store returned for the part.
    pub etag: String,
}

/// Minimal S3 operation set the adapters need.
///
/// Implementations report an absent key as
/// [`StoreError::NotFound`](crate::error::StoreError::NotFound) and
/// must never retry on their own.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync + Debug {
    /// HEAD an object.
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead>;

    /// GET an object's full body.
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes>;

    /// PUT an object, replacing any existing one. Returns the new ETag.
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StoreResult<String>;

    /// Server-side copy. Returns the destination ETag.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<String>;

    /// DELETE a single object. Deleting an absent key succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Multi-object delete of at most 1000 keys. Returns the keys the store
    /// refused to delete.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<Vec<String>>;

    /// List keys under `prefix`, rolling up at `delimiter` when given.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ListPage>;

    /// Start a multipart upload and return its upload ID.
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StoreResult<String>;

    /// Upload one part. Returns the part's ETag.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> StoreResult<String>;

    /// Assemble the uploaded parts into the final object. Returns its ETag.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<String>;

    /// Abort a multipart upload and discard its parts.
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StoreResult<()>;
}
