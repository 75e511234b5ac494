//! In-memory [`ObjectStoreClient`] implementation.
//!
//! Objects live in one sorted map per bucket so prefix listings come out in
//! key order, the way S3 returns them. Multipart uploads keep their parts
//! until completion or abort.
//!
//! The store also counts requests per operation and can be told to fail a
//! given operation or to refuse deleting specific keys, which is what the
//! adapter tests use to observe round trips and failure handling.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use md5::{Digest, Md5};
use tracing::{debug, trace};
use uuid::Uuid;

use super::{CompletedPart, ListPage, ObjectHead, ObjectStoreClient, ObjectSummary};
use crate::config::DEFAULT_MIN_PART_SIZE;
use crate::error::{StoreError, StoreResult};

/// Store operations, used to count and fail requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// `HEAD` object.
    Head,
    /// `GET` object.
    Get,
    /// `PUT` object.
    Put,
    /// Server-side copy.
    Copy,
    /// Single `DELETE`.
    Delete,
    /// Multi-object delete.
    DeleteBatch,
    /// Prefix listing.
    List,
    /// Create multipart upload.
    CreateMultipart,
    /// Upload part.
    UploadPart,
    /// Complete multipart upload.
    CompleteMultipart,
    /// Abort multipart upload.
    AbortMultipart,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredPart {
    data: Bytes,
    etag: String,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<u32, StoredPart>,
}

/// Thread-safe in-memory object store.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use s3vfs_core::store::{InMemoryObjectStore, ObjectStoreClient};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryObjectStore::new();
/// store.put_object("media", "a/b.txt", Bytes::from("hello")).await.unwrap();
///
/// let head = store.head_object("media", "a/b.txt").await.unwrap();
/// assert_eq!(head.size, 5);
/// # });
/// ```
#[derive(Debug)]
pub struct InMemoryObjectStore {
    buckets: DashMap<String, BTreeMap<String, StoredObject>>,
    uploads: DashMap<String, PendingUpload>,
    min_part_size: u64,
    requests: DashMap<StoreOperation, u64>,
    /// Remaining successful calls before the operation fails once.
    failures: DashMap<StoreOperation, u64>,
    protected_keys: DashSet<String>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    /// Create an empty store enforcing the S3 minimum part size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_min_part_size(DEFAULT_MIN_PART_SIZE)
    }

    /// Create an empty store with a custom minimum part size.
    #[must_use]
    pub fn with_min_part_size(min_part_size: u64) -> Self {
        debug!(min_part_size, "creating InMemoryObjectStore");
        Self {
            buckets: DashMap::new(),
            uploads: DashMap::new(),
            min_part_size,
            requests: DashMap::new(),
            failures: DashMap::new(),
            protected_keys: DashSet::new(),
        }
    }

    /// Number of requests issued for `op` so far.
    #[must_use]
    pub fn request_count(&self, op: StoreOperation) -> u64 {
        self.requests.get(&op).map_or(0, |c| *c)
    }

    /// Total number of requests across all operations.
    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.requests.iter().map(|e| *e.value()).sum()
    }

    /// Reset every request counter.
    pub fn reset_request_counts(&self) {
        self.requests.clear();
    }

    /// Let `op` succeed `successes` more times, then fail once.
    pub fn fail_after(&self, op: StoreOperation, successes: u64) {
        self.failures.insert(op, successes);
    }

    /// Make multi-object deletes report `key` as failed.
    pub fn protect_key(&self, key: impl Into<String>) {
        self.protected_keys.insert(key.into());
    }

    /// All keys in `bucket`, sorted.
    #[must_use]
    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of multipart uploads neither completed nor aborted.
    #[must_use]
    pub fn pending_upload_count(&self) -> usize {
        self.uploads.len()
    }

    fn record(&self, op: StoreOperation) -> StoreResult<()> {
        *self.requests.entry(op).or_insert(0) += 1;

        let should_fail = match self.failures.get_mut(&op) {
            Some(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        if should_fail {
            self.failures.remove(&op);
            return Err(StoreError::Service {
                code: "InternalError".to_owned(),
                message: format!("injected failure for {op:?}"),
            });
        }
        Ok(())
    }

    fn read(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        self.buckets
            .get(bucket)
            .and_then(|b| b.get(key).cloned())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_owned(),
            })
    }

    fn write(&self, bucket: &str, key: &str, data: Bytes, etag: String) -> String {
        trace!(bucket, key, size = data.len(), "stored object data");
        self.buckets.entry(bucket.to_owned()).or_default().insert(
            key.to_owned(),
            StoredObject {
                data,
                etag: etag.clone(),
                last_modified: Utc::now(),
            },
        );
        etag
    }
}

#[async_trait]
impl ObjectStoreClient for InMemoryObjectStore {
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        self.record(StoreOperation::Head)?;
        let obj = self.read(bucket, key)?;
        Ok(ObjectHead {
            key: key.to_owned(),
            size: obj.data.len() as u64,
            etag: obj.etag,
            last_modified: obj.last_modified,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        self.record(StoreOperation::Get)?;
        Ok(self.read(bucket, key)?.data)
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StoreResult<String> {
        self.record(StoreOperation::Put)?;
        let etag = compute_etag(&body);
        Ok(self.write(bucket, key, body, etag))
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<String> {
        self.record(StoreOperation::Copy)?;
        let src = self.read(src_bucket, src_key)?;
        debug!(
            src_bucket,
            src_key,
            dst_bucket,
            dst_key,
            size = src.data.len(),
            "copying object data"
        );
        Ok(self.write(dst_bucket, dst_key, src.data, src.etag))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.record(StoreOperation::Delete)?;
        if let Some(mut b) = self.buckets.get_mut(bucket) {
            if b.remove(key).is_some() {
                trace!(bucket, key, "deleted object data");
            }
        }
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<Vec<String>> {
        self.record(StoreOperation::DeleteBatch)?;
        if keys.len() > 1000 {
            return Err(StoreError::Service {
                code: "MalformedXML".to_owned(),
                message: format!("at most 1000 keys per request, got {}", keys.len()),
            });
        }
        let mut failed = Vec::new();
        if let Some(mut b) = self.buckets.get_mut(bucket) {
            for key in keys {
                if self.protected_keys.contains(key) {
                    failed.push(key.clone());
                } else {
                    b.remove(key);
                }
            }
        } else {
            failed.extend(
                keys.iter()
                    .filter(|k| self.protected_keys.contains(*k))
                    .cloned(),
            );
        }
        Ok(failed)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ListPage> {
        self.record(StoreOperation::List)?;
        let Some(b) = self.buckets.get(bucket) else {
            return Ok(ListPage::default());
        };
        Ok(list_from_btree(
            b.iter(),
            prefix,
            delimiter.unwrap_or(""),
            continuation_token.unwrap_or(""),
            max_keys,
        ))
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StoreResult<String> {
        self.record(StoreOperation::CreateMultipart)?;
        let upload_id = Uuid::new_v4().to_string();
        self.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                parts: BTreeMap::new(),
            },
        );
        debug!(bucket, key, upload_id, "created multipart upload");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> StoreResult<String> {
        self.record(StoreOperation::UploadPart)?;
        let mut upload = self
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.bucket == bucket && u.key == key)
            .ok_or_else(|| StoreError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            })?;
        let etag = compute_etag(&body);
        trace!(bucket, upload_id, part_number, size = body.len(), "stored part data");
        upload.parts.insert(
            part_number,
            StoredPart {
                data: body,
                etag: etag.clone(),
            },
        );
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<String> {
        self.record(StoreOperation::CompleteMultipart)?;
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(StoreError::InvalidPartOrder);
        }

        let no_such_upload = || StoreError::NoSuchUpload {
            upload_id: upload_id.to_owned(),
        };
        let (combined, etag) = {
            let upload = self
                .uploads
                .get(upload_id)
                .filter(|u| u.bucket == bucket && u.key == key)
                .ok_or_else(no_such_upload)?;

            let mut combined = BytesMut::new();
            let mut part_md5s = Vec::with_capacity(parts.len());
            for (idx, requested) in parts.iter().enumerate() {
                let stored = upload
                    .parts
                    .get(&requested.part_number)
                    .filter(|p| p.etag.trim_matches('"') == requested.etag.trim_matches('"'))
                    .ok_or(StoreError::InvalidPart)?;
                let is_last = idx + 1 == parts.len();
                if !is_last && (stored.data.len() as u64) < self.min_part_size {
                    return Err(StoreError::EntityTooSmall);
                }
                combined.extend_from_slice(&stored.data);
                part_md5s.push(stored.etag.trim_matches('"').to_owned());
            }
            (combined.freeze(), compute_multipart_etag(&part_md5s))
        };

        self.uploads.remove(upload_id);
        debug!(bucket, key, upload_id, parts = parts.len(), "completed multipart upload");
        Ok(self.write(bucket, key, combined, etag))
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StoreResult<()> {
        self.record(StoreOperation::AbortMultipart)?;
        match self.uploads.remove(upload_id) {
            Some(_) => {
                debug!(bucket, key, upload_id, "aborted multipart upload");
                Ok(())
            }
            None => Err(StoreError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            }),
        }
    }
}

/// Quoted hex MD5 of `data`.
fn compute_etag(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Md5::digest(data)))
}

/// MD5 of the concatenated binary part digests, suffixed with the part count.
fn compute_multipart_etag(part_md5_hexes: &[String]) -> String {
    let mut combined = Vec::with_capacity(part_md5_hexes.len() * 16);
    for hex_str in part_md5_hexes {
        if let Ok(bytes) = hex::decode(hex_str) {
            combined.extend_from_slice(&bytes);
        }
    }
    format!(
        "\"{}-{}\"",
        hex::encode(Md5::digest(&combined)),
        part_md5_hexes.len()
    )
}

/// Produce one page of a listing over keys in ascending order.
///
/// Entries and rolled-up prefixes both count towards `max_keys`. The
/// continuation token is the last entry emitted; a token that is a rolled-up
/// prefix also skips every key underneath it.
fn list_from_btree<'a>(
    objects: impl Iterator<Item = (&'a String, &'a StoredObject)>,
    prefix: &str,
    delimiter: &str,
    start_after: &str,
    max_keys: usize,
) -> ListPage {
    let use_delim = !delimiter.is_empty();
    let skip_rolled_up = use_delim && start_after.ends_with(delimiter);
    let mut page = ListPage::default();
    let mut seen_prefixes = HashSet::new();
    let mut count = 0usize;
    let mut last_emitted: Option<String> = None;

    for (key, obj) in objects {
        if !start_after.is_empty()
            && (key.as_str() <= start_after || (skip_rolled_up && key.starts_with(start_after)))
        {
            continue;
        }
        if !key.starts_with(prefix) {
            continue;
        }

        let rolled_up = if use_delim {
            key[prefix.len()..]
                .find(delimiter)
                .map(|pos| format!("{prefix}{}{delimiter}", &key[prefix.len()..prefix.len() + pos]))
        } else {
            None
        };
        if let Some(cp) = &rolled_up {
            if seen_prefixes.contains(cp) {
                continue;
            }
        }

        if count >= max_keys {
            page.next_token = last_emitted;
            return page;
        }
        count += 1;

        match rolled_up {
            Some(cp) => {
                seen_prefixes.insert(cp.clone());
                page.common_prefixes.push(cp.clone());
                last_emitted = Some(cp);
            }
            None => {
                page.objects.push(ObjectSummary {
                    key: key.clone(),
                    size: obj.data.len() as u64,
                    etag: obj.etag.clone(),
                    last_modified: obj.last_modified,
                });
                last_emitted = Some(key.clone());
            }
        }
    }

    page
}
