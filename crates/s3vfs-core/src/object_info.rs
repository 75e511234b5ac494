//! A single logical file or directory in the object store.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::VfsResult;
use crate::metadata::{self, LAST_WRITE_TIME, LOCK, MetadataMap};
use crate::path::{ObjectLocation, PathMapper};
use crate::provider::ObjectInfoProvider;

/// Lazily loaded view of one object.
///
/// Construction performs no I/O. The first attribute access loads the HEAD
/// result and the sidecar into the scope cache; later accesses, from this
/// value or any other [`S3ObjectInfo`] for the same key in the same scope, are
/// served from the cache.
#[derive(Debug, Clone)]
pub struct S3ObjectInfo {
    provider: ObjectInfoProvider,
    location: ObjectLocation,
}

impl S3ObjectInfo {
    /// Create a view of `location`.
    #[must_use]
    pub fn new(provider: ObjectInfoProvider, location: ObjectLocation) -> Self {
        Self { provider, location }
    }

    /// Bucket and key.
    #[must_use]
    pub fn location(&self) -> &ObjectLocation {
        &self.location
    }

    /// Object key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.location.key
    }

    /// `/`-rooted path without trailing slash.
    #[must_use]
    pub fn logical_path(&self) -> String {
        PathMapper::to_logical_path(&self.location.key)
    }

    /// Whether the key denotes a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.location.is_directory()
    }

    /// Whether the object exists. Not-found is `false`; other failures are
    /// returned.
    pub async fn exists(&self) -> VfsResult<bool> {
        self.provider.object_exists(&self.location).await
    }

    /// Content length, `0` for absent objects and marker-less directories.
    pub async fn length(&self) -> VfsResult<u64> {
        let entry = self.provider.load(&self.location).await?;
        Ok(entry.head.map_or(0, |h| h.size))
    }

    /// Entity tag as reported by the store.
    pub async fn etag(&self) -> VfsResult<Option<String>> {
        let entry = self.provider.load(&self.location).await?;
        Ok(entry.head.map(|h| h.etag))
    }

    /// Logical last-write time: `LAST_WRITE_TIME` from the sidecar, else the
    /// native last-modified time.
    pub async fn last_write_time(&self) -> VfsResult<Option<DateTime<Utc>>> {
        let entry = self.provider.load(&self.location).await?;
        Ok(entry
            .metadata
            .get(LAST_WRITE_TIME)
            .and_then(|v| metadata::parse_time(v))
            .or_else(|| entry.head.map(|h| h.last_modified)))
    }

    /// Whether the advisory lock flag is set.
    pub async fn is_locked(&self) -> VfsResult<bool> {
        Ok(self
            .get_metadata(LOCK)
            .await?
            .is_some_and(|v| v.eq_ignore_ascii_case("true")))
    }

    /// One metadata value.
    pub async fn get_metadata(&self, key: &str) -> VfsResult<Option<String>> {
        let entry = self.provider.load(&self.location).await?;
        Ok(entry.metadata.get(key).cloned())
    }

    /// The whole metadata map, including unsaved edits.
    pub async fn metadata(&self) -> VfsResult<MetadataMap> {
        Ok(self.provider.load(&self.location).await?.metadata)
    }

    /// Set a metadata value.
    ///
    /// The value is recorded in the scope cache. With `update`, the whole
    /// sidecar is rewritten (last writer wins). With `log`, an audit event is
    /// emitted on the `s3vfs::trace` target.
    pub async fn set_metadata(&self, key: &str, value: &str, update: bool, log: bool) -> VfsResult<()> {
        metadata::validate_entry(key, value)?;

        let mut entry = self.provider.load(&self.location).await?;
        entry.metadata.insert(key.to_owned(), value.to_owned());
        self.provider.cache().update(&self.location, |cached| {
            cached.metadata.insert(key.to_owned(), value.to_owned());
        });

        if log {
            info!(
                target: "s3vfs::trace",
                bucket = %self.location.bucket,
                key = %self.location.key,
                metadata_key = key,
                value,
                "metadata changed"
            );
        }

        if update {
            self.provider
                .write_metadata_file(&self.location, &entry.metadata)
                .await?;
        }
        Ok(())
    }

    /// Persist a new logical last-write time.
    pub async fn set_last_write_time(&self, time: DateTime<Utc>) -> VfsResult<()> {
        self.set_metadata(LAST_WRITE_TIME, &metadata::format_time(time), true, false)
            .await
    }

    /// Set the advisory lock. No-op for a missing object.
    pub async fn lock(&self) -> VfsResult<()> {
        self.set_lock(true).await
    }

    /// Clear the advisory lock. No-op for a missing object.
    pub async fn unlock(&self) -> VfsResult<()> {
        self.set_lock(false).await
    }

    async fn set_lock(&self, locked: bool) -> VfsResult<()> {
        if !self.exists().await? {
            return Ok(());
        }
        let value = if locked { "True" } else { "False" };
        self.set_metadata(LOCK, value, true, false).await
    }

    /// Remove only the sidecar.
    pub async fn delete_metadata_file(&self) -> VfsResult<()> {
        self.provider.delete_metadata_file(&self.location).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use chrono::TimeZone;

    use super::*;
    use crate::cache::ObjectCache;
    use crate::config::VfsConfig;
    use crate::store::memory::StoreOperation;
    use crate::store::{InMemoryObjectStore, ObjectStoreClient};

    fn scope(store: &Arc<InMemoryObjectStore>) -> ObjectInfoProvider {
        ObjectInfoProvider::new(
            store.clone(),
            Arc::new(ObjectCache::new()),
            Arc::new(VfsConfig::builder().bucket("b".to_owned()).build()),
        )
    }

    fn object(provider: &ObjectInfoProvider, key: &str) -> S3ObjectInfo {
        S3ObjectInfo::new(provider.clone(), ObjectLocation::new("b", key))
    }

    #[tokio::test]
    async fn test_should_construct_without_network() {
        let store = Arc::new(InMemoryObjectStore::new());
        let obj = object(&scope(&store), "a/b.txt");
        assert_eq!(obj.logical_path(), "/a/b.txt");
        assert!(!obj.is_directory());
        assert_eq!(store.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_should_load_attributes_with_one_head_and_one_get() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.put_object("b", "f.txt", Bytes::from("hello")).await.unwrap();
        store.reset_request_counts();

        let obj = object(&scope(&store), "f.txt");
        assert!(obj.exists().await.unwrap());
        assert_eq!(obj.length().await.unwrap(), 5);
        assert!(obj.etag().await.unwrap().is_some());
        assert!(obj.last_write_time().await.unwrap().is_some());
        assert!(!obj.is_locked().await.unwrap());
        assert_eq!(obj.get_metadata("missing").await.unwrap(), None);

        assert_eq!(store.request_count(StoreOperation::Head), 1);
        assert_eq!(store.request_count(StoreOperation::Get), 1);
    }

    #[tokio::test]
    async fn test_should_report_missing_object_softly() {
        let store = Arc::new(InMemoryObjectStore::new());
        let obj = object(&scope(&store), "nope.txt");
        assert!(!obj.exists().await.unwrap());
        assert_eq!(obj.length().await.unwrap(), 0);
        assert_eq!(obj.etag().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_should_round_trip_metadata_across_scopes() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.put_object("b", "f.txt", Bytes::from("x")).await.unwrap();

        let first = scope(&store);
        object(&first, "f.txt")
            .set_metadata("Owner", "alice", true, true)
            .await
            .unwrap();
        assert_eq!(
            object(&first, "f.txt").get_metadata("Owner").await.unwrap().as_deref(),
            Some("alice")
        );

        let second = scope(&store);
        let obj = object(&second, "f.txt");
        assert_eq!(obj.get_metadata("Owner").await.unwrap().as_deref(), Some("alice"));
        assert!(obj.get_metadata(LAST_WRITE_TIME).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_should_keep_unsaved_metadata_in_scope_only() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.put_object("b", "f.txt", Bytes::from("x")).await.unwrap();

        let first = scope(&store);
        object(&first, "f.txt")
            .set_metadata("Draft", "yes", false, false)
            .await
            .unwrap();
        assert_eq!(
            object(&first, "f.txt").get_metadata("Draft").await.unwrap().as_deref(),
            Some("yes")
        );
        assert_eq!(
            object(&scope(&store), "f.txt").get_metadata("Draft").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_should_lock_and_unlock_existing_object() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.put_object("b", "f.txt", Bytes::from("x")).await.unwrap();
        let provider = scope(&store);

        object(&provider, "f.txt").lock().await.unwrap();
        assert!(object(&scope(&store), "f.txt").is_locked().await.unwrap());

        object(&provider, "f.txt").unlock().await.unwrap();
        let obj = object(&scope(&store), "f.txt");
        assert!(!obj.is_locked().await.unwrap());
        assert_eq!(obj.get_metadata(LOCK).await.unwrap().as_deref(), Some("False"));
    }

    #[tokio::test]
    async fn test_should_ignore_lock_on_missing_object() {
        let store = Arc::new(InMemoryObjectStore::new());
        object(&scope(&store), "ghost.txt").lock().await.unwrap();
        assert!(store.object_keys("b").is_empty());
        assert_eq!(store.request_count(StoreOperation::Put), 0);
    }

    #[tokio::test]
    async fn test_should_reject_delimiter_characters() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.put_object("b", "f.txt", Bytes::from("x")).await.unwrap();
        let obj = object(&scope(&store), "f.txt");
        assert!(obj.set_metadata("a;b", "v", true, false).await.unwrap_err().is_invalid_operation());
        assert!(obj.set_metadata("k", "v#", true, false).await.unwrap_err().is_invalid_operation());
    }

    #[tokio::test]
    async fn test_should_prefer_stored_last_write_time() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.put_object("b", "f.txt", Bytes::from("x")).await.unwrap();
        let t = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();

        object(&scope(&store), "f.txt").set_last_write_time(t).await.unwrap();

        assert_eq!(
            object(&scope(&store), "f.txt").last_write_time().await.unwrap(),
            Some(t)
        );
    }

    #[tokio::test]
    async fn test_should_delete_only_sidecar() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.put_object("b", "f.txt", Bytes::from("x")).await.unwrap();
        let provider = scope(&store);
        object(&provider, "f.txt").lock().await.unwrap();

        object(&provider, "f.txt").delete_metadata_file().await.unwrap();

        assert_eq!(store.object_keys("b"), vec!["f.txt".to_owned()]);
        assert!(!object(&provider, "f.txt").is_locked().await.unwrap());
    }
}
