//! The object info provider.
//!
//! [`ObjectInfoProvider`] is the only component that talks to the
//! [`ObjectStoreClient`]. It layers three things on top of the raw transport:
//!
//! - **Caching**: attribute lookups go through the scope's [`ObjectCache`],
//!   and every mutation invalidates the entries it affects, so a scope always
//!   observes its own writes.
//! - **Directory emulation**: directory existence falls back to a prefix
//!   listing when no marker exists, and recursive listings synthesize the
//!   intermediate directories S3 never stores.
//! - **Metadata sidecars**: reading, writing and deleting
//!   `<metadata_prefix><key>.meta` objects.
//!
//! Not-found on reads maps to `false`/`None`/empty rather than an error.

use std::collections::BTreeSet;
use std::io::{Cursor, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::{debug, trace};

use crate::cache::{CachedObject, ObjectCache};
use crate::config::VfsConfig;
use crate::error::{StoreError, VfsError, VfsResult};
use crate::metadata::{self, LAST_WRITE_TIME, MetadataMap};
use crate::multipart::MultiPartUploader;
use crate::path::{ObjectLocation, PathMapper};
use crate::store::{DEFAULT_LIST_PAGE_SIZE, ListPage, ObjectHead, ObjectStoreClient};

/// Which entries a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingType {
    /// File keys only.
    Files,
    /// Directory keys only (ending with `/`).
    Directories,
    /// Both.
    All,
}

impl ListingType {
    fn files(self) -> bool {
        matches!(self, Self::Files | Self::All)
    }

    fn directories(self) -> bool {
        matches!(self, Self::Directories | Self::All)
    }
}

/// Reader over a fully fetched object body.
pub type ObjectReader = Cursor<Bytes>;

/// Remote access layer shared by the adapters of one scope.
#[derive(Debug, Clone)]
pub struct ObjectInfoProvider {
    client: Arc<dyn ObjectStoreClient>,
    cache: Arc<ObjectCache>,
    config: Arc<VfsConfig>,
}

impl ObjectInfoProvider {
    /// Create a provider bound to a client, a scope cache and configuration.
    #[must_use]
    pub fn new(
        client: Arc<dyn ObjectStoreClient>,
        cache: Arc<ObjectCache>,
        config: Arc<VfsConfig>,
    ) -> Self {
        Self {
            client,
            cache,
            config,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// The scope cache.
    #[must_use]
    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// A multipart uploader bound to the same client.
    #[must_use]
    pub fn multipart(&self) -> MultiPartUploader {
        MultiPartUploader::new(self.client.clone(), &self.config)
    }

    fn sidecar(&self, loc: &ObjectLocation) -> ObjectLocation {
        loc.with_key(metadata::sidecar_key(&self.config.metadata_prefix, &loc.key))
    }

    fn is_sidecar(&self, key: &str) -> bool {
        metadata::is_sidecar_key(&self.config.metadata_prefix, key)
    }

    // -----------------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------------

    /// Everything known about `loc`, fetched once per scope.
    ///
    /// A miss costs one HEAD, plus a one-key listing for directories without a
    /// marker, plus one sidecar GET when the object exists. The metadata map
    /// always carries `LAST_WRITE_TIME` for objects that have a native
    /// last-modified time.
    pub async fn load(&self, loc: &ObjectLocation) -> VfsResult<CachedObject> {
        if let Some(entry) = self.cache.get(loc) {
            return Ok(entry);
        }

        let entry = if loc.key.is_empty() {
            CachedObject {
                exists: true,
                ..CachedObject::default()
            }
        } else {
            let head = self.fetch_head(loc).await?;
            let exists = head.is_some()
                || (loc.is_directory() && self.has_children(&loc.bucket, &loc.key).await?);
            if exists {
                let sidecar = self.fetch_metadata(loc).await?;
                let has_sidecar = sidecar.is_some();
                let mut metadata = sidecar.unwrap_or_default();
                if let Some(head) = &head {
                    metadata
                        .entry(LAST_WRITE_TIME.to_owned())
                        .or_insert_with(|| metadata::format_time(head.last_modified));
                }
                CachedObject {
                    exists,
                    head,
                    metadata,
                    has_sidecar,
                }
            } else {
                CachedObject::missing()
            }
        };

        self.cache.insert(loc.clone(), entry.clone());
        Ok(entry)
    }

    /// Whether `loc` exists. For directory keys, any key under the prefix
    /// counts.
    pub async fn object_exists(&self, loc: &ObjectLocation) -> VfsResult<bool> {
        Ok(self.load(loc).await?.exists)
    }

    /// HEAD attributes of the exact key, `None` when absent.
    pub async fn get_object_head(&self, loc: &ObjectLocation) -> VfsResult<Option<ObjectHead>> {
        Ok(self.load(loc).await?.head)
    }

    async fn fetch_head(&self, loc: &ObjectLocation) -> VfsResult<Option<ObjectHead>> {
        match self.client.head_object(&loc.bucket, &loc.key).await {
            Ok(head) => Ok(Some(head)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    async fn list_all_pages(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> VfsResult<ListPage> {
        let mut merged = ListPage::default();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects(bucket, prefix, delimiter, token.as_deref(), DEFAULT_LIST_PAGE_SIZE)
                .await?;
            merged.objects.extend(page.objects);
            merged.common_prefixes.extend(page.common_prefixes);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        trace!(
            bucket,
            prefix,
            objects = merged.objects.len(),
            prefixes = merged.common_prefixes.len(),
            "listed objects"
        );
        Ok(merged)
    }

    /// List keys under a directory `prefix`.
    ///
    /// Without `recursive`, only immediate children are returned. With it,
    /// every descendant is returned, and every intermediate directory implied
    /// by a deeper key is reported even when no marker object exists. Empty
    /// directories that exist only as a marker appear in a recursive
    /// [`ListingType::All`] listing only when `include_markers` is set.
    ///
    /// The prefix's own marker and sidecar keys are never returned. Results
    /// are sorted.
    pub async fn get_objects_list(
        &self,
        bucket: &str,
        prefix: &str,
        listing: ListingType,
        recursive: bool,
        include_markers: bool,
    ) -> VfsResult<Vec<String>> {
        let mut result = BTreeSet::new();

        if recursive {
            let page = self.list_all_pages(bucket, prefix, None).await?;
            let mut files = BTreeSet::new();
            let mut markers = BTreeSet::new();
            let mut implied = BTreeSet::new();
            for obj in page.objects {
                let key = obj.key;
                if key == prefix || self.is_sidecar(&key) {
                    continue;
                }
                let rest = &key[prefix.len()..];
                for (idx, _) in rest.trim_end_matches('/').match_indices('/') {
                    implied.insert(format!("{prefix}{}", &rest[..=idx]));
                }
                if key.ends_with('/') {
                    markers.insert(key);
                } else {
                    files.insert(key);
                }
            }

            if listing.files() {
                result.extend(files);
            }
            match listing {
                ListingType::Directories => {
                    result.extend(implied);
                    result.extend(markers);
                }
                ListingType::All => {
                    result.extend(implied);
                    if include_markers {
                        result.extend(markers);
                    }
                }
                ListingType::Files => {}
            }
        } else {
            let page = self.list_all_pages(bucket, prefix, Some("/")).await?;
            if listing.files() {
                result.extend(
                    page.objects
                        .into_iter()
                        .map(|o| o.key)
                        .filter(|k| k != prefix && !k.ends_with('/') && !self.is_sidecar(k)),
                );
            }
            if listing.directories() {
                result.extend(
                    page.common_prefixes
                        .into_iter()
                        .filter(|p| p != prefix && !self.is_sidecar(p)),
                );
            }
        }

        debug!(bucket, prefix, ?listing, recursive, count = result.len(), "built object list");
        Ok(result.into_iter().collect())
    }

    /// Every stored key under `prefix`, including its own marker, excluding
    /// sidecars. Unlike [`get_objects_list`](Self::get_objects_list), nothing
    /// is synthesized.
    pub async fn list_keys(&self, bucket: &str, prefix: &str) -> VfsResult<Vec<String>> {
        let page = self.list_all_pages(bucket, prefix, None).await?;
        Ok(page
            .objects
            .into_iter()
            .map(|o| o.key)
            .filter(|k| !self.is_sidecar(k))
            .collect())
    }

    /// Every sidecar key describing an object under `prefix`.
    pub async fn list_metadata_files(&self, bucket: &str, prefix: &str) -> VfsResult<Vec<String>> {
        let sidecar_prefix = format!("{}{prefix}", self.config.metadata_prefix);
        let page = self.list_all_pages(bucket, &sidecar_prefix, None).await?;
        Ok(page.objects.into_iter().map(|o| o.key).collect())
    }

    /// Whether anything other than the marker itself lives under `prefix`.
    pub async fn has_children(&self, bucket: &str, prefix: &str) -> VfsResult<bool> {
        let mut token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects(bucket, prefix, Some("/"), token.as_deref(), DEFAULT_LIST_PAGE_SIZE)
                .await?;
            let found = page
                .objects
                .iter()
                .any(|o| o.key != prefix && !self.is_sidecar(&o.key))
                || page
                    .common_prefixes
                    .iter()
                    .any(|p| p != prefix && !self.is_sidecar(p));
            if found {
                return Ok(true);
            }
            match page.next_token {
                Some(next) => token = Some(next),
                None => return Ok(false),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    fn invalidate(&self, loc: &ObjectLocation) {
        self.cache.invalidate_prefix(&loc.bucket, &loc.key);
    }

    /// Create a zero-byte object (a directory marker when the key ends with
    /// `/`).
    pub async fn create_empty_object(&self, loc: &ObjectLocation) -> VfsResult<()> {
        self.client
            .put_object(&loc.bucket, &loc.key, Bytes::new())
            .await?;
        self.invalidate(loc);
        debug!(bucket = %loc.bucket, key = %loc.key, "created empty object");
        Ok(())
    }

    /// Server-side copy of an object and its sidecar, if any.
    pub async fn copy_object(&self, src: &ObjectLocation, dst: &ObjectLocation) -> VfsResult<()> {
        let has_sidecar = self.load(src).await?.has_sidecar;
        self.client
            .copy_object(&src.bucket, &src.key, &dst.bucket, &dst.key)
            .await
            .map_err(|e| not_found_as_path(e, &src.key))?;

        let dst_sidecar = self.sidecar(dst);
        if has_sidecar {
            let src_sidecar = self.sidecar(src);
            self.client
                .copy_object(&src_sidecar.bucket, &src_sidecar.key, &dst_sidecar.bucket, &dst_sidecar.key)
                .await?;
        } else {
            self.client
                .delete_object(&dst_sidecar.bucket, &dst_sidecar.key)
                .await?;
        }

        self.invalidate(dst);
        debug!(src = %src, dst = %dst, "copied object");
        Ok(())
    }

    /// Delete an object and its sidecar.
    pub async fn delete_object(&self, loc: &ObjectLocation) -> VfsResult<()> {
        self.client.delete_object(&loc.bucket, &loc.key).await?;
        let sidecar = self.sidecar(loc);
        self.client
            .delete_object(&sidecar.bucket, &sidecar.key)
            .await?;
        self.invalidate(loc);
        debug!(bucket = %loc.bucket, key = %loc.key, "deleted object");
        Ok(())
    }

    /// Delete many keys, chunked by the batch limit.
    ///
    /// All chunks are attempted; keys the store refuses are reported together
    /// in one [`VfsError::BatchDelete`] naming `context_path`.
    pub async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
        context_path: &str,
    ) -> VfsResult<()> {
        let mut failed = Vec::new();
        for chunk in keys.chunks(self.config.batch_delete_limit.max(1)) {
            failed.extend(self.client.delete_objects(bucket, chunk).await?);
        }
        for key in keys {
            self.cache.invalidate_prefix(bucket, key);
        }
        debug!(bucket, count = keys.len(), failed = failed.len(), "batch deleted objects");

        if failed.is_empty() {
            Ok(())
        } else {
            Err(VfsError::BatchDelete {
                path: context_path.to_owned(),
                failed,
            })
        }
    }

    /// Write a UTF-8 string.
    pub async fn put_text_to_object(&self, loc: &ObjectLocation, text: &str) -> VfsResult<String> {
        self.put_bytes_to_object(loc, Bytes::copy_from_slice(text.as_bytes()))
            .await
    }

    /// Write a byte buffer, switching to multipart above the threshold.
    pub async fn put_bytes_to_object(&self, loc: &ObjectLocation, body: Bytes) -> VfsResult<String> {
        let len = body.len() as u64;
        let etag = if len > self.config.multipart_threshold {
            self.multipart()
                .upload_from_stream(loc, &mut Cursor::new(body))
                .await?
        } else {
            self.client.put_object(&loc.bucket, &loc.key, body).await?
        };
        self.invalidate(loc);
        debug!(bucket = %loc.bucket, key = %loc.key, size = len, "put object");
        Ok(etag)
    }

    /// Write a seekable stream from its start, switching to multipart above
    /// the threshold.
    pub async fn put_data_from_stream_to_object<R>(
        &self,
        loc: &ObjectLocation,
        stream: &mut R,
    ) -> VfsResult<String>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let len = stream.seek(SeekFrom::End(0)).await?;
        stream.seek(SeekFrom::Start(0)).await?;

        if len > self.config.multipart_threshold {
            let etag = self.multipart().upload_from_stream(loc, stream).await?;
            self.invalidate(loc);
            debug!(bucket = %loc.bucket, key = %loc.key, size = len, "put object from stream");
            return Ok(etag);
        }

        let mut buf = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
        stream.read_to_end(&mut buf).await?;
        self.put_bytes_to_object(loc, Bytes::from(buf)).await
    }

    /// Upload a local file.
    pub async fn put_file_to_object(&self, loc: &ObjectLocation, path: &Path) -> VfsResult<String> {
        let mut file = tokio::fs::File::open(path).await?;
        self.put_data_from_stream_to_object(loc, &mut file).await
    }

    /// Append text by read-modify-write. A missing object starts empty.
    pub async fn append_text_to_object(&self, loc: &ObjectLocation, text: &str) -> VfsResult<String> {
        let mut content = self
            .get_object_content(loc)
            .await?
            .map(|b| b.to_vec())
            .unwrap_or_default();
        content.extend_from_slice(text.as_bytes());
        self.put_bytes_to_object(loc, Bytes::from(content)).await
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    /// Full object body, `None` when absent.
    pub async fn get_object_content(&self, loc: &ObjectLocation) -> VfsResult<Option<Bytes>> {
        match self.client.get_object(&loc.bucket, &loc.key).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Async reader over the object body, `None` when absent.
    pub async fn get_object_reader(&self, loc: &ObjectLocation) -> VfsResult<Option<ObjectReader>> {
        Ok(self.get_object_content(loc).await?.map(Cursor::new))
    }

    // -----------------------------------------------------------------------
    // Metadata sidecars
    // -----------------------------------------------------------------------

    async fn fetch_metadata(&self, loc: &ObjectLocation) -> VfsResult<Option<MetadataMap>> {
        let sidecar = self.sidecar(loc);
        Ok(self
            .get_object_content(&sidecar)
            .await?
            .map(|body| metadata::decode(&String::from_utf8_lossy(&body))))
    }

    /// Raw sidecar content of `loc`, `None` when there is no sidecar.
    pub async fn read_metadata_file(&self, loc: &ObjectLocation) -> VfsResult<Option<MetadataMap>> {
        if let Some(entry) = self.cache.get(loc) {
            if !entry.has_sidecar {
                return Ok(None);
            }
        }
        self.fetch_metadata(loc).await
    }

    /// Overwrite the sidecar of `loc` with `map`.
    ///
    /// `LAST_WRITE_TIME` is set to now when missing. Entries containing the
    /// record delimiters are rejected.
    pub async fn write_metadata_file(&self, loc: &ObjectLocation, map: &MetadataMap) -> VfsResult<()> {
        let mut map = map.clone();
        map.entry(LAST_WRITE_TIME.to_owned())
            .or_insert_with(|| metadata::format_time(Utc::now()));
        for (k, v) in &map {
            metadata::validate_entry(k, v)?;
        }

        let sidecar = self.sidecar(loc);
        self.client
            .put_object(&sidecar.bucket, &sidecar.key, Bytes::from(metadata::encode(&map)))
            .await?;
        self.cache.update(loc, |entry| {
            entry.metadata = map;
            entry.has_sidecar = true;
        });
        debug!(bucket = %loc.bucket, key = %loc.key, "wrote metadata file");
        Ok(())
    }

    /// Delete only the sidecar of `loc`.
    pub async fn delete_metadata_file(&self, loc: &ObjectLocation) -> VfsResult<()> {
        let sidecar = self.sidecar(loc);
        self.client
            .delete_object(&sidecar.bucket, &sidecar.key)
            .await?;
        self.cache.invalidate(loc);
        debug!(bucket = %loc.bucket, key = %loc.key, "deleted metadata file");
        Ok(())
    }
}

fn not_found_as_path(err: StoreError, key: &str) -> VfsError {
    if err.is_not_found() {
        VfsError::NotFound {
            path: PathMapper::to_logical_path(key),
        }
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryObjectStore;
    use crate::store::memory::StoreOperation;

    fn setup_with(config: VfsConfig) -> (Arc<InMemoryObjectStore>, ObjectInfoProvider) {
        let store = Arc::new(InMemoryObjectStore::with_min_part_size(config.min_part_size));
        let provider = ObjectInfoProvider::new(
            store.clone(),
            Arc::new(ObjectCache::new()),
            Arc::new(config),
        );
        (store, provider)
    }

    fn setup() -> (Arc<InMemoryObjectStore>, ObjectInfoProvider) {
        setup_with(VfsConfig::builder().bucket("b".to_owned()).build())
    }

    fn loc(key: &str) -> ObjectLocation {
        ObjectLocation::new("b", key)
    }

    async fn seed(store: &InMemoryObjectStore, keys: &[&str]) {
        for key in keys {
            store.put_object("b", key, Bytes::from_static(b"x")).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_should_fetch_attributes_once_per_scope() {
        let (store, provider) = setup();
        seed(&store, &["a.txt"]).await;
        store.reset_request_counts();

        assert!(provider.object_exists(&loc("a.txt")).await.unwrap());
        assert_eq!(provider.get_object_head(&loc("a.txt")).await.unwrap().unwrap().size, 1);
        assert!(provider.object_exists(&loc("a.txt")).await.unwrap());

        assert_eq!(store.request_count(StoreOperation::Head), 1);
        assert_eq!(store.request_count(StoreOperation::Get), 1);
        assert_eq!(store.total_requests(), 2);
    }

    #[tokio::test]
    async fn test_should_cache_missing_objects() {
        let (store, provider) = setup();
        assert!(!provider.object_exists(&loc("nope.txt")).await.unwrap());
        assert!(!provider.object_exists(&loc("nope.txt")).await.unwrap());
        assert_eq!(store.request_count(StoreOperation::Head), 1);
        assert_eq!(store.request_count(StoreOperation::Get), 0);
    }

    #[tokio::test]
    async fn test_should_detect_directory_without_marker() {
        let (store, provider) = setup();
        seed(&store, &["a/b/c.txt"]).await;
        assert!(provider.object_exists(&loc("a/")).await.unwrap());
        assert!(provider.object_exists(&loc("a/b/")).await.unwrap());
        assert!(!provider.object_exists(&loc("a/c/")).await.unwrap());
        assert!(provider.get_object_head(&loc("a/")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_should_observe_own_writes() {
        let (_, provider) = setup();
        assert!(!provider.object_exists(&loc("d/f.txt")).await.unwrap());
        assert!(!provider.object_exists(&loc("d/")).await.unwrap());

        provider.put_text_to_object(&loc("d/f.txt"), "hi").await.unwrap();

        assert!(provider.object_exists(&loc("d/f.txt")).await.unwrap());
        assert!(provider.object_exists(&loc("d/")).await.unwrap());

        provider.delete_object(&loc("d/f.txt")).await.unwrap();
        assert!(!provider.object_exists(&loc("d/f.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_should_list_immediate_children() {
        let (store, provider) = setup();
        seed(
            &store,
            &["a/", "a/1.txt", "a/2.txt", "a/sub/", "a/sub/3.txt", "a/deep/x/4.txt", "__metadata/a/1.txt.meta"],
        )
        .await;

        let files = provider
            .get_objects_list("b", "a/", ListingType::Files, false, false)
            .await
            .unwrap();
        assert_eq!(files, vec!["a/1.txt", "a/2.txt"]);

        let dirs = provider
            .get_objects_list("b", "a/", ListingType::Directories, false, false)
            .await
            .unwrap();
        assert_eq!(dirs, vec!["a/deep/", "a/sub/"]);

        let root_dirs = provider
            .get_objects_list("b", "", ListingType::Directories, false, false)
            .await
            .unwrap();
        assert_eq!(root_dirs, vec!["a/"]);
    }

    #[tokio::test]
    async fn test_should_synthesize_intermediate_directories_when_recursive() {
        let (store, provider) = setup();
        seed(&store, &["a/", "a/1.txt", "a/empty/", "a/x/y/z.txt"]).await;

        let dirs = provider
            .get_objects_list("b", "a/", ListingType::Directories, true, false)
            .await
            .unwrap();
        assert_eq!(dirs, vec!["a/empty/", "a/x/", "a/x/y/"]);

        let files = provider
            .get_objects_list("b", "a/", ListingType::Files, true, false)
            .await
            .unwrap();
        assert_eq!(files, vec!["a/1.txt", "a/x/y/z.txt"]);

        let all = provider
            .get_objects_list("b", "a/", ListingType::All, true, false)
            .await
            .unwrap();
        assert_eq!(all, vec!["a/1.txt", "a/x/", "a/x/y/", "a/x/y/z.txt"]);

        let all_with_markers = provider
            .get_objects_list("b", "a/", ListingType::All, true, true)
            .await
            .unwrap();
        assert_eq!(
            all_with_markers,
            vec!["a/1.txt", "a/empty/", "a/x/", "a/x/y/", "a/x/y/z.txt"]
        );
    }

    #[tokio::test]
    async fn test_should_list_stored_keys_and_sidecars() {
        let (store, provider) = setup();
        seed(&store, &["a/", "a/x/y.txt", "__metadata/a/x/y.txt.meta", "b.txt"]).await;
        assert_eq!(provider.list_keys("b", "a/").await.unwrap(), vec!["a/", "a/x/y.txt"]);
        assert_eq!(
            provider.list_metadata_files("b", "a/").await.unwrap(),
            vec!["__metadata/a/x/y.txt.meta"]
        );
    }

    #[tokio::test]
    async fn test_should_report_children() {
        let (store, provider) = setup();
        seed(&store, &["a/", "b/", "b/x.txt"]).await;
        assert!(!provider.has_children("b", "a/").await.unwrap());
        assert!(provider.has_children("b", "b/").await.unwrap());
    }

    #[tokio::test]
    async fn test_should_chunk_batch_deletes_and_aggregate_failures() {
        let (store, provider) = setup_with(
            VfsConfig::builder()
                .bucket("b".to_owned())
                .batch_delete_limit(2)
                .build(),
        );
        let keys: Vec<String> = (0..5).map(|i| format!("d/{i}")).collect();
        for key in &keys {
            store.put_object("b", key, Bytes::new()).await.unwrap();
        }
        store.protect_key("d/3");

        let err = provider.delete_objects("b", &keys, "/d").await.unwrap_err();

        assert_eq!(store.request_count(StoreOperation::DeleteBatch), 3);
        match err {
            VfsError::BatchDelete { path, failed } => {
                assert_eq!(path, "/d");
                assert_eq!(failed, vec!["d/3".to_owned()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.object_keys("b"), vec!["d/3".to_owned()]);
    }

    #[tokio::test]
    async fn test_should_round_trip_metadata_file() {
        let (store, provider) = setup();
        seed(&store, &["f.txt"]).await;
        assert!(provider.read_metadata_file(&loc("f.txt")).await.unwrap().is_none());

        let mut map = MetadataMap::new();
        map.insert("Owner".to_owned(), "alice".to_owned());
        provider.write_metadata_file(&loc("f.txt"), &map).await.unwrap();

        let read = provider.read_metadata_file(&loc("f.txt")).await.unwrap().unwrap();
        assert_eq!(read.get("Owner").map(String::as_str), Some("alice"));
        assert!(read.contains_key(LAST_WRITE_TIME));

        provider.delete_metadata_file(&loc("f.txt")).await.unwrap();
        assert!(provider.read_metadata_file(&loc("f.txt")).await.unwrap().is_none());
        assert!(provider.object_exists(&loc("f.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_should_reject_delimiters_in_metadata() {
        let (store, provider) = setup();
        seed(&store, &["f.txt"]).await;
        let mut map = MetadataMap::new();
        map.insert("k".to_owned(), "a#b".to_owned());
        let err = provider.write_metadata_file(&loc("f.txt"), &map).await.unwrap_err();
        assert!(err.is_invalid_operation());
        assert_eq!(store.request_count(StoreOperation::Put), 1);
    }

    #[tokio::test]
    async fn test_should_copy_object_with_sidecar() {
        let (store, provider) = setup();
        seed(&store, &["src.txt"]).await;
        let mut map = MetadataMap::new();
        map.insert("Lock".to_owned(), "True".to_owned());
        provider.write_metadata_file(&loc("src.txt"), &map).await.unwrap();

        provider.copy_object(&loc("src.txt"), &loc("dst.txt")).await.unwrap();

        let copied = provider.read_metadata_file(&loc("dst.txt")).await.unwrap().unwrap();
        assert_eq!(copied.get("Lock").map(String::as_str), Some("True"));
        assert!(
            provider
                .copy_object(&loc("missing.txt"), &loc("x.txt"))
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_should_delete_sidecar_with_object() {
        let (store, provider) = setup();
        seed(&store, &["f.txt"]).await;
        provider
            .write_metadata_file(&loc("f.txt"), &MetadataMap::new())
            .await
            .unwrap();
        provider.delete_object(&loc("f.txt")).await.unwrap();
        assert!(store.object_keys("b").is_empty());
    }

    #[tokio::test]
    async fn test_should_switch_to_multipart_above_threshold() {
        let (store, provider) = setup_with(
            VfsConfig::builder()
                .bucket("b".to_owned())
                .min_part_size(4)
                .max_part_size(8)
                .multipart_threshold(8)
                .build(),
        );
        provider
            .put_bytes_to_object(&loc("small"), Bytes::from_static(b"12345678"))
            .await
            .unwrap();
        assert_eq!(store.request_count(StoreOperation::CreateMultipart), 0);

        let mut stream = Cursor::new(b"0123456789".to_vec());
        stream.set_position(3);
        provider
            .put_data_from_stream_to_object(&loc("big"), &mut stream)
            .await
            .unwrap();
        assert_eq!(store.request_count(StoreOperation::CreateMultipart), 1);
        assert_eq!(
            provider.get_object_content(&loc("big")).await.unwrap().unwrap().as_ref(),
            b"0123456789"
        );
    }

    #[tokio::test]
    async fn test_should_append_text() {
        let (_, provider) = setup();
        provider.append_text_to_object(&loc("log.txt"), "a").await.unwrap();
        provider.append_text_to_object(&loc("log.txt"), "b").await.unwrap();
        let content = provider.get_object_content(&loc("log.txt")).await.unwrap().unwrap();
        assert_eq!(content.as_ref(), b"ab");
    }

    #[tokio::test]
    async fn test_should_upload_local_file() {
        let (_, provider) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.txt");
        std::fs::write(&path, "from disk").unwrap();

        provider.put_file_to_object(&loc("up.txt"), &path).await.unwrap();

        let mut reader = provider.get_object_reader(&loc("up.txt")).await.unwrap().unwrap();
        let mut text = String::new();
        reader.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "from disk");
        assert!(provider.get_object_reader(&loc("none")).await.unwrap().is_none());
    }
}
