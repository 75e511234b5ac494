//! Directory operations over the object store with local fallback.
//!
//! A remote directory exists when its marker object (`dir/`) exists or when
//! any key lives under its prefix. Enumeration merges the remote listing with
//! the local directory of the same path, so partially migrated trees show up
//! whole.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{VfsError, VfsResult};
use crate::local;
use crate::metadata;
use crate::object_info::S3ObjectInfo;
use crate::path::{Backend, ObjectLocation, PathMapper, file_name};
use crate::pattern::SearchPattern;
use crate::provider::{ListingType, ObjectInfoProvider};
use crate::storage::StorageScope;

/// Whether enumeration descends into subdirectories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchOption {
    /// Immediate children only.
    #[default]
    TopDirectoryOnly,
    /// Every descendant.
    AllDirectories,
}

/// Directory operations bound to one [`StorageScope`].
#[derive(Debug, Clone)]
pub struct DirectoryAdapter {
    scope: StorageScope,
}

impl DirectoryAdapter {
    /// Create an adapter for `scope`.
    #[must_use]
    pub fn new(scope: StorageScope) -> Self {
        Self { scope }
    }

    fn provider(&self) -> &ObjectInfoProvider {
        self.scope.provider()
    }

    fn resolve(&self, path: &str) -> Backend {
        self.scope.mapper().resolve_directory(path)
    }

    fn logical(&self, path: &str) -> String {
        PathMapper::to_logical_path(&self.scope.mapper().to_directory_key(path))
    }

    fn not_found(&self, path: &str) -> VfsError {
        VfsError::NotFound {
            path: self.logical(path),
        }
    }

    /// Whether the directory exists locally or remotely.
    pub async fn exists(&self, path: &str) -> VfsResult<bool> {
        if local::dir_exists(&self.scope.local_path(path)).await {
            return Ok(true);
        }
        match self.resolve(path) {
            Backend::Remote(loc) => self.provider().object_exists(&loc).await,
            Backend::Local(_) => Ok(false),
        }
    }

    /// Create the directory. Existing directories are left as they are.
    pub async fn create_directory(&self, path: &str) -> VfsResult<()> {
        if self.exists(path).await? {
            return Ok(());
        }
        match self.resolve(path) {
            Backend::Remote(loc) => self.ensure_marker(&loc).await?,
            Backend::Local(p) => tokio::fs::create_dir_all(&p).await?,
        }
        Ok(())
    }

    async fn ensure_marker(&self, loc: &ObjectLocation) -> VfsResult<()> {
        if !loc.key.is_empty() && self.provider().get_object_head(loc).await?.is_none() {
            self.provider().create_empty_object(loc).await?;
            debug!(key = %loc.key, "created directory marker");
        }
        Ok(())
    }

    /// Files under `path` whose names match `pattern`, as logical paths.
    pub async fn enumerate_files(
        &self,
        path: &str,
        pattern: &str,
        option: SearchOption,
    ) -> VfsResult<Vec<String>> {
        self.collect(path, pattern, option, false).await
    }

    /// Subdirectories under `path` whose names match `pattern`, as logical
    /// paths.
    pub async fn enumerate_directories(
        &self,
        path: &str,
        pattern: &str,
        option: SearchOption,
    ) -> VfsResult<Vec<String>> {
        self.collect(path, pattern, option, true).await
    }

    /// Immediate files of `path`.
    pub async fn get_files(&self, path: &str) -> VfsResult<Vec<String>> {
        self.enumerate_files(path, "*", SearchOption::TopDirectoryOnly)
            .await
    }

    /// Immediate subdirectories of `path`.
    pub async fn get_directories(&self, path: &str) -> VfsResult<Vec<String>> {
        self.enumerate_directories(path, "*", SearchOption::TopDirectoryOnly)
            .await
    }

    /// Remote names first, then local names not already present under a
    /// case-insensitive comparison.
    async fn collect(
        &self,
        path: &str,
        pattern: &str,
        option: SearchOption,
        directories: bool,
    ) -> VfsResult<Vec<String>> {
        let pattern = SearchPattern::new(pattern)?;
        let recursive = option == SearchOption::AllDirectories;
        let mut found: BTreeMap<String, String> = BTreeMap::new();

        if let Backend::Remote(loc) = self.resolve(path) {
            let listing = if directories {
                ListingType::Directories
            } else {
                ListingType::Files
            };
            let keys = self
                .provider()
                .get_objects_list(&loc.bucket, &loc.key, listing, recursive, false)
                .await?;
            for key in keys {
                if pattern.is_match(file_name(&key)) {
                    let logical = PathMapper::to_logical_path(&key);
                    found.insert(logical.to_lowercase(), logical);
                }
            }
        }

        let raw_prefix = self.scope.mapper().to_raw_directory_key(path);
        for entry in local::list_entries(&self.scope.local_path(path), recursive).await? {
            if entry.is_dir != directories || !pattern.is_match(file_name(&entry.relative)) {
                continue;
            }
            let logical = format!("/{raw_prefix}{}", entry.relative);
            found.entry(logical.to_lowercase()).or_insert(logical);
        }

        debug!(path, pattern = pattern.as_str(), ?option, directories, count = found.len(), "enumerated");
        Ok(found.into_values().collect())
    }

    /// Delete the directory.
    ///
    /// Without `recursive`, a directory with remote children is rejected with
    /// [`VfsError::DirectoryNotEmpty`]. With it, every descendant object and
    /// sidecar is batch-deleted before the marker itself.
    pub async fn delete(&self, path: &str, recursive: bool) -> VfsResult<()> {
        let loc = match self.resolve(path) {
            Backend::Local(p) => return self.delete_local(path, &p, recursive).await,
            Backend::Remote(loc) => loc,
        };

        if loc.key.is_empty() {
            return Err(VfsError::invalid_operation("the root directory cannot be deleted"));
        }
        if !self.provider().object_exists(&loc).await? {
            return if local::dir_exists(&self.scope.local_path(path)).await {
                Err(VfsError::invalid_operation(format!(
                    "{} exists only on the local file system; it has not been migrated to the object store",
                    self.logical(path)
                )))
            } else {
                Err(self.not_found(path))
            };
        }

        if recursive {
            self.delete_remote_tree(&loc, path).await?;
        } else {
            if self.provider().has_children(&loc.bucket, &loc.key).await? {
                return Err(VfsError::DirectoryNotEmpty {
                    path: self.logical(path),
                });
            }
            self.provider().delete_object(&loc).await?;
        }

        self.scope.mirror().remove(&loc).await;
        debug!(path, recursive, "deleted directory");
        Ok(())
    }

    async fn delete_local(&self, path: &str, dir: &std::path::Path, recursive: bool) -> VfsResult<()> {
        if !local::dir_exists(dir).await {
            return Err(self.not_found(path));
        }
        if recursive {
            tokio::fs::remove_dir_all(dir).await?;
        } else {
            if !local::list_entries(dir, false).await?.is_empty() {
                return Err(VfsError::DirectoryNotEmpty {
                    path: self.logical(path),
                });
            }
            tokio::fs::remove_dir(dir).await?;
        }
        debug!(path, recursive, "deleted local directory");
        Ok(())
    }

    async fn delete_remote_tree(&self, loc: &ObjectLocation, path: &str) -> VfsResult<()> {
        let provider = self.provider();
        let mut keys: Vec<String> = provider
            .list_keys(&loc.bucket, &loc.key)
            .await?
            .into_iter()
            .filter(|k| *k != loc.key)
            .collect();
        keys.extend(provider.list_metadata_files(&loc.bucket, &loc.key).await?);

        if !keys.is_empty() {
            provider
                .delete_objects(&loc.bucket, &keys, &self.logical(path))
                .await?;
        }
        provider.delete_object(loc).await?;
        debug!(bucket = %loc.bucket, prefix = %loc.key, count = keys.len() + 1, "deleted remote tree");
        Ok(())
    }

    /// Move a directory tree.
    ///
    /// Runs in two phases: everything is copied to `dst` (local-only files
    /// are uploaded on the way), then the source is deleted. A failure in
    /// either phase leaves whatever was already done in place; there is no
    /// rollback.
    pub async fn move_directory(&self, src: &str, dst: &str) -> VfsResult<()> {
        if !self.exists(src).await? {
            return Err(self.not_found(src));
        }
        if self.exists(dst).await? {
            return Err(VfsError::AlreadyExists {
                path: self.logical(dst),
            });
        }
        let mapper = self.scope.mapper();
        if mapper
            .to_directory_key(dst)
            .starts_with(&mapper.to_directory_key(src))
        {
            return Err(VfsError::invalid_operation(format!(
                "cannot move {} into its own subtree {}",
                self.logical(src),
                self.logical(dst)
            )));
        }

        self.copy_tree(src, dst).await?;

        if let Backend::Remote(loc) = self.resolve(src) {
            if self.provider().object_exists(&loc).await? {
                self.delete_remote_tree(&loc, src).await?;
                self.scope.mirror().remove(&loc).await;
            }
        }
        let local_src = self.scope.local_path(src);
        if local::dir_exists(&local_src).await {
            tokio::fs::remove_dir_all(&local_src).await?;
        }

        debug!(src, dst, "moved directory");
        Ok(())
    }

    async fn copy_tree(&self, src: &str, dst: &str) -> VfsResult<()> {
        let mut pending = vec![(src.to_owned(), dst.to_owned())];
        let files = self.scope.file();

        while let Some((from, to)) = pending.pop() {
            self.create_directory(&to).await?;
            let to_prefix = to.trim_end_matches(['/', '\\']);

            for file in self.get_files(&from).await? {
                let target = format!("{to_prefix}/{}", file_name(&file));
                files.copy(&file, &target, true).await?;
            }
            for dir in self.get_directories(&from).await? {
                let target = format!("{to_prefix}/{}", file_name(&dir));
                pending.push((dir, target));
            }
        }
        Ok(())
    }

    /// Rename every mixed-case key under `path` to its lower-case form.
    ///
    /// Objects uploaded by tools that keep the original case are invisible
    /// to lookups, which always use lower-case keys. Returns the number of
    /// objects renamed.
    pub async fn prepare_files_for_import(&self, path: &str) -> VfsResult<usize> {
        let Backend::Remote(loc) = self.resolve(path) else {
            return Ok(0);
        };
        let provider = self.provider();
        let raw_prefix = self.scope.mapper().to_raw_directory_key(path);

        let mut keys = provider.list_keys(&loc.bucket, &raw_prefix).await?;
        if raw_prefix != loc.key {
            keys.extend(provider.list_keys(&loc.bucket, &loc.key).await?);
        }

        let mut originals = Vec::new();
        for key in keys {
            let lower = key.to_lowercase();
            if lower == key {
                continue;
            }
            provider
                .copy_object(&loc.with_key(key.clone()), &loc.with_key(lower))
                .await?;
            originals.push(metadata::sidecar_key(&provider.config().metadata_prefix, &key));
            originals.push(key);
        }

        let renamed = originals.len() / 2;
        if !originals.is_empty() {
            provider
                .delete_objects(&loc.bucket, &originals, &self.logical(path))
                .await?;
        }
        debug!(path, renamed, "prepared files for import");
        Ok(renamed)
    }

    /// Logical last-write time of the directory. `None` when it exists only
    /// as implied by deeper keys and has no recorded time.
    pub async fn get_last_write_time(&self, path: &str) -> VfsResult<Option<DateTime<Utc>>> {
        if let Backend::Remote(loc) = self.resolve(path) {
            let info = S3ObjectInfo::new(self.provider().clone(), loc);
            if info.exists().await? {
                if let Some(t) = info.last_write_time().await? {
                    return Ok(Some(t));
                }
                return local::modified(&self.scope.local_path(path))
                    .await
                    .map_err(Into::into);
            }
        }
        match local::modified(&self.scope.local_path(path)).await? {
            Some(t) => Ok(Some(t)),
            None => Err(self.not_found(path)),
        }
    }

    /// Record `time` as the directory's last-write time, creating its marker
    /// when missing.
    pub async fn set_last_write_time(&self, path: &str, time: DateTime<Utc>) -> VfsResult<()> {
        if !self.exists(path).await? {
            return Err(self.not_found(path));
        }
        match self.resolve(path) {
            Backend::Remote(loc) => {
                self.ensure_marker(&loc).await?;
                S3ObjectInfo::new(self.provider().clone(), loc)
                    .set_last_write_time(time)
                    .await
            }
            Backend::Local(p) => Ok(local::set_modified(&p, time).await?),
        }
    }
}
