//! File operations over the object store with local fallback.
//!
//! Reads try the object store first and fall back to the local file system,
//! which is how content not yet migrated stays readable. Writes to a remote
//! path always go to the object store. Every remote mutation refreshes the
//! parent directory's marker, creating it if needed.

use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::debug;

use crate::error::{VfsError, VfsResult};
use crate::local;
use crate::object_info::S3ObjectInfo;
use crate::path::{Backend, ObjectLocation, PathMapper, parent_directory_key};
use crate::provider::{ObjectInfoProvider, ObjectReader};
use crate::storage::StorageScope;
use crate::url;

/// How [`FileAdapter::open`] treats existing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Create a new file; fail if it exists.
    CreateNew,
    /// Create a new file or overwrite an existing one.
    Create,
    /// Open an existing file, positioned at the start.
    Open,
    /// Open a file if it exists, otherwise create it.
    OpenOrCreate,
    /// Open an existing file and discard its content.
    Truncate,
    /// Open or create a file, positioned at the end.
    Append,
}

/// File operations bound to one [`StorageScope`].
#[derive(Debug, Clone)]
pub struct FileAdapter {
    scope: StorageScope,
}

impl FileAdapter {
    /// Create an adapter for `scope`.
    #[must_use]
    pub fn new(scope: StorageScope) -> Self {
        Self { scope }
    }

    fn provider(&self) -> &ObjectInfoProvider {
        self.scope.provider()
    }

    fn resolve(&self, path: &str) -> Backend {
        self.scope.mapper().resolve(path)
    }

    fn logical(&self, path: &str) -> String {
        PathMapper::to_logical_path(&self.scope.mapper().to_object_key(path))
    }

    fn not_found(&self, path: &str) -> VfsError {
        VfsError::NotFound {
            path: self.logical(path),
        }
    }

    /// Refresh `LAST_WRITE_TIME` on the parent marker (creating it when
    /// missing) and on the object's own sidecar when it has one.
    async fn touch(&self, loc: &ObjectLocation) -> VfsResult<()> {
        let now = Utc::now();
        let provider = self.provider();

        if let Some(parent) = parent_directory_key(&loc.key) {
            let parent_loc = loc.with_key(parent);
            if provider.get_object_head(&parent_loc).await?.is_none() {
                provider.create_empty_object(&parent_loc).await?;
            }
            S3ObjectInfo::new(provider.clone(), parent_loc)
                .set_last_write_time(now)
                .await?;
        }

        if provider.load(loc).await?.has_sidecar {
            S3ObjectInfo::new(provider.clone(), loc.clone())
                .set_last_write_time(now)
                .await?;
        }
        Ok(())
    }

    /// Whether the file exists remotely or locally.
    pub async fn exists(&self, path: &str) -> VfsResult<bool> {
        match self.resolve(path) {
            Backend::Remote(loc) => Ok(self.provider().object_exists(&loc).await?
                || local::file_exists(&self.scope.local_path(path)).await),
            Backend::Local(p) => Ok(local::file_exists(&p).await),
        }
    }

    /// Delete a file.
    ///
    /// A remote path whose file exists only locally is rejected: deleting it
    /// from the object store would not make it disappear.
    pub async fn delete(&self, path: &str) -> VfsResult<()> {
        match self.resolve(path) {
            Backend::Local(p) => {
                if !local::file_exists(&p).await {
                    return Err(self.not_found(path));
                }
                local::remove_file(&p).await?;
            }
            Backend::Remote(loc) => {
                if self.provider().object_exists(&loc).await? {
                    self.provider().delete_object(&loc).await?;
                    self.scope.mirror().remove(&loc).await;
                    self.touch(&loc).await?;
                } else if local::file_exists(&self.scope.local_path(path)).await {
                    return Err(VfsError::invalid_operation(format!(
                        "{} exists only on the local file system and has not been migrated to the object store",
                        self.logical(path)
                    )));
                } else {
                    return Err(self.not_found(path));
                }
            }
        }
        debug!(path, "deleted file");
        Ok(())
    }

    /// Copy a file. With `overwrite` unset, an existing destination is left
    /// untouched and the call succeeds.
    pub async fn copy(&self, src: &str, dst: &str, overwrite: bool) -> VfsResult<()> {
        if !overwrite && self.exists(dst).await? {
            debug!(src, dst, "destination exists, copy skipped");
            return Ok(());
        }

        let dst_backend = self.resolve(dst);
        let server_side = match (self.resolve(src), &dst_backend) {
            (Backend::Remote(s), Backend::Remote(d)) if s.bucket == d.bucket => {
                if self.provider().object_exists(&s).await? {
                    Some((s, d.clone()))
                } else {
                    None
                }
            }
            _ => None,
        };

        match server_side {
            Some((s, d)) => self.provider().copy_object(&s, &d).await?,
            None => self.cross_store_copy(src, &dst_backend).await?,
        }

        if let Backend::Remote(d) = &dst_backend {
            self.touch(d).await?;
        }
        debug!(src, dst, "copied file");
        Ok(())
    }

    async fn cross_store_copy(&self, src: &str, dst: &Backend) -> VfsResult<()> {
        let data = self.read_all_bytes(src).await?;
        match dst {
            Backend::Remote(d) => {
                self.provider().put_bytes_to_object(d, data).await?;
            }
            Backend::Local(p) => local::write(p, &data).await?,
        }
        Ok(())
    }

    /// Move a file. Fails with [`VfsError::AlreadyExists`] when the
    /// destination exists.
    pub async fn move_file(&self, src: &str, dst: &str) -> VfsResult<()> {
        if self.exists(dst).await? {
            return Err(VfsError::AlreadyExists {
                path: self.logical(dst),
            });
        }
        if !self.exists(src).await? {
            return Err(self.not_found(src));
        }

        self.copy(src, dst, true).await?;

        let remote_src = match self.resolve(src) {
            Backend::Remote(s) if self.provider().object_exists(&s).await? => Some(s),
            _ => None,
        };
        if let Some(s) = remote_src {
            self.provider().delete_object(&s).await?;
            self.scope.mirror().remove(&s).await;
            self.touch(&s).await?;
        }
        local::remove_file(&self.scope.local_path(src)).await?;
        debug!(src, dst, "moved file");
        Ok(())
    }

    /// Whole content. Remote first, then local.
    pub async fn read_all_bytes(&self, path: &str) -> VfsResult<Bytes> {
        if let Backend::Remote(loc) = self.resolve(path) {
            if let Some(data) = self.provider().get_object_content(&loc).await? {
                return Ok(data);
            }
        }
        local::read(&self.scope.local_path(path))
            .await?
            .ok_or_else(|| self.not_found(path))
    }

    /// Whole content as UTF-8.
    pub async fn read_all_text(&self, path: &str) -> VfsResult<String> {
        let data = self.read_all_bytes(path).await?;
        String::from_utf8(data.to_vec())
            .map_err(|e| VfsError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Content split into lines.
    pub async fn read_all_lines(&self, path: &str) -> VfsResult<Vec<String>> {
        Ok(self
            .read_all_text(path)
            .await?
            .lines()
            .map(str::to_owned)
            .collect())
    }

    /// Replace the content. Large payloads go through multipart upload.
    pub async fn write_all_bytes(&self, path: &str, data: impl Into<Bytes>) -> VfsResult<()> {
        let data = data.into();
        match self.resolve(path) {
            Backend::Remote(loc) => {
                self.provider().put_bytes_to_object(&loc, data).await?;
                self.touch(&loc).await?;
            }
            Backend::Local(p) => local::write(&p, &data).await?,
        }
        Ok(())
    }

    /// Replace the content with text.
    pub async fn write_all_text(&self, path: &str, text: &str) -> VfsResult<()> {
        self.write_all_bytes(path, Bytes::copy_from_slice(text.as_bytes()))
            .await
    }

    /// Append text. A remote path that only exists locally is migrated with
    /// the appended text.
    pub async fn append_all_text(&self, path: &str, text: &str) -> VfsResult<()> {
        match self.resolve(path) {
            Backend::Remote(loc) => {
                if self.provider().object_exists(&loc).await? {
                    self.provider().append_text_to_object(&loc, text).await?;
                } else {
                    let mut content = local::read(&self.scope.local_path(path))
                        .await?
                        .map(|b| b.to_vec())
                        .unwrap_or_default();
                    content.extend_from_slice(text.as_bytes());
                    self.provider()
                        .put_bytes_to_object(&loc, Bytes::from(content))
                        .await?;
                }
                self.touch(&loc).await?;
            }
            Backend::Local(p) => {
                if let Some(parent) = p.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&p)
                    .await?;
                file.write_all(text.as_bytes()).await?;
                file.flush().await?;
            }
        }
        Ok(())
    }

    /// Reader over the whole content.
    pub async fn open_read(&self, path: &str) -> VfsResult<ObjectReader> {
        Ok(ObjectReader::new(self.read_all_bytes(path).await?))
    }

    /// Open a writer. Content is spooled to a temp file and stored on
    /// [`FileWriter::close`].
    pub async fn open(&self, path: &str, mode: FileMode) -> VfsResult<FileWriter> {
        let exists = self.exists(path).await?;
        match mode {
            FileMode::CreateNew if exists => {
                return Err(VfsError::AlreadyExists {
                    path: self.logical(path),
                });
            }
            FileMode::Open | FileMode::Truncate if !exists => return Err(self.not_found(path)),
            _ => {}
        }

        let mut file = tokio::fs::File::from_std(tempfile::tempfile()?);
        if exists && matches!(mode, FileMode::Open | FileMode::OpenOrCreate | FileMode::Append) {
            let data = self.read_all_bytes(path).await?;
            file.write_all(&data).await?;
            if mode != FileMode::Append {
                file.seek(SeekFrom::Start(0)).await?;
            }
        }

        Ok(FileWriter {
            file,
            adapter: self.clone(),
            path: path.to_owned(),
        })
    }

    /// Create or overwrite a file through a writer.
    pub async fn create(&self, path: &str) -> VfsResult<FileWriter> {
        self.open(path, FileMode::Create).await
    }

    /// Create or overwrite a text file through a writer.
    ///
    /// Alias of [`FileAdapter::create`]: writers take text through
    /// [`FileWriter::write_text`] and raw bytes alike.
    pub async fn create_text(&self, path: &str) -> VfsResult<FileWriter> {
        self.open(path, FileMode::Create).await
    }

    async fn commit(&self, path: &str, spool: &mut tokio::fs::File) -> VfsResult<()> {
        spool.flush().await?;
        match self.resolve(path) {
            Backend::Remote(loc) => {
                self.provider()
                    .put_data_from_stream_to_object(&loc, spool)
                    .await?;
                self.touch(&loc).await?;
            }
            Backend::Local(p) => {
                if let Some(parent) = p.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                spool.seek(SeekFrom::Start(0)).await?;
                let mut out = tokio::fs::File::create(&p).await?;
                tokio::io::copy(spool, &mut out).await?;
                out.flush().await?;
            }
        }
        debug!(path, "committed file writer");
        Ok(())
    }

    /// Logical last-write time.
    pub async fn get_last_write_time(&self, path: &str) -> VfsResult<DateTime<Utc>> {
        if let Backend::Remote(loc) = self.resolve(path) {
            let info = S3ObjectInfo::new(self.provider().clone(), loc);
            if info.exists().await? {
                if let Some(t) = info.last_write_time().await? {
                    return Ok(t);
                }
            }
        }
        local::modified(&self.scope.local_path(path))
            .await?
            .ok_or_else(|| self.not_found(path))
    }

    /// Set the logical last-write time.
    pub async fn set_last_write_time(&self, path: &str, time: DateTime<Utc>) -> VfsResult<()> {
        if let Backend::Remote(loc) = self.resolve(path) {
            let info = S3ObjectInfo::new(self.provider().clone(), loc);
            if info.exists().await? {
                return info.set_last_write_time(time).await;
            }
        }
        let local_path = self.scope.local_path(path);
        if !local::file_exists(&local_path).await {
            return Err(self.not_found(path));
        }
        local::set_modified(&local_path, time).await?;
        Ok(())
    }

    /// A real file with the content: the temp-mirror copy of a remote
    /// object, or the local file itself.
    pub async fn get_local_copy(&self, path: &str) -> VfsResult<PathBuf> {
        if let Backend::Remote(loc) = self.resolve(path) {
            if let Some(data) = self.provider().get_object_content(&loc).await? {
                let mirror_path = self.scope.mirror().store(&loc, &data).await?;
                debug!(path, mirror = %mirror_path.display(), "materialized local copy");
                return Ok(mirror_path);
            }
        }
        let local_path = self.scope.local_path(path);
        if local::file_exists(&local_path).await {
            Ok(local_path)
        } else {
            Err(self.not_found(path))
        }
    }

    /// URL a client can download the file from.
    #[must_use]
    pub fn get_file_url(&self, path: &str) -> String {
        let config = self.provider().config();
        match self.resolve(path) {
            Backend::Remote(loc) if config.public_read => {
                url::public_url(config, &loc.bucket, &loc.key)
            }
            _ => url::download_url(config, &self.logical(path)),
        }
    }
}

/// Writer returned by [`FileAdapter::open`].
///
/// Bytes go to an anonymous temp file; [`close`](Self::close) stores them at
/// the target path. Dropping the writer without closing discards them.
#[derive(Debug)]
pub struct FileWriter {
    file: tokio::fs::File,
    adapter: FileAdapter,
    path: String,
}

impl FileWriter {
    /// Target path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Write UTF-8 text at the current position.
    pub async fn write_text(&mut self, text: &str) -> VfsResult<()> {
        self.file.write_all(text.as_bytes()).await?;
        Ok(())
    }

    /// Store the content at the target path.
    pub async fn close(mut self) -> VfsResult<()> {
        self.adapter.commit(&self.path, &mut self.file).await
    }
}

impl AsyncWrite for FileWriter {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().file).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_shutdown(cx)
    }
}

impl AsyncRead for FileWriter {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_read(cx, buf)
    }
}

impl AsyncSeek for FileWriter {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.get_mut().file).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.get_mut().file).poll_complete(cx)
    }
}
