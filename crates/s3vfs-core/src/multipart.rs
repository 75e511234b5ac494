//! Multipart upload orchestration.
//!
//! [`MultiPartUploader::upload_from_stream`] slices a seekable stream into
//! parts no smaller than the configured minimum (except the last) and never
//! more than 10,000 of them. Any failure after the upload was created aborts
//! it once, best-effort, and the original error is returned.

use std::io::{self, SeekFrom};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::{debug, trace, warn};

use crate::config::VfsConfig;
use crate::error::{VfsError, VfsResult};
use crate::path::ObjectLocation;
use crate::store::{CompletedPart, ObjectStoreClient};

/// Maximum number of parts in one upload.
pub const MAX_PARTS: u32 = 10_000;

/// Uploads objects in parts through an [`ObjectStoreClient`].
#[derive(Debug, Clone)]
pub struct MultiPartUploader {
    client: Arc<dyn ObjectStoreClient>,
    min_part_size: u64,
    max_part_size: u64,
}

impl MultiPartUploader {
    /// Create an uploader using the part-size limits from `config`.
    #[must_use]
    pub fn new(client: Arc<dyn ObjectStoreClient>, config: &VfsConfig) -> Self {
        Self {
            client,
            min_part_size: config.min_part_size,
            max_part_size: config.max_part_size,
        }
    }

    /// Part size used for an object of `len` bytes: the minimum part size,
    /// grown just enough to stay within [`MAX_PARTS`].
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use s3vfs_core::config::VfsConfig;
    /// use s3vfs_core::multipart::MultiPartUploader;
    /// use s3vfs_core::store::InMemoryObjectStore;
    ///
    /// let config = VfsConfig::builder().min_part_size(100).build();
    /// let uploader = MultiPartUploader::new(Arc::new(InMemoryObjectStore::new()), &config);
    /// assert_eq!(uploader.part_size_for(1_000), 100);
    /// assert_eq!(uploader.part_size_for(10_000 * 100 + 1), 101);
    /// ```
    #[must_use]
    pub fn part_size_for(&self, len: u64) -> u64 {
        self.min_part_size.max(len.div_ceil(u64::from(MAX_PARTS)))
    }

    /// Start an upload for `loc`.
    pub async fn init_multipart_upload(&self, loc: &ObjectLocation) -> VfsResult<String> {
        let upload_id = self
            .client
            .create_multipart_upload(&loc.bucket, &loc.key)
            .await?;
        debug!(bucket = %loc.bucket, key = %loc.key, upload_id, "initiated multipart upload");
        Ok(upload_id)
    }

    /// Read `size` bytes from `stream` and upload them as `part_number`.
    ///
    /// Parts larger than the maximum part size and part numbers outside
    /// `1..=10000` are rejected before anything is read or sent.
    pub async fn upload_part_from_stream<R>(
        &self,
        upload_id: &str,
        loc: &ObjectLocation,
        part_number: u32,
        stream: &mut R,
        size: u64,
    ) -> VfsResult<CompletedPart>
    where
        R: AsyncRead + Unpin + Send,
    {
        if !(1..=MAX_PARTS).contains(&part_number) {
            return Err(VfsError::InvalidPartNumber(part_number));
        }
        if size > self.max_part_size {
            return Err(VfsError::PartTooLarge {
                part_number,
                size,
                max: self.max_part_size,
            });
        }

        let mut buf = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        let read = (&mut *stream).take(size).read_to_end(&mut buf).await?;
        if u64::try_from(read).ok() != Some(size) {
            return Err(VfsError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("part {part_number} ended after {read} of {size} bytes"),
            )));
        }

        let etag = self
            .client
            .upload_part(&loc.bucket, &loc.key, upload_id, part_number, Bytes::from(buf))
            .await?;
        trace!(upload_id, part_number, size, "uploaded part");
        Ok(CompletedPart { part_number, etag })
    }

    /// Upload a whole seekable stream, rewinding it first.
    ///
    /// Empty streams are written with a single PUT. Returns the final ETag.
    pub async fn upload_from_stream<R>(&self, loc: &ObjectLocation, stream: &mut R) -> VfsResult<String>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let len = stream.seek(SeekFrom::End(0)).await?;
        stream.seek(SeekFrom::Start(0)).await?;

        if len == 0 {
            let etag = self
                .client
                .put_object(&loc.bucket, &loc.key, Bytes::new())
                .await?;
            return Ok(etag);
        }

        let part_size = self.part_size_for(len);
        if part_size > self.max_part_size {
            return Err(VfsError::PartTooLarge {
                part_number: 1,
                size: part_size,
                max: self.max_part_size,
            });
        }

        let upload_id = self.init_multipart_upload(loc).await?;
        let result = async {
            let parts = self
                .upload_parts(&upload_id, loc, stream, len, part_size)
                .await?;
            self.complete_multipart_upload(&upload_id, loc, &parts).await
        }
        .await;

        match result {
            Ok(etag) => {
                debug!(bucket = %loc.bucket, key = %loc.key, size = len, part_size, "multipart upload finished");
                Ok(etag)
            }
            Err(e) => {
                if let Err(abort_err) = self.abort_multipart_upload(&upload_id, loc).await {
                    warn!(upload_id, error = %abort_err, "failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts<R>(
        &self,
        upload_id: &str,
        loc: &ObjectLocation,
        stream: &mut R,
        len: u64,
        part_size: u64,
    ) -> VfsResult<Vec<CompletedPart>>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut parts = Vec::new();
        let mut offset = 0u64;
        let mut part_number = 1u32;
        while offset < len {
            let size = part_size.min(len - offset);
            let part = self
                .upload_part_from_stream(upload_id, loc, part_number, stream, size)
                .await?;
            parts.push(part);
            offset += size;
            part_number += 1;
        }
        Ok(parts)
    }

    /// Finish an upload. Part numbers must be strictly ascending.
    pub async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        loc: &ObjectLocation,
        parts: &[CompletedPart],
    ) -> VfsResult<String> {
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(VfsError::InvalidPartOrder);
        }
        let etag = self
            .client
            .complete_multipart_upload(&loc.bucket, &loc.key, upload_id, parts)
            .await?;
        Ok(etag)
    }

    /// Abort an upload and discard its parts.
    pub async fn abort_multipart_upload(&self, upload_id: &str, loc: &ObjectLocation) -> VfsResult<()> {
        self.client
            .abort_multipart_upload(&loc.bucket, &loc.key, upload_id)
            .await?;
        debug!(bucket = %loc.bucket, key = %loc.key, upload_id, "aborted multipart upload");
        Ok(())
    }
}
