//! [`ObjectStoreClient`] over `aws-sdk-s3`.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, Delete, ObjectIdentifier};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use s3vfs_core::error::{StoreError, StoreResult};
use s3vfs_core::store::{CompletedPart, ListPage, ObjectHead, ObjectStoreClient, ObjectSummary};
use tracing::{debug, trace};

/// Object store backed by an `aws-sdk-s3` client.
#[derive(Debug, Clone)]
pub struct AwsObjectStore {
    client: Client,
}

impl AwsObjectStore {
    /// Wrap an SDK client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The underlying SDK client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Map an SDK error to a [`StoreError`].
///
/// `key` names the object for not-found errors; `upload_id` is set for
/// multipart calls so an unknown upload is reported as such.
fn map_sdk_error<E>(err: SdkError<E>, key: &str, upload_id: Option<&str>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if let SdkError::ServiceError(service_err) = &err {
        let status = service_err.raw().status().as_u16();
        let meta = service_err.err();
        if let Some(mapped) = classify(status, meta.code(), meta.message(), key, upload_id) {
            return mapped;
        }
    }
    StoreError::Transport(anyhow::Error::new(err))
}

/// Classify a service error by HTTP status and error code. `None` leaves it
/// to the transport catch-all.
///
/// A missing bucket is a service error, not a missing key, so it never
/// reads as "object does not exist".
fn classify(
    status: u16,
    code: Option<&str>,
    message: Option<&str>,
    key: &str,
    upload_id: Option<&str>,
) -> Option<StoreError> {
    let not_found = || StoreError::NotFound {
        key: key.to_owned(),
    };
    match (code, upload_id) {
        (Some("NoSuchUpload"), Some(id)) => Some(StoreError::NoSuchUpload {
            upload_id: id.to_owned(),
        }),
        (Some("InvalidPart"), _) => Some(StoreError::InvalidPart),
        (Some("InvalidPartOrder"), _) => Some(StoreError::InvalidPartOrder),
        (Some("EntityTooSmall"), _) => Some(StoreError::EntityTooSmall),
        (Some("NoSuchKey" | "NotFound"), _) => Some(not_found()),
        (Some(code), _) if code != "NoSuchBucket" && status == 404 => Some(not_found()),
        (None, _) if status == 404 => Some(not_found()),
        (Some(code), _) => Some(StoreError::Service {
            code: code.to_owned(),
            message: message.unwrap_or_default().to_owned(),
        }),
        (None, _) => None,
    }
}

fn transport<E>(err: E) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StoreError::Transport(anyhow::Error::new(err))
}

fn to_chrono(dt: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
    dt.and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos()))
        .unwrap_or_default()
}

fn to_size(len: Option<i64>) -> u64 {
    len.and_then(|n| u64::try_from(n).ok()).unwrap_or(0)
}

#[async_trait]
impl ObjectStoreClient for AwsObjectStore {
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key, None))?;

        Ok(ObjectHead {
            key: key.to_owned(),
            size: to_size(output.content_length()),
            etag: output.e_tag().unwrap_or_default().to_owned(),
            last_modified: to_chrono(output.last_modified()),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key, None))?;

        let data = output.body.collect().await.map_err(transport)?;
        Ok(data.into_bytes())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StoreResult<String> {
        let len = body.len();
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key, None))?;
        trace!(bucket, key, len, "put object");
        Ok(output.e_tag().unwrap_or_default().to_owned())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<String> {
        // CopySource is `bucket/key` with the key URL-encoded.
        let copy_source = format!(
            "{src_bucket}/{}",
            utf8_percent_encode(src_key, NON_ALPHANUMERIC)
        );
        let output = self
            .client
            .copy_object()
            .bucket(dst_bucket)
            .key(dst_key)
            .copy_source(copy_source)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, src_key, None))?;

        Ok(output
            .copy_object_result()
            .and_then(|r| r.e_tag())
            .unwrap_or_default()
            .to_owned())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        match self.client.delete_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(()),
            Err(e) => match map_sdk_error(e, key, None) {
                StoreError::NotFound { .. } => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let objects = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(transport)?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(transport)?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, None))?;

        let failed: Vec<String> = output
            .errors()
            .iter()
            .filter_map(|e| e.key().map(str::to_owned))
            .collect();
        debug!(bucket, requested = keys.len(), failed = failed.len(), "multi-object delete");
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
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(i32::try_from(max_keys).unwrap_or(i32::MAX))
            .set_delimiter(delimiter.map(str::to_owned))
            .set_continuation_token(continuation_token.map(str::to_owned))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, prefix, None))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|o| {
                o.key().map(|key| ObjectSummary {
                    key: key.to_owned(),
                    size: to_size(o.size()),
                    etag: o.e_tag().unwrap_or_default().to_owned(),
                    last_modified: to_chrono(o.last_modified()),
                })
            })
            .collect();
        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_owned))
            .collect();
        let next_token = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(str::to_owned)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            common_prefixes,
            next_token,
        })
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StoreResult<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key, None))?;

        output
            .upload_id()
            .map(str::to_owned)
            .ok_or_else(|| StoreError::Service {
                code: "InternalError".to_owned(),
                message: format!("no upload id returned for {key}"),
            })
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> StoreResult<String> {
        let number = i32::try_from(part_number).map_err(transport)?;
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key, Some(upload_id)))?;
        Ok(output.e_tag().unwrap_or_default().to_owned())
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<String> {
        let mut sdk_parts = Vec::with_capacity(parts.len());
        for part in parts {
            sdk_parts.push(
                aws_sdk_s3::types::CompletedPart::builder()
                    .e_tag(&part.etag)
                    .part_number(i32::try_from(part.part_number).map_err(transport)?)
                    .build(),
            );
        }
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(sdk_parts))
            .build();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key, Some(upload_id)))?;
        Ok(output.e_tag().unwrap_or_default().to_owned())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StoreResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key, Some(upload_id)))?;
        debug!(bucket, key, upload_id, "aborted multipart upload");
        Ok(())
    }
}
