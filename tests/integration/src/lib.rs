//! Integration tests for s3vfs against a real S3-compatible endpoint.
//!
//! These tests require an S3 endpoint (MinIO, LocalStack) at
//! `localhost:4566`. They are marked `#[ignore]` so they don't run during
//! normal `cargo test`.
//!
//! Run them with:
//! ```text
//! S3_ENDPOINT_URL=http://localhost:9000 cargo test -p s3vfs-integration -- --ignored
//! ```

use std::sync::{Arc, Once};

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use s3vfs_aws::AwsObjectStore;
use s3vfs_core::config::VfsConfig;
use s3vfs_core::storage::S3Storage;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL of the object store.
fn endpoint_url() -> String {
    std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_owned())
}

/// Create an SDK client pointing at the test endpoint.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    init_tracing();

    let creds = Credentials::new("test", "test", None, None, "integration-test");

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(endpoint_url())
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("s3vfs-{prefix}-{id}")
}

/// Create a bucket and return its name. Caller is responsible for cleanup.
pub async fn create_test_bucket(client: &aws_sdk_s3::Client, prefix: &str) -> String {
    let name = test_bucket_name(prefix);
    client
        .create_bucket()
        .bucket(&name)
        .send()
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
    name
}

/// Delete all objects in a bucket, then delete the bucket.
pub async fn cleanup_bucket(client: &aws_sdk_s3::Client, bucket: &str) {
    let mut continuation_token = None;
    loop {
        let mut req = client.list_objects_v2().bucket(bucket);
        if let Some(token) = continuation_token.take() {
            req = req.continuation_token(token);
        }
        let Ok(resp) = req.send().await else {
            return;
        };

        for obj in resp.contents() {
            if let Some(key) = obj.key() {
                let _ = client.delete_object().bucket(bucket).key(key).send().await;
            }
        }

        if resp.is_truncated() == Some(true) {
            continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
        } else {
            break;
        }
    }

    if let Ok(uploads) = client.list_multipart_uploads().bucket(bucket).send().await {
        for upload in uploads.uploads() {
            if let (Some(key), Some(id)) = (upload.key(), upload.upload_id()) {
                let _ = client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(id)
                    .send()
                    .await;
            }
        }
    }

    let _ = client.delete_bucket().bucket(bucket).send().await;
}

/// A storage root over a fresh bucket plus the local root it falls back to.
#[derive(Debug)]
pub struct TestStorage {
    /// SDK client, for direct assertions.
    pub client: aws_sdk_s3::Client,
    /// Bucket created for the test.
    pub bucket: String,
    /// Storage root under test.
    pub storage: S3Storage,
    /// Local root directory.
    pub local: tempfile::TempDir,
}

impl TestStorage {
    /// Create a bucket and a storage root over it.
    ///
    /// Part sizes use the S3 minimum of 5 MiB with a 6 MiB multipart
    /// threshold so multipart tests stay small.
    pub async fn new(prefix: &str) -> Self {
        let client = s3_client();
        let bucket = create_test_bucket(&client, prefix).await;
        let local = tempfile::tempdir().expect("tempdir");
        let config = VfsConfig::builder()
            .bucket(bucket.clone())
            .endpoint(endpoint_url())
            .force_path_style(true)
            .local_root(local.path().to_path_buf())
            .multipart_threshold(6 * 1024 * 1024)
            .build();
        let store = Arc::new(AwsObjectStore::new(client.clone()));
        let storage = S3Storage::new(config, store).expect("storage");
        Self {
            client,
            bucket,
            storage,
            local,
        }
    }

    /// Keys currently in the bucket.
    pub async fn keys(&self) -> Vec<String> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .send()
            .await
            .expect("list_objects_v2");
        resp.contents()
            .iter()
            .filter_map(|o| o.key().map(ToOwned::to_owned))
            .collect()
    }

    /// Remove the bucket and everything in it.
    pub async fn cleanup(&self) {
        cleanup_bucket(&self.client, &self.bucket).await;
    }
}

mod test_directory;
mod test_file;
mod test_multipart;
mod test_transport;
