//! Account bootstrap: credentials, bucket and region.
//!
//! Connecting validates the configuration, asks the store once for the
//! configured bucket's region and rebuilds the client for that region. With
//! a custom endpoint the region is taken from the configuration and the
//! bucket is checked with `HeadBucket` instead. Every failure here is a [`VfsError::Configuration`] raised at startup.

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use s3vfs_core::config::VfsConfig;
use s3vfs_core::error::{VfsError, VfsResult};
use s3vfs_core::storage::S3Storage;
use tracing::{debug, info};

use crate::client::AwsObjectStore;

/// Region reported for buckets without a location constraint.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Legacy location constraint still returned for some Ireland buckets.
const LEGACY_EU: &str = "EU";

/// Region that [`LEGACY_EU`] stands for.
const LEGACY_EU_REGION: &str = "eu-west-1";

/// Resolved account: configuration plus a client bound to the bucket's region.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    config: VfsConfig,
    region: String,
    store: AwsObjectStore,
}

impl AccountInfo {
    /// Validate `config`, resolve the bucket region and build the client.
    pub async fn connect(config: VfsConfig) -> VfsResult<Self> {
        config.validate()?;
        validate_credentials(&config)?;
        let bucket = config
            .buckets()
            .into_iter()
            .next()
            .ok_or_else(|| VfsError::Configuration("no bucket configured".to_owned()))?;

        let bootstrap = build_client(&config, &config.region).await;
        let region = if config.endpoint.is_some() {
            // S3 emulators accept any region; only check that the bucket is there.
            verify_bucket(&bootstrap, &bucket).await?;
            config.region.clone()
        } else {
            let output = bootstrap
                .get_bucket_location()
                .bucket(&bucket)
                .send()
                .await
                .map_err(|e| {
                    VfsError::Configuration(format!(
                        "failed to resolve the region of bucket {bucket}: {}",
                        aws_sdk_s3::error::DisplayErrorContext(&e)
                    ))
                })?;
            normalize_region(output.location_constraint().map(|c| c.as_str()))
        };

        let client = if region == config.region {
            bootstrap
        } else {
            build_client(&config, &region).await
        };
        info!(bucket = %bucket, region = %region, endpoint = ?config.endpoint, "connected object store account");

        Ok(Self {
            config,
            region,
            store: AwsObjectStore::new(client),
        })
    }

    /// Resolved region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// The region-bound object store.
    #[must_use]
    pub fn store(&self) -> &AwsObjectStore {
        &self.store
    }

    /// Build a storage root over this account.
    pub fn into_storage(self) -> VfsResult<S3Storage> {
        S3Storage::new(self.config, Arc::new(self.store))
    }
}

/// Map a bucket location constraint to a region name.
#[must_use]
pub fn normalize_region(constraint: Option<&str>) -> String {
    match constraint.map(str::trim) {
        None | Some("") => DEFAULT_REGION.to_owned(),
        Some(c) if c.eq_ignore_ascii_case(LEGACY_EU) => LEGACY_EU_REGION.to_owned(),
        Some(c) => c.to_owned(),
    }
}

/// Fail with a configuration error unless `bucket` is reachable.
async fn verify_bucket(client: &Client, bucket: &str) -> VfsResult<()> {
    client
        .head_bucket()
        .bucket(bucket)
        .send()
        .await
        .map_err(|e| {
            VfsError::Configuration(format!(
                "bucket {bucket} is not reachable: {}",
                aws_sdk_s3::error::DisplayErrorContext(&e)
            ))
        })?;
    Ok(())
}

fn validate_credentials(config: &VfsConfig) -> VfsResult<()> {
    match (&config.access_key_id, &config.secret_access_key) {
        (Some(_), None) | (None, Some(_)) => Err(VfsError::Configuration(
            "access key id and secret access key must be set together".to_owned(),
        )),
        _ => Ok(()),
    }
}

/// Build an SDK client for `region`, using explicit keys when configured
/// and the ambient credential chain otherwise.
async fn build_client(config: &VfsConfig, region: &str) -> Client {
    let region = Region::new(region.to_owned());
    let mut builder = match (&config.access_key_id, &config.secret_access_key) {
        (Some(id), Some(secret)) => aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(Credentials::new(id, secret, None, None, "s3vfs-config")),
        _ => {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;
            aws_sdk_s3::config::Builder::from(&shared)
        }
    };

    if let Some(endpoint) = &config.endpoint {
        builder = builder.endpoint_url(endpoint);
    }
    if config.force_path_style {
        builder = builder.force_path_style(true);
    }
    debug!(endpoint = ?config.endpoint, force_path_style = config.force_path_style, "built s3 client");
    Client::from_conf(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_normalize_bucket_regions() {
        assert_eq!(normalize_region(None), "us-east-1");
        assert_eq!(normalize_region(Some("")), "us-east-1");
        assert_eq!(normalize_region(Some("EU")), "eu-west-1");
        assert_eq!(normalize_region(Some("ap-southeast-2")), "ap-southeast-2");
    }

    #[tokio::test]
    async fn test_should_reject_missing_bucket() {
        let config = VfsConfig::builder()
            .access_key_id("id".to_owned())
            .secret_access_key("secret".to_owned())
            .build();
        let err = AccountInfo::connect(config).await.unwrap_err();
        assert!(matches!(err, VfsError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_should_reject_half_configured_credentials() {
        let config = VfsConfig::builder()
            .bucket("site".to_owned())
            .access_key_id("id".to_owned())
            .build();
        let err = AccountInfo::connect(config).await.unwrap_err();
        assert!(matches!(err, VfsError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_should_fail_at_startup_when_bucket_is_unreachable() {
        let config = VfsConfig::builder()
            .bucket("site".to_owned())
            .endpoint("http://127.0.0.1:1".to_owned())
            .force_path_style(true)
            .access_key_id("id".to_owned())
            .secret_access_key("secret".to_owned())
            .build();
        let err = AccountInfo::connect(config).await.unwrap_err();
        assert!(matches!(&err, VfsError::Configuration(msg) if msg.contains("site")));
    }
}
