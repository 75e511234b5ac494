//! Public and signed download URLs.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};

use crate::config::VfsConfig;

/// Characters escaped in query values (everything but RFC 3986 unreserved).
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters escaped in object key paths (unreserved and `/` kept).
const KEY_PATH: &AsciiSet = &QUERY_VALUE.remove(b'/');

/// Base URL objects of `bucket` are publicly reachable under.
#[must_use]
pub fn public_base_url(config: &VfsConfig, bucket: &str) -> String {
    if let Some(base) = &config.public_endpoint {
        return base.trim_end_matches('/').to_owned();
    }
    match &config.endpoint {
        Some(endpoint) if config.force_path_style => {
            format!("{}/{bucket}", endpoint.trim_end_matches('/'))
        }
        _ => format!("https://{bucket}.s3.amazonaws.com"),
    }
}

/// Direct URL of an object in a public bucket.
#[must_use]
pub fn public_url(config: &VfsConfig, bucket: &str, key: &str) -> String {
    format!(
        "{}/{}",
        public_base_url(config, bucket),
        utf8_percent_encode(key, KEY_PATH)
    )
}

/// Download-endpoint URL for a private object.
///
/// The `hash` parameter is the hex SHA-256 of the `path=...` query string
/// followed by the configured salt, so the endpoint can verify the link.
///
/// # Examples
///
/// ```
/// use s3vfs_core::config::VfsConfig;
/// use s3vfs_core::url::download_url;
///
/// let config = VfsConfig::builder().hash_salt("pepper".to_owned()).build();
/// let url = download_url(&config, "/docs/a b.pdf");
/// assert!(url.starts_with("/getfile?path=%2Fdocs%2Fa%20b.pdf&hash="));
/// ```
#[must_use]
pub fn download_url(config: &VfsConfig, logical_path: &str) -> String {
    let query = format!("path={}", utf8_percent_encode(logical_path, QUERY_VALUE));
    let hash = hex::encode(Sha256::digest(format!("{query}{}", config.hash_salt).as_bytes()));
    format!("{}?{query}&hash={hash}", config.download_endpoint)
}
