//! Metadata sidecar encoding.
//!
//! Custom metadata for an object lives in a separate object,
//! `<metadata_prefix><key>.meta`, whose body is a flat list of
//! `key;value#` records.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{VfsError, VfsResult};

/// Metadata key holding the logical last-write time.
pub const LAST_WRITE_TIME: &str = "LAST_WRITE_TIME";

/// Metadata key holding the advisory lock flag.
pub const LOCK: &str = "Lock";

const FIELD_SEPARATOR: char = ';';
const RECORD_SEPARATOR: char = '#';
const SIDECAR_SUFFIX: &str = ".meta";

/// Metadata of one object, ordered by key so encoding is deterministic.
pub type MetadataMap = BTreeMap<String, String>;

/// Key of the sidecar object describing `key`.
#[must_use]
pub fn sidecar_key(metadata_prefix: &str, key: &str) -> String {
    format!("{metadata_prefix}{key}{SIDECAR_SUFFIX}")
}

/// Whether `key` is a sidecar (or anything else under the metadata prefix).
#[must_use]
pub fn is_sidecar_key(metadata_prefix: &str, key: &str) -> bool {
    key.starts_with(metadata_prefix)
}

/// Serialize a map as `key;value#key;value#`.
///
/// # Examples
///
/// ```
/// use s3vfs_core::metadata::{decode, encode, MetadataMap};
///
/// let mut map = MetadataMap::new();
/// map.insert("Lock".to_owned(), "True".to_owned());
/// assert_eq!(encode(&map), "Lock;True#");
/// assert_eq!(decode("Lock;True#"), map);
/// ```
#[must_use]
pub fn encode(map: &MetadataMap) -> String {
    map.iter()
        .map(|(k, v)| format!("{k}{FIELD_SEPARATOR}{v}{RECORD_SEPARATOR}"))
        .collect()
}

/// Parse a sidecar body. Records without a field separator are skipped; a
/// repeated key keeps its last value.
#[must_use]
pub fn decode(text: &str) -> MetadataMap {
    text.split(RECORD_SEPARATOR)
        .filter_map(|record| record.split_once(FIELD_SEPARATOR))
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

/// Reject keys or values that would corrupt the record format.
pub fn validate_entry(key: &str, value: &str) -> VfsResult<()> {
    if key.is_empty() {
        return Err(VfsError::invalid_operation("metadata key must not be empty"));
    }
    let bad = |s: &str| s.contains(FIELD_SEPARATOR) || s.contains(RECORD_SEPARATOR);
    if bad(key) || bad(value) {
        return Err(VfsError::invalid_operation(format!(
            "metadata entry {key:?} contains a reserved character ('{FIELD_SEPARATOR}' or '{RECORD_SEPARATOR}')"
        )));
    }
    Ok(())
}

/// Format a timestamp the way it is stored in `LAST_WRITE_TIME`.
#[must_use]
pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp. Accepts RFC 3339 and RFC 2822.
#[must_use]
pub fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
