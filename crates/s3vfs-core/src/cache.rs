//! Per-unit-of-work object cache.
//!
//! A [`StorageScope`](crate::storage::StorageScope) owns exactly one
//! [`ObjectCache`]. Entries remember what a HEAD and a sidecar GET returned so
//! repeated attribute reads in the same scope cost no further round trips.
//! Nothing here expires: dropping the scope drops the cache.

use dashmap::DashMap;
use tracing::trace;

use crate::metadata::MetadataMap;
use crate::path::ObjectLocation;
use crate::store::ObjectHead;

/// What is known about one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedObject {
    /// Whether the object (or, for directories, anything under it) exists.
    pub exists: bool,
    /// HEAD result; `None` when there is no object under the exact key.
    pub head: Option<ObjectHead>,
    /// Decoded sidecar content plus any unsaved in-memory edits.
    pub metadata: MetadataMap,
    /// Whether a sidecar object exists in the store.
    pub has_sidecar: bool,
}

impl CachedObject {
    /// Entry for an object known to be absent.
    #[must_use]
    pub fn missing() -> Self {
        Self::default()
    }
}

/// Cache of object attributes keyed by bucket and key.
#[derive(Debug, Default)]
pub struct ObjectCache {
    entries: DashMap<ObjectLocation, CachedObject>,
}

impl ObjectCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached entry for `loc`, if any.
    #[must_use]
    pub fn get(&self, loc: &ObjectLocation) -> Option<CachedObject> {
        let hit = self.entries.get(loc).map(|e| e.value().clone());
        trace!(location = %loc, hit = hit.is_some(), "object cache lookup");
        hit
    }

    /// Store an entry, replacing any previous one.
    pub fn insert(&self, loc: ObjectLocation, entry: CachedObject) {
        self.entries.insert(loc, entry);
    }

    /// Apply `f` to an existing entry. Returns `false` when nothing is cached.
    pub fn update(&self, loc: &ObjectLocation, f: impl FnOnce(&mut CachedObject)) -> bool {
        match self.entries.get_mut(loc) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    /// Forget one entry.
    pub fn invalidate(&self, loc: &ObjectLocation) {
        self.entries.remove(loc);
    }

    /// Forget every entry in `bucket` whose key starts with `prefix`, plus
    /// the entries of directories above it (their existence may change).
    pub fn invalidate_prefix(&self, bucket: &str, prefix: &str) {
        self.entries.retain(|loc, _| {
            !(loc.bucket == bucket
                && (loc.key.starts_with(prefix) || (loc.is_directory() && prefix.starts_with(&loc.key))))
        });
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(key: &str) -> ObjectLocation {
        ObjectLocation::new("b", key)
    }

    #[test]
    fn test_should_store_and_update_entries() {
        let cache = ObjectCache::new();
        assert!(cache.get(&loc("a.txt")).is_none());
        cache.insert(loc("a.txt"), CachedObject::missing());
        assert_eq!(cache.get(&loc("a.txt")), Some(CachedObject::missing()));

        assert!(cache.update(&loc("a.txt"), |e| e.exists = true));
        assert!(cache.get(&loc("a.txt")).is_some_and(|e| e.exists));
        assert!(!cache.update(&loc("b.txt"), |e| e.exists = true));
    }

    #[test]
    fn test_should_invalidate_prefix_and_ancestors() {
        let cache = ObjectCache::new();
        for key in ["a/", "a/b/", "a/b/c.txt", "a/x.txt", "z.txt"] {
            cache.insert(loc(key), CachedObject::missing());
        }
        cache.insert(ObjectLocation::new("other", "a/b/c.txt"), CachedObject::missing());

        cache.invalidate_prefix("b", "a/b/");

        assert!(cache.get(&loc("a/")).is_none());
        assert!(cache.get(&loc("a/b/")).is_none());
        assert!(cache.get(&loc("a/b/c.txt")).is_none());
        assert!(cache.get(&loc("a/x.txt")).is_some());
        assert!(cache.get(&loc("z.txt")).is_some());
        assert!(cache.get(&ObjectLocation::new("other", "a/b/c.txt")).is_some());
        assert_eq!(cache.len(), 3);
    }
}
