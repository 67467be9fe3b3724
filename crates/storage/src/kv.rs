// Path: crates/storage/src/kv.rs
//! The process-wide TTL key-value cache.
//!
//! Backs the compat mapping store and the watcher cursors. Entries expire
//! lazily on read; a zero TTL pins the entry forever (watcher cursors).

use dashmap::DashMap;
use lightnode_api::storage::{KvStore, StorageError};
use std::time::{Duration, Instant};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

/// An in-memory TTL cache over a concurrent map. Every individual read and
/// write is atomic per key; concurrent writes to one key race with
/// undefined order, which the callers tolerate.
#[derive(Default)]
pub struct MemKv {
    entries: DashMap<String, Entry>,
}

impl MemKv {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry. The node calls this periodically so the
    /// map does not accumulate weeks of dead mappings between reads.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| match e.expires_at {
            Some(deadline) => deadline > now,
            None => true,
        });
        before - self.entries.len()
    }

    /// The number of live entries, counting not-yet-purged expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemKv {
    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StorageError> {
        let expires_at = match ttl {
            Some(d) if !d.is_zero() => Some(Instant::now() + d),
            _ => None,
        };
        self.entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        if let Some(entry) = self.entries.get(key) {
            match entry.expires_at {
                Some(deadline) if deadline <= Instant::now() => {}
                _ => return Ok(entry.value.clone()),
            }
        } else {
            return Err(StorageError::NotFound);
        }
        // Expired: drop it and report missing.
        self.entries.remove(key);
        Err(StorageError::NotFound)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let kv = MemKv::new();
        kv.set("a", b"1".to_vec(), None).unwrap();
        assert_eq!(kv.get("a").unwrap(), b"1");
        kv.delete("a").unwrap();
        assert!(matches!(kv.get("a"), Err(StorageError::NotFound)));
        // Deleting again is fine.
        kv.delete("a").unwrap();
    }

    #[test]
    fn zero_ttl_never_expires() {
        let kv = MemKv::new();
        kv.set("cursor", b"42".to_vec(), Some(Duration::ZERO)).unwrap();
        assert_eq!(kv.get("cursor").unwrap(), b"42");
        assert_eq!(kv.purge_expired(), 0);
    }

    #[test]
    fn expired_entries_vanish() {
        let kv = MemKv::new();
        kv.set("t", b"x".to_vec(), Some(Duration::from_nanos(1))).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(kv.get("t"), Err(StorageError::NotFound)));
        assert!(kv.is_empty());
    }

    #[test]
    fn purge_drops_only_expired() {
        let kv = MemKv::new();
        kv.set("old", b"x".to_vec(), Some(Duration::from_nanos(1))).unwrap();
        kv.set("live", b"y".to_vec(), Some(Duration::from_secs(60))).unwrap();
        kv.set("pinned", b"z".to_vec(), None).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(kv.purge_expired(), 1);
        assert_eq!(kv.len(), 2);
    }

    #[test]
    fn overwrite_replaces_value_and_ttl() {
        let kv = MemKv::new();
        kv.set("k", b"1".to_vec(), Some(Duration::from_nanos(1))).unwrap();
        kv.set("k", b"2".to_vec(), Some(Duration::from_secs(60))).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(kv.get("k").unwrap(), b"2");
    }
}
