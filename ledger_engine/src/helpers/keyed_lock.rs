//! An async mutex per key.
//!
//! Holders of different keys never wait on each other. The entry for a key only lives while someone holds or waits
//! for its lock, so the map stays as small as the set of keys currently in use.
use std::{hash::Hash, sync::Arc};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct KeyedLock<K: Eq + Hash> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash> Clone for KeyedLock<K> {
    fn clone(&self) -> Self {
        Self { locks: Arc::clone(&self.locks) }
    }
}

impl<K: Eq + Hash> Default for KeyedLock<K> {
    fn default() -> Self {
        Self { locks: Arc::new(DashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone> KeyedLock<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`. Access is released when the returned guard is dropped.
    pub async fn lock(&self, key: K) -> KeyedLockGuard<K> {
        // The map reference must be released before awaiting, or other keys in the same shard would block.
        let mutex = Arc::clone(self.locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).value());
        let guard = mutex.lock_owned().await;
        KeyedLockGuard { key, guard: Some(guard), locks: Arc::clone(&self.locks) }
    }

    /// The number of keys that are currently locked or being waited for.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct KeyedLockGuard<K: Eq + Hash> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash> KeyedLockGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for KeyedLockGuard<K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left means nobody holds or waits for this key.
        self.locks.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
