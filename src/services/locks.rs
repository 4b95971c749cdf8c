use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Table<K> = Mutex<HashMap<K, Arc<AsyncMutex<()>>>>;

/// One async mutex per key, created on first use and dropped again once the
/// last guard is released with nobody waiting. Guards are owned so they can
/// be held across `.await` and dropped in any order.
pub struct KeyedLocks<K> {
    table: Table<K>,
}

/// Holds one key of a [`KeyedLocks`] until dropped.
pub struct KeyGuard<'a, K: Eq + Hash> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    table: &'a Table<K>,
}

impl<K: Eq + Hash> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        // slot() clones under this same lock, so the count cannot grow
        // between the check and the removal
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        drop(self.guard.take());
        if table.get(&self.key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            table.remove(&self.key);
        }
    }
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self { table: Mutex::new(HashMap::new()) }
    }
}

impl<K: Copy + Eq + Hash + Ord> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: K) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.entry(key).or_default().clone()
    }

    fn guard(&self, key: K, guard: OwnedMutexGuard<()>) -> KeyGuard<'_, K> {
        KeyGuard { key, guard: Some(guard), table: &self.table }
    }

    pub async fn lock(&self, key: K) -> KeyGuard<'_, K> {
        let guard = self.slot(key).lock_owned().await;
        self.guard(key, guard)
    }

    /// `None` if someone else currently holds the key.
    pub fn try_lock(&self, key: K) -> Option<KeyGuard<'_, K>> {
        let guard = self.slot(key).try_lock_owned().ok()?;
        Some(self.guard(key, guard))
    }

    /// Locks every key in ascending order, each key once. Every caller
    /// acquires in the same order, so two overlapping sets cannot deadlock.
    pub async fn lock_all(&self, keys: &[K]) -> Vec<KeyGuard<'_, K>> {
        let mut ordered = keys.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            guards.push(self.lock(key).await);
        }
        guards
    }

    #[cfg(test)]
    fn entries(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
