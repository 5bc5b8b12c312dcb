//! Memoization of expensive function results

use std::hash::Hash;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::Result;
use crate::value::Value;

/// A concurrent cache that computes each key at most once.
///
/// Concurrent callers for the same key wait for the first computation
/// instead of starting their own. Failures are not cached, so a later call
/// retries.
pub struct MemoCache<K> {
    slots: DashMap<K, Arc<Mutex<Option<Value>>>>,
}

impl<K: Eq + Hash + Clone> Default for MemoCache<K> {
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> MemoCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_try_insert_with<F>(&self, key: K, compute: F) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        // Clone the slot out so the map shard is unlocked while computing.
        let slot = Arc::clone(self.slots.entry(key).or_default().value());
        let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(ref value) = *guard {
            return Ok(value.clone());
        }
        let value = compute()?;
        *guard = Some(value.clone());
        Ok(value)
    }

    /// The cached value, if computed successfully.
    pub fn get(&self, key: &K) -> Option<Value> {
        let slot = self.slots.get(key).map(|s| Arc::clone(s.value()))?;
        let guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    /// Number of successfully computed entries.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .lock()
                    .map(|g| g.is_some())
                    .unwrap_or(false)
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}

/// Caches shared by every evaluation in one resolver.
#[derive(Default)]
pub struct FunctionCache {
    /// Keyed by (stack, component).
    pub outputs: MemoCache<(String, String)>,
    /// Keyed by (store, stack, component, key).
    pub stores: MemoCache<(String, String, String, String)>,
}

impl FunctionCache {
    pub fn new() -> Self {
        Self::default()
    }
}
