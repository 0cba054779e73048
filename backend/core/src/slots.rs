//! Keyed state with per-key serialization.
//!
//! Each key owns its own mutex inside a read-write-locked map. Request paths
//! hold the map's read lock for the whole read-modify-write on their key, so
//! different keys never contend while a sweep (write lock) waits for every
//! in-flight request to finish before it touches the map.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{GateError, GateResult};

pub struct KeyedSlots<K, V> {
    slots: RwLock<HashMap<K, Arc<Mutex<V>>>>,
}

impl<K, V> Default for KeyedSlots<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> KeyedSlots<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Run `f` on the slot for `key`, creating it with `init` when absent.
    ///
    /// `f` runs while the key's mutex is held; two calls for the same key
    /// never interleave.
    pub async fn with_slot<R>(
        &self,
        key: &K,
        init: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> GateResult<R> {
        let slots = {
            let read = self.slots.read().await;
            if read.contains_key(key) {
                read
            } else {
                drop(read);
                let mut write = self.slots.write().await;
                write
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(init())));
                write.downgrade()
            }
        };

        let slot = slots
            .get(key)
            .cloned()
            .ok_or_else(|| GateError::Internal(format!("state slot for {key:?} vanished")))?;
        let mut state = slot.lock().await;
        Ok(f(&mut state))
    }

    /// Read a slot without creating it.
    pub async fn peek<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        let slots = self.slots.read().await;
        let slot = slots.get(key)?.clone();
        let state = slot.lock().await;
        Some(f(&state))
    }

    /// Keep only the slots for which `keep` returns true. Returns how many
    /// slots were removed.
    pub async fn retain(&self, mut keep: impl FnMut(&K, &mut V) -> bool) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|key, slot| match slot.try_lock() {
            Ok(mut state) => keep(key, &mut state),
            // Still referenced by a caller that outlived its read guard.
            Err(_) => true,
        });
        let removed = before - slots.len();
        if removed > 0 {
            debug!(removed, remaining = slots.len(), "Swept keyed slots");
        }
        removed
    }

    pub async fn clear(&self) {
        self.slots.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}
