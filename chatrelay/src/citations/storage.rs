use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use lru::LruCache;

/// Key/value slots holding serialized cache entries.
///
/// Operations are synchronous so a cache write (read, evict, store) runs
/// as one step with no await point in between.
pub trait SlotStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`. `expires_at` is a hint; backends may drop
    /// the slot any time after it.
    fn set(&self, key: &str, value: String, expires_at: DateTime<Utc>);

    fn remove(&self, key: &str);

    /// Drops every expired slot and returns how many were removed.
    fn purge_expired(&self) -> usize;
}

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Slot {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// In-process slot storage bounded by slot count.
///
/// When full, the least recently used slot is dropped to make room.
pub struct MemorySlotStorage {
    slots: Mutex<LruCache<String, Slot>>,
}

impl MemorySlotStorage {
    pub fn new(max_slots: usize) -> Self {
        let capacity = NonZeroUsize::new(max_slots).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SlotStorage for MemorySlotStorage {
    fn get(&self, key: &str) -> Option<String> {
        let mut slots = self.lock();
        let now = Utc::now();
        match slots.get(key) {
            Some(slot) if slot.is_expired(now) => {
                slots.pop(key);
                None
            }
            Some(slot) => Some(slot.value.clone()),
            None => None,
        }
    }

    fn set(&self, key: &str, value: String, expires_at: DateTime<Utc>) {
        let mut slots = self.lock();
        if let Some((evicted, _)) = slots.push(key.to_string(), Slot { value, expires_at }) {
            if evicted != key {
                tracing::debug!(slot = %evicted, "Slot storage full, dropped least recently used slot");
            }
        }
    }

    fn remove(&self, key: &str) {
        self.lock().pop(key);
    }

    fn purge_expired(&self) -> usize {
        let mut slots = self.lock();
        let now = Utc::now();
        let expired: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            slots.pop(key);
        }
        expired.len()
    }
}
