use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use super::key::MessageKey;
use super::legacy::LegacyCacheAdapter;
use super::packed::{pack, unpack, PackedCitation};
use super::storage::SlotStorage;
use super::CitationMap;
use crate::config::CitationCacheConfig;
use crate::error::Result;
use crate::models::CitationRecord;

pub const SLOT_PREFIX: &str = "cit:";
pub const DEFAULT_BUDGET_BYTES: usize = 3800;
pub const DEFAULT_EXPIRY_DAYS: i64 = 7;

const FORMAT_VERSION: u8 = 1;

/// Result of a [`CitationCache::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// The entry fit the budget as is.
    Stored,
    /// Older messages were dropped to make the entry fit.
    Trimmed { evicted: usize },
    /// Nothing fit; the conversation's slot was removed.
    Cleared,
    /// No citations were given, storage was not touched.
    Skipped,
}

#[derive(Debug, Deserialize)]
struct StoredEntry {
    v: u8,
    m: BTreeMap<MessageKey, Vec<PackedCitation>>,
}

#[derive(Serialize)]
struct StoredEntryRef<'a> {
    v: u8,
    m: &'a BTreeMap<MessageKey, Vec<PackedCitation>>,
}

pub fn slot_key(conversation_id: &str) -> String {
    format!("{SLOT_PREFIX}{conversation_id}")
}

/// Serialized size of a slot as the budget counts it: `key=payload`.
fn serialized_size(slot_key: &str, payload: &str) -> usize {
    slot_key.len() + 1 + payload.len()
}

/// Per-conversation citation cache with a byte budget per slot.
///
/// Each conversation owns one slot holding `{"v":1,"m":{messageKey:[packed..]}}`.
/// When a write would push the slot over budget, the oldest messages are
/// dropped first; if the newest message alone does not fit, the slot is
/// removed entirely.
pub struct CitationCache {
    storage: Arc<dyn SlotStorage>,
    legacy: LegacyCacheAdapter,
    budget_bytes: usize,
    expiry: Duration,
    write_lock: Mutex<()>,
}

impl CitationCache {
    pub fn new(storage: Arc<dyn SlotStorage>, config: &CitationCacheConfig) -> Self {
        Self {
            legacy: LegacyCacheAdapter::new(storage.clone()),
            storage,
            budget_bytes: config.budget_bytes,
            expiry: Duration::days(config.expiry_days),
            write_lock: Mutex::new(()),
        }
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// Stores `records` under `key`, replacing any previous value for it.
    pub fn write(
        &self,
        conversation_id: &str,
        key: MessageKey,
        records: &[CitationRecord],
    ) -> Result<WriteOutcome> {
        if records.is_empty() {
            return Ok(WriteOutcome::Skipped);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slot_key(conversation_id);

        let mut entries = self.load_packed(&slot);
        entries.insert(key.clone(), pack(records));

        let mut eviction_order: Vec<MessageKey> =
            entries.keys().filter(|k| **k != key).cloned().collect();
        eviction_order.sort_by_key(MessageKey::eviction_ordinal);

        let mut evicted = 0;
        loop {
            let payload = serde_json::to_string(&StoredEntryRef {
                v: FORMAT_VERSION,
                m: &entries,
            })?;
            if serialized_size(&slot, &payload) <= self.budget_bytes {
                self.storage.set(&slot, payload, Utc::now() + self.expiry);
                return Ok(if evicted == 0 {
                    WriteOutcome::Stored
                } else {
                    tracing::info!(
                        conversation_id,
                        evicted,
                        "Citation cache over budget, dropped oldest messages"
                    );
                    WriteOutcome::Trimmed { evicted }
                });
            }

            match eviction_order.get(evicted) {
                Some(oldest) => {
                    entries.remove(oldest);
                    evicted += 1;
                }
                None => {
                    self.storage.remove(&slot);
                    tracing::warn!(
                        conversation_id,
                        message_key = %key,
                        budget = self.budget_bytes,
                        "Citations for a single message exceed the cache budget, cleared slot"
                    );
                    return Ok(WriteOutcome::Cleared);
                }
            }
        }
    }

    /// Current-format entry if present, else the legacy slice, else empty.
    /// Reading never migrates legacy data.
    pub fn read(&self, conversation_id: &str) -> CitationMap {
        let current = self.load_packed(&slot_key(conversation_id));
        if !current.is_empty() {
            return current
                .into_iter()
                .map(|(key, packed)| (key, unpack(packed)))
                .collect();
        }
        self.legacy.read(conversation_id)
    }

    pub fn clear(&self, conversation_id: &str) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.storage.remove(&slot_key(conversation_id));
    }

    fn load_packed(&self, slot: &str) -> BTreeMap<MessageKey, Vec<PackedCitation>> {
        let Some(raw) = self.storage.get(slot) else {
            return BTreeMap::new();
        };
        match serde_json::from_str::<StoredEntry>(&raw) {
            Ok(entry) if entry.v == FORMAT_VERSION => entry.m,
            Ok(entry) => {
                tracing::warn!(slot, version = entry.v, "Unknown citation cache format, ignoring");
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!(slot, error = %e, "Corrupt citation cache entry, ignoring");
                BTreeMap::new()
            }
        }
    }
}
