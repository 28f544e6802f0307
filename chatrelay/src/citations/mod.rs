//! Bounded per-conversation citation cache.
//!
//! Citations are stored per conversation in one slot of a [`SlotStorage`],
//! packed as positional tuples and kept under a byte budget by dropping the
//! oldest assistant messages first. Conversations cached by the old global
//! format are still readable through [`LegacyCacheAdapter`].

mod cache;
mod key;
mod legacy;
mod packed;
mod storage;

use std::collections::BTreeMap;

use crate::models::CitationRecord;

pub use cache::{
    slot_key, CitationCache, WriteOutcome, DEFAULT_BUDGET_BYTES, DEFAULT_EXPIRY_DAYS, SLOT_PREFIX,
};
pub use key::MessageKey;
pub use legacy::{LegacyCacheAdapter, LEGACY_SLOT_KEY};
pub use packed::{pack, unpack, PackedCitation};
pub use storage::{MemorySlotStorage, SlotStorage};

/// Citations of one conversation, by message key.
pub type CitationMap = BTreeMap<MessageKey, Vec<CitationRecord>>;
