use serde::{Deserialize, Serialize};

const ASSISTANT_PREFIX: &str = "a:";

/// Key of one message's citations inside a conversation's cache entry.
///
/// Current writes always use [`MessageKey::Assistant`]. Any other key found
/// in stored data is kept verbatim as [`MessageKey::Legacy`] so it can still
/// be read and evicted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MessageKey {
    /// `a:<n>`, the 1-based index of the assistant message in its conversation.
    Assistant(u32),
    /// Raw message-list index or any other unrecognised key.
    Legacy(String),
}

impl MessageKey {
    pub fn assistant(ordinal: u32) -> Self {
        Self::Assistant(ordinal)
    }

    /// Ordinal used for oldest-first eviction. Keys that are not `a:<n>`
    /// sort as 0 and are evicted first.
    pub fn eviction_ordinal(&self) -> u32 {
        match self {
            Self::Assistant(n) => *n,
            Self::Legacy(_) => 0,
        }
    }
}

impl std::fmt::Display for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assistant(n) => write!(f, "{ASSISTANT_PREFIX}{n}"),
            Self::Legacy(raw) => f.write_str(raw),
        }
    }
}

impl From<&str> for MessageKey {
    fn from(raw: &str) -> Self {
        raw.strip_prefix(ASSISTANT_PREFIX)
            .and_then(|n| n.parse::<u32>().ok())
            .map(Self::Assistant)
            .unwrap_or_else(|| Self::Legacy(raw.to_string()))
    }
}

impl TryFrom<String> for MessageKey {
    type Error = std::convert::Infallible;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Ok(Self::from(raw.as_str()))
    }
}

impl From<MessageKey> for String {
    fn from(key: MessageKey) -> Self {
        key.to_string()
    }
}
