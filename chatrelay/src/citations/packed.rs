//! Positional encoding of [`CitationRecord`]s for the citation cache.
//!
//! A packed citation is a JSON array in fixed slot order:
//!
//! ```text
//! [source, content, document_name?, score?, dataset_id?, document_id?, segment_id?, position?]
//! ```
//!
//! Unset slots at the tail are dropped before serialization; unset slots in
//! the middle are written as `null`. Decoding treats missing and `null`
//! slots identically, so an omitted field always reads back as `None`.
//! Scores are written as full-precision JSON numbers.

use std::fmt;

use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::CitationRecord;

const REQUIRED_SLOTS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct PackedCitation(CitationRecord);

impl PackedCitation {
    pub fn into_record(self) -> CitationRecord {
        self.0
    }

    /// Number of slots written once trailing unset slots are truncated.
    fn encoded_len(&self) -> usize {
        let r = &self.0;
        let optional = [
            r.document_name.is_some(),
            r.score.is_some(),
            r.dataset_id.is_some(),
            r.document_id.is_some(),
            r.segment_id.is_some(),
            r.position.is_some(),
        ];
        optional
            .iter()
            .rposition(|set| *set)
            .map_or(REQUIRED_SLOTS, |last| REQUIRED_SLOTS + last + 1)
    }
}

impl From<CitationRecord> for PackedCitation {
    fn from(record: CitationRecord) -> Self {
        Self(record)
    }
}

pub fn pack(records: &[CitationRecord]) -> Vec<PackedCitation> {
    records.iter().cloned().map(PackedCitation::from).collect()
}

pub fn unpack(packed: Vec<PackedCitation>) -> Vec<CitationRecord> {
    packed.into_iter().map(PackedCitation::into_record).collect()
}

impl Serialize for PackedCitation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.encoded_len();
        let r = &self.0;
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&r.source)?;
        seq.serialize_element(&r.content)?;
        if len > 2 {
            seq.serialize_element(&r.document_name)?;
        }
        if len > 3 {
            seq.serialize_element(&r.score)?;
        }
        if len > 4 {
            seq.serialize_element(&r.dataset_id)?;
        }
        if len > 5 {
            seq.serialize_element(&r.document_id)?;
        }
        if len > 6 {
            seq.serialize_element(&r.segment_id)?;
        }
        if len > 7 {
            seq.serialize_element(&r.position)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for PackedCitation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(PackedCitationVisitor)
    }
}

struct PackedCitationVisitor;

impl<'de> Visitor<'de> for PackedCitationVisitor {
    type Value = PackedCitation;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a packed citation array with at least source and content")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let source: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let content: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;

        let record = CitationRecord {
            source,
            content,
            document_name: seq.next_element::<Option<String>>()?.flatten(),
            score: seq.next_element::<Option<f64>>()?.flatten(),
            dataset_id: seq.next_element::<Option<String>>()?.flatten(),
            document_id: seq.next_element::<Option<String>>()?.flatten(),
            segment_id: seq.next_element::<Option<String>>()?.flatten(),
            position: seq.next_element::<Option<u32>>()?.flatten(),
        };

        while seq.next_element::<IgnoredAny>()?.is_some() {}

        Ok(PackedCitation(record))
    }
}
