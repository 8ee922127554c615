//! Secondary index definitions
//!
//! An [`IndexSpec`] describes a compound key over peer record fields, an
//! optional uniqueness constraint and an optional partial filter. Engines
//! that materialize indexes use [`IndexSpec::encode`], which produces keys
//! whose byte order matches the declared field directions.

use serde::{Deserialize, Serialize};

use crate::peers::record::PeerRecord;
use crate::types::Reputation;

/// Indexable record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexField {
    LedgerNodeId,
    PeerId,
    Reputation,
    BackoffUntil,
    RequiredBlockHeight,
    Updated,
    LastPushAt,
    ConsecutiveFailures,
    PulledAfterPush,
}

impl IndexField {
    /// Document path of the field
    pub fn path(&self) -> &'static str {
        match self {
            IndexField::LedgerNodeId => "meta.ledgerNodeId",
            IndexField::PeerId => "peer.id",
            IndexField::Reputation => "peer.reputation",
            IndexField::BackoffUntil => "peer.status.backoffUntil",
            IndexField::RequiredBlockHeight => "peer.status.requiredBlockHeight",
            IndexField::Updated => "meta.updated",
            IndexField::LastPushAt => "peer.status.lastPushAt",
            IndexField::ConsecutiveFailures => "peer.status.consecutiveFailures",
            IndexField::PulledAfterPush => "meta.pulledAfterPush",
        }
    }

    fn encode_into(&self, record: &PeerRecord, out: &mut Vec<u8>) {
        let status = &record.peer.status;
        match self {
            IndexField::LedgerNodeId => encode_str(&record.meta.ledger_node_id, out),
            IndexField::PeerId => encode_str(&record.peer.id, out),
            IndexField::Reputation => out.extend_from_slice(&encode_reputation(record.peer.reputation)),
            IndexField::BackoffUntil => out.extend_from_slice(&status.backoff_until.to_be_bytes()),
            IndexField::RequiredBlockHeight => {
                out.extend_from_slice(&status.required_block_height.to_be_bytes())
            }
            IndexField::Updated => out.extend_from_slice(&record.meta.updated.to_be_bytes()),
            IndexField::LastPushAt => out.extend_from_slice(&status.last_push_at.to_be_bytes()),
            IndexField::ConsecutiveFailures => {
                out.extend_from_slice(&status.consecutive_failures.to_be_bytes())
            }
            IndexField::PulledAfterPush => out.push(record.meta.pulled_after_push as u8),
        }
    }
}

/// Flip the sign bit so negative scores sort first
fn encode_reputation(reputation: Reputation) -> [u8; 8] {
    ((reputation as u64) ^ (1 << 63)).to_be_bytes()
}

/// Strings are 0x00-escaped and terminated so shorter values sort first
pub(crate) fn encode_str(value: &str, out: &mut Vec<u8>) {
    for byte in value.as_bytes() {
        out.push(*byte);
        if *byte == 0x00 {
            out.push(0xFF);
        }
    }
    out.extend_from_slice(&[0x00, 0x01]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexDirection {
    Ascending,
    Descending,
}

impl IndexDirection {
    fn apply(&self, bytes: &mut [u8]) {
        if *self == IndexDirection::Descending {
            for byte in bytes {
                *byte = !*byte;
            }
        }
    }
}

/// Value of a leading key component, used to seek inside an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexValue<'a> {
    Str(&'a str),
    Reputation(Reputation),
    Flag(bool),
}

impl IndexValue<'_> {
    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            IndexValue::Str(value) => encode_str(value, out),
            IndexValue::Reputation(value) => out.extend_from_slice(&encode_reputation(*value)),
            IndexValue::Flag(value) => out.push(*value as u8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: IndexField,
    pub direction: IndexDirection,
}

impl IndexKey {
    pub const fn asc(field: IndexField) -> Self {
        Self {
            field,
            direction: IndexDirection::Ascending,
        }
    }

    pub const fn desc(field: IndexField) -> Self {
        Self {
            field,
            direction: IndexDirection::Descending,
        }
    }
}

/// Restricts an index to records matching a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartialFilter {
    PulledAfterPush(bool),
}

impl PartialFilter {
    pub fn matches(&self, record: &PeerRecord) -> bool {
        match self {
            PartialFilter::PulledAfterPush(flag) => record.meta.pulled_after_push == *flag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<IndexKey>,
    pub unique: bool,
    pub partial: Option<PartialFilter>,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, keys: Vec<IndexKey>) -> Self {
        Self {
            name: name.into(),
            keys,
            unique: false,
            partial: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn partial(mut self, filter: PartialFilter) -> Self {
        self.partial = Some(filter);
        self
    }

    /// Whether `record` has an entry in this index
    pub fn covers(&self, record: &PeerRecord) -> bool {
        self.partial.map_or(true, |filter| filter.matches(record))
    }

    /// Order-preserving key of `record` under this index
    pub fn encode(&self, record: &PeerRecord) -> Vec<u8> {
        let mut out = Vec::new();
        for key in &self.keys {
            let start = out.len();
            key.field.encode_into(record, &mut out);
            key.direction.apply(&mut out[start..]);
        }
        out
    }

    /// Encoded key prefix for the first `values.len()` components
    ///
    /// Every entry whose leading components equal `values` starts with the
    /// returned bytes, and seeking to it respects the declared directions.
    pub fn encode_prefix(&self, values: &[IndexValue<'_>]) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in self.keys.iter().zip(values) {
            let start = out.len();
            value.encode_into(&mut out);
            key.direction.apply(&mut out[start..]);
        }
        out
    }

    /// Reputation stored at byte `offset` of an encoded key, when the
    /// component there is [`IndexField::Reputation`] at `position`
    pub fn decode_reputation(&self, position: usize, encoded: &[u8], offset: usize) -> Option<Reputation> {
        let key = self.keys.get(position)?;
        if key.field != IndexField::Reputation {
            return None;
        }
        let mut bytes: [u8; 8] = encoded.get(offset..offset + 8)?.try_into().ok()?;
        key.direction.apply(&mut bytes);
        Some((u64::from_be_bytes(bytes) ^ (1 << 63)) as Reputation)
    }

    /// Whether the leading components are exactly `fields`, in order
    pub fn leads_with(&self, fields: &[IndexField]) -> bool {
        self.keys.len() >= fields.len()
            && self.keys.iter().zip(fields).all(|(key, field)| key.field == *field)
    }

    /// Human-readable key layout, e.g. `meta.ledgerNodeId:1,peer.id:1`
    pub fn describe(&self) -> String {
        self.keys
            .iter()
            .map(|key| {
                let dir = match key.direction {
                    IndexDirection::Ascending => 1,
                    IndexDirection::Descending => -1,
                };
                format!("{}:{}", key.field.path(), dir)
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::record::Peer;

    fn record(id: &str, reputation: i64, updated: u64) -> PeerRecord {
        let mut peer = Peer::new(id);
        peer.reputation = reputation;
        let mut record = PeerRecord::new("node", peer, updated);
        record.meta.updated = updated;
        record
    }

    #[test]
    fn test_reputation_encoding_orders_signed_values() {
        let spec = IndexSpec::new("rep", vec![IndexKey::asc(IndexField::Reputation)]);
        let low = spec.encode(&record("a", -5, 0));
        let zero = spec.encode(&record("a", 0, 0));
        let high = spec.encode(&record("a", 7, 0));
        assert!(low < zero);
        assert!(zero < high);
    }

    #[test]
    fn test_descending_component_reverses_order() {
        let spec = IndexSpec::new(
            "rep_desc",
            vec![
                IndexKey::asc(IndexField::LedgerNodeId),
                IndexKey::desc(IndexField::Reputation),
                IndexKey::asc(IndexField::Updated),
            ],
        );
        let high = spec.encode(&record("a", 10, 5));
        let low = spec.encode(&record("b", 1, 1));
        assert!(high < low);

        let older = spec.encode(&record("c", 10, 1));
        assert!(older < high);
    }

    #[test]
    fn test_string_prefix_sorts_first() {
        let spec = IndexSpec::new("id", vec![IndexKey::asc(IndexField::PeerId)]);
        assert!(spec.encode(&record("ab", 0, 0)) < spec.encode(&record("abc", 0, 0)));
    }

    #[test]
    fn test_partial_filter_coverage() {
        let spec = IndexSpec::new("push", vec![IndexKey::asc(IndexField::PeerId)])
            .partial(PartialFilter::PulledAfterPush(true));
        let mut rec = record("a", 0, 0);
        assert!(!spec.covers(&rec));
        rec.meta.pulled_after_push = true;
        assert!(spec.covers(&rec));
    }

    #[test]
    fn test_prefix_matches_full_encoding() {
        let spec = IndexSpec::new(
            "rep_desc",
            vec![
                IndexKey::asc(IndexField::LedgerNodeId),
                IndexKey::desc(IndexField::Reputation),
                IndexKey::asc(IndexField::Updated),
            ],
        );
        let rec = record("a", -12, 40);
        let full = spec.encode(&rec);

        let node = spec.encode_prefix(&[IndexValue::Str("node")]);
        let with_rep = spec.encode_prefix(&[IndexValue::Str("node"), IndexValue::Reputation(-12)]);
        assert!(full.starts_with(&node));
        assert!(full.starts_with(&with_rep));

        assert_eq!(spec.decode_reputation(1, &full, node.len()), Some(-12));
        assert_eq!(spec.decode_reputation(2, &full, node.len()), None);
        assert!(spec.leads_with(&[IndexField::LedgerNodeId, IndexField::Reputation]));
        assert!(!spec.leads_with(&[IndexField::Reputation]));
    }

    #[test]
    fn test_describe() {
        let spec = IndexSpec::new(
            "x",
            vec![
                IndexKey::asc(IndexField::LedgerNodeId),
                IndexKey::desc(IndexField::LastPushAt),
            ],
        );
        assert_eq!(spec.describe(), "meta.ledgerNodeId:1,peer.status.lastPushAt:-1");
    }
}
