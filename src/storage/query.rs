//! Peer collection query model
//!
//! Filters, sort keys and partial updates understood by every
//! [`PeerCollection`](super::PeerCollection) engine. Evaluation lives here
//! so all engines agree on semantics.

use std::cmp::Ordering;

use crate::peers::record::{Peer, PeerRecord};
use crate::types::{BlockHeight, LedgerNodeId, PeerId, Reputation, Timestamp};

/// Numeric range predicate with independent inclusive/exclusive bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeFilter<T> {
    pub gt: Option<T>,
    pub gte: Option<T>,
    pub lt: Option<T>,
    pub lte: Option<T>,
}

impl<T: PartialOrd + Copy> RangeFilter<T> {
    /// `value >= min`, and `value <= max` when a max is given
    pub fn inclusive(min: T, max: Option<T>) -> Self {
        Self {
            gt: None,
            gte: Some(min),
            lt: None,
            lte: max,
        }
    }

    /// `after < value < before`
    pub fn exclusive(after: T, before: T) -> Self {
        Self {
            gt: Some(after),
            gte: None,
            lt: Some(before),
            lte: None,
        }
    }

    /// `value <= max`
    pub fn at_most(max: T) -> Self {
        Self {
            lte: Some(max),
            ..Self::unbounded()
        }
    }

    fn unbounded() -> Self {
        Self {
            gt: None,
            gte: None,
            lt: None,
            lte: None,
        }
    }

    pub fn matches(&self, value: T) -> bool {
        self.gt.map_or(true, |b| value > b)
            && self.gte.map_or(true, |b| value >= b)
            && self.lt.map_or(true, |b| value < b)
            && self.lte.map_or(true, |b| value <= b)
    }
}

/// Peer id predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdFilter {
    Eq(PeerId),
    In(Vec<PeerId>),
}

impl IdFilter {
    pub fn matches(&self, id: &str) -> bool {
        match self {
            IdFilter::Eq(expected) => expected == id,
            IdFilter::In(ids) => ids.iter().any(|candidate| candidate == id),
        }
    }
}

/// Conjunction of predicates over peer records of one ledger node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerQuery {
    pub ledger_node_id: LedgerNodeId,
    pub peer_id: Option<IdFilter>,
    pub recommended: Option<bool>,
    pub reputation: Option<RangeFilter<Reputation>>,
    pub sequence: Option<u64>,
    pub backoff_until: Option<RangeFilter<Timestamp>>,
    pub required_block_height: Option<RangeFilter<BlockHeight>>,
    pub consecutive_failures: Option<RangeFilter<u32>>,
    pub updated: Option<RangeFilter<Timestamp>>,
    pub last_push_at: Option<RangeFilter<Timestamp>>,
    pub pulled_after_push: Option<bool>,
}

impl PeerQuery {
    /// Match every peer of `ledger_node_id`
    pub fn for_node(ledger_node_id: impl Into<LedgerNodeId>) -> Self {
        Self {
            ledger_node_id: ledger_node_id.into(),
            peer_id: None,
            recommended: None,
            reputation: None,
            sequence: None,
            backoff_until: None,
            required_block_height: None,
            consecutive_failures: None,
            updated: None,
            last_push_at: None,
            pulled_after_push: None,
        }
    }

    pub fn peer_id(mut self, id: impl Into<PeerId>) -> Self {
        self.peer_id = Some(IdFilter::Eq(id.into()));
        self
    }

    pub fn peer_ids(mut self, ids: Vec<PeerId>) -> Self {
        self.peer_id = Some(IdFilter::In(ids));
        self
    }

    /// The single peer id this query is pinned to, if any
    pub fn single_peer_id(&self) -> Option<&str> {
        match &self.peer_id {
            Some(IdFilter::Eq(id)) => Some(id),
            _ => None,
        }
    }

    pub fn matches(&self, record: &PeerRecord) -> bool {
        let peer = &record.peer;
        let status = &peer.status;

        record.meta.ledger_node_id == self.ledger_node_id
            && self.peer_id.as_ref().map_or(true, |f| f.matches(&peer.id))
            && self.recommended.map_or(true, |r| peer.recommended == r)
            && self.reputation.map_or(true, |f| f.matches(peer.reputation))
            && self.sequence.map_or(true, |s| peer.sequence == s)
            && self.backoff_until.map_or(true, |f| f.matches(status.backoff_until))
            && self
                .required_block_height
                .map_or(true, |f| f.matches(status.required_block_height))
            && self
                .consecutive_failures
                .map_or(true, |f| f.matches(status.consecutive_failures))
            && self.updated.map_or(true, |f| f.matches(record.meta.updated))
            && self.last_push_at.map_or(true, |f| f.matches(status.last_push_at))
            && self
                .pulled_after_push
                .map_or(true, |p| record.meta.pulled_after_push == p)
    }
}

/// Sortable record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Reputation,
    LastPushAt,
    Updated,
    ConsecutiveFailures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Descending,
        }
    }

    fn compare(&self, a: &PeerRecord, b: &PeerRecord) -> Ordering {
        let ordering = match self.field {
            SortField::Reputation => a.peer.reputation.cmp(&b.peer.reputation),
            SortField::LastPushAt => a.peer.status.last_push_at.cmp(&b.peer.status.last_push_at),
            SortField::Updated => a.meta.updated.cmp(&b.meta.updated),
            SortField::ConsecutiveFailures => a
                .peer
                .status
                .consecutive_failures
                .cmp(&b.peer.status.consecutive_failures),
        };

        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Stable sort by `keys`, ties keep natural storage order
pub fn sort_records(records: &mut [PeerRecord], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        keys.iter()
            .map(|key| key.compare(a, b))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// Field-level update applied to every matched record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerUpdate {
    /// Replace the whole `peer` sub-document
    pub set_peer: Option<Peer>,
    pub set_updated: Option<Timestamp>,
    pub set_last_push_at: Option<Timestamp>,
    pub set_url: Option<String>,
    pub set_backoff_until: Option<Timestamp>,
    /// Re-derive `meta.pulledAfterPush` from the updated timestamps
    pub recompute_pulled_after_push: bool,
    /// Explicit flag value, applied after any recompute
    pub set_pulled_after_push: Option<bool>,
    pub inc_sequence: u64,
}

impl PeerUpdate {
    /// Apply to `record`, returning whether anything changed
    pub fn apply(&self, record: &mut PeerRecord) -> bool {
        let before = record.clone();

        if let Some(peer) = &self.set_peer {
            record.peer = peer.clone();
        }
        if let Some(updated) = self.set_updated {
            record.meta.updated = updated;
        }
        if let Some(last_push_at) = self.set_last_push_at {
            record.peer.status.last_push_at = last_push_at;
        }
        if let Some(url) = &self.set_url {
            record.peer.url = Some(url.clone());
        }
        if let Some(backoff_until) = self.set_backoff_until {
            record.peer.status.backoff_until = backoff_until;
        }
        if self.recompute_pulled_after_push {
            record.meta.pulled_after_push = record.peer.pulled_after_push();
        }
        if let Some(flag) = self.set_pulled_after_push {
            record.meta.pulled_after_push = flag;
        }
        record.peer.sequence = record.peer.sequence.wrapping_add(self.inc_sequence);

        *record != before
    }
}

/// Outcome of an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}
