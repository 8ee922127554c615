//! Ledger node peer registry
//!
//! Tracks the peers one ledger node replicates with and answers the
//! selection queries a push/pull scheduler uses to decide whom to contact
//! next. All concurrency control is delegated to the collection: the
//! registry never holds a lock, it only builds predicates and updates.

use std::sync::Arc;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{NotFoundReason, PeerRegistryError, PeerRegistryResult};
use crate::peers::record::{Peer, PeerInput, PeerRecord};
use crate::storage::{
    PeerCollection, PeerQuery, PeerUpdate, RangeFilter, SortDirection, SortField, SortKey,
    UpdateResult,
};
use crate::types::{BlockHeight, LedgerNodeId, PeerId, Reputation, Timestamp};

/// Default number of peers returned by [`LedgerNodePeers::get_lru`]
pub const DEFAULT_LRU_LIMIT: usize = 10;

/// Inclusive reputation bounds; `max: None` means no upper bound
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReputationRange {
    pub min: Reputation,
    pub max: Option<Reputation>,
}

impl ReputationRange {
    pub fn at_least(min: Reputation) -> Self {
        Self { min, max: None }
    }

    pub fn between(min: Reputation, max: Reputation) -> Self {
        Self { min, max: Some(max) }
    }

    fn filter(&self) -> RangeFilter<Reputation> {
        RangeFilter::inclusive(self.min, self.max)
    }
}

/// Filters and ordering for [`LedgerNodePeers::get_all`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAllOptions {
    pub reputation: ReputationRange,
    /// Only peers with `backoffUntil <= value`
    pub backoff_until: Option<Timestamp>,
    pub max_required_block_height: Option<BlockHeight>,
    pub max_consecutive_failures: Option<u32>,
    pub sort_reputation: SortDirection,
    /// Secondary ordering on `lastPushAt`
    pub sort_last_push_at: Option<SortDirection>,
    pub limit: Option<usize>,
}

impl Default for GetAllOptions {
    fn default() -> Self {
        Self {
            reputation: ReputationRange::default(),
            backoff_until: None,
            max_required_block_height: None,
            max_consecutive_failures: None,
            sort_reputation: SortDirection::Descending,
            sort_last_push_at: None,
            limit: None,
        }
    }
}

/// Filters for [`LedgerNodePeers::get_lru`]
///
/// Unset time bounds resolve against the registry clock at call time:
/// `backoffUntil <= now`, `updated` in `(updated_after, now)` and
/// `lastPushAt` in `(pushed_after, now)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LruOptions {
    pub reputation: ReputationRange,
    pub backoff_until: Option<Timestamp>,
    pub max_required_block_height: BlockHeight,
    pub updated_after: Timestamp,
    pub updated_before: Option<Timestamp>,
    pub pushed_after: Timestamp,
    pub pushed_before: Option<Timestamp>,
    pub limit: Option<usize>,
}

/// Incremental push bookkeeping for [`LedgerNodePeers::update_last_push_at`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastPushUpdate {
    pub id: PeerId,
    /// Defaults to now
    pub last_push_at: Option<Timestamp>,
    pub url: Option<String>,
    pub backoff_until: Option<Timestamp>,
    /// Only update if the stored `meta.updated <= max_updated`
    pub max_updated: Option<Timestamp>,
    /// Only update if a pull happened since the last push, clearing the flag
    pub use_pulled_after_push: bool,
}

impl LastPushUpdate {
    pub fn new(id: impl Into<PeerId>) -> Self {
        Self {
            id: id.into(),
            last_push_at: None,
            url: None,
            backoff_until: None,
            max_updated: None,
            use_pulled_after_push: false,
        }
    }

    pub fn at(mut self, last_push_at: Timestamp) -> Self {
        self.last_push_at = Some(last_push_at);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_backoff_until(mut self, backoff_until: Timestamp) -> Self {
        self.backoff_until = Some(backoff_until);
        self
    }

    pub fn with_max_updated(mut self, max_updated: Timestamp) -> Self {
        self.max_updated = Some(max_updated);
        self
    }

    pub fn require_pulled_after_push(mut self) -> Self {
        self.use_pulled_after_push = true;
        self
    }
}

/// Peer registry scoped to one ledger node
pub struct LedgerNodePeers {
    ledger_node_id: LedgerNodeId,
    collection: Arc<dyn PeerCollection>,
    clock: Arc<dyn Clock>,
    default_lru_limit: usize,
}

impl LedgerNodePeers {
    pub fn new(ledger_node_id: impl Into<LedgerNodeId>, collection: Arc<dyn PeerCollection>) -> Self {
        Self {
            ledger_node_id: ledger_node_id.into(),
            collection,
            clock: Arc::new(SystemClock),
            default_lru_limit: DEFAULT_LRU_LIMIT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_default_lru_limit(mut self, limit: usize) -> Self {
        self.default_lru_limit = limit;
        self
    }

    pub fn ledger_node_id(&self) -> &str {
        &self.ledger_node_id
    }

    fn query(&self) -> PeerQuery {
        PeerQuery::for_node(self.ledger_node_id.clone())
    }

    fn missing(&self, peer_id: &str) -> PeerRegistryError {
        PeerRegistryError::NotFound {
            ledger_node_id: self.ledger_node_id.clone(),
            peer_id: peer_id.to_string(),
            reason: NotFoundReason::Missing,
        }
    }

    /// Classify a conditional write that matched nothing
    fn unmatched(&self, peer_id: &str) -> PeerRegistryResult<PeerRegistryError> {
        let exists = self.collection.find_one(&self.query().peer_id(peer_id))?.is_some();
        let reason = if exists {
            NotFoundReason::PreconditionFailed
        } else {
            NotFoundReason::Missing
        };
        Ok(PeerRegistryError::NotFound {
            ledger_node_id: self.ledger_node_id.clone(),
            peer_id: peer_id.to_string(),
            reason,
        })
    }

    /// Insert a new peer, filling unset fields with defaults
    pub fn add(&self, input: PeerInput) -> PeerRegistryResult<PeerRecord> {
        let record = PeerRecord::new(
            self.ledger_node_id.clone(),
            input.into_peer(),
            self.clock.now_ms(),
        );

        if let Err(e) = self.collection.insert_one(&record) {
            if e.is_duplicate() {
                return Err(PeerRegistryError::Duplicate {
                    ledger_node_id: self.ledger_node_id.clone(),
                    peer_id: record.peer.id,
                    source: e,
                });
            }
            return Err(e.into());
        }

        debug!("Added peer {} to ledger node {}", record.peer.id, self.ledger_node_id);
        Ok(record)
    }

    /// Number of peers whose reputation lies in `range`
    pub fn count(&self, range: ReputationRange) -> PeerRegistryResult<u64> {
        let mut query = self.query();
        query.reputation = Some(range.filter());
        Ok(self.collection.count(&query)?)
    }

    pub fn get(&self, id: &str) -> PeerRegistryResult<Peer> {
        self.collection
            .find_one(&self.query().peer_id(id))?
            .map(|record| record.peer)
            .ok_or_else(|| self.missing(id))
    }

    /// Peers matching `options`, highest reputation first by default
    pub fn get_all(&self, options: &GetAllOptions) -> PeerRegistryResult<Vec<Peer>> {
        Ok(self
            .get_all_records(options)?
            .into_iter()
            .map(|record| record.peer)
            .collect())
    }

    /// Same as [`get_all`](Self::get_all) but keeps each record's `meta`
    pub fn get_all_records(&self, options: &GetAllOptions) -> PeerRegistryResult<Vec<PeerRecord>> {
        let mut query = self.query();
        query.reputation = Some(options.reputation.filter());
        query.backoff_until = options.backoff_until.map(RangeFilter::at_most);
        query.required_block_height = options.max_required_block_height.map(RangeFilter::at_most);
        query.consecutive_failures = options.max_consecutive_failures.map(RangeFilter::at_most);

        let mut sort = vec![SortKey {
            field: SortField::Reputation,
            direction: options.sort_reputation,
        }];
        if let Some(direction) = options.sort_last_push_at {
            sort.push(SortKey {
                field: SortField::LastPushAt,
                direction,
            });
        }

        Ok(self.collection.find(&query, &sort, options.limit)?)
    }

    pub fn get_recommended(&self) -> PeerRegistryResult<Vec<Peer>> {
        let mut query = self.query();
        query.recommended = Some(true);
        Ok(self
            .collection
            .find(&query, &[], None)?
            .into_iter()
            .map(|record| record.peer)
            .collect())
    }

    /// Least recently updated peers eligible for contact now
    pub fn get_lru(&self, options: &LruOptions) -> PeerRegistryResult<Vec<Peer>> {
        let now = self.clock.now_ms();

        let mut query = self.query();
        query.reputation = Some(options.reputation.filter());
        query.backoff_until = Some(RangeFilter::at_most(options.backoff_until.unwrap_or(now)));
        query.required_block_height = Some(RangeFilter::at_most(options.max_required_block_height));
        query.updated = Some(RangeFilter::exclusive(
            options.updated_after,
            options.updated_before.unwrap_or(now),
        ));
        query.last_push_at = Some(RangeFilter::exclusive(
            options.pushed_after,
            options.pushed_before.unwrap_or(now),
        ));

        let limit = options.limit.unwrap_or(self.default_lru_limit);
        Ok(self
            .collection
            .find(&query, &[SortKey::asc(SortField::Updated)], Some(limit))?
            .into_iter()
            .map(|record| record.peer)
            .collect())
    }

    /// Permanently delete a peer
    pub fn remove(&self, id: &str) -> PeerRegistryResult<()> {
        let deleted = self.collection.delete_one(&self.query().peer_id(id))?;
        if deleted == 0 {
            return Err(self.missing(id));
        }
        debug!("Removed peer {} from ledger node {}", id, self.ledger_node_id);
        Ok(())
    }

    /// Replace a peer's sub-document
    ///
    /// With `check_sequence`, the stored sequence must equal
    /// `peer.sequence - 1`; a stale sequence is reported as `NotFound`.
    pub fn update(&self, input: PeerInput, check_sequence: bool) -> PeerRegistryResult<UpdateResult> {
        let peer = input.into_peer();
        let peer_id = peer.id.clone();

        let mut query = self.query().peer_id(peer_id.clone());
        if check_sequence {
            match peer.sequence.checked_sub(1) {
                Some(previous) => query.sequence = Some(previous),
                // Sequence 0 has no predecessor
                None => return Err(self.unmatched(&peer_id)?),
            }
        }

        let update = PeerUpdate {
            set_peer: Some(peer),
            set_updated: Some(self.clock.now_ms()),
            recompute_pulled_after_push: true,
            ..Default::default()
        };

        let result = self.collection.update_one(&query, &update)?;
        if result.matched != 1 {
            return Err(self.unmatched(&peer_id)?);
        }

        debug!(
            "Updated peer {} on ledger node {} (check_sequence={})",
            peer_id, self.ledger_node_id, check_sequence
        );
        Ok(result)
    }

    /// Record a push to a peer and bump its sequence
    pub fn update_last_push_at(&self, push: LastPushUpdate) -> PeerRegistryResult<UpdateResult> {
        let now = self.clock.now_ms();

        let mut query = self.query().peer_id(push.id.clone());
        let mut update = PeerUpdate {
            set_updated: Some(now),
            set_last_push_at: Some(push.last_push_at.unwrap_or(now)),
            set_url: push.url,
            set_backoff_until: push.backoff_until,
            inc_sequence: 1,
            ..Default::default()
        };

        if push.use_pulled_after_push {
            query.pulled_after_push = Some(true);
            update.set_pulled_after_push = Some(false);
        } else {
            update.recompute_pulled_after_push = true;
        }
        if let Some(max_updated) = push.max_updated {
            query.updated = Some(RangeFilter::at_most(max_updated));
        }

        let result = self.collection.update_one(&query, &update)?;
        if result.matched != 1 {
            return Err(self.unmatched(&push.id)?);
        }

        debug!("Recorded push to peer {} on ledger node {}", push.id, self.ledger_node_id);
        Ok(result)
    }

    /// Touch `meta.updated` and bump the sequence of every listed peer
    ///
    /// Moves the peers to the back of the LRU order without recording a
    /// push or pull. Unknown ids are ignored.
    pub fn mark_updated<I, S>(&self, ids: I) -> PeerRegistryResult<u64>
    where
        I: IntoIterator<Item = S>,
        S: Into<PeerId>,
    {
        let ids: Vec<PeerId> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let update = PeerUpdate {
            set_updated: Some(self.clock.now_ms()),
            inc_sequence: 1,
            ..Default::default()
        };
        let result = self.collection.update_many(&self.query().peer_ids(ids), &update)?;

        debug!(
            "Marked {} peers updated on ledger node {}",
            result.matched, self.ledger_node_id
        );
        Ok(result.matched)
    }
}
