//! Peer record schema
//!
//! A [`PeerRecord`] is stored once per (ledger node, peer id) pair. The
//! `peer` sub-document is what callers read and write; `meta` is owned by
//! the registry.

use serde::{Deserialize, Serialize};

use crate::types::{BlockHeight, LedgerNodeId, PeerId, Reputation, Timestamp};

/// Replication status of a peer, all zero for a fresh peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerStatus {
    /// Do not contact the peer before this time
    pub backoff_until: Timestamp,

    pub consecutive_failures: u32,

    /// Last successful pull from the peer
    pub last_pull_at: Timestamp,

    /// Last successful push to the peer
    pub last_push_at: Timestamp,

    /// Minimum block height required before the peer is selected
    pub required_block_height: BlockHeight,
}

/// Peer sub-document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub id: PeerId,
    pub url: Option<String>,
    pub recommended: bool,
    pub reputation: Reputation,

    /// Version counter for sequence-checked updates
    pub sequence: u64,

    pub status: PeerStatus,
}

impl Peer {
    /// A peer with every field at its default
    pub fn new(id: impl Into<PeerId>) -> Self {
        Self {
            id: id.into(),
            url: None,
            recommended: false,
            reputation: 0,
            sequence: 0,
            status: PeerStatus::default(),
        }
    }

    /// Whether a pull happened after the last push
    pub fn pulled_after_push(&self) -> bool {
        self.status.last_pull_at > self.status.last_push_at
    }
}

/// Registry-owned bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMeta {
    pub ledger_node_id: LedgerNodeId,
    pub created: Timestamp,
    pub updated: Timestamp,

    /// `lastPullAt > lastPushAt` as of the last write that set either field
    pub pulled_after_push: bool,
}

/// Stored document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub meta: PeerMeta,
    pub peer: Peer,
}

impl PeerRecord {
    /// Build a fresh record stamped at `now`
    pub fn new(ledger_node_id: impl Into<LedgerNodeId>, peer: Peer, now: Timestamp) -> Self {
        Self {
            meta: PeerMeta {
                ledger_node_id: ledger_node_id.into(),
                created: now,
                updated: now,
                pulled_after_push: peer.pulled_after_push(),
            },
            peer,
        }
    }
}

/// Caller-supplied status fields; `None` keeps the default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerStatusInput {
    pub backoff_until: Option<Timestamp>,
    pub consecutive_failures: Option<u32>,
    pub last_pull_at: Option<Timestamp>,
    pub last_push_at: Option<Timestamp>,
    pub required_block_height: Option<BlockHeight>,
}

impl PeerStatusInput {
    /// Overlay the supplied fields onto `base`
    pub fn overlay(self, base: PeerStatus) -> PeerStatus {
        PeerStatus {
            backoff_until: self.backoff_until.unwrap_or(base.backoff_until),
            consecutive_failures: self.consecutive_failures.unwrap_or(base.consecutive_failures),
            last_pull_at: self.last_pull_at.unwrap_or(base.last_pull_at),
            last_push_at: self.last_push_at.unwrap_or(base.last_push_at),
            required_block_height: self.required_block_height.unwrap_or(base.required_block_height),
        }
    }
}

impl From<PeerStatus> for PeerStatusInput {
    fn from(status: PeerStatus) -> Self {
        Self {
            backoff_until: Some(status.backoff_until),
            consecutive_failures: Some(status.consecutive_failures),
            last_pull_at: Some(status.last_pull_at),
            last_push_at: Some(status.last_push_at),
            required_block_height: Some(status.required_block_height),
        }
    }
}

/// Caller-supplied peer for `add` and `update`
///
/// Unset fields take the documented defaults: not recommended, reputation
/// 0, sequence 0 and an all-zero status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerInput {
    pub id: PeerId,
    pub url: Option<String>,
    pub recommended: Option<bool>,
    pub reputation: Option<Reputation>,
    pub sequence: Option<u64>,
    pub status: Option<PeerStatusInput>,
}

impl PeerInput {
    pub fn new(id: impl Into<PeerId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_recommended(mut self, recommended: bool) -> Self {
        self.recommended = Some(recommended);
        self
    }

    pub fn with_reputation(mut self, reputation: Reputation) -> Self {
        self.reputation = Some(reputation);
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_status(mut self, status: PeerStatusInput) -> Self {
        self.status = Some(status);
        self
    }

    /// Resolve into a full peer, layering supplied fields over defaults
    pub fn into_peer(self) -> Peer {
        let base = Peer::new(self.id);
        let status = self.status.unwrap_or_default().overlay(base.status);

        Peer {
            id: base.id,
            url: self.url.or(base.url),
            recommended: self.recommended.unwrap_or(base.recommended),
            reputation: self.reputation.unwrap_or(base.reputation),
            sequence: self.sequence.unwrap_or(base.sequence),
            status,
        }
    }
}

impl From<Peer> for PeerInput {
    fn from(peer: Peer) -> Self {
        Self {
            id: peer.id,
            url: peer.url,
            recommended: Some(peer.recommended),
            reputation: Some(peer.reputation),
            sequence: Some(peer.sequence),
            status: Some(peer.status.into()),
        }
    }
}
