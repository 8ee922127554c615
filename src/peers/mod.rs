//! Peer Registry Module
//!
//! Stores one record per (ledger node, peer) and answers the selection
//! queries used by a push/pull replication scheduler.

pub mod indexes;
pub mod record;
mod registry;

pub use indexes::{peer_indexes, COLLECTION_NAME};
pub use record::{Peer, PeerInput, PeerMeta, PeerRecord, PeerStatus, PeerStatusInput};
pub use registry::{
    GetAllOptions, LastPushUpdate, LedgerNodePeers, LruOptions, ReputationRange, DEFAULT_LRU_LIMIT,
};
