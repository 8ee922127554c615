//! Ledger Node Store
//!
//! Data-access layer of a distributed-ledger node:
//!
//! - [`peers::LedgerNodePeers`]: per-node registry of replication peers with
//!   reputation, backoff and push/pull bookkeeping, backed by a
//!   [`storage::PeerCollection`]
//! - [`blocks::LedgerNodeBlocks`]: read API over the node's block storage
//!
//! Both take their storage by injection; [`storage::Database`] opens the
//! RocksDB handle that the concrete engines share.

pub mod blocks;
pub mod clock;
pub mod config;
pub mod error;
pub mod peers;
pub mod storage;
pub mod types;

#[cfg(test)]
mod tests;

pub use blocks::{Block, BlockStorage, BlockSummary, LedgerNodeBlocks, RocksBlockStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use error::{BlockError, ErrorKind, NotFoundReason, PeerRegistryError};
pub use peers::{LedgerNodePeers, Peer, PeerInput, PeerRecord};
pub use storage::{Database, MemoryPeerCollection, PeerCollection, RocksPeerCollection};
