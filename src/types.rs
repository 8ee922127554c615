//! Shared primitive types
//!
//! All timestamps in this crate are Unix epoch milliseconds.

/// Epoch milliseconds
pub type Timestamp = u64;

/// Block height (genesis is 0)
pub type BlockHeight = u64;

/// Identifier of the ledger node that owns a peer list
pub type LedgerNodeId = String;

/// Opaque peer identifier
pub type PeerId = String;

/// Signed peer reputation score
pub type Reputation = i64;
