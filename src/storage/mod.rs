// Storage - persistence engines behind the peer registry and block reader
//
// The registry only speaks `PeerCollection`; the block reader only speaks
// `BlockStorage`. Concrete engines take an injected `Database` handle.

pub mod db;
pub mod index;
pub mod memory;
pub mod query;
pub mod rocks;

pub use db::{Database, StorageError, WriteOp};
pub use index::{IndexDirection, IndexField, IndexKey, IndexSpec, IndexValue, PartialFilter};
pub use memory::MemoryPeerCollection;
pub use query::{
    IdFilter, PeerQuery, PeerUpdate, RangeFilter, SortDirection, SortField, SortKey, UpdateResult,
};
pub use rocks::RocksPeerCollection;

use crate::peers::record::PeerRecord;

/// Document collection holding peer records
///
/// Every mutation is atomic per document. Conditional updates are
/// evaluated by the engine so callers never read-modify-write.
pub trait PeerCollection: Send + Sync {
    /// Declare indexes; already-declared identical indexes are a no-op
    fn create_indexes(&self, indexes: &[IndexSpec]) -> Result<(), StorageError>;

    /// Insert a new record, failing with `DuplicateKey` on a unique violation
    fn insert_one(&self, record: &PeerRecord) -> Result<(), StorageError>;

    /// First record matching `query` in natural order
    fn find_one(&self, query: &PeerQuery) -> Result<Option<PeerRecord>, StorageError>;

    /// All records matching `query`, sorted by `sort` and capped at `limit`
    fn find(
        &self,
        query: &PeerQuery,
        sort: &[SortKey],
        limit: Option<usize>,
    ) -> Result<Vec<PeerRecord>, StorageError>;

    fn count(&self, query: &PeerQuery) -> Result<u64, StorageError>;

    /// Update the first matching record
    fn update_one(&self, query: &PeerQuery, update: &PeerUpdate) -> Result<UpdateResult, StorageError>;

    /// Update every matching record
    fn update_many(&self, query: &PeerQuery, update: &PeerUpdate) -> Result<UpdateResult, StorageError>;

    /// Delete the first matching record, returning the number deleted
    fn delete_one(&self, query: &PeerQuery) -> Result<u64, StorageError>;
}

/// Natural key of a record: (ledger node, peer id)
pub(crate) fn natural_key(record: &PeerRecord) -> (String, String) {
    (record.meta.ledger_node_id.clone(), record.peer.id.clone())
}
