//! Peer collection name and index contract
//!
//! Query performance of the registry depends on these indexes; call
//! [`init`] once at startup before serving registry operations.

use tracing::info;

use crate::storage::{IndexField, IndexKey, IndexSpec, PartialFilter, PeerCollection, StorageError};

pub const COLLECTION_NAME: &str = "ledgerNode_peer";

/// The four indexes the registry relies on
pub fn peer_indexes() -> Vec<IndexSpec> {
    vec![
        // One record per (ledger node, peer id)
        IndexSpec::new(
            format!("{}.peerId", COLLECTION_NAME),
            vec![
                IndexKey::asc(IndexField::LedgerNodeId),
                IndexKey::asc(IndexField::PeerId),
            ],
        )
        .unique(),
        // getAll / getLRU
        IndexSpec::new(
            format!("{}.reputation", COLLECTION_NAME),
            vec![
                IndexKey::asc(IndexField::LedgerNodeId),
                IndexKey::desc(IndexField::Reputation),
                IndexKey::asc(IndexField::BackoffUntil),
                IndexKey::asc(IndexField::RequiredBlockHeight),
                IndexKey::asc(IndexField::Updated),
                IndexKey::desc(IndexField::LastPushAt),
                IndexKey::asc(IndexField::ConsecutiveFailures),
            ],
        ),
        // Failure-biased selection
        IndexSpec::new(
            format!("{}.failures", COLLECTION_NAME),
            vec![
                IndexKey::asc(IndexField::LedgerNodeId),
                IndexKey::asc(IndexField::ConsecutiveFailures),
                IndexKey::desc(IndexField::Reputation),
                IndexKey::asc(IndexField::BackoffUntil),
                IndexKey::asc(IndexField::RequiredBlockHeight),
                IndexKey::asc(IndexField::Updated),
                IndexKey::desc(IndexField::LastPushAt),
            ],
        ),
        // Push updates conditioned on a pull since the last push
        IndexSpec::new(
            format!("{}.pushUpdates", COLLECTION_NAME),
            vec![
                IndexKey::asc(IndexField::LedgerNodeId),
                IndexKey::asc(IndexField::PeerId),
                IndexKey::asc(IndexField::PulledAfterPush),
            ],
        )
        .partial(PartialFilter::PulledAfterPush(true)),
    ]
}

/// Ensure the peer indexes exist on `collection`
pub fn init(collection: &dyn PeerCollection) -> Result<(), StorageError> {
    let indexes = peer_indexes();
    collection.create_indexes(&indexes)?;
    info!("Peer indexes ready ({} declared)", indexes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryPeerCollection;

    #[test]
    fn test_index_contract() {
        let indexes = peer_indexes();
        assert_eq!(indexes.len(), 4);
        assert!(indexes[0].unique);
        assert_eq!(indexes[0].describe(), "meta.ledgerNodeId:1,peer.id:1");
        assert_eq!(indexes[2].keys[1].field, IndexField::ConsecutiveFailures);
        assert_eq!(indexes[3].partial, Some(PartialFilter::PulledAfterPush(true)));
    }

    #[test]
    fn test_init_is_idempotent() {
        let collection = MemoryPeerCollection::new();
        init(&collection).unwrap();
        init(&collection).unwrap();
        assert_eq!(collection.indexes().len(), 4);
    }
}
