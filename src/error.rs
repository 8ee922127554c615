//! Error types raised by the registry and block reader

use thiserror::Error;

use crate::storage::StorageError;
use crate::types::{LedgerNodeId, PeerId};

/// Coarse error category, stable across internal refinements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Duplicate,
    NotFound,
    Storage,
}

impl ErrorKind {
    /// HTTP status an API layer should map this kind to
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Duplicate => 409,
            ErrorKind::NotFound => 404,
            ErrorKind::Storage => 500,
        }
    }
}

/// Why a write matched no peer
///
/// Every variant surfaces as [`ErrorKind::NotFound`]; the reason only aids
/// diagnosis and is determined by a follow-up read, so it may already be
/// out of date when observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// No record exists for the peer id
    Missing,
    /// The record exists but a sequence, `maxUpdated` or `pulledAfterPush`
    /// precondition did not hold
    PreconditionFailed,
}

#[derive(Debug, Error)]
pub enum PeerRegistryError {
    #[error("Duplicate peer {peer_id} for ledger node {ledger_node_id}")]
    Duplicate {
        ledger_node_id: LedgerNodeId,
        peer_id: PeerId,
        #[source]
        source: StorageError,
    },

    #[error("Peer {peer_id} not found for ledger node {ledger_node_id} ({reason:?})")]
    NotFound {
        ledger_node_id: LedgerNodeId,
        peer_id: PeerId,
        reason: NotFoundReason,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PeerRegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PeerRegistryError::Duplicate { .. } => ErrorKind::Duplicate,
            PeerRegistryError::NotFound { .. } => ErrorKind::NotFound,
            PeerRegistryError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_duplicate(&self) -> bool {
        self.kind() == ErrorKind::Duplicate
    }
}

pub type PeerRegistryResult<T> = Result<T, PeerRegistryError>;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Block not found: {block_id}")]
    NotFound { block_id: String },

    #[error("Ledger has no blocks")]
    NoBlocks,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl BlockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BlockError::NotFound { .. } | BlockError::NoBlocks => ErrorKind::NotFound,
            BlockError::Storage(_) => ErrorKind::Storage,
        }
    }
}

pub type BlockResult<T> = Result<T, BlockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_status_codes() {
        let dup = PeerRegistryError::Duplicate {
            ledger_node_id: "n".into(),
            peer_id: "p".into(),
            source: StorageError::DuplicateKey {
                index: "primary".into(),
            },
        };
        assert_eq!(dup.kind(), ErrorKind::Duplicate);
        assert_eq!(dup.http_status(), 409);

        let missing = PeerRegistryError::NotFound {
            ledger_node_id: "n".into(),
            peer_id: "p".into(),
            reason: NotFoundReason::PreconditionFailed,
        };
        assert!(missing.is_not_found());
        assert_eq!(missing.http_status(), 404);
        assert!(missing.to_string().contains("Peer p not found"));

        let storage: PeerRegistryError = StorageError::ReadFailed("io".into()).into();
        assert_eq!(storage.http_status(), 500);
    }

    #[test]
    fn test_block_error_kind() {
        assert_eq!(BlockError::NoBlocks.kind(), ErrorKind::NotFound);
        assert_eq!(
            BlockError::NotFound {
                block_id: "urn:block:1".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
    }
}
