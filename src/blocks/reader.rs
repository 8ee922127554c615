//! Ledger node block reader
//!
//! Pure delegation to the block storage: no retries, no caching, errors
//! surface exactly as the storage raised them.

use std::sync::Arc;

use super::types::{Block, BlockSummary};
use crate::error::BlockResult;
use crate::types::BlockHeight;

/// Block storage consumed by [`LedgerNodeBlocks`]
pub trait BlockStorage: Send + Sync {
    /// Block by id; with `consensus` only finalized blocks match
    fn get(&self, block_id: &str, consensus: bool) -> BlockResult<Block>;

    /// Block at height 0
    fn get_genesis(&self) -> BlockResult<Block>;

    /// Highest consensus block with its events
    fn get_latest(&self) -> BlockResult<Block>;

    fn get_latest_block_height(&self) -> BlockResult<BlockHeight>;

    /// Highest consensus block without events
    fn get_latest_summary(&self) -> BlockResult<BlockSummary>;
}

/// Block API of one ledger node
pub struct LedgerNodeBlocks {
    storage: Arc<dyn BlockStorage>,
}

impl LedgerNodeBlocks {
    pub fn new(storage: Arc<dyn BlockStorage>) -> Self {
        Self { storage }
    }

    /// Consensus block by id
    pub fn get(&self, block_id: &str) -> BlockResult<Block> {
        self.storage.get(block_id, true)
    }

    /// Block by id, optionally allowing a non-consensus block
    pub fn get_with_consensus(&self, block_id: &str, consensus: bool) -> BlockResult<Block> {
        self.storage.get(block_id, consensus)
    }

    pub fn get_genesis(&self) -> BlockResult<Block> {
        self.storage.get_genesis()
    }

    pub fn get_latest(&self) -> BlockResult<Block> {
        self.storage.get_latest()
    }

    pub fn get_latest_block_height(&self) -> BlockResult<BlockHeight> {
        self.storage.get_latest_block_height()
    }

    pub fn get_latest_summary(&self) -> BlockResult<BlockSummary> {
        self.storage.get_latest_summary()
    }
}
