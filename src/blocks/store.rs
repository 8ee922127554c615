// Block Store - RocksDB block storage (by id, summary, by height, best height)
use tracing::debug;

use super::reader::BlockStorage;
use super::types::{Block, BlockSummary};
use crate::error::{BlockError, BlockResult};
use crate::storage::{Database, StorageError, WriteOp};
use crate::types::BlockHeight;

/// Storage key prefixes
const PREFIX_BLOCK_BY_ID: &[u8] = b"block_by_id:";
const PREFIX_BLOCK_BY_HEIGHT: &[u8] = b"block_by_height:";
const PREFIX_BLOCK_SUMMARY: &[u8] = b"block_summary:";
const KEY_BEST_HEIGHT: &[u8] = b"block_best_height";

/// Block storage backed by RocksDB
///
/// Every block is reachable by id, with its event-free summary stored
/// alongside. Only consensus blocks are indexed by height and can become
/// the latest block.
pub struct RocksBlockStore {
    db: Database,
}

impl RocksBlockStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store a block; consensus blocks also advance the best height
    pub fn put_block(&self, block: &Block) -> BlockResult<()> {
        let data = serde_json::to_vec(block).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let summary = serde_json::to_vec(&block.summary())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut ops = vec![
            WriteOp::Put {
                key: Self::block_by_id_key(&block.id),
                value: data,
            },
            WriteOp::Put {
                key: Self::block_summary_key(&block.id),
                value: summary,
            },
        ];

        if block.consensus {
            ops.push(WriteOp::Put {
                key: Self::block_by_height_key(block.block_height),
                value: block.id.as_bytes().to_vec(),
            });

            let best = self.best_height()?;
            if best.map_or(true, |best| block.block_height > best) {
                ops.push(WriteOp::Put {
                    key: KEY_BEST_HEIGHT.to_vec(),
                    value: block.block_height.to_be_bytes().to_vec(),
                });
            }
        }

        self.db.batch_write(ops)?;
        debug!(
            "Stored block {} at height {} (consensus={})",
            block.id, block.block_height, block.consensus
        );
        Ok(())
    }

    fn best_height(&self) -> BlockResult<Option<BlockHeight>> {
        match self.db.get(KEY_BEST_HEIGHT)? {
            Some(data) if data.len() == 8 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&data);
                Ok(Some(BlockHeight::from_be_bytes(bytes)))
            }
            Some(_) => Err(StorageError::Deserialization("invalid best block height".to_string()).into()),
            None => Ok(None),
        }
    }

    fn block_by_id(&self, block_id: &str) -> BlockResult<Option<Block>> {
        match self.db.get(&Self::block_by_id_key(block_id))? {
            Some(data) => {
                let block = serde_json::from_slice(&data)
                    .map_err(|e| StorageError::Deserialization(e.to_string()))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    fn summary_by_id(&self, block_id: &str) -> BlockResult<Option<BlockSummary>> {
        match self.db.get(&Self::block_summary_key(block_id))? {
            Some(data) => {
                let summary = serde_json::from_slice(&data)
                    .map_err(|e| StorageError::Deserialization(e.to_string()))?;
                Ok(Some(summary))
            }
            // Written before summaries were stored
            None => Ok(self.block_by_id(block_id)?.map(|block| block.summary())),
        }
    }

    fn block_id_at_height(&self, height: BlockHeight) -> BlockResult<Option<String>> {
        match self.db.get(&Self::block_by_height_key(height))? {
            Some(id) => {
                let block_id = String::from_utf8(id)
                    .map_err(|e| StorageError::Deserialization(e.to_string()))?;
                Ok(Some(block_id))
            }
            None => Ok(None),
        }
    }

    fn block_at_height(&self, height: BlockHeight) -> BlockResult<Option<Block>> {
        match self.block_id_at_height(height)? {
            Some(block_id) => self.block_by_id(&block_id),
            None => Ok(None),
        }
    }

    fn block_by_id_key(block_id: &str) -> Vec<u8> {
        let mut key = PREFIX_BLOCK_BY_ID.to_vec();
        key.extend_from_slice(block_id.as_bytes());
        key
    }

    fn block_summary_key(block_id: &str) -> Vec<u8> {
        let mut key = PREFIX_BLOCK_SUMMARY.to_vec();
        key.extend_from_slice(block_id.as_bytes());
        key
    }

    fn block_by_height_key(height: BlockHeight) -> Vec<u8> {
        let mut key = PREFIX_BLOCK_BY_HEIGHT.to_vec();
        key.extend_from_slice(&height.to_be_bytes());
        key
    }
}

impl BlockStorage for RocksBlockStore {
    fn get(&self, block_id: &str, consensus: bool) -> BlockResult<Block> {
        match self.block_by_id(block_id)? {
            Some(block) if block.consensus || !consensus => Ok(block),
            _ => Err(BlockError::NotFound {
                block_id: block_id.to_string(),
            }),
        }
    }

    fn get_genesis(&self) -> BlockResult<Block> {
        self.block_at_height(0)?.ok_or(BlockError::NoBlocks)
    }

    fn get_latest(&self) -> BlockResult<Block> {
        let height = self.get_latest_block_height()?;
        self.block_at_height(height)?.ok_or(BlockError::NoBlocks)
    }

    fn get_latest_block_height(&self) -> BlockResult<BlockHeight> {
        self.best_height()?.ok_or(BlockError::NoBlocks)
    }

    fn get_latest_summary(&self) -> BlockResult<BlockSummary> {
        let height = self.get_latest_block_height()?;
        match self.block_id_at_height(height)? {
            Some(block_id) => self.summary_by_id(&block_id)?.ok_or(BlockError::NoBlocks),
            None => Err(BlockError::NoBlocks),
        }
    }
}
