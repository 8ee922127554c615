// Block reads through LedgerNodeBlocks over the RocksDB block store

#[cfg(test)]
mod block_tests {
    use std::sync::Arc;
    use tempfile::tempdir;

    use crate::blocks::{Block, BlockStorage, BlockSummary, LedgerNodeBlocks, RocksBlockStore};
    use crate::error::{BlockError, BlockResult, ErrorKind};
    use crate::storage::{Database, StorageError};
    use crate::types::BlockHeight;

    fn block(height: BlockHeight, consensus: bool) -> Block {
        Block {
            id: format!("urn:uuid:block-{}", height),
            block_height: height,
            previous_block_hash: None,
            consensus,
            consensus_date: None,
            events: vec![
                serde_json::json!({"type": "WebLedgerOperationEvent", "operation": [{"type": "CreateWebLedgerRecord"}]}),
                serde_json::json!({"type": "ContinuityMergeEvent"}),
            ],
        }
    }

    #[test]
    fn test_reader_over_rocks_store() {
        let dir = tempdir().unwrap();
        let store = Arc::new(RocksBlockStore::new(Database::open(dir.path()).unwrap()));
        for height in 0..3 {
            store.put_block(&block(height, true)).unwrap();
        }
        store.put_block(&block(3, false)).unwrap();

        let blocks = LedgerNodeBlocks::new(store);

        assert_eq!(blocks.get_genesis().unwrap().id, "urn:uuid:block-0");
        assert_eq!(blocks.get_latest_block_height().unwrap(), 2);

        let latest = blocks.get_latest().unwrap();
        assert_eq!(latest.events.len(), 2);
        assert_eq!(blocks.get_latest_summary().unwrap(), latest.summary());

        assert_eq!(blocks.get("urn:uuid:block-1").unwrap().block_height, 1);
        let err = blocks.get("urn:uuid:block-3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(blocks.get_with_consensus("urn:uuid:block-3", false).is_ok());
    }

    #[test]
    fn test_blocks_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksBlockStore::new(Database::open(dir.path()).unwrap());
            store.put_block(&block(0, true)).unwrap();
        }
        let blocks = LedgerNodeBlocks::new(Arc::new(RocksBlockStore::new(
            Database::open(dir.path()).unwrap(),
        )));
        assert_eq!(blocks.get_latest_block_height().unwrap(), 0);
    }

    /// Storage that always fails, to observe pass-through errors
    struct FailingStorage;

    impl BlockStorage for FailingStorage {
        fn get(&self, _block_id: &str, _consensus: bool) -> BlockResult<Block> {
            Err(StorageError::ReadFailed("disk unavailable".into()).into())
        }

        fn get_genesis(&self) -> BlockResult<Block> {
            Err(BlockError::NoBlocks)
        }

        fn get_latest(&self) -> BlockResult<Block> {
            Err(BlockError::NoBlocks)
        }

        fn get_latest_block_height(&self) -> BlockResult<BlockHeight> {
            Err(StorageError::ReadFailed("disk unavailable".into()).into())
        }

        fn get_latest_summary(&self) -> BlockResult<BlockSummary> {
            Err(BlockError::NoBlocks)
        }
    }

    #[test]
    fn test_storage_errors_pass_through() {
        let blocks = LedgerNodeBlocks::new(Arc::new(FailingStorage));

        assert!(matches!(blocks.get("any"), Err(BlockError::Storage(_))));
        assert_eq!(blocks.get_latest_block_height().unwrap_err().kind(), ErrorKind::Storage);
        assert!(matches!(blocks.get_latest(), Err(BlockError::NoBlocks)));
    }
}
