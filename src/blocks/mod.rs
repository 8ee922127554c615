//! Block read API of a ledger node

pub mod reader;
pub mod store;
pub mod types;

pub use reader::{BlockStorage, LedgerNodeBlocks};
pub use store::RocksBlockStore;
pub use types::{Block, BlockSummary};
