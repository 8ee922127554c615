// Block - read model for blocks owned by the external block storage
use serde::{Deserialize, Serialize};

use crate::types::{BlockHeight, Timestamp};

/// Full block including its events and their operations
///
/// Events are opaque JSON-LD documents; this layer never inspects them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block URI
    pub id: String,

    pub block_height: BlockHeight,

    pub previous_block_hash: Option<String>,

    /// Finalized by consensus, as opposed to provisional
    pub consensus: bool,

    pub consensus_date: Option<Timestamp>,

    #[serde(default)]
    pub events: Vec<serde_json::Value>,
}

impl Block {
    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            id: self.id.clone(),
            block_height: self.block_height,
            previous_block_hash: self.previous_block_hash.clone(),
            consensus: self.consensus,
            consensus_date: self.consensus_date,
            event_count: self.events.len(),
        }
    }
}

/// Block metadata without event bodies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub id: String,
    pub block_height: BlockHeight,
    pub previous_block_hash: Option<String>,
    pub consensus: bool,
    pub consensus_date: Option<Timestamp>,
    pub event_count: usize,
}
