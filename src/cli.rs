// CLI - admin commands over one ledger node's peer registry and blocks

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use ledger_node_store::storage::SortDirection;
use ledger_node_store::types::{BlockHeight, Reputation, Timestamp};

/// Inspect and maintain the peer registry of a ledger node
#[derive(Parser, Debug)]
#[command(name = "ledger-peers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Peer registry and block inspection for a ledger node")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "ledger-store.toml")]
    pub config: PathBuf,

    /// Database directory (overrides the config file)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Ledger node whose peers are addressed
    #[arg(short, long, global = true, env = "LEDGER_NODE_ID", default_value = "")]
    pub ledger_node: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a new peer
    Add(AddCmd),

    /// Show one peer
    Get {
        id: String,
    },

    /// List peers, highest reputation first
    List(ListCmd),

    /// Count peers within a reputation range
    Count(ReputationArgs),

    /// List recommended peers
    Recommended,

    /// Least recently updated peers eligible for contact now
    Lru(LruCmd),

    /// Delete a peer
    Remove {
        id: String,
    },

    /// Touch peers so they rotate to the back of the LRU order
    MarkUpdated {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Record a push to a peer
    Push(PushCmd),

    /// Show the latest consensus block summary
    LatestBlock {
        /// Include events
        #[arg(long)]
        full: bool,
    },

    /// Show a block by id, or the genesis block
    Block(BlockCmd),

    /// Store a block from a JSON file
    PutBlock {
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct ReputationArgs {
    /// Minimum reputation (inclusive)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub min_reputation: Reputation,

    /// Maximum reputation (inclusive); unbounded when omitted
    #[arg(long, allow_hyphen_values = true)]
    pub max_reputation: Option<Reputation>,
}

#[derive(Args, Debug)]
pub struct AddCmd {
    pub id: String,

    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub recommended: bool,

    #[arg(long, allow_hyphen_values = true)]
    pub reputation: Option<Reputation>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Direction {
    Asc,
    Desc,
}

impl From<Direction> for SortDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Asc => SortDirection::Ascending,
            Direction::Desc => SortDirection::Descending,
        }
    }
}

#[derive(Args, Debug)]
pub struct ListCmd {
    #[command(flatten)]
    pub reputation: ReputationArgs,

    /// Only peers whose backoff ends at or before this time (epoch ms)
    #[arg(long)]
    pub backoff_until: Option<Timestamp>,

    #[arg(long)]
    pub max_required_block_height: Option<BlockHeight>,

    #[arg(long)]
    pub max_consecutive_failures: Option<u32>,

    #[arg(long, value_enum, default_value = "desc")]
    pub sort_reputation: Direction,

    #[arg(long, value_enum)]
    pub sort_last_push_at: Option<Direction>,

    #[arg(long)]
    pub limit: Option<usize>,

    /// Include record metadata
    #[arg(long)]
    pub meta: bool,
}

#[derive(Args, Debug)]
pub struct LruCmd {
    #[command(flatten)]
    pub reputation: ReputationArgs,

    #[arg(long, default_value = "0")]
    pub max_required_block_height: BlockHeight,

    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct PushCmd {
    pub id: String,

    /// Push time (epoch ms); defaults to now
    #[arg(long)]
    pub at: Option<Timestamp>,

    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub backoff_until: Option<Timestamp>,

    /// Only record if the peer was not updated after this time
    #[arg(long)]
    pub max_updated: Option<Timestamp>,

    /// Only record if a pull happened since the last push
    #[arg(long)]
    pub use_pulled_after_push: bool,
}

#[derive(Args, Debug)]
pub struct BlockCmd {
    /// Block id; omit with --genesis
    #[arg(required_unless_present = "genesis")]
    pub id: Option<String>,

    #[arg(long, conflicts_with = "id")]
    pub genesis: bool,

    /// Also match blocks not yet finalized by consensus
    #[arg(long)]
    pub any: bool,
}
