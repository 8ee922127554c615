// Ledger Peers - admin entry point for a ledger node store

mod cli;

use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ReputationArgs};
use ledger_node_store::blocks::{Block, LedgerNodeBlocks, RocksBlockStore};
use ledger_node_store::config::StoreConfig;
use ledger_node_store::peers::{
    self, GetAllOptions, LastPushUpdate, LedgerNodePeers, LruOptions, PeerInput, ReputationRange,
};
use ledger_node_store::storage::{Database, RocksPeerCollection};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = if cli.config.exists() {
        StoreConfig::load(&cli.config)?
    } else {
        warn!("Config file {:?} not found, using defaults", cli.config);
        StoreConfig::default()
    };
    let config = match cli.data_dir.clone() {
        Some(data_dir) => config.with_data_dir(data_dir),
        None => config,
    };
    config.validate()?;

    std::fs::create_dir_all(&config.data_dir)?;
    let db = Database::open_with(&config.data_dir, &config)?;
    info!("Store opened at {:?}", config.data_dir);

    let collection = Arc::new(RocksPeerCollection::open(db.clone(), peers::COLLECTION_NAME)?);
    if config.ensure_indexes {
        peers::indexes::init(collection.as_ref())?;
    }

    let block_store = Arc::new(RocksBlockStore::new(db));
    let blocks = LedgerNodeBlocks::new(block_store.clone());

    let registry = || -> anyhow::Result<LedgerNodePeers> {
        if cli.ledger_node.is_empty() {
            anyhow::bail!("--ledger-node (or LEDGER_NODE_ID) is required for peer commands");
        }
        Ok(LedgerNodePeers::new(cli.ledger_node.clone(), collection.clone())
            .with_default_lru_limit(config.default_lru_limit))
    };

    match &cli.command {
        Commands::Add(cmd) => {
            let mut input = PeerInput::new(cmd.id.clone()).with_recommended(cmd.recommended);
            if let Some(url) = &cmd.url {
                input = input.with_url(url.clone());
            }
            if let Some(reputation) = cmd.reputation {
                input = input.with_reputation(reputation);
            }
            print_json(&registry()?.add(input)?)
        }
        Commands::Get { id } => print_json(&registry()?.get(id)?),
        Commands::List(cmd) => {
            let options = GetAllOptions {
                reputation: reputation_range(&cmd.reputation),
                backoff_until: cmd.backoff_until,
                max_required_block_height: cmd.max_required_block_height,
                max_consecutive_failures: cmd.max_consecutive_failures,
                sort_reputation: cmd.sort_reputation.into(),
                sort_last_push_at: cmd.sort_last_push_at.map(Into::into),
                limit: cmd.limit,
            };
            let peers = registry()?;
            if cmd.meta {
                print_json(&peers.get_all_records(&options)?)
            } else {
                print_json(&peers.get_all(&options)?)
            }
        }
        Commands::Count(range) => print_json(&registry()?.count(reputation_range(range))?),
        Commands::Recommended => print_json(&registry()?.get_recommended()?),
        Commands::Lru(cmd) => {
            let options = LruOptions {
                reputation: reputation_range(&cmd.reputation),
                max_required_block_height: cmd.max_required_block_height,
                limit: cmd.limit,
                ..Default::default()
            };
            print_json(&registry()?.get_lru(&options)?)
        }
        Commands::Remove { id } => {
            registry()?.remove(id)?;
            print_json(&serde_json::json!({ "removed": id }))
        }
        Commands::MarkUpdated { ids } => {
            let matched = registry()?.mark_updated(ids.iter().cloned())?;
            print_json(&serde_json::json!({ "matched": matched }))
        }
        Commands::Push(cmd) => {
            let mut push = LastPushUpdate::new(cmd.id.clone());
            push.last_push_at = cmd.at;
            push.url = cmd.url.clone();
            push.backoff_until = cmd.backoff_until;
            push.max_updated = cmd.max_updated;
            push.use_pulled_after_push = cmd.use_pulled_after_push;

            let result = registry()?.update_last_push_at(push)?;
            print_json(&serde_json::json!({
                "matched": result.matched,
                "modified": result.modified,
            }))
        }
        Commands::LatestBlock { full } => {
            if *full {
                print_json(&blocks.get_latest()?)
            } else {
                print_json(&blocks.get_latest_summary()?)
            }
        }
        Commands::Block(cmd) => {
            let block = match &cmd.id {
                Some(id) => blocks.get_with_consensus(id, !cmd.any)?,
                None => blocks.get_genesis()?,
            };
            print_json(&block)
        }
        Commands::PutBlock { file } => {
            let content = std::fs::read_to_string(file)?;
            let block: Block = serde_json::from_str(&content)?;
            block_store.put_block(&block)?;
            print_json(&block.summary())
        }
    }
}

fn reputation_range(args: &ReputationArgs) -> ReputationRange {
    ReputationRange {
        min: args.min_reputation,
        max: args.max_reputation,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
