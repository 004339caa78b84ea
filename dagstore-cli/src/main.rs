use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dagstore_core::config::Config;
use dagstore_core::logging::init_logging_with_config;
use dagstore_core::{Cursor, DagStore, QueryPage};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "dagstore")]
#[command(author, version, about = "Inspect and maintain a message DAG store", long_about = None)]
struct Args {
    /// Database file (overrides the configured store path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML configuration file; `DAGSTORE_*` environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List channels with their message and leaf counts
    Channels,

    /// Print the current leaves of a channel
    Leaves {
        /// Channel id (hex)
        channel: String,
    },

    /// Print one query page
    Page {
        /// Channel id (hex)
        channel: String,

        /// Start at this height (forward only)
        #[arg(long, conflicts_with = "hash", required_unless_present = "hash")]
        height: Option<u64>,

        /// Start at this message hash (hex)
        #[arg(long)]
        hash: Option<String>,

        /// Page toward older messages
        #[arg(long)]
        backward: bool,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Print a window of hashes by offset
    Window {
        /// Channel id (hex)
        channel: String,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Walk from the newest message
        #[arg(long)]
        reverse: bool,
    },

    /// List entity ids under a prefix
    Entities {
        prefix: String,
    },

    /// Remove every message of a channel
    Purge {
        /// Channel id (hex)
        channel: String,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::from_env().context("Invalid DAGSTORE_* environment")?,
    };

    if let Some(db) = &args.db {
        config.store.path = Some(db.clone());
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    config.validate()?;
    Ok(config)
}

fn decode_hex(label: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).with_context(|| format!("{} '{}' is not valid hex", label, value))
}

fn page_json(page: &QueryPage) -> Value {
    json!({
        "messages": page.messages.iter().map(|m| json!({
            "hash": hex::encode(&m.hash),
            "parents": m.parents.iter().map(hex::encode).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
        "backward_hash": page.backward_hash.as_ref().map(hex::encode),
        "forward_hash": page.forward_hash.as_ref().map(hex::encode),
    })
}

async fn run(store: &DagStore, command: Command) -> Result<Value> {
    let output = match command {
        Command::Channels => {
            let mut channels = Vec::new();
            for channel in store.get_channel_ids().await? {
                let messages = store.get_message_count(&channel).await?;
                let leaves = store.get_leaf_hashes(&channel).await?.len();
                channels.push(json!({
                    "channel": hex::encode(&channel),
                    "messages": messages,
                    "leaves": leaves,
                }));
            }
            json!({ "channels": channels })
        }
        Command::Leaves { channel } => {
            let channel = decode_hex("channel", &channel)?;
            let leaves = store.get_leaf_hashes(&channel).await?;
            json!({ "leaves": leaves.iter().map(hex::encode).collect::<Vec<_>>() })
        }
        Command::Page { channel, height, hash, backward, limit } => {
            let channel = decode_hex("channel", &channel)?;
            let cursor = match (height, hash) {
                (_, Some(hash)) => Cursor::Hash(decode_hex("hash", &hash)?),
                (Some(height), None) => Cursor::Height(height),
                (None, None) => bail!("either --height or --hash is required"),
            };
            let page = store.query(&channel, cursor, backward, limit).await?;
            page_json(&page)
        }
        Command::Window { channel, offset, limit, reverse } => {
            let channel = decode_hex("channel", &channel)?;
            let hashes = if reverse {
                store.get_reverse_hashes_at_offset(&channel, offset, limit).await?
            } else {
                store.get_hashes_at_offset(&channel, offset, limit).await?
            };
            json!({ "hashes": hashes.iter().map(hex::encode).collect::<Vec<_>>() })
        }
        Command::Entities { prefix } => {
            let ids = store.get_entity_keys(&prefix).await?;
            let total = store.get_entity_count().await?;
            json!({ "prefix": prefix, "ids": ids, "total": total })
        }
        Command::Purge { channel } => {
            let channel_id = decode_hex("channel", &channel)?;
            let before = store.get_message_count(&channel_id).await?;
            store.remove_channel_messages(&channel_id).await?;
            json!({ "channel": channel, "removed": before })
        }
    };

    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(config.logging.to_log_config()?)?;

    let Some(path) = config.store.path.clone() else {
        bail!("No database path: pass --db or set store.path / DAGSTORE_STORE_PATH");
    };

    debug!(path = %path.display(), command = ?args.command, "Opening store");
    let store = DagStore::open(config.store)
        .await
        .with_context(|| format!("Failed to open store at {}", path.display()))?;

    let result = run(&store, args.command).await;
    store.close().await?;

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    info!("dagstore finished");
    Ok(())
}
