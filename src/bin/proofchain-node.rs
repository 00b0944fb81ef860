#![forbid(unsafe_code)]
//! Run a proofchain node and serve its HTTP API.

use clap::Parser;
use proofchain::config::{load_config_from, DEFAULT_CONFIG_PATH};
use proofchain::node::Node;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "proofchain-node", about = "Proof-of-work ledger node")]
struct Args {
    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Leading hex zeros required of a proof digest
    #[arg(short, long)]
    difficulty: Option<u32>,

    /// Peer to register at startup (repeatable)
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Identity credited with mining rewards
    #[arg(long)]
    node_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = load_config_from(&args.config)?;
    if let Some(port) = args.port {
        config.network.api_port = port;
    }
    if let Some(difficulty) = args.difficulty {
        config.miner.difficulty = difficulty;
    }
    if args.node_id.is_some() {
        config.miner.node_id = args.node_id;
    }
    config.network.bootstrap_peers.extend(args.peers);

    let node = Arc::new(Node::new(config)?);
    node.run().await?;
    Ok(())
}
