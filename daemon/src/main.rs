//! Tessera daemon: entry point for running a Tessera node.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tessera_node::{
    dev_genesis, init_logging, load_genesis, LogFormat, NodeBuilder, NodeConfig, ServiceContext,
};
use tessera_types::{Address, NetworkId, NodeId};
use tessera_wallet_core::AccountManager;

#[derive(Parser)]
#[command(name = "tessera-daemon", about = "Tessera consensus node daemon")]
struct Cli {
    /// Network to join: "live", "test", or "dev".
    /// When a config file is provided, defaults to the file's network value.
    #[arg(long, env = "TESSERA_NETWORK")]
    network: Option<String>,

    /// Data directory for the chain database.
    #[arg(long, env = "TESSERA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Maximum number of peer connections.
    #[arg(long, env = "TESSERA_MAX_PEERS")]
    max_peers: Option<usize>,

    /// Start producing blocks once the node is up.
    #[arg(long, env = "TESSERA_MINE")]
    mine: bool,

    /// Reward address for produced blocks (0x-prefixed hex).
    #[arg(long, env = "TESSERA_ETHERBASE")]
    etherbase: Option<Address>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "TESSERA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Password for the keystore files in `keystore_dir`.
    #[arg(long, env = "TESSERA_KEYSTORE_PASSWORD", hide_env_values = true, default_value = "")]
    keystore_password: String,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Subcommand.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node commands.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT or SIGTERM.
    Run,
}

impl Cli {
    /// File config (or defaults) with flags and env vars applied on top.
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let path = path.to_string_lossy();
                NodeConfig::from_toml_file(&path)
                    .with_context(|| format!("loading config file {path}"))?
            }
            None => NodeConfig::default(),
        };
        if let Some(network) = &self.network {
            config.network = NetworkId::parse(network);
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(max_peers) = self.max_peers {
            config.max_peers = max_peers;
        }
        if let Some(etherbase) = self.etherbase {
            config.etherbase = etherbase;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config.mine |= self.mine;
        Ok(config)
    }
}

async fn run_node(config: NodeConfig, keystore_password: &str) -> anyhow::Result<()> {
    let identity = match config.identity()? {
        Some(kp) => kp,
        None => {
            tracing::warn!("no identity_seed configured, using an ephemeral identity");
            tessera_crypto::generate_keypair()
        }
    };
    let local = NodeId::from_public_key(&identity.public);

    let genesis = match &config.genesis {
        Some(path) => load_genesis(path)?,
        None => {
            tracing::info!("no genesis file configured, using the development genesis");
            dev_genesis(local)
        }
    };
    let accounts = match &config.keystore_dir {
        Some(dir) => AccountManager::from_keystore_dir(dir, keystore_password)
            .with_context(|| format!("unlocking keystore {}", dir.display()))?,
        None => AccountManager::default(),
    };
    let max_peers = config.max_peers;
    let mine = config.mine;

    let ctx = ServiceContext::new(config);
    let node = NodeBuilder::new(ctx.clone())
        .validate()?
        .open_default_storage(genesis)
        .context("opening the chain database")?
        .select_engine()
        .with_default_txpool()
        .with_default_network()
        .with_genesis_committee()
        .with_genesis_beacon()
        .with_identity(identity)
        .with_default_production(Arc::new(accounts));

    node.start(max_peers).await?;
    if mine {
        if let Err(e) = node.start_mining(true).await {
            tracing::error!(error = %e, "mining not started");
        }
    }

    ctx.shutdown.wait_for_signal().await;
    tracing::info!("shutdown signal received, stopping node");
    node.stop().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.node_config()?;

    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level)?;

    match cli.command {
        Command::Node { action } => match action {
            NodeAction::Run => {
                tracing::info!(
                    network = config.network.as_str(),
                    data_dir = %config.data_dir.display(),
                    sync_mode = %config.sync_mode,
                    "starting tessera node"
                );
                run_node(config, &cli.keystore_password).await?;
                tracing::info!("tessera daemon exited cleanly");
            }
        },
    }

    Ok(())
}
