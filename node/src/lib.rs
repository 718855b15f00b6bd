//! Tessera full node: consensus-role orchestration.
//!
//! The node is the central coordinator that:
//! - Follows the chain head and rotates committees at epoch boundaries
//! - Derives the per-epoch leader schedule from verifiable randomness
//! - Resolves the local duty (producer, validator, relay or passive) per height
//! - Produces, validates and announces blocks according to that duty
//! - Owns the startup checks and the ordered shutdown of every service

pub mod bloom;
pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod genesis;
pub mod logging;
pub mod metrics;
pub mod mining;
pub mod notifier;
pub mod orchestrator;
pub mod pipeline;
pub mod producer;
pub mod rounds;
pub mod service;
pub mod shutdown;
pub mod tracing_spans;
pub mod txpool;
pub mod validator;

pub use bloom::{Bloom, BloomIndexer, Retrieval};
pub use builder::{open_lmdb, NodeBuilder};
pub use config::{NodeConfig, SyncMode};
pub use context::ServiceContext;
pub use error::NodeError;
pub use events::{EventBus, NodeEvent};
pub use genesis::{dev_genesis, load_genesis, setup_genesis};
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use mining::{make_extra_data, MiningControl, WalletSigner, MAX_EXTRA_DATA};
pub use notifier::{NotifyReport, PeerNotifier};
pub use orchestrator::{LifecycleState, NodeOrchestrator};
pub use pipeline::{ChainFollower, HeadUpdate, ProduceRequest};
pub use producer::BlockProducer;
pub use rounds::{EpochBook, EpochView};
pub use service::TaskGroup;
pub use shutdown::ShutdownController;
pub use txpool::{MemoryTxPool, PoolBuilder};
pub use validator::{BlockValidator, RejectReason, Verdict};

/// Seconds since the Unix epoch; zero if the clock is before it.
pub(crate) fn unix_now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
