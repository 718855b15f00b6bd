use thiserror::Error;

use tessera_types::BlockHash;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("store error: {0}")]
    Store(#[from] tessera_store::StoreError),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] tessera_store_lmdb::LmdbError),

    #[error("consensus error: {0}")]
    Consensus(#[from] tessera_consensus::ConsensusError),

    #[error("beacon error: {0}")]
    Beacon(#[from] tessera_vrf::VrfError),

    #[error("network error: {0}")]
    Network(#[from] tessera_network::NetworkError),

    #[error("wallet error: {0}")]
    Wallet(#[from] tessera_wallet_core::WalletError),

    #[error("invalid sync mode '{0}'")]
    InvalidSyncMode(String),

    #[error("light sync is not supported by a full node, use a light client")]
    LightSyncUnsupported,

    #[error("database schema {stored} is newer than supported {supported}")]
    SchemaTooNew { stored: u32, supported: u32 },

    #[error("database schema {stored} does not match {expected}")]
    VersionMismatch { stored: u32, expected: u32 },

    #[error("database belongs to genesis {stored}, configured genesis is {configured}")]
    GenesisMismatch {
        stored: BlockHash,
        configured: BlockHash,
    },

    #[error("etherbase must be explicitly specified")]
    NoEtherbase,

    #[error("signer missing: {0}")]
    SignerMissing(String),

    #[error("invalid peer config: light peer count ({light}) >= total peer count ({max})")]
    InvalidPeerConfig { light: usize, max: usize },

    #[error("cannot {action} a node that is {state}")]
    InvalidLifecycle {
        action: &'static str,
        state: &'static str,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl NodeError {
    /// Lift store errors, keeping schema refusals distinct.
    pub fn from_store(err: tessera_store::StoreError) -> Self {
        match err {
            tessera_store::StoreError::SchemaTooNew { stored, supported } => {
                Self::SchemaTooNew { stored, supported }
            }
            tessera_store::StoreError::UnknownMigration { from, .. } => Self::VersionMismatch {
                stored: from,
                expected: tessera_store::CURRENT_SCHEMA_VERSION,
            },
            other => Self::Store(other),
        }
    }
}
