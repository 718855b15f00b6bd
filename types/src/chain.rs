//! Chain configuration and genesis description.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

use crate::{Address, BlockHash, NodeId};

/// Proof-of-authority settings. Presence selects the authority engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Target seconds between blocks.
    pub period_secs: u64,
    /// Addresses allowed to seal blocks.
    pub signers: Vec<Address>,
}

/// Consensus-relevant chain parameters, fixed by genesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Heights per committee epoch. Must be non-zero.
    pub epoch_length: u64,
    /// Members drawn into each epoch's committee.
    pub committee_size: usize,
    #[serde(default)]
    pub authority: Option<AuthorityConfig>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            epoch_length: 100,
            committee_size: 4,
            authority: None,
        }
    }
}

/// Genesis description: chain config plus the initial participant directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    pub config: ChainConfig,
    pub timestamp: u64,
    /// Identities eligible for committee election.
    pub candidates: Vec<NodeId>,
    /// Identities declared as relay (broadcast) nodes.
    #[serde(default)]
    pub broadcasters: Vec<NodeId>,
    #[serde(default)]
    pub extra: Vec<u8>,
}

impl Genesis {
    /// Hash identifying this genesis.
    ///
    /// The chain config is not part of the hash, so a config upgrade keeps
    /// the same genesis identity.
    pub fn hash(&self) -> BlockHash {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update((self.candidates.len() as u64).to_be_bytes());
        for id in &self.candidates {
            hasher.update(id.as_bytes());
        }
        hasher.update((self.broadcasters.len() as u64).to_be_bytes());
        for id in &self.broadcasters {
            hasher.update(id.as_bytes());
        }
        hasher.update((self.extra.len() as u64).to_be_bytes());
        hasher.update(&self.extra);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        BlockHash::new(out)
    }
}
