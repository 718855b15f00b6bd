//! Genesis setup: bind the database to one genesis and keep its chain
//! config current.

use std::path::Path;

use tessera_store::{read_chain_config, read_genesis_hash, write_chain_config, write_genesis_hash, MetaStore};
use tessera_types::{BlockHash, ChainConfig, Genesis, NodeId};

use crate::NodeError;

/// Load a genesis description from a JSON file.
pub fn load_genesis(path: &Path) -> Result<Genesis, NodeError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| NodeError::Config(format!("genesis {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| NodeError::Config(format!("genesis {}: {e}", path.display())))
}

/// Single-member development chain in which `local` produces every block.
pub fn dev_genesis(local: NodeId) -> Genesis {
    Genesis {
        config: ChainConfig {
            committee_size: 1,
            ..ChainConfig::default()
        },
        timestamp: 0,
        candidates: vec![local],
        broadcasters: Vec::new(),
        extra: b"tessera-dev".to_vec(),
    }
}

/// Record `genesis` in a fresh database, or check it against the stored one.
///
/// A database initialised for another genesis is refused. A chain config
/// that differs from the stored one for the same genesis is rewritten.
/// Returns the genesis hash and the chain config in effect.
pub fn setup_genesis(
    meta: &(impl MetaStore + ?Sized),
    genesis: &Genesis,
) -> Result<(BlockHash, ChainConfig), NodeError> {
    let hash = genesis.hash();
    match read_genesis_hash(meta).map_err(NodeError::from_store)? {
        None => {
            tracing::info!(%hash, "writing genesis");
            write_genesis_hash(meta, &hash)?;
            write_chain_config(meta, &hash, &genesis.config)?;
            return Ok((hash, genesis.config.clone()));
        }
        Some(stored) if stored != hash => {
            return Err(NodeError::GenesisMismatch {
                stored,
                configured: hash,
            });
        }
        Some(_) => {}
    }

    match read_chain_config(meta, &hash)? {
        Some(stored) if stored == genesis.config => {}
        Some(stored) => {
            tracing::warn!(
                %hash,
                old_epoch_length = stored.epoch_length,
                new_epoch_length = genesis.config.epoch_length,
                "chain config changed for stored genesis, rewriting"
            );
            write_chain_config(meta, &hash, &genesis.config)?;
        }
        None => {
            tracing::warn!(%hash, "stored genesis has no chain config, writing");
            write_chain_config(meta, &hash, &genesis.config)?;
        }
    }
    tracing::info!(%hash, chain_id = genesis.config.chain_id, "initialised chain configuration");
    Ok((hash, genesis.config.clone()))
}
