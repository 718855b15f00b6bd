//! Genesis hash and per-genesis chain config records.

use tessera_types::{BlockHash, ChainConfig};

use crate::{MetaStore, StoreError};

pub(crate) const GENESIS_HASH_KEY: &str = "genesis_hash";
pub(crate) const CHAIN_CONFIG_PREFIX: &str = "chain_config:";

fn optional(result: Result<Vec<u8>, StoreError>) -> Result<Option<Vec<u8>>, StoreError> {
    match result {
        Ok(bytes) => Ok(Some(bytes)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn config_key(genesis: &BlockHash) -> String {
    format!("{}{}", CHAIN_CONFIG_PREFIX, genesis)
}

/// Genesis hash this database was initialised with, if any.
pub fn read_genesis_hash(meta: &(impl MetaStore + ?Sized)) -> Result<Option<BlockHash>, StoreError> {
    let Some(bytes) = optional(meta.get_meta(GENESIS_HASH_KEY))? else {
        return Ok(None);
    };
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| StoreError::Corruption(format!("genesis hash of {} bytes", bytes.len())))?;
    Ok(Some(BlockHash::new(arr)))
}

pub fn write_genesis_hash(
    meta: &(impl MetaStore + ?Sized),
    hash: &BlockHash,
) -> Result<(), StoreError> {
    meta.put_meta(GENESIS_HASH_KEY, hash.as_bytes())
}

/// Chain config stored for `genesis`, JSON encoded.
pub fn read_chain_config(
    meta: &(impl MetaStore + ?Sized),
    genesis: &BlockHash,
) -> Result<Option<ChainConfig>, StoreError> {
    let Some(bytes) = optional(meta.get_meta(&config_key(genesis)))? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

pub fn write_chain_config(
    meta: &(impl MetaStore + ?Sized),
    genesis: &BlockHash,
    config: &ChainConfig,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(config).map_err(|e| StoreError::Serialization(e.to_string()))?;
    meta.put_meta(&config_key(genesis), &bytes)
}
