//! `MetaStore` over the LMDB `meta` table.

use tessera_store::meta::MetaStore;
use tessera_store::StoreError;

use crate::{LmdbError, LmdbStore};

const SCHEMA_VERSION_KEY: &str = "schema_version";

impl LmdbStore {
    fn meta_read(&self, key: &str) -> Result<Option<Vec<u8>>, LmdbError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.meta_db.get(&rtxn, key.as_bytes())?.map(<[u8]>::to_vec))
    }

    fn meta_write(&self, key: &str, value: Option<&[u8]>) -> Result<(), LmdbError> {
        let mut wtxn = self.env.write_txn()?;
        match value {
            Some(v) => self.meta_db.put(&mut wtxn, key.as_bytes(), v)?,
            None => {
                self.meta_db.delete(&mut wtxn, key.as_bytes())?;
            }
        }
        wtxn.commit()?;
        Ok(())
    }
}

impl MetaStore for LmdbStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.ensure_open()?;
        Ok(self.meta_write(key, Some(value))?)
    }

    fn get_meta(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.ensure_open()?;
        self.meta_read(key)?
            .ok_or_else(|| LmdbError::NotFound(format!("meta key '{key}'")).into())
    }

    fn delete_meta(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        Ok(self.meta_write(key, None)?)
    }

    /// Zero on a store that has never been migrated.
    fn get_schema_version(&self) -> Result<u32, StoreError> {
        self.ensure_open()?;
        let Some(bytes) = self.meta_read(SCHEMA_VERSION_KEY)? else {
            return Ok(0);
        };
        let le: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
            LmdbError::Serialization(format!("schema_version is {} bytes", bytes.len()))
        })?;
        Ok(u32::from_le_bytes(le))
    }

    fn set_schema_version(&self, version: u32) -> Result<(), StoreError> {
        self.ensure_open()?;
        Ok(self.meta_write(SCHEMA_VERSION_KEY, Some(&version.to_le_bytes()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_store::{
        read_chain_config, read_genesis_hash, write_chain_config, write_genesis_hash, Migrator,
        CURRENT_SCHEMA_VERSION,
    };
    use tessera_types::{BlockHash, ChainConfig};

    fn open() -> (tempfile::TempDir, LmdbStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path(), 1 << 24).unwrap();
        (dir, store)
    }

    #[test]
    fn missing_key_is_not_found() {
        let (_dir, store) = open();
        assert!(matches!(store.get_meta("nope"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn put_get_delete() {
        let (_dir, store) = open();
        store.put_meta("k", b"v").unwrap();
        assert_eq!(store.get_meta("k").unwrap(), b"v");
        store.delete_meta("k").unwrap();
        assert!(store.get_meta("k").is_err());
    }

    #[test]
    fn fresh_schema_version_is_zero_then_migrated() {
        let (_dir, store) = open();
        assert_eq!(store.get_schema_version().unwrap(), 0);
        Migrator::run(&store).unwrap();
        assert_eq!(store.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn genesis_records_roundtrip_through_lmdb() {
        let (_dir, store) = open();
        let genesis = BlockHash::new([4u8; 32]);
        assert_eq!(read_genesis_hash(&store).unwrap(), None);
        write_genesis_hash(&store, &genesis).unwrap();
        write_chain_config(&store, &genesis, &ChainConfig::default()).unwrap();
        assert_eq!(read_genesis_hash(&store).unwrap(), Some(genesis));
        assert_eq!(
            read_chain_config(&store, &genesis).unwrap(),
            Some(ChainConfig::default())
        );
    }
}
