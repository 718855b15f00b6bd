//! Database schema migration engine.
//!
//! Tracks a monotonically increasing schema version in the meta store and
//! runs sequential migrations to bring an older database up to date.

use crate::chain::{CHAIN_CONFIG_PREFIX, GENESIS_HASH_KEY};
use crate::{MetaStore, StoreError};

/// The schema version that the current code expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Key used by schema 1 for the (single, unscoped) chain config.
const LEGACY_CHAIN_CONFIG_KEY: &str = "chain_config";

/// Runs database migrations to bring the schema up to date.
pub struct Migrator;

impl Migrator {
    /// Check the stored schema version and run any needed migrations.
    ///
    /// - Version 0 means a fresh database (no version stored yet).
    /// - A stored version equal to `CURRENT_SCHEMA_VERSION` is a no-op.
    /// - A stored version higher than `CURRENT_SCHEMA_VERSION` was written by
    ///   a newer node and is refused.
    pub fn run(meta: &(impl MetaStore + ?Sized)) -> Result<u32, StoreError> {
        let current = meta.get_schema_version()?;
        Self::check(current)?;

        if current == CURRENT_SCHEMA_VERSION {
            tracing::info!(version = current, "database schema is up to date");
            return Ok(current);
        }

        for version in current..CURRENT_SCHEMA_VERSION {
            tracing::info!(from = version, to = version + 1, "running migration");
            run_migration(meta, version, version + 1)?;
        }

        meta.set_schema_version(CURRENT_SCHEMA_VERSION)?;
        tracing::info!(version = CURRENT_SCHEMA_VERSION, "migration complete");
        Ok(CURRENT_SCHEMA_VERSION)
    }

    /// Refuse versions newer than this code understands.
    pub fn check(stored: u32) -> Result<(), StoreError> {
        if stored > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::SchemaTooNew {
                stored,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }
        Ok(())
    }
}

fn run_migration(meta: &(impl MetaStore + ?Sized), from: u32, to: u32) -> Result<(), StoreError> {
    match (from, to) {
        (0, 1) => Ok(()),
        (1, 2) => {
            // Chain config moves under a key scoped by genesis hash.
            let legacy = match meta.get_meta(LEGACY_CHAIN_CONFIG_KEY) {
                Ok(bytes) => bytes,
                Err(StoreError::NotFound(_)) => return Ok(()),
                Err(e) => return Err(e),
            };
            let genesis = match meta.get_meta(GENESIS_HASH_KEY) {
                Ok(bytes) => bytes,
                Err(StoreError::NotFound(_)) => {
                    return Err(StoreError::Corruption(
                        "chain config stored without a genesis hash".to_string(),
                    ))
                }
                Err(e) => return Err(e),
            };
            let key = format!("{}{}", CHAIN_CONFIG_PREFIX, hex_lower(&genesis));
            meta.put_meta(&key, &legacy)?;
            meta.delete_meta(LEGACY_CHAIN_CONFIG_KEY)
        }
        _ => Err(StoreError::UnknownMigration { from, to }),
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapMeta(RefCell<HashMap<String, Vec<u8>>>);

    impl MetaStore for MapMeta {
        fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
            self.0.borrow_mut().insert(key.to_string(), value.to_vec());
            Ok(())
        }
        fn get_meta(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            self.0
                .borrow()
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(key.to_string()))
        }
        fn delete_meta(&self, key: &str) -> Result<(), StoreError> {
            self.0.borrow_mut().remove(key);
            Ok(())
        }
        fn get_schema_version(&self) -> Result<u32, StoreError> {
            match self.get_meta("schema_version") {
                Ok(b) => Ok(u32::from_le_bytes(b.try_into().unwrap())),
                Err(StoreError::NotFound(_)) => Ok(0),
                Err(e) => Err(e),
            }
        }
        fn set_schema_version(&self, version: u32) -> Result<(), StoreError> {
            self.put_meta("schema_version", &version.to_le_bytes())
        }
    }

    #[test]
    fn fresh_database_is_brought_to_current() {
        let meta = MapMeta::default();
        assert_eq!(Migrator::run(&meta).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(meta.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_refused() {
        let meta = MapMeta::default();
        meta.set_schema_version(CURRENT_SCHEMA_VERSION + 1).unwrap();
        assert!(matches!(
            Migrator::run(&meta),
            Err(StoreError::SchemaTooNew { .. })
        ));
    }

    #[test]
    fn v1_chain_config_is_rescoped_by_genesis() {
        let meta = MapMeta::default();
        meta.set_schema_version(1).unwrap();
        meta.put_meta(GENESIS_HASH_KEY, &[0xab; 32]).unwrap();
        meta.put_meta(LEGACY_CHAIN_CONFIG_KEY, b"{}").unwrap();

        Migrator::run(&meta).unwrap();

        let key = format!("{}{}", CHAIN_CONFIG_PREFIX, "ab".repeat(32));
        assert_eq!(meta.get_meta(&key).unwrap(), b"{}");
        assert!(meta.get_meta(LEGACY_CHAIN_CONFIG_KEY).is_err());
    }

    #[test]
    fn unknown_migration_is_error() {
        let meta = MapMeta::default();
        assert!(matches!(
            run_migration(&meta, 99, 100),
            Err(StoreError::UnknownMigration { from: 99, to: 100 })
        ));
    }
}
