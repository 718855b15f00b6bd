//! Nullable store: thread-safe in-memory metadata for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tessera_store::{Database, MetaStore, StoreError};

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// An in-memory database that counts how often it is closed.
#[derive(Default)]
pub struct NullStore {
    meta: Mutex<HashMap<String, Vec<u8>>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that claims to have been written with schema `version`.
    pub fn with_schema_version(version: u32) -> Self {
        let store = Self::new();
        store
            .meta
            .lock()
            .unwrap()
            .insert(SCHEMA_VERSION_KEY.to_string(), version.to_le_bytes().to_vec());
        store
    }

    /// Times `close` released the store (at most one).
    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl MetaStore for NullStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.meta
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.ensure_open()?;
        self.meta
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn delete_meta(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.meta.lock().unwrap().remove(key);
        Ok(())
    }

    fn get_schema_version(&self) -> Result<u32, StoreError> {
        match self.get_meta(SCHEMA_VERSION_KEY) {
            Ok(bytes) => {
                let arr: [u8; 4] = bytes
                    .try_into()
                    .map_err(|_| StoreError::Corruption("schema_version length".into()))?;
                Ok(u32::from_le_bytes(arr))
            }
            Err(StoreError::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn set_schema_version(&self, version: u32) -> Result<(), StoreError> {
        self.put_meta(SCHEMA_VERSION_KEY, &version.to_le_bytes())
    }
}

impl Database for NullStore {
    fn close(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
