//! LMDB environment setup and lifecycle.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use tessera_store::StoreError;

use crate::LmdbError;

/// Default LMDB map size (1 GiB).
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

const MAX_DBS: u32 = 4;
const META_DB: &str = "meta";

/// The node database backed by one LMDB environment.
pub struct LmdbStore {
    pub(crate) env: Env,
    pub(crate) meta_db: Database<Bytes, Bytes>,
    closed: AtomicBool,
}

impl LmdbStore {
    /// Open or create an LMDB environment under `path`.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        // SAFETY: the environment is opened once per process per path; the
        // node holds a single `LmdbStore` for its data directory.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };
        let mut wtxn = env.write_txn()?;
        let meta_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some(META_DB))?;
        wtxn.commit()?;

        tracing::info!(path = %path.display(), map_size, "opened LMDB environment");
        Ok(Self {
            env,
            meta_db,
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn ensure_open(&self) -> Result<(), LmdbError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LmdbError::Closed);
        }
        Ok(())
    }
}

impl tessera_store::Database for LmdbStore {
    fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.env.force_sync().map_err(LmdbError::from)?;
        tracing::info!("LMDB environment flushed and closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
