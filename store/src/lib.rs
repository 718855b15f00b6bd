//! Abstract storage traits for the Tessera node.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits.

pub mod chain;
pub mod error;
pub mod meta;
pub mod schema;

pub use chain::{read_chain_config, read_genesis_hash, write_chain_config, write_genesis_hash};
pub use error::StoreError;
pub use meta::MetaStore;
pub use schema::{Migrator, CURRENT_SCHEMA_VERSION};

/// A node database: metadata plus lifecycle.
///
/// `close` must be safe to call more than once; only the first call releases
/// the backend.
pub trait Database: MetaStore + Send + Sync {
    fn close(&self) -> Result<(), StoreError>;

    /// Whether `close` has been called.
    fn is_closed(&self) -> bool;
}
