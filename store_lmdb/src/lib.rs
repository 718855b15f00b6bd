//! LMDB storage backend for the Tessera node.
//!
//! Implements the `tessera-store` traits using the `heed` LMDB bindings.
//! The node keeps its metadata in one named database inside a single
//! environment.

pub mod environment;
pub mod error;
pub mod meta;

pub use environment::{LmdbStore, DEFAULT_MAP_SIZE};
pub use error::LmdbError;
