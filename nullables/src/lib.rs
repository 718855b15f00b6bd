//! Nullable infrastructure for deterministic testing.
//!
//! Every external collaborator of the node (storage, network, randomness,
//! accounts, transaction pool, block building) is consumed through a trait.
//! This crate provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Record what was asked of them
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod accounts;
pub mod consensus;
pub mod network;
pub mod random;
pub mod store;
pub mod txpool;

pub use accounts::NullWallet;
pub use consensus::{FixedCommittee, NullBuilder, NullVerifier};
pub use network::{NullNetwork, RecordingSink};
pub use random::NullRandom;
pub use store::NullStore;
pub use txpool::NullTxPool;
