//! Fundamental types for the Tessera node.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: node identities, account addresses, heights and epochs,
//! consensus roles, blocks, and chain configuration.

pub mod address;
pub mod block;
pub mod chain;
pub mod keys;
pub mod network;
pub mod node_id;
pub mod role;
pub mod round;

pub use address::Address;
pub use block::{tx_root, Block, BlockHash, BlockHeader};
pub use chain::{AuthorityConfig, ChainConfig, Genesis};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
pub use node_id::NodeId;
pub use role::Role;
pub use round::{Epoch, Height};

// Inline hex encoding to avoid adding the `hex` crate as a dependency of types.
pub(crate) mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
