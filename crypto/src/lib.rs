//! Cryptographic primitives for the Tessera node.
//!
//! - **Ed25519** for node identities and block signatures
//! - **Blake2b** for hashing and address derivation

pub mod address;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::{derive_address, node_address};
pub use hash::{blake2b_256, blake2b_256_multi};
pub use keys::{generate_keypair, keypair_from_seed};
pub use sign::{sign_header, sign_message, verify_block_signature, verify_signature};
