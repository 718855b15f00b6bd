//! Account address derivation.

use tessera_types::{Address, NodeId, PublicKey};

use crate::hash::blake2b_256;

/// Derive the 20-byte account address for a public key: the last 20 bytes
/// of its Blake2b-256 digest.
pub fn derive_address(public_key: &PublicKey) -> Address {
    let digest = blake2b_256(public_key.as_bytes());
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address::new(out)
}

/// Account address controlled by a node identity.
pub fn node_address(id: &NodeId) -> Address {
    derive_address(&id.public_key())
}
