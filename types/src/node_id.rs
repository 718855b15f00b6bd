//! Network identity of a participant.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keys::PublicKey;

/// Opaque, immutable identity of a node: its 32-byte Ed25519 public key.
///
/// Identities are totally ordered by byte order; that order is the fixed
/// tie-break used by leader selection.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; 32]);

impl NodeId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_public_key(key: &PublicKey) -> Self {
        Self(key.0)
    }

    /// The public key this identity signs with.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Abbreviated peer id (first 16 hex characters), as used by the
    /// connection layer to key peers.
    pub fn short(&self) -> String {
        crate::hex::encode(&self.0[..8])
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_is_sixteen_hex_chars() {
        let id = NodeId::new([0xab; 32]);
        assert_eq!(id.short(), "abababababababab");
        assert!(id.to_string().starts_with(&id.short()));
    }

    #[test]
    fn ordering_follows_bytes() {
        let mut low = [0u8; 32];
        low[0] = 1;
        let mut high = [0u8; 32];
        high[0] = 2;
        assert!(NodeId::new(low) < NodeId::new(high));
    }
}
