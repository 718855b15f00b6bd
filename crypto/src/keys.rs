//! Ed25519 identity keys.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tessera_types::{KeyPair, PrivateKey, PublicKey};

fn keypair_of(signing_key: &SigningKey) -> KeyPair {
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Fresh identity from the OS random source. Used when no identity seed is
/// configured, so the node id changes on every run.
pub fn generate_keypair() -> KeyPair {
    keypair_of(&SigningKey::generate(&mut OsRng))
}

/// Deterministic identity from a 32-byte seed.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    keypair_of(&SigningKey::from_bytes(seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_identity_is_stable() {
        let a = keypair_from_seed(&[42u8; 32]);
        let b = keypair_from_seed(&[42u8; 32]);
        assert_eq!(a.public, b.public);
        assert_eq!(a.private.0, [42u8; 32]);
        assert_ne!(keypair_from_seed(&[43u8; 32]).public, a.public);
    }

    #[test]
    fn generated_identities_differ() {
        assert_ne!(generate_keypair().public, generate_keypair().public);
    }
}
