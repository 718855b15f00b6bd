//! Ed25519 message and block signing.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use tessera_types::{Block, BlockHeader, PrivateKey, PublicKey, Signature};

/// Sign a message with a private key, returning the signature.
pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    let signing_key = SigningKey::from_bytes(&private_key.0);
    Signature(signing_key.sign(message).to_bytes())
}

/// Verify a signature against a message and public key.
///
/// Non-canonical signatures are rejected.
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let dalek_sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key.verify_strict(message, &dalek_sig).is_ok()
}

/// Sign a header's hash.
pub fn sign_header(header: &BlockHeader, private_key: &PrivateKey) -> Signature {
    sign_message(header.hash().as_bytes(), private_key)
}

/// Check that a block is signed by the producer named in its header.
pub fn verify_block_signature(block: &Block) -> bool {
    let header = block.header();
    verify_signature(
        header.hash().as_bytes(),
        block.signature(),
        &header.producer.public_key(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_keypair, keypair_from_seed};
    use tessera_types::{Address, BlockHash, Epoch, Height, NodeId};

    fn header(producer: NodeId) -> BlockHeader {
        BlockHeader {
            parent: BlockHash::ZERO,
            height: Height::new(5),
            epoch: Epoch::new(0),
            producer,
            coinbase: Address::ZERO,
            timestamp: 1_700_000_000,
            tx_root: tessera_types::tx_root(&[]),
            extra: Vec::new(),
            nonce: 0,
        }
    }

    #[test]
    fn sign_and_verify() {
        let kp = generate_keypair();
        let sig = sign_message(b"tessera", &kp.private);
        assert!(verify_signature(b"tessera", &sig, &kp.public));
        assert!(!verify_signature(b"other", &sig, &kp.public));
    }

    #[test]
    fn wrong_key_fails() {
        let kp1 = generate_keypair();
        let kp2 = generate_keypair();
        let sig = sign_message(b"m", &kp1.private);
        assert!(!verify_signature(b"m", &sig, &kp2.public));
    }

    #[test]
    fn invalid_public_key() {
        let kp = generate_keypair();
        let sig = sign_message(b"test", &kp.private);
        assert!(!verify_signature(b"test", &sig, &PublicKey([0xFF; 32])));
    }

    #[test]
    fn block_signed_by_producer_verifies() {
        let kp = keypair_from_seed(&[5u8; 32]);
        let h = header(NodeId::from_public_key(&kp.public));
        let sig = sign_header(&h, &kp.private);
        let block = Block::new(h, Vec::new(), sig);
        assert!(verify_block_signature(&block));
    }

    #[test]
    fn block_signed_by_someone_else_fails() {
        let producer = keypair_from_seed(&[5u8; 32]);
        let impostor = keypair_from_seed(&[6u8; 32]);
        let h = header(NodeId::from_public_key(&producer.public));
        let sig = sign_header(&h, &impostor.private);
        let block = Block::new(h, Vec::new(), sig);
        assert!(!verify_block_signature(&block));
    }
}
