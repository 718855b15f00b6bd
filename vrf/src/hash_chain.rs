//! Deterministic hash-chain beacon.
//!
//! `value = sha256(seed || epoch_be)`. Anyone holding the seed can verify.
//! It offers no unpredictability against seed holders; use it on
//! development networks or where the seed is published after the fact.

use sha2::{Digest, Sha256};
use tessera_types::Epoch;

use crate::{RandomBeacon, Randomness, VrfError};

pub struct HashChainBeacon {
    seed: [u8; 32],
}

impl HashChainBeacon {
    pub fn new(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    fn derive(&self, epoch: Epoch) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.seed);
        hasher.update(epoch.as_u64().to_be_bytes());
        hasher.finalize().into()
    }
}

impl RandomBeacon for HashChainBeacon {
    fn randomness_for(&self, epoch: Epoch) -> Result<Randomness, VrfError> {
        Ok(Randomness {
            epoch,
            value: self.derive(epoch),
            proof: Vec::new(),
        })
    }

    fn verify(&self, output: &Randomness) -> Result<bool, VrfError> {
        Ok(output.value == self.derive(output.epoch))
    }

    fn name(&self) -> &str {
        "hash-chain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_values() {
        let a = HashChainBeacon::new([1u8; 32]);
        let b = HashChainBeacon::new([1u8; 32]);
        assert_eq!(
            a.randomness_for(Epoch::new(4)).unwrap(),
            b.randomness_for(Epoch::new(4)).unwrap()
        );
    }

    #[test]
    fn epochs_differ() {
        let beacon = HashChainBeacon::new([1u8; 32]);
        let r0 = beacon.randomness_for(Epoch::new(0)).unwrap();
        let r1 = beacon.randomness_for(Epoch::new(1)).unwrap();
        assert_ne!(r0.value, r1.value);
    }

    #[test]
    fn verify_rejects_tampered_value() {
        let beacon = HashChainBeacon::new([1u8; 32]);
        let mut r = beacon.randomness_for(Epoch::new(2)).unwrap();
        assert!(beacon.verify(&r).unwrap());
        r.value[0] ^= 1;
        assert!(!beacon.verify(&r).unwrap());
    }
}
