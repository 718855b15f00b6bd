//! Verifiable per-epoch randomness for leader scheduling.
//!
//! Providers:
//! - **Commit-reveal**: committee members commit hashed values, then reveal
//!   them; the combined reveals seed the epoch.
//! - **Hash chain**: deterministic `sha256(seed || epoch)`, for development
//!   networks and tests.
//!
//! [`BeaconCache`] sits in front of any provider and enforces that each value
//! is verified and bound to exactly one epoch.

pub mod cache;
pub mod commit_reveal;
pub mod error;
pub mod hash_chain;

use serde::{Deserialize, Serialize};
use tessera_types::Epoch;

pub use cache::BeaconCache;
pub use commit_reveal::CommitRevealBeacon;
pub use error::VrfError;
pub use hash_chain::HashChainBeacon;

/// Source of verifiable randomness, one value per epoch.
pub trait RandomBeacon: Send + Sync {
    /// Randomness for `epoch`. Providers that have not yet collected enough
    /// material for the epoch return `VrfError::Unavailable`.
    fn randomness_for(&self, epoch: Epoch) -> Result<Randomness, VrfError>;

    /// Verify that an output was correctly generated for its epoch.
    fn verify(&self, output: &Randomness) -> Result<bool, VrfError>;

    /// Human-readable name of this provider.
    fn name(&self) -> &str;
}

/// Randomness for one epoch with the proof its provider can check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Randomness {
    pub epoch: Epoch,
    pub value: [u8; 32],
    pub proof: Vec<u8>,
}

impl Randomness {
    /// First eight bytes of the value, big-endian.
    pub fn seed_u64(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.value[..8]);
        u64::from_be_bytes(buf)
    }

    pub fn value_hex(&self) -> String {
        hex::encode(self.value)
    }
}
