//! Nullable random: deterministic per-epoch randomness.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tessera_types::Epoch;
use tessera_vrf::{RandomBeacon, Randomness, VrfError};

/// A deterministic beacon for testing.
///
/// The first eight bytes of every value are `start` (big-endian), so the
/// leader schedule always begins at slot `start mod n`. The last eight bytes
/// carry the epoch so values never repeat across epochs.
pub struct NullRandom {
    start: u64,
    unavailable: Mutex<HashSet<Epoch>>,
    calls: AtomicUsize,
}

impl NullRandom {
    pub fn new(start: u64) -> Self {
        Self {
            start,
            unavailable: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make `epoch` report `VrfError::Unavailable`.
    pub fn withhold(&self, epoch: Epoch) {
        self.unavailable.lock().unwrap().insert(epoch);
    }

    pub fn release(&self, epoch: Epoch) {
        self.unavailable.lock().unwrap().remove(&epoch);
    }

    /// Number of `randomness_for` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn value(&self, epoch: Epoch) -> [u8; 32] {
        let mut value = [0u8; 32];
        value[..8].copy_from_slice(&self.start.to_be_bytes());
        value[24..].copy_from_slice(&epoch.as_u64().to_be_bytes());
        value
    }
}

impl Default for NullRandom {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RandomBeacon for NullRandom {
    fn randomness_for(&self, epoch: Epoch) -> Result<Randomness, VrfError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.lock().unwrap().contains(&epoch) {
            return Err(VrfError::Unavailable(epoch));
        }
        Ok(Randomness {
            epoch,
            value: self.value(epoch),
            proof: Vec::new(),
        })
    }

    fn verify(&self, output: &Randomness) -> Result<bool, VrfError> {
        Ok(output.value == self.value(output.epoch))
    }

    fn name(&self) -> &str {
        "null-random"
    }
}
