//! Verified per-epoch randomness cache.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tessera_types::Epoch;

use crate::{RandomBeacon, Randomness, VrfError};

/// Caches verified randomness per epoch in front of a provider.
///
/// Every value is checked with the provider's `verify` before it is cached,
/// and a value already bound to another epoch is refused with
/// [`VrfError::Reused`]. Epochs older than `retain` behind the newest cached
/// epoch are dropped.
pub struct BeaconCache {
    inner: Arc<dyn RandomBeacon>,
    retain: u64,
    entries: Mutex<BTreeMap<Epoch, Randomness>>,
}

impl BeaconCache {
    pub fn new(inner: Arc<dyn RandomBeacon>, retain: u64) -> Self {
        Self {
            inner,
            retain: retain.max(1),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn cached_epochs(&self) -> Vec<Epoch> {
        self.entries
            .lock()
            .map(|e| e.keys().copied().collect())
            .unwrap_or_default()
    }

    fn fetch_verified(&self, epoch: Epoch) -> Result<Randomness, VrfError> {
        let output = self.inner.randomness_for(epoch)?;
        if output.epoch != epoch {
            return Err(VrfError::EpochMismatch {
                requested: epoch,
                got: output.epoch,
            });
        }
        if !self.inner.verify(&output)? {
            return Err(VrfError::VerificationFailed(format!(
                "{} output for epoch {}",
                self.inner.name(),
                epoch
            )));
        }
        Ok(output)
    }
}

impl RandomBeacon for BeaconCache {
    fn randomness_for(&self, epoch: Epoch) -> Result<Randomness, VrfError> {
        {
            let entries = self
                .entries
                .lock()
                .map_err(|_| VrfError::Other("beacon cache poisoned".into()))?;
            if let Some(hit) = entries.get(&epoch) {
                return Ok(hit.clone());
            }
        }

        let output = self.fetch_verified(epoch)?;

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| VrfError::Other("beacon cache poisoned".into()))?;
        if let Some((previous, _)) = entries
            .iter()
            .find(|(e, r)| **e != epoch && r.value == output.value)
        {
            tracing::error!(
                %epoch,
                previous = %previous,
                value = %output.value_hex(),
                "randomness reused across epochs"
            );
            return Err(VrfError::Reused {
                epoch,
                previous: *previous,
            });
        }
        entries.insert(epoch, output.clone());

        if let Some(newest) = entries.keys().next_back().copied() {
            let floor = Epoch::new(newest.as_u64().saturating_sub(self.retain));
            *entries = entries.split_off(&floor);
        }
        tracing::debug!(%epoch, provider = self.inner.name(), "cached epoch randomness");
        Ok(output)
    }

    fn verify(&self, output: &Randomness) -> Result<bool, VrfError> {
        self.inner.verify(output)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
