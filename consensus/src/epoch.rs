//! Height to epoch arithmetic.

use tessera_types::{ChainConfig, Epoch, Height};

/// Fixed-length epochs: epoch `e` covers heights
/// `[e * epoch_length, (e + 1) * epoch_length)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochSchedule {
    epoch_length: u64,
}

impl EpochSchedule {
    /// A zero length is treated as one.
    pub fn new(epoch_length: u64) -> Self {
        Self {
            epoch_length: epoch_length.max(1),
        }
    }

    pub fn epoch_length(&self) -> u64 {
        self.epoch_length
    }

    pub fn epoch_of(&self, height: Height) -> Epoch {
        Epoch::new(height.as_u64() / self.epoch_length)
    }

    /// The boundary height at which `epoch` becomes active.
    pub fn first_height(&self, epoch: Epoch) -> Height {
        Height::new(epoch.as_u64().saturating_mul(self.epoch_length))
    }

    pub fn is_boundary(&self, height: Height) -> bool {
        height.as_u64() % self.epoch_length == 0
    }

    /// Position of `height` within its epoch.
    pub fn offset(&self, height: Height) -> u64 {
        height.as_u64() % self.epoch_length
    }
}

impl From<&ChainConfig> for EpochSchedule {
    fn from(config: &ChainConfig) -> Self {
        Self::new(config.epoch_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_arithmetic() {
        let s = EpochSchedule::new(10);
        assert_eq!(s.epoch_of(Height::new(0)), Epoch::new(0));
        assert_eq!(s.epoch_of(Height::new(9)), Epoch::new(0));
        assert_eq!(s.epoch_of(Height::new(10)), Epoch::new(1));
        assert_eq!(s.first_height(Epoch::new(3)), Height::new(30));
        assert!(s.is_boundary(Height::new(20)));
        assert!(!s.is_boundary(Height::new(21)));
        assert_eq!(s.offset(Height::new(27)), 7);
    }

    #[test]
    fn zero_length_is_one() {
        let s = EpochSchedule::new(0);
        assert_eq!(s.epoch_of(Height::new(5)), Epoch::new(5));
    }
}
