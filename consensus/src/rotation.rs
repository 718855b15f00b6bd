//! Committee rotation at epoch boundaries.
//!
//! The rotation tracks the highest height the chain has reached. A new
//! committee is fetched from the [`CommitteeSource`] when that height enters
//! a new epoch, and only from then on is it reported as active. Lower heights
//! never change the active committee.
//!
//! Retention: committees of the last `retain_epochs` epochs stay addressable,
//! and an older committee stays as long as any round still holds its `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tessera_types::{Epoch, Height};

use crate::{Committee, CommitteeSource, ConsensusError, EpochSchedule};

/// Emitted when a new committee becomes active.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotationEvent {
    pub epoch: Epoch,
    /// Height at which the rotation was observed (the boundary, unless
    /// heights were skipped).
    pub height: Height,
    pub previous: Option<Epoch>,
    pub members: usize,
}

pub struct CommitteeRotation {
    source: Arc<dyn CommitteeSource>,
    epochs: EpochSchedule,
    retain_epochs: u64,
    committees: BTreeMap<Epoch, Arc<Committee>>,
    current_epoch: Option<Epoch>,
    tip: Option<Height>,
}

impl CommitteeRotation {
    pub fn new(source: Arc<dyn CommitteeSource>, epochs: EpochSchedule, retain_epochs: u64) -> Self {
        Self {
            source,
            epochs,
            retain_epochs,
            committees: BTreeMap::new(),
            current_epoch: None,
            tip: None,
        }
    }

    pub fn epochs(&self) -> &EpochSchedule {
        &self.epochs
    }

    pub fn current_epoch(&self) -> Option<Epoch> {
        self.current_epoch
    }

    /// Highest height this rotation has advanced to.
    pub fn tip(&self) -> Option<Height> {
        self.tip
    }

    /// Committee active at `height`, if known.
    ///
    /// Heights in an epoch the rotation has not reached yet return `None`;
    /// heights in retained earlier epochs return their committee.
    pub fn current_committee(&self, height: Height) -> Option<Arc<Committee>> {
        let epoch = self.epochs.epoch_of(height);
        match self.current_epoch {
            Some(current) if epoch <= current => self.committees.get(&epoch).cloned(),
            _ => None,
        }
    }

    /// Committee of the epoch before the current one, while still retained.
    pub fn previous_committee(&self) -> Option<Arc<Committee>> {
        let current = self.current_epoch?;
        self.committees
            .range(..current)
            .next_back()
            .map(|(_, c)| c.clone())
    }

    /// Advance to `height`. Entering a new epoch activates its committee and
    /// returns the rotation event. Heights at or below the tip are ignored.
    pub fn advance_to(&mut self, height: Height) -> Result<Option<RotationEvent>, ConsensusError> {
        if matches!(self.tip, Some(tip) if height <= tip) {
            return Ok(None);
        }

        let epoch = self.epochs.epoch_of(height);
        if self.current_epoch == Some(epoch) {
            self.tip = Some(height);
            return Ok(None);
        }

        let committee = match self.committees.get(&epoch) {
            Some(c) => c.clone(),
            None => {
                let fetched = self.source.committee_for(epoch)?;
                if fetched.epoch() != epoch {
                    return Err(ConsensusError::CommitteeUnavailable(epoch));
                }
                Arc::new(fetched)
            }
        };
        let members = committee.len();
        self.committees.insert(epoch, committee);

        let previous = self.current_epoch.replace(epoch);
        self.tip = Some(height);
        self.prune();

        tracing::info!(
            %epoch,
            %height,
            members,
            previous = ?previous.map(|e| e.as_u64()),
            "committee rotated"
        );
        Ok(Some(RotationEvent {
            epoch,
            height,
            previous,
            members,
        }))
    }

    fn prune(&mut self) {
        let Some(current) = self.current_epoch else {
            return;
        };
        let floor = current.as_u64().saturating_sub(self.retain_epochs);
        self.committees.retain(|epoch, committee| {
            epoch.as_u64() >= floor || Arc::strong_count(committee) > 1
        });
    }

    /// Number of committees still held.
    pub fn retained(&self) -> usize {
        self.committees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::NodeId;

    struct ByEpoch;

    impl CommitteeSource for ByEpoch {
        fn committee_for(&self, epoch: Epoch) -> Result<Committee, ConsensusError> {
            let b = epoch.as_u64() as u8;
            Committee::new(
                epoch,
                vec![NodeId::new([b; 32]), NodeId::new([b.wrapping_add(100); 32])],
            )
        }
    }

    fn rotation(retain: u64) -> CommitteeRotation {
        CommitteeRotation::new(Arc::new(ByEpoch), EpochSchedule::new(10), retain)
    }

    #[test]
    fn rotates_exactly_at_boundary() {
        let mut r = rotation(2);
        assert!(r.advance_to(Height::new(0)).unwrap().is_some());
        for h in 1..10 {
            assert!(r.advance_to(Height::new(h)).unwrap().is_none());
        }
        assert_eq!(r.current_committee(Height::new(9)).unwrap().epoch(), Epoch::new(0));
        assert!(r.current_committee(Height::new(10)).is_none());

        let event = r.advance_to(Height::new(10)).unwrap().unwrap();
        assert_eq!(event.epoch, Epoch::new(1));
        assert_eq!(event.previous, Some(Epoch::new(0)));
        assert_eq!(r.current_committee(Height::new(10)).unwrap().epoch(), Epoch::new(1));
        assert_eq!(r.current_committee(Height::new(9)).unwrap().epoch(), Epoch::new(0));
    }

    #[test]
    fn lower_height_is_ignored() {
        let mut r = rotation(2);
        r.advance_to(Height::new(25)).unwrap();
        assert!(r.advance_to(Height::new(5)).unwrap().is_none());
        assert_eq!(r.current_epoch(), Some(Epoch::new(2)));
    }

    #[test]
    fn old_committees_pruned_unless_held() {
        let mut r = rotation(1);
        r.advance_to(Height::new(0)).unwrap();
        let held = r.current_committee(Height::new(0)).unwrap();
        r.advance_to(Height::new(10)).unwrap();
        r.advance_to(Height::new(20)).unwrap();
        r.advance_to(Height::new(30)).unwrap();
        // epoch 0 is held by `held`; epochs 2 and 3 are within retention.
        assert!(r.current_committee(Height::new(0)).is_some());
        assert!(r.current_committee(Height::new(10)).is_none());
        assert_eq!(r.retained(), 3);
        drop(held);
        r.advance_to(Height::new(40)).unwrap();
        assert!(r.current_committee(Height::new(0)).is_none());
    }

    #[test]
    fn previous_committee_available_after_rotation() {
        let mut r = rotation(2);
        r.advance_to(Height::new(0)).unwrap();
        assert!(r.previous_committee().is_none());
        r.advance_to(Height::new(10)).unwrap();
        assert_eq!(r.previous_committee().unwrap().epoch(), Epoch::new(0));
    }
}
