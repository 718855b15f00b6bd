//! Per-epoch snapshots published by the chain follower.

use std::collections::BTreeMap;
use std::sync::Arc;

use tessera_consensus::{Committee, DutyRoster, EpochSchedule, LeaderSchedule, RoleResolver};
use tessera_types::{Epoch, Height, NodeId};

/// Committee, leader schedule and declared relays of one epoch.
#[derive(Debug)]
pub struct EpochView {
    pub epoch: Epoch,
    pub committee: Arc<Committee>,
    /// Absent when the epoch's randomness could not be obtained.
    pub schedule: Option<Arc<LeaderSchedule>>,
    pub broadcasters: Vec<NodeId>,
}

/// The epochs readers can still resolve rosters for. Replaced wholesale on
/// every rotation; readers hold whichever snapshot they borrowed.
#[derive(Clone, Debug, Default)]
pub struct EpochBook {
    views: BTreeMap<Epoch, Arc<EpochView>>,
}

impl EpochBook {
    /// A copy with `view` added and epochs older than `retain` behind it
    /// dropped.
    pub fn with(&self, view: EpochView, retain: u64) -> Self {
        let mut views = self.views.clone();
        let newest = view.epoch;
        views.insert(newest, Arc::new(view));
        let floor = newest.as_u64().saturating_sub(retain);
        views.retain(|e, _| e.as_u64() >= floor);
        Self { views }
    }

    pub fn view(&self, epoch: Epoch) -> Option<Arc<EpochView>> {
        self.views.get(&epoch).cloned()
    }

    pub fn epochs(&self) -> Vec<Epoch> {
        self.views.keys().copied().collect()
    }

    /// Role partition at `height`, if its epoch is known and scheduled.
    pub fn roster_for(&self, epochs: &EpochSchedule, height: Height) -> Option<DutyRoster> {
        let view = self.views.get(&epochs.epoch_of(height))?;
        RoleResolver::partition(
            height,
            Some(&view.committee),
            view.schedule.as_deref(),
            &view.broadcasters,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_vrf::Randomness;

    fn view(epoch: u64, scheduled: bool) -> EpochView {
        let members: Vec<NodeId> = (1..=3).map(|b| NodeId::new([b; 32])).collect();
        let committee = Committee::new(Epoch::new(epoch), members).unwrap();
        let schedule = scheduled.then(|| {
            let randomness = Randomness {
                epoch: Epoch::new(epoch),
                value: [0u8; 32],
                proof: Vec::new(),
            };
            Arc::new(LeaderSchedule::derive(&committee, &randomness, EpochSchedule::new(10)).unwrap())
        });
        EpochView {
            epoch: Epoch::new(epoch),
            committee: Arc::new(committee),
            schedule,
            broadcasters: vec![NodeId::new([9; 32])],
        }
    }

    #[test]
    fn old_epochs_are_dropped() {
        let book = EpochBook::default()
            .with(view(0, true), 1)
            .with(view(1, true), 1)
            .with(view(2, true), 1);
        assert_eq!(book.epochs(), vec![Epoch::new(1), Epoch::new(2)]);
    }

    #[test]
    fn roster_needs_a_schedule() {
        let epochs = EpochSchedule::new(10);
        let book = EpochBook::default().with(view(0, true), 2).with(view(1, false), 2);
        let roster = book.roster_for(&epochs, Height::new(3)).unwrap();
        assert_eq!(roster.broadcasters(), &[NodeId::new([9; 32])]);
        assert!(book.roster_for(&epochs, Height::new(12)).is_none());
        assert!(book.roster_for(&epochs, Height::new(25)).is_none());
    }
}
