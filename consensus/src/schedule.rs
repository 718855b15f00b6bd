//! Deterministic leader schedule for one epoch.
//!
//! `start = u64::from_be_bytes(randomness[0..8]) mod n` and the leader of
//! height `h` is `order[(start + (h - epoch_start)) mod n]`, where `order` is
//! the committee's election order. Every node with the same committee and
//! randomness derives the same schedule.

use tessera_types::{Epoch, Height, NodeId};
use tessera_vrf::Randomness;

use crate::{Committee, ConsensusError, EpochSchedule};

#[derive(Clone, Debug)]
pub struct LeaderSchedule {
    epoch: Epoch,
    epochs: EpochSchedule,
    order: Vec<NodeId>,
    start: usize,
    current: Option<(Height, NodeId)>,
}

impl LeaderSchedule {
    pub fn derive(
        committee: &Committee,
        randomness: &Randomness,
        epochs: EpochSchedule,
    ) -> Result<Self, ConsensusError> {
        if randomness.epoch != committee.epoch() {
            return Err(ConsensusError::EpochMismatch {
                committee: committee.epoch(),
                randomness: randomness.epoch,
            });
        }

        // Committee construction refuses duplicates, so slots are unique.
        let order = committee.members().to_vec();
        if order.is_empty() {
            return Err(ConsensusError::EmptyCommittee(committee.epoch()));
        }

        let start = (randomness.seed_u64() % order.len() as u64) as usize;
        tracing::debug!(
            epoch = %committee.epoch(),
            start,
            members = order.len(),
            "leader schedule derived"
        );
        Ok(Self {
            epoch: committee.epoch(),
            epochs,
            order,
            start,
            current: None,
        })
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Leader of `height`. The height must belong to this schedule's epoch.
    pub fn leader(&self, height: Height) -> Result<NodeId, ConsensusError> {
        if self.epochs.epoch_of(height) != self.epoch {
            return Err(ConsensusError::HeightOutsideEpoch {
                height,
                epoch: self.epoch,
            });
        }
        let n = self.order.len() as u64;
        let slot = (self.start as u64 + self.epochs.offset(height) % n) % n;
        Ok(self.order[slot as usize])
    }

    /// Move the current-leader pointer to `height`.
    pub fn advance(&mut self, height: Height) -> Result<NodeId, ConsensusError> {
        let leader = self.leader(height)?;
        self.current = Some((height, leader));
        Ok(leader)
    }

    /// Leader at the last height passed to [`advance`](Self::advance).
    pub fn current_leader(&self) -> Option<(Height, NodeId)> {
        self.current
    }

    /// Committee members in schedule order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }
}
