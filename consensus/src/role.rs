//! Role resolution for a height.
//!
//! Priority: the scheduled leader is the Producer, other committee members
//! are Validators, declared relays outside the committee are Broadcast, and
//! everyone else is Passive. A published [`RoundDuty`] is only valid for the
//! height it was computed for.

use std::sync::Arc;

use tessera_types::{Epoch, Height, NodeId, Role};

use crate::{Committee, LeaderSchedule};

/// The role partition over all duty-holding identities at one height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DutyRoster {
    height: Height,
    epoch: Epoch,
    producer: NodeId,
    validators: Vec<NodeId>,
    broadcasters: Vec<NodeId>,
}

impl DutyRoster {
    pub fn height(&self) -> Height {
        self.height
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn producer(&self) -> NodeId {
        self.producer
    }

    pub fn validators(&self) -> &[NodeId] {
        &self.validators
    }

    pub fn broadcasters(&self) -> &[NodeId] {
        &self.broadcasters
    }

    pub fn role_of(&self, id: &NodeId) -> Role {
        if *id == self.producer {
            Role::Producer
        } else if self.validators.contains(id) {
            Role::Validator
        } else if self.broadcasters.contains(id) {
            Role::Broadcast
        } else {
            Role::Passive
        }
    }

    /// Every duty-holding identity with its role.
    pub fn assignments(&self) -> impl Iterator<Item = (NodeId, Role)> + '_ {
        std::iter::once((self.producer, Role::Producer))
            .chain(self.validators.iter().map(|id| (*id, Role::Validator)))
            .chain(self.broadcasters.iter().map(|id| (*id, Role::Broadcast)))
    }

    /// Identities that should be told about a new block at this height.
    pub fn announcement_targets(&self) -> impl Iterator<Item = (NodeId, Role)> + '_ {
        self.assignments()
            .filter(|(_, role)| role.receives_announcements())
    }
}

/// The local node's duty at one height, published by the chain follower.
#[derive(Clone, Debug)]
pub struct RoundDuty {
    pub height: Height,
    pub epoch: Epoch,
    pub role: Role,
    /// Absent when the resolver failed safe to Passive.
    pub roster: Option<Arc<DutyRoster>>,
}

impl RoundDuty {
    pub fn passive(height: Height, epoch: Epoch) -> Self {
        Self {
            height,
            epoch,
            role: Role::Passive,
            roster: None,
        }
    }

    /// Role at `height`: this duty's role when the heights match, otherwise
    /// Passive.
    pub fn role_at(&self, height: Height) -> Role {
        if height == self.height {
            self.role
        } else {
            Role::Passive
        }
    }
}

pub struct RoleResolver {
    local: NodeId,
}

impl RoleResolver {
    pub fn new(local: NodeId) -> Self {
        Self { local }
    }

    pub fn local(&self) -> NodeId {
        self.local
    }

    /// Partition identities at `height`. `None` when the committee or the
    /// schedule is missing or does not cover the height.
    pub fn partition(
        height: Height,
        committee: Option<&Committee>,
        schedule: Option<&LeaderSchedule>,
        broadcasters: &[NodeId],
    ) -> Option<DutyRoster> {
        let committee = committee?;
        let schedule = schedule?;
        if schedule.epoch() != committee.epoch() {
            return None;
        }
        let producer = schedule.leader(height).ok()?;
        if !committee.contains(&producer) {
            return None;
        }

        let validators: Vec<NodeId> = committee
            .members()
            .iter()
            .filter(|id| **id != producer)
            .copied()
            .collect();
        let mut relays: Vec<NodeId> = Vec::with_capacity(broadcasters.len());
        for id in broadcasters {
            if !committee.contains(id) && !relays.contains(id) {
                relays.push(*id);
            }
        }

        Some(DutyRoster {
            height,
            epoch: committee.epoch(),
            producer,
            validators,
            broadcasters: relays,
        })
    }

    /// Resolve the local node's duty at `height`. Missing inputs fail safe
    /// to Passive.
    pub fn resolve(
        &self,
        height: Height,
        epoch: Epoch,
        committee: Option<&Committee>,
        schedule: Option<&LeaderSchedule>,
        broadcasters: &[NodeId],
    ) -> RoundDuty {
        match Self::partition(height, committee, schedule, broadcasters) {
            Some(roster) => RoundDuty {
                height,
                epoch,
                role: roster.role_of(&self.local),
                roster: Some(Arc::new(roster)),
            },
            None => {
                tracing::warn!(
                    %height,
                    %epoch,
                    has_committee = committee.is_some(),
                    has_schedule = schedule.is_some(),
                    "duty inputs unavailable, fail safe to inactive"
                );
                RoundDuty::passive(height, epoch)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EpochSchedule;
    use tessera_vrf::Randomness;

    fn id(b: u8) -> NodeId {
        NodeId::new([b; 32])
    }

    fn setup() -> (Committee, LeaderSchedule) {
        let committee = Committee::new(Epoch::new(0), vec![id(1), id(2), id(3)]).unwrap();
        let randomness = Randomness {
            epoch: Epoch::new(0),
            value: [0u8; 32],
            proof: Vec::new(),
        };
        let schedule =
            LeaderSchedule::derive(&committee, &randomness, EpochSchedule::new(10)).unwrap();
        (committee, schedule)
    }

    #[test]
    fn priority_order() {
        let (committee, schedule) = setup();
        let relays = [id(9), id(2)];
        // seed 0 -> start 0 -> leader at height 0 is id(1)
        let roster =
            RoleResolver::partition(Height::new(0), Some(&committee), Some(&schedule), &relays)
                .unwrap();
        assert_eq!(roster.role_of(&id(1)), Role::Producer);
        assert_eq!(roster.role_of(&id(2)), Role::Validator);
        assert_eq!(roster.role_of(&id(9)), Role::Broadcast);
        assert_eq!(roster.role_of(&id(7)), Role::Passive);
        assert_eq!(roster.broadcasters(), &[id(9)]);
    }

    #[test]
    fn missing_inputs_fail_safe() {
        let (committee, _) = setup();
        let resolver = RoleResolver::new(id(1));
        let duty = resolver.resolve(Height::new(0), Epoch::new(0), Some(&committee), None, &[]);
        assert_eq!(duty.role, Role::Passive);
        assert!(duty.roster.is_none());
    }

    #[test]
    fn duty_is_passive_at_other_heights() {
        let (committee, schedule) = setup();
        let resolver = RoleResolver::new(id(1));
        let duty = resolver.resolve(
            Height::new(0),
            Epoch::new(0),
            Some(&committee),
            Some(&schedule),
            &[],
        );
        assert_eq!(duty.role_at(Height::new(0)), Role::Producer);
        assert_eq!(duty.role_at(Height::new(1)), Role::Passive);
    }

    #[test]
    fn announcement_targets_exclude_producer() {
        let (committee, schedule) = setup();
        let roster =
            RoleResolver::partition(Height::new(1), Some(&committee), Some(&schedule), &[id(9)])
                .unwrap();
        let targets: Vec<_> = roster.announcement_targets().map(|(id, _)| id).collect();
        assert_eq!(targets.len(), 3);
        assert!(!targets.contains(&roster.producer()));
    }
}
