//! Committee membership for one epoch.

use std::collections::HashSet;

use tessera_types::{Epoch, NodeId};

use crate::ConsensusError;

/// The ordered set of identities eligible to produce and validate during one
/// epoch. Order is the election order and drives the leader schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Committee {
    epoch: Epoch,
    members: Vec<NodeId>,
}

impl Committee {
    /// Build a committee. Duplicate members and empty committees are refused.
    pub fn new(epoch: Epoch, members: Vec<NodeId>) -> Result<Self, ConsensusError> {
        if members.is_empty() {
            return Err(ConsensusError::EmptyCommittee(epoch));
        }
        let mut seen = HashSet::with_capacity(members.len());
        for member in &members {
            if !seen.insert(*member) {
                return Err(ConsensusError::DuplicateMember {
                    epoch,
                    member: *member,
                });
            }
        }
        Ok(Self { epoch, members })
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.members.contains(id)
    }
}
