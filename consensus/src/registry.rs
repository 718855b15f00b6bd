//! Committee election and identity registry seams.

use tessera_types::{Epoch, Genesis, NodeId};

use crate::{Committee, ConsensusError};

/// Supplies the committee for an epoch.
pub trait CommitteeSource: Send + Sync {
    fn committee_for(&self, epoch: Epoch) -> Result<Committee, ConsensusError>;
}

/// Read-only view of identities holding declared (non-elected) roles.
pub trait IdentityRegistry: Send + Sync {
    /// Identities declared as relay nodes for `epoch`.
    fn broadcasters(&self, epoch: Epoch) -> Vec<NodeId>;
}

/// Election from a fixed candidate list.
///
/// Epoch `e` takes `committee_size` consecutive candidates starting at
/// `(e * committee_size) mod n`, wrapping around, so membership rotates
/// through the whole candidate list.
pub struct StaticElection {
    candidates: Vec<NodeId>,
    committee_size: usize,
    broadcasters: Vec<NodeId>,
}

impl StaticElection {
    pub fn new(candidates: Vec<NodeId>, committee_size: usize, broadcasters: Vec<NodeId>) -> Self {
        Self {
            candidates,
            committee_size,
            broadcasters,
        }
    }

    pub fn from_genesis(genesis: &Genesis) -> Self {
        Self::new(
            genesis.candidates.clone(),
            genesis.config.committee_size,
            genesis.broadcasters.clone(),
        )
    }
}

impl CommitteeSource for StaticElection {
    fn committee_for(&self, epoch: Epoch) -> Result<Committee, ConsensusError> {
        let n = self.candidates.len();
        if n == 0 || self.committee_size == 0 {
            return Err(ConsensusError::CommitteeUnavailable(epoch));
        }
        let size = self.committee_size.min(n);
        let start = (epoch.as_u64() % n as u64) as usize * size % n;
        let members = (0..size)
            .map(|i| self.candidates[(start + i) % n])
            .collect();
        Committee::new(epoch, members)
    }
}

impl IdentityRegistry for StaticElection {
    fn broadcasters(&self, _epoch: Epoch) -> Vec<NodeId> {
        self.broadcasters.clone()
    }
}
