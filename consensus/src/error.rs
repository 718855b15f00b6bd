use thiserror::Error;

use tessera_types::{Address, Epoch, Height, NodeId};
use tessera_vrf::VrfError;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("committee for epoch {epoch} lists {member} twice")]
    DuplicateMember { epoch: Epoch, member: NodeId },

    #[error("committee for epoch {0} is empty")]
    EmptyCommittee(Epoch),

    #[error("committee for epoch {0} unavailable")]
    CommitteeUnavailable(Epoch),

    #[error("randomness for epoch {randomness} cannot seed committee of epoch {committee}")]
    EpochMismatch { committee: Epoch, randomness: Epoch },

    #[error("height {height} is outside epoch {epoch}")]
    HeightOutsideEpoch { height: Height, epoch: Epoch },

    #[error("beacon error: {0}")]
    Beacon(#[from] VrfError),

    #[error("no authorized signer")]
    SignerMissing,

    #[error("signer {0} is not an authority")]
    UnauthorizedSigner(Address),

    #[error("invalid seal: {0}")]
    InvalidSeal(String),

    #[error("sealing gave up after {0} attempts")]
    SealExhausted(u64),

    #[error("sealing interrupted")]
    SealInterrupted,

    #[error("block building failed: {0}")]
    Build(String),

    #[error("{0}")]
    Other(String),
}
