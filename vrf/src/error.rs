use thiserror::Error;
use tessera_types::Epoch;

#[derive(Debug, Error)]
pub enum VrfError {
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("invalid proof")]
    InvalidProof,

    #[error("randomness for epoch {0} not available")]
    Unavailable(Epoch),

    #[error("provider returned randomness for epoch {got}, requested {requested}")]
    EpochMismatch { requested: Epoch, got: Epoch },

    #[error("randomness for epoch {epoch} already used for epoch {previous}")]
    Reused { epoch: Epoch, previous: Epoch },

    #[error("commit-reveal: {0}")]
    CommitReveal(String),

    #[error("{0}")]
    Other(String),
}
