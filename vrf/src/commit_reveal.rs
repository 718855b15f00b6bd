//! Commit-reveal beacon.
//!
//! For each epoch, participants first commit `sha256(value)` and later reveal
//! `value`. Once at least `quorum` reveals match their commitments the epoch's
//! randomness is `sha256(epoch_be || id_1 || value_1 || ... )` over reveals
//! sorted by participant identity. The proof carries the reveals, so any node
//! holding the commitments can recompute the value.

use std::collections::BTreeMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tessera_types::{Epoch, NodeId};

use crate::{RandomBeacon, Randomness, VrfError};

const REVEAL_LEN: usize = 64;

/// Commitment hash for a secret value.
pub fn commitment_for(value: &[u8; 32]) -> [u8; 32] {
    Sha256::digest(value).into()
}

#[derive(Default)]
struct EpochRound {
    commitments: BTreeMap<NodeId, [u8; 32]>,
    reveals: BTreeMap<NodeId, [u8; 32]>,
}

pub struct CommitRevealBeacon {
    quorum: usize,
    rounds: Mutex<BTreeMap<Epoch, EpochRound>>,
}

impl CommitRevealBeacon {
    pub fn new(quorum: usize) -> Self {
        Self {
            quorum: quorum.max(1),
            rounds: Mutex::new(BTreeMap::new()),
        }
    }

    fn rounds(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<Epoch, EpochRound>>, VrfError> {
        self.rounds
            .lock()
            .map_err(|_| VrfError::Other("commit-reveal state poisoned".into()))
    }

    /// Record a participant's commitment. A participant commits once per epoch.
    pub fn record_commitment(
        &self,
        epoch: Epoch,
        participant: NodeId,
        hash: [u8; 32],
    ) -> Result<(), VrfError> {
        let mut rounds = self.rounds()?;
        let round = rounds.entry(epoch).or_default();
        if round.commitments.contains_key(&participant) {
            return Err(VrfError::CommitReveal(format!(
                "{} already committed for epoch {}",
                participant.short(),
                epoch
            )));
        }
        round.commitments.insert(participant, hash);
        Ok(())
    }

    /// Record a reveal and check it matches the participant's commitment.
    pub fn record_reveal(
        &self,
        epoch: Epoch,
        participant: NodeId,
        value: [u8; 32],
    ) -> Result<(), VrfError> {
        let mut rounds = self.rounds()?;
        let round = rounds.get_mut(&epoch).ok_or_else(|| {
            VrfError::CommitReveal(format!("no commitments for epoch {}", epoch))
        })?;
        let committed = round.commitments.get(&participant).ok_or_else(|| {
            VrfError::CommitReveal(format!("{} did not commit", participant.short()))
        })?;
        if *committed != commitment_for(&value) {
            tracing::warn!(
                participant = %participant.short(),
                %epoch,
                "reveal does not match commitment"
            );
            return Err(VrfError::CommitReveal(format!(
                "reveal from {} does not match commitment",
                participant.short()
            )));
        }
        round.reveals.insert(participant, value);
        Ok(())
    }

    /// Number of accepted reveals for `epoch`.
    pub fn reveal_count(&self, epoch: Epoch) -> usize {
        self.rounds()
            .map(|r| r.get(&epoch).map(|round| round.reveals.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Drop rounds older than `epoch`.
    pub fn prune_before(&self, epoch: Epoch) -> Result<(), VrfError> {
        let mut rounds = self.rounds()?;
        *rounds = rounds.split_off(&epoch);
        Ok(())
    }

    fn combine(epoch: Epoch, reveals: &BTreeMap<NodeId, [u8; 32]>) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(epoch.as_u64().to_be_bytes());
        for (id, value) in reveals {
            hasher.update(id.as_bytes());
            hasher.update(value);
        }
        hasher.finalize().into()
    }

    fn encode_proof(reveals: &BTreeMap<NodeId, [u8; 32]>) -> Vec<u8> {
        let mut proof = Vec::with_capacity(reveals.len() * REVEAL_LEN);
        for (id, value) in reveals {
            proof.extend_from_slice(id.as_bytes());
            proof.extend_from_slice(value);
        }
        proof
    }

    fn decode_proof(proof: &[u8]) -> Result<BTreeMap<NodeId, [u8; 32]>, VrfError> {
        if proof.len() % REVEAL_LEN != 0 {
            return Err(VrfError::InvalidProof);
        }
        let mut reveals = BTreeMap::new();
        for chunk in proof.chunks_exact(REVEAL_LEN) {
            let mut id = [0u8; 32];
            let mut value = [0u8; 32];
            id.copy_from_slice(&chunk[..32]);
            value.copy_from_slice(&chunk[32..]);
            if reveals.insert(NodeId::new(id), value).is_some() {
                return Err(VrfError::InvalidProof);
            }
        }
        Ok(reveals)
    }
}

impl RandomBeacon for CommitRevealBeacon {
    fn randomness_for(&self, epoch: Epoch) -> Result<Randomness, VrfError> {
        let rounds = self.rounds()?;
        let round = rounds.get(&epoch).ok_or(VrfError::Unavailable(epoch))?;
        if round.reveals.len() < self.quorum {
            tracing::debug!(
                %epoch,
                reveals = round.reveals.len(),
                quorum = self.quorum,
                "not enough reveals"
            );
            return Err(VrfError::Unavailable(epoch));
        }
        Ok(Randomness {
            epoch,
            value: Self::combine(epoch, &round.reveals),
            proof: Self::encode_proof(&round.reveals),
        })
    }

    fn verify(&self, output: &Randomness) -> Result<bool, VrfError> {
        let reveals = Self::decode_proof(&output.proof)?;
        if reveals.len() < self.quorum {
            return Ok(false);
        }
        let rounds = self.rounds()?;
        let Some(round) = rounds.get(&output.epoch) else {
            return Err(VrfError::Unavailable(output.epoch));
        };
        for (id, value) in &reveals {
            match round.commitments.get(id) {
                Some(c) if *c == commitment_for(value) => {}
                _ => return Ok(false),
            }
        }
        Ok(Self::combine(output.epoch, &reveals) == output.value)
    }

    fn name(&self) -> &str {
        "commit-reveal"
    }
}
