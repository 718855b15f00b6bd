//! Nullable consensus collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use tessera_consensus::{
    BlockBuilder, BlockVerifier, BuildContext, Committee, CommitteeSource, ConsensusError,
    IdentityRegistry,
};
use tessera_types::{Block, Epoch, NodeId};

/// The same members and relays every epoch.
pub struct FixedCommittee {
    members: Vec<NodeId>,
    broadcasters: Vec<NodeId>,
}

impl FixedCommittee {
    pub fn new(members: Vec<NodeId>, broadcasters: Vec<NodeId>) -> Self {
        Self {
            members,
            broadcasters,
        }
    }
}

impl CommitteeSource for FixedCommittee {
    fn committee_for(&self, epoch: Epoch) -> Result<Committee, ConsensusError> {
        Committee::new(epoch, self.members.clone())
    }
}

impl IdentityRegistry for FixedCommittee {
    fn broadcasters(&self, _epoch: Epoch) -> Vec<NodeId> {
        self.broadcasters.clone()
    }
}

/// Returns a fixed body and counts builds. Can be held so a build blocks
/// until released.
#[derive(Default)]
pub struct NullBuilder {
    body: Vec<Vec<u8>>,
    builds: AtomicUsize,
    fail: Mutex<Option<String>>,
    held: Mutex<bool>,
    released: Condvar,
}

impl NullBuilder {
    pub fn new(body: Vec<Vec<u8>>) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// Make every build fail with `reason`.
    pub fn fail_with(&self, reason: &str) {
        *self.fail.lock().unwrap() = Some(reason.to_string());
    }

    /// Block every build, after it is counted, until [`release`](Self::release).
    pub fn hold(&self) {
        *self.held.lock().unwrap() = true;
    }

    pub fn release(&self) {
        *self.held.lock().unwrap() = false;
        self.released.notify_all();
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl BlockBuilder for NullBuilder {
    fn build_body(&self, _ctx: &BuildContext) -> Result<Vec<Vec<u8>>, ConsensusError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let mut held = self.held.lock().unwrap();
        while *held {
            held = self.released.wait(held).unwrap();
        }
        drop(held);
        if let Some(reason) = self.fail.lock().unwrap().clone() {
            return Err(ConsensusError::Build(reason));
        }
        Ok(self.body.clone())
    }
}

/// Accepts every body unless told to reject; counts checks.
#[derive(Default)]
pub struct NullVerifier {
    reject: Mutex<Option<String>>,
    checks: AtomicUsize,
}

impl NullVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_with(&self, reason: &str) {
        *self.reject.lock().unwrap() = Some(reason.to_string());
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl BlockVerifier for NullVerifier {
    fn verify_body(&self, _block: &Block) -> Result<(), String> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        match self.reject.lock().unwrap().clone() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}
