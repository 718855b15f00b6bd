//! Validator duty: check candidates, cache verdicts and report them to the
//! vote aggregator.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use tessera_consensus::{BlockVerifier, Engine, RoundDuty};
use tessera_crypto::verify_block_signature;
use tessera_types::{tx_root, Block, BlockHash, Epoch, Height, NodeId, Role};

use crate::{tracing_spans, NodeMetrics};

/// Why a candidate was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    WrongHeight { expected: Height, got: Height },
    WrongEpoch { expected: Epoch, got: Epoch },
    NotScheduledLeader { expected: NodeId, got: NodeId },
    /// The validator holds no roster to check the producer against.
    NoRoster,
    BadSignature,
    /// Engine header verification failed.
    Header(String),
    TxRoot,
    /// The body verifier refused the block.
    Body(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongHeight { expected, got } => {
                write!(f, "height {got}, duty is for {expected}")
            }
            Self::WrongEpoch { expected, got } => write!(f, "epoch {got}, duty is for {expected}"),
            Self::NotScheduledLeader { expected, got } => write!(
                f,
                "produced by {}, scheduled leader is {}",
                got.short(),
                expected.short()
            ),
            Self::NoRoster => f.write_str("no duty roster"),
            Self::BadSignature => f.write_str("bad producer signature"),
            Self::Header(e) => write!(f, "header: {e}"),
            Self::TxRoot => f.write_str("transaction root mismatch"),
            Self::Body(e) => write!(f, "body: {e}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub height: Height,
    pub hash: BlockHash,
    pub accepted: bool,
    pub reason: Option<RejectReason>,
}

impl Verdict {
    fn from_result(height: Height, hash: BlockHash, result: Result<(), RejectReason>) -> Self {
        match result {
            Ok(()) => Self {
                height,
                hash,
                accepted: true,
                reason: None,
            },
            Err(reason) => Self {
                height,
                hash,
                accepted: false,
                reason: Some(reason),
            },
        }
    }
}

/// Bounded FIFO of verdicts keyed by (height, hash).
struct VerdictCache {
    entries: HashMap<(Height, BlockHash), Verdict>,
    order: VecDeque<(Height, BlockHash)>,
    capacity: usize,
}

impl VerdictCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &(Height, BlockHash)) -> Option<Verdict> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, verdict: Verdict) {
        let key = (verdict.height, verdict.hash);
        if self.entries.insert(key, verdict).is_some() {
            return;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }
}

pub struct BlockValidator {
    engine: Arc<Engine>,
    verifier: Arc<dyn BlockVerifier>,
    cache: Mutex<VerdictCache>,
    votes: mpsc::Sender<Verdict>,
    checks: AtomicUsize,
    metrics: Arc<NodeMetrics>,
}

impl BlockValidator {
    pub fn new(
        engine: Arc<Engine>,
        verifier: Arc<dyn BlockVerifier>,
        votes: mpsc::Sender<Verdict>,
        cache_capacity: usize,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        Self {
            engine,
            verifier,
            cache: Mutex::new(VerdictCache::new(cache_capacity)),
            votes,
            checks: AtomicUsize::new(0),
            metrics,
        }
    }

    /// Full checks run so far; cached answers are not counted.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::Relaxed)
    }

    /// Judge `block` under `duty` without reporting the verdict.
    ///
    /// `None` unless the duty is Validator. A repeated (height, hash) gets
    /// the cached verdict without re-checking.
    pub fn validate(&self, duty: &RoundDuty, block: &Block) -> Option<Verdict> {
        self.evaluate(duty, block).map(|(verdict, _)| verdict)
    }

    /// Judge `block` and hand a new verdict, rejections included, to the
    /// vote aggregator. Waits for queue space; cached verdicts are not
    /// reported again.
    pub async fn validate_and_report(&self, duty: &RoundDuty, block: &Block) -> Option<Verdict> {
        let (verdict, fresh) = self.evaluate(duty, block)?;
        if fresh && self.votes.send(verdict.clone()).await.is_err() {
            tracing::warn!(height = %verdict.height, "vote aggregator gone, verdict not reported");
        }
        Some(verdict)
    }

    /// The verdict, and whether it was freshly checked.
    fn evaluate(&self, duty: &RoundDuty, block: &Block) -> Option<(Verdict, bool)> {
        if duty.role != Role::Validator {
            return None;
        }
        let hash = block.hash();
        let key = (block.height(), hash);
        if let Some(cached) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            tracing::trace!(height = %key.0, %hash, "cached verdict");
            return Some((cached, false));
        }

        let _span = tracing_spans::verify_span(block.height(), &hash).entered();
        self.checks.fetch_add(1, Ordering::Relaxed);
        let verdict = Verdict::from_result(block.height(), hash, self.check(duty, block));
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(verdict.clone());

        match &verdict.reason {
            None => {
                self.metrics.verdicts.with_label_values(&["accepted"]).inc();
                tracing::debug!(height = %verdict.height, %hash, "candidate accepted");
            }
            Some(reason) => {
                self.metrics.verdicts.with_label_values(&["rejected"]).inc();
                tracing::warn!(height = %verdict.height, %hash, %reason, "candidate rejected");
            }
        }
        Some((verdict, true))
    }

    fn check(&self, duty: &RoundDuty, block: &Block) -> Result<(), RejectReason> {
        let header = block.header();
        if header.height != duty.height {
            return Err(RejectReason::WrongHeight {
                expected: duty.height,
                got: header.height,
            });
        }
        if header.epoch != duty.epoch {
            return Err(RejectReason::WrongEpoch {
                expected: duty.epoch,
                got: header.epoch,
            });
        }
        let roster = duty.roster.as_ref().ok_or(RejectReason::NoRoster)?;
        if header.producer != roster.producer() {
            return Err(RejectReason::NotScheduledLeader {
                expected: roster.producer(),
                got: header.producer,
            });
        }
        self.verify_block(block)
    }

    /// Duty-independent checks: signature, engine header, tx root, body.
    pub fn verify_block(&self, block: &Block) -> Result<(), RejectReason> {
        if !verify_block_signature(block) {
            return Err(RejectReason::BadSignature);
        }
        self.engine
            .verify_header(block.header())
            .map_err(|e| RejectReason::Header(e.to_string()))?;
        if tx_root(block.body()) != block.header().tx_root {
            return Err(RejectReason::TxRoot);
        }
        self.verifier.verify_body(block).map_err(RejectReason::Body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_consensus::{
        Committee, EpochSchedule, LeaderSchedule, PowMode, RoleResolver, WorkEngine,
    };
    use tessera_crypto::{keypair_from_seed, sign_header};
    use tessera_nullables::NullVerifier;
    use tessera_types::{Address, BlockHeader, KeyPair, Signature};
    use tessera_vrf::Randomness;

    struct Fixture {
        producer: KeyPair,
        validator: BlockValidator,
        verifier: Arc<NullVerifier>,
        votes: mpsc::Receiver<Verdict>,
        duty: RoundDuty,
    }

    fn fixture() -> Fixture {
        let producer = keypair_from_seed(&[1u8; 32]);
        let local = keypair_from_seed(&[2u8; 32]);
        let producer_id = NodeId::from_public_key(&producer.public);
        let local_id = NodeId::from_public_key(&local.public);

        let mut members = vec![producer_id, local_id];
        members.sort();
        let start = members.iter().position(|m| *m == producer_id).unwrap() as u64;
        let committee = Committee::new(Epoch::new(0), members).unwrap();
        let mut value = [0u8; 32];
        value[..8].copy_from_slice(&start.to_be_bytes());
        let randomness = Randomness {
            epoch: Epoch::new(0),
            value,
            proof: Vec::new(),
        };
        // height 0 is the epoch start, so slot `start` produces it
        let schedule =
            LeaderSchedule::derive(&committee, &randomness, EpochSchedule::new(100)).unwrap();
        let duty = RoleResolver::new(local_id).resolve(
            Height::new(0),
            Epoch::new(0),
            Some(&committee),
            Some(&schedule),
            &[],
        );
        assert_eq!(duty.role, Role::Validator);

        let verifier = Arc::new(NullVerifier::new());
        let (tx, rx) = mpsc::channel(16);
        let validator = BlockValidator::new(
            Arc::new(Engine::Work(WorkEngine::new(PowMode::Fake))),
            verifier.clone(),
            tx,
            64,
            Arc::new(NodeMetrics::new()),
        );
        Fixture {
            producer,
            validator,
            verifier,
            votes: rx,
            duty,
        }
    }

    fn candidate(signer: &KeyPair, height: u64, body: Vec<Vec<u8>>) -> Block {
        let header = BlockHeader {
            parent: BlockHash::ZERO,
            height: Height::new(height),
            epoch: Epoch::new(0),
            producer: NodeId::from_public_key(&signer.public),
            coinbase: Address::ZERO,
            timestamp: 1,
            tx_root: tx_root(&body),
            extra: Vec::new(),
            nonce: 0,
        };
        let sig = sign_header(&header, &signer.private);
        Block::new(header, body, sig)
    }

    #[tokio::test]
    async fn accepts_the_scheduled_leaders_block() {
        let mut f = fixture();
        let block = candidate(&f.producer, 0, vec![b"tx".to_vec()]);
        let verdict = f.validator.validate_and_report(&f.duty, &block).await.unwrap();
        assert!(verdict.accepted);
        assert_eq!(f.votes.try_recv().unwrap(), verdict);
    }

    #[tokio::test]
    async fn rejections_are_reported_with_reason() {
        let mut f = fixture();
        let intruder = keypair_from_seed(&[3u8; 32]);
        let block = candidate(&intruder, 0, Vec::new());
        let verdict = f.validator.validate_and_report(&f.duty, &block).await.unwrap();
        assert!(!verdict.accepted);
        assert!(matches!(
            verdict.reason,
            Some(RejectReason::NotScheduledLeader { .. })
        ));
        let reported = f.votes.try_recv().unwrap();
        assert_eq!(reported.reason, verdict.reason);
    }

    #[tokio::test]
    async fn repeated_requests_use_the_cache() {
        let mut f = fixture();
        let block = candidate(&f.producer, 0, Vec::new());
        let first = f.validator.validate_and_report(&f.duty, &block).await.unwrap();
        let second = f.validator.validate_and_report(&f.duty, &block).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.validator.checks(), 1);
        assert_eq!(f.verifier.checks(), 1);
        assert!(f.votes.try_recv().is_ok());
        assert!(f.votes.try_recv().is_err());
    }

    #[tokio::test]
    async fn reporting_waits_for_queue_space() {
        let producer = keypair_from_seed(&[1u8; 32]);
        let mut f = fixture();
        let (tx, mut rx) = mpsc::channel(1);
        let validator = Arc::new(BlockValidator::new(
            Arc::new(Engine::Work(WorkEngine::new(PowMode::Fake))),
            f.verifier.clone(),
            tx,
            64,
            Arc::new(NodeMetrics::new()),
        ));
        let intruder = keypair_from_seed(&[3u8; 32]);
        let accepted = candidate(&producer, 0, Vec::new());
        let rejected = candidate(&intruder, 0, Vec::new());

        validator.validate_and_report(&f.duty, &accepted).await.unwrap();
        // queue is full; the second report must wait rather than be dropped
        let duty = f.duty.clone();
        let pending = {
            let validator = validator.clone();
            tokio::spawn(async move { validator.validate_and_report(&duty, &rejected).await })
        };
        tokio::task::yield_now().await;
        assert!(rx.recv().await.unwrap().accepted);
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second.reason,
            Some(RejectReason::NotScheduledLeader { .. })
        ));
        assert_eq!(pending.await.unwrap(), Some(second));
        assert!(f.votes.try_recv().is_err());
    }

    #[test]
    fn validate_alone_reports_nothing() {
        let mut f = fixture();
        let block = candidate(&f.producer, 0, Vec::new());
        assert!(f.validator.validate(&f.duty, &block).unwrap().accepted);
        assert!(f.votes.try_recv().is_err());
    }

    #[test]
    fn tampered_and_mismatched_blocks_are_rejected() {
        let f = fixture();

        let block = candidate(&f.producer, 0, vec![b"a".to_vec()]);
        let forged = Block::new(block.header().clone(), block.body().to_vec(), Signature::EMPTY);
        let v = f.validator.validate(&f.duty, &forged).unwrap();
        assert_eq!(v.reason, Some(RejectReason::BadSignature));

        let mut header = block.header().clone();
        header.tx_root = [9u8; 32];
        let sig = sign_header(&header, &f.producer.private);
        let wrong_root = Block::new(header, block.body().to_vec(), sig);
        let v = f.validator.validate(&f.duty, &wrong_root).unwrap();
        assert_eq!(v.reason, Some(RejectReason::TxRoot));

        let later = candidate(&f.producer, 1, Vec::new());
        let v = f.validator.validate(&f.duty, &later).unwrap();
        assert!(matches!(v.reason, Some(RejectReason::WrongHeight { .. })));
    }

    #[test]
    fn body_verifier_has_the_last_word() {
        let f = fixture();
        f.verifier.reject_with("too many transactions");
        let block = candidate(&f.producer, 0, Vec::new());
        let v = f.validator.validate(&f.duty, &block).unwrap();
        assert_eq!(
            v.reason,
            Some(RejectReason::Body("too many transactions".into()))
        );
    }

    #[test]
    fn non_validator_duty_is_not_judged() {
        let f = fixture();
        let block = candidate(&f.producer, 0, Vec::new());
        let passive = RoundDuty::passive(Height::new(0), Epoch::new(0));
        assert!(f.validator.validate(&passive, &block).is_none());
        assert_eq!(f.validator.checks(), 0);
    }
}
