//! The duty pipeline.
//!
//! The [`ChainFollower`] consumes head updates in order. For each new head
//! at height `h` it advances committee rotation, derives the leader schedule
//! when a new epoch begins, resolves the local duty for `h + 1`, publishes
//! it, and only then activates the producer or validator worker. Workers
//! read the duty from the activation message itself, never from shared
//! mutable state.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};

use tessera_consensus::{
    CommitteeRotation, IdentityRegistry, LeaderSchedule, RoleResolver, RotationEvent, RoundDuty,
};
use tessera_network::{ProtocolManager, TxPool};
use tessera_types::{Block, BlockHash, Epoch, Height, Role};
use tessera_vrf::RandomBeacon;

use crate::bloom::BloomIndexer;
use crate::mining::MiningControl;
use crate::notifier::PeerNotifier;
use crate::producer::BlockProducer;
use crate::rounds::{EpochBook, EpochView};
use crate::validator::{BlockValidator, Verdict};
use crate::{tracing_spans, unix_now_secs, NodeEvent, ServiceContext};

/// Candidates buffered ahead of the validator's current duty.
const MAX_FUTURE_CANDIDATES: usize = 64;

/// A new chain head, with the body when it is known.
#[derive(Clone, Debug)]
pub struct HeadUpdate {
    pub height: Height,
    pub hash: BlockHash,
    pub body: Vec<Vec<u8>>,
}

impl HeadUpdate {
    pub fn of_block(block: &Block) -> Self {
        Self {
            height: block.height(),
            hash: block.hash(),
            body: block.body().to_vec(),
        }
    }
}

/// Producer activation: the duty to act on and the head to build on.
#[derive(Clone, Debug)]
pub struct ProduceRequest {
    pub duty: Arc<RoundDuty>,
    pub parent: BlockHash,
}

/// Where the follower publishes and whom it activates.
pub struct DutyChannels {
    pub book: watch::Sender<Arc<EpochBook>>,
    pub duty: watch::Sender<Arc<RoundDuty>>,
    pub produce: mpsc::Sender<ProduceRequest>,
    pub validate: mpsc::Sender<Arc<RoundDuty>>,
}

/// Single writer of the epoch book and the current duty.
pub struct ChainFollower {
    resolver: RoleResolver,
    rotation: CommitteeRotation,
    beacon: Arc<dyn RandomBeacon>,
    registry: Arc<dyn IdentityRegistry>,
    /// Schedule of the current epoch, advanced height by height.
    schedule: Option<LeaderSchedule>,
    book: Arc<EpochBook>,
    channels: DutyChannels,
    bloom: Arc<BloomIndexer>,
    retain: u64,
    head: Option<(Height, BlockHash)>,
    ctx: ServiceContext,
}

impl ChainFollower {
    pub fn new(
        resolver: RoleResolver,
        rotation: CommitteeRotation,
        beacon: Arc<dyn RandomBeacon>,
        registry: Arc<dyn IdentityRegistry>,
        bloom: Arc<BloomIndexer>,
        channels: DutyChannels,
        ctx: ServiceContext,
    ) -> Self {
        let retain = ctx.config.retain_epochs;
        Self {
            resolver,
            rotation,
            beacon,
            registry,
            schedule: None,
            book: Arc::new(EpochBook::default()),
            channels,
            bloom,
            retain,
            head: None,
            ctx,
        }
    }

    pub fn head(&self) -> Option<(Height, BlockHash)> {
        self.head
    }

    /// Accept a new head and resolve the duty for the height after it.
    /// Heights at or below the current head are ignored.
    pub fn on_head(&mut self, update: HeadUpdate) -> Option<Arc<RoundDuty>> {
        if matches!(self.head, Some((h, _)) if update.height <= h) {
            tracing::trace!(height = %update.height, "stale head ignored");
            return None;
        }
        self.bloom.process(update.height, &update.body);
        self.head = Some((update.height, update.hash));
        self.ctx.metrics.head_height.set(update.height.as_u64() as i64);
        self.ctx.events.emit(&NodeEvent::HeadImported {
            height: update.height,
            hash: update.hash,
        });
        Some(self.round(update.height.next(), update.hash))
    }

    fn round(&mut self, height: Height, parent: BlockHash) -> Arc<RoundDuty> {
        let epoch = self.rotation.epochs().epoch_of(height);
        let _span = tracing_spans::round_span(height, epoch).entered();
        self.ctx.metrics.rounds.inc();

        match self.rotation.advance_to(height) {
            Ok(Some(event)) => self.on_rotation(&event),
            Ok(None) => {}
            Err(e) => tracing::warn!(%height, %epoch, error = %e, "committee rotation failed"),
        }
        if self.schedule.as_ref().map(|s| s.epoch()) != Some(epoch) {
            self.retry_schedule(epoch);
        }

        let committee = self
            .rotation
            .current_committee(height)
            .filter(|c| c.epoch() == epoch);
        let schedule = self.schedule.as_mut().filter(|s| s.epoch() == epoch);
        if let Some(schedule) = schedule {
            if let Err(e) = schedule.advance(height) {
                tracing::warn!(%height, error = %e, "leader schedule does not cover height");
            }
        }
        let broadcasters = self
            .book
            .view(epoch)
            .map(|v| v.broadcasters.clone())
            .unwrap_or_default();
        let duty = Arc::new(self.resolver.resolve(
            height,
            epoch,
            committee.as_deref(),
            self.schedule.as_ref().filter(|s| s.epoch() == epoch),
            &broadcasters,
        ));

        // Publish before activating anyone.
        self.channels.duty.send_replace(duty.clone());
        self.ctx
            .metrics
            .roles
            .with_label_values(&[duty.role.as_str()])
            .inc();
        self.ctx.events.emit(&NodeEvent::DutyAssigned {
            height,
            role: duty.role,
        });
        tracing::debug!(%height, role = %duty.role, "duty resolved");

        if let Err(e) = self.channels.validate.try_send(duty.clone()) {
            tracing::warn!(%height, error = %e, "validator worker not keeping up");
        }
        if duty.role == Role::Producer {
            let request = ProduceRequest {
                duty: duty.clone(),
                parent,
            };
            if let Err(e) = self.channels.produce.try_send(request) {
                tracing::warn!(%height, error = %e, "producer worker not keeping up");
            }
        }
        duty
    }

    fn on_rotation(&mut self, event: &RotationEvent) {
        let _span = tracing_spans::rotation_span(event.epoch).entered();
        self.schedule = None;
        self.publish_view(event.epoch);
        self.ctx.metrics.rotations.inc();
        self.ctx.metrics.current_epoch.set(event.epoch.as_u64() as i64);
        self.ctx.events.emit(&NodeEvent::CommitteeRotated {
            epoch: event.epoch,
            height: event.height,
        });
    }

    /// Randomness may arrive after the boundary (commit-reveal); until it
    /// does the epoch stays unscheduled and every duty is Passive.
    fn retry_schedule(&mut self, epoch: Epoch) {
        if self.rotation.current_epoch() != Some(epoch) {
            return;
        }
        let unscheduled = self
            .book
            .view(epoch)
            .map_or(true, |v| v.schedule.is_none());
        if unscheduled {
            self.publish_view(epoch);
        }
    }

    fn publish_view(&mut self, epoch: Epoch) {
        let Some(committee) = self.rotation.current_committee(self.rotation.epochs().first_height(epoch))
        else {
            return;
        };
        let schedule = match self.beacon.randomness_for(epoch) {
            Ok(randomness) => {
                match LeaderSchedule::derive(&committee, &randomness, *self.rotation.epochs()) {
                    Ok(schedule) => Some(schedule),
                    Err(e) => {
                        tracing::warn!(%epoch, error = %e, "leader schedule derivation failed");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(%epoch, error = %e, "epoch randomness unavailable");
                None
            }
        };
        let view = EpochView {
            epoch,
            committee,
            schedule: schedule.clone().map(Arc::new),
            broadcasters: self.registry.broadcasters(epoch),
        };
        self.schedule = schedule;
        self.book = Arc::new(self.book.with(view, self.retain));
        self.channels.book.send_replace(self.book.clone());
    }

    /// Follow heads until shutdown or until every sender is gone.
    pub async fn run(
        mut self,
        genesis: BlockHash,
        mut heads: mpsc::Receiver<HeadUpdate>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        self.on_head(HeadUpdate {
            height: Height::GENESIS,
            hash: genesis,
            body: Vec::new(),
        });
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!("chain follower shutting down");
                    break;
                }
                update = heads.recv() => match update {
                    Some(update) => {
                        self.on_head(update);
                    }
                    None => break,
                },
            }
        }
    }
}

/// What happens to a block the node accepts as its next head.
pub struct ChainOutlet {
    pub protocol: Arc<ProtocolManager>,
    pub notifier: Arc<PeerNotifier>,
    pub txpool: Arc<dyn TxPool>,
    pub heads: mpsc::Sender<HeadUpdate>,
}

impl ChainOutlet {
    /// Serve, drop included transactions and hand to the follower.
    pub fn import(&self, block: &Block) {
        self.protocol.serve_block(block.clone());
        self.txpool.remove_included(block.body());
        if let Err(e) = self.heads.try_send(HeadUpdate::of_block(block)) {
            tracing::warn!(height = %block.height(), error = %e, "head queue full, block dropped");
        }
    }

    /// Import, then announce to the height's duty-holders.
    pub fn import_and_announce(&self, block: &Block) {
        self.import(block);
        self.notifier.fetcher_notify(block.hash(), block.height());
    }
}

/// Whether `request` still matches the latest published duty.
fn still_owned(current: &watch::Receiver<Arc<RoundDuty>>, request: &ProduceRequest) -> bool {
    let current = current.borrow();
    current.height == request.duty.height && current.role == Role::Producer
}

pub async fn run_producer(
    ctx: ServiceContext,
    producer: Arc<BlockProducer>,
    mining: Arc<MiningControl>,
    outlet: Arc<ChainOutlet>,
    current: watch::Receiver<Arc<RoundDuty>>,
    mut requests: mpsc::Receiver<ProduceRequest>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    // Latest request that arrived while mining was off.
    let mut parked: Option<ProduceRequest> = None;
    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                tracing::info!("producer worker shutting down");
                break;
            }
            request = requests.recv() => match request {
                Some(r) => r,
                None => break,
            },
            _ = mining.nudged() => match parked.take() {
                Some(r) => r,
                None => continue,
            },
        };

        if !still_owned(&current, &request) {
            tracing::debug!(height = %request.duty.height, "stale producer duty dropped");
            continue;
        }

        let state = mining.snapshot().await;
        if !state.mining {
            tracing::debug!(height = %request.duty.height, "mining disabled, producer duty parked");
            parked = Some(request);
            continue;
        }

        let task_producer = producer.clone();
        let duty = request.duty.clone();
        let mut task = tokio::task::spawn_blocking(move || {
            task_producer.produce(&duty, request.parent, state.etherbase, unix_now_secs())
        });
        let produced = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                producer.halt();
                tracing::info!(height = %request.duty.height, "producer worker shutting down mid-production");
                break;
            }
            produced = &mut task => produced,
        };
        match produced {
            Ok(Ok(Some(block))) => {
                outlet.import_and_announce(&block);
                ctx.events.emit(&NodeEvent::BlockProduced {
                    height: block.height(),
                    hash: block.hash(),
                });
            }
            Ok(Ok(None)) => {}
            // Already logged and counted by the producer.
            Ok(Err(_)) => {}
            Err(e) => tracing::error!(error = %e, "producer task panicked"),
        }
    }
}

pub async fn run_validator(
    ctx: ServiceContext,
    validator: Arc<BlockValidator>,
    outlet: Arc<ChainOutlet>,
    mut duties: mpsc::Receiver<Arc<RoundDuty>>,
    mut candidates: mpsc::Receiver<Block>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut worker = ValidatorWorker {
        ctx,
        validator,
        outlet,
        duty: None,
        future: BTreeMap::new(),
    };
    loop {
        let work = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                tracing::info!("validator worker shutting down");
                break;
            }
            duty = duties.recv() => match duty {
                Some(duty) => ValidatorWork::Duty(duty),
                None => break,
            },
            block = candidates.recv() => match block {
                Some(block) => ValidatorWork::Candidate(block),
                None => break,
            },
        };
        // Reporting may wait on a full vote queue.
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                tracing::info!("validator worker shutting down mid-judgement");
                break;
            }
            _ = worker.handle(work) => {}
        }
    }
}

/// Stand-in aggregator: drains verdicts nobody else took.
pub async fn log_verdicts(
    mut verdicts: mpsc::Receiver<Verdict>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            verdict = verdicts.recv() => match verdict {
                Some(v) => tracing::debug!(
                    height = %v.height,
                    hash = %v.hash,
                    accepted = v.accepted,
                    reason = ?v.reason,
                    "verdict"
                ),
                None => break,
            },
        }
    }
}

enum ValidatorWork {
    Duty(Arc<RoundDuty>),
    Candidate(Block),
}

struct ValidatorWorker {
    ctx: ServiceContext,
    validator: Arc<BlockValidator>,
    outlet: Arc<ChainOutlet>,
    duty: Option<Arc<RoundDuty>>,
    future: BTreeMap<Height, Vec<Block>>,
}

impl ValidatorWorker {
    async fn handle(&mut self, work: ValidatorWork) {
        match work {
            ValidatorWork::Duty(duty) => self.on_duty(duty).await,
            ValidatorWork::Candidate(block) => self.on_candidate(block).await,
        }
    }

    async fn on_duty(&mut self, duty: Arc<RoundDuty>) {
        let height = duty.height;
        self.future = self.future.split_off(&height);
        let ready = self.future.remove(&height).unwrap_or_default();
        self.duty = Some(duty.clone());
        for block in ready {
            self.judge(&duty, block).await;
        }
    }

    async fn on_candidate(&mut self, block: Block) {
        let Some(duty) = self.duty.clone() else {
            self.buffer(block);
            return;
        };
        let height = block.height();
        if height < duty.height {
            tracing::trace!(%height, "candidate below current round dropped");
        } else if height > duty.height {
            self.buffer(block);
        } else {
            self.judge(&duty, block).await;
        }
    }

    fn buffer(&mut self, block: Block) {
        if self.future.len() >= MAX_FUTURE_CANDIDATES && !self.future.contains_key(&block.height()) {
            tracing::debug!(height = %block.height(), "future candidate buffer full");
            return;
        }
        self.future.entry(block.height()).or_default().push(block);
    }

    async fn judge(&self, duty: &RoundDuty, block: Block) {
        match duty.role {
            Role::Validator => {
                let Some(verdict) = self.validator.validate_and_report(duty, &block).await else {
                    return;
                };
                self.ctx.events.emit(&NodeEvent::Verdict {
                    height: verdict.height,
                    hash: verdict.hash,
                    accepted: verdict.accepted,
                    reason: verdict.reason.clone(),
                });
                if verdict.accepted {
                    self.outlet.import(&block);
                }
            }
            // Our own candidate is imported by the producer worker.
            Role::Producer => {}
            role => match self.validator.verify_block(&block) {
                Ok(()) if role == Role::Broadcast => self.outlet.import_and_announce(&block),
                Ok(()) => self.outlet.import(&block),
                Err(reason) => {
                    tracing::warn!(height = %block.height(), %reason, "fetched block failed verification")
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeConfig;
    use tessera_consensus::{EpochSchedule, StaticElection};
    use tessera_nullables::{FixedCommittee, NullRandom};
    use tessera_types::NodeId;

    fn id(b: u8) -> NodeId {
        NodeId::new([b; 32])
    }

    struct Harness {
        follower: ChainFollower,
        book_rx: watch::Receiver<Arc<EpochBook>>,
        duty_rx: watch::Receiver<Arc<RoundDuty>>,
        produce_rx: mpsc::Receiver<ProduceRequest>,
        validate_rx: mpsc::Receiver<Arc<RoundDuty>>,
    }

    fn harness(local: NodeId, epoch_length: u64, beacon: Arc<NullRandom>) -> Harness {
        let epochs = EpochSchedule::new(epoch_length);
        let election = Arc::new(StaticElection::new(vec![id(1), id(2), id(3), id(4)], 2, vec![id(9)]));
        let (book, book_rx) = watch::channel(Arc::new(EpochBook::default()));
        let (duty, duty_rx) =
            watch::channel(Arc::new(RoundDuty::passive(Height::GENESIS, Epoch::new(0))));
        let (produce, produce_rx) = mpsc::channel(16);
        let (validate, validate_rx) = mpsc::channel(16);
        let follower = ChainFollower::new(
            RoleResolver::new(local),
            CommitteeRotation::new(election.clone(), epochs, 2),
            beacon,
            election,
            Arc::new(BloomIndexer::new(64)),
            DutyChannels {
                book,
                duty,
                produce,
                validate,
            },
            ServiceContext::new(NodeConfig::default()),
        );
        Harness {
            follower,
            book_rx,
            duty_rx,
            produce_rx,
            validate_rx,
        }
    }

    fn head(h: u64) -> HeadUpdate {
        HeadUpdate {
            height: Height::new(h),
            hash: BlockHash::new([h as u8; 32]),
            body: Vec::new(),
        }
    }

    #[test]
    fn committee_switches_exactly_at_boundary() {
        let mut h = harness(id(1), 10, Arc::new(NullRandom::new(0)));
        let mut last_before = None;
        let mut first_after = None;
        for height in 0..10 {
            let duty = h.follower.on_head(head(height)).unwrap();
            if duty.height == Height::new(9) {
                last_before = duty.roster.clone();
            }
            if duty.height == Height::new(10) {
                first_after = duty.roster.clone();
            }
        }
        let before = last_before.unwrap();
        let after = first_after.unwrap();
        assert_eq!(before.epoch(), Epoch::new(0));
        assert_eq!(after.epoch(), Epoch::new(1));
        // Epoch 0 elects {1, 2}, epoch 1 elects {3, 4}.
        assert!([id(1), id(2)].contains(&before.producer()));
        assert!([id(3), id(4)].contains(&after.producer()));
        assert_eq!(h.book_rx.borrow().epochs(), vec![Epoch::new(0), Epoch::new(1)]);
    }

    #[test]
    fn duty_is_published_before_activation() {
        let mut h = harness(id(1), 10, Arc::new(NullRandom::new(0)));
        // Seed 0 over [1, 2]: id(1) leads the even heights.
        for height in 0..4 {
            h.follower.on_head(head(height));
        }
        let mut produced = 0;
        while let Ok(request) = h.produce_rx.try_recv() {
            assert_eq!(request.duty.role, Role::Producer);
            assert_eq!(request.duty.roster.as_ref().unwrap().producer(), id(1));
            produced += 1;
        }
        let mut validated = 0;
        while let Ok(duty) = h.validate_rx.try_recv() {
            assert!(duty.height <= h.duty_rx.borrow().height);
            validated += 1;
        }
        assert_eq!(validated, 4);
        assert_eq!(produced, 2);
        assert_eq!(h.duty_rx.borrow().height, Height::new(4));
    }

    #[test]
    fn stale_heads_are_ignored() {
        let mut h = harness(id(1), 10, Arc::new(NullRandom::new(0)));
        assert!(h.follower.on_head(head(5)).is_some());
        assert!(h.follower.on_head(head(5)).is_none());
        assert!(h.follower.on_head(head(3)).is_none());
        assert_eq!(h.follower.head().unwrap().0, Height::new(5));
    }

    #[test]
    fn withheld_randomness_is_passive_until_released() {
        let beacon = Arc::new(NullRandom::new(0));
        beacon.withhold(Epoch::new(0));
        let mut h = harness(id(1), 10, beacon.clone());

        let duty = h.follower.on_head(head(0)).unwrap();
        assert_eq!(duty.role, Role::Passive);
        assert!(duty.roster.is_none());

        beacon.release(Epoch::new(0));
        let duty = h.follower.on_head(head(1)).unwrap();
        assert!(duty.roster.is_some());
        assert_ne!(duty.role, Role::Passive);
    }

    #[test]
    fn missing_committee_fails_safe() {
        let epochs = EpochSchedule::new(10);
        let empty = Arc::new(FixedCommittee::new(Vec::new(), Vec::new()));
        let (book, _book_rx) = watch::channel(Arc::new(EpochBook::default()));
        let (duty, _duty_rx) =
            watch::channel(Arc::new(RoundDuty::passive(Height::GENESIS, Epoch::new(0))));
        let (produce, mut produce_rx) = mpsc::channel(4);
        let (validate, _validate_rx) = mpsc::channel(4);
        let mut follower = ChainFollower::new(
            RoleResolver::new(id(1)),
            CommitteeRotation::new(empty.clone(), epochs, 2),
            Arc::new(NullRandom::new(0)),
            empty,
            Arc::new(BloomIndexer::new(64)),
            DutyChannels {
                book,
                duty,
                produce,
                validate,
            },
            ServiceContext::new(NodeConfig::default()),
        );
        let duty = follower.on_head(head(0)).unwrap();
        assert_eq!(duty.role, Role::Passive);
        assert!(produce_rx.try_recv().is_err());
    }
}
