//! The node orchestrator: lifecycle, mining control and the public surface.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};

use tessera_consensus::{ApiDescriptor, Engine, RoundDuty};
use tessera_messages::Message;
use tessera_network::{Fetcher, NetworkError, ProtocolManager, TxPool};
use tessera_store::Database;
use tessera_types::{Address, Block, BlockHash, ChainConfig, Height, NodeId};
use tessera_wallet_core::AccountManager;

use crate::bloom::{start_bloom_handlers, BloomIndexer, Retrieval};
use crate::mining::{MiningControl, WalletSigner};
use crate::notifier::{NotifyReport, PeerNotifier};
use crate::pipeline::{
    log_verdicts, run_producer, run_validator, ChainFollower, ChainOutlet, HeadUpdate,
    ProduceRequest,
};
use crate::producer::BlockProducer;
use crate::rounds::EpochBook;
use crate::validator::{BlockValidator, Verdict};
use crate::{NodeError, NodeEvent, ServiceContext, TaskGroup};

/// Timeout for waiting on each task group during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
/// Announced hashes the fetcher remembers.
const FETCHER_CAPACITY: usize = 1024;
/// Queue depth of fetcher events.
const FETCHER_QUEUE: usize = 256;

/// `Constructed -> Started -> Stopped`; no restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Constructed,
    Started,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Constructed => "constructed",
            LifecycleState::Started => "started",
            LifecycleState::Stopped => "stopped",
        }
    }
}

/// Workers and channel ends that only come alive on `start`.
pub(crate) struct Dormant {
    pub follower: ChainFollower,
    pub outlet: Arc<ChainOutlet>,
    pub producer: Arc<BlockProducer>,
    pub validator: Arc<BlockValidator>,
    pub heads_rx: mpsc::Receiver<HeadUpdate>,
    pub produce_rx: mpsc::Receiver<ProduceRequest>,
    pub validate_rx: mpsc::Receiver<Arc<RoundDuty>>,
    pub bloom_rx: mpsc::Receiver<Retrieval>,
    pub completed_tx: mpsc::Sender<Block>,
    pub completed_rx: mpsc::Receiver<Block>,
}

/// Everything the builder's last stage hands over.
pub(crate) struct Parts {
    pub ctx: ServiceContext,
    pub local: NodeId,
    pub db: Arc<dyn Database>,
    pub genesis_hash: BlockHash,
    pub chain: ChainConfig,
    pub engine: Arc<Engine>,
    pub txpool: Arc<dyn TxPool>,
    pub protocol: Arc<ProtocolManager>,
    pub accounts: Arc<AccountManager>,
    pub mining: Arc<MiningControl>,
    pub bloom: Arc<BloomIndexer>,
    pub bloom_tx: mpsc::Sender<Retrieval>,
    pub notifier: Arc<PeerNotifier>,
    pub heads_tx: mpsc::Sender<HeadUpdate>,
    pub duty_rx: watch::Receiver<Arc<RoundDuty>>,
    pub book_rx: watch::Receiver<Arc<EpochBook>>,
    pub votes_rx: mpsc::Receiver<Verdict>,
    pub dormant: Dormant,
}

struct Lifecycle {
    state: LifecycleState,
    dormant: Option<Dormant>,
}

/// One task group per service, stopped in teardown order.
struct Services {
    bloom: TaskGroup,
    follower: TaskGroup,
    network: TaskGroup,
    duties: TaskGroup,
}

pub struct NodeOrchestrator {
    ctx: ServiceContext,
    local: NodeId,
    db: Arc<dyn Database>,
    genesis_hash: BlockHash,
    chain: ChainConfig,
    engine: Arc<Engine>,
    txpool: Arc<dyn TxPool>,
    protocol: Arc<ProtocolManager>,
    accounts: Arc<AccountManager>,
    mining: Arc<MiningControl>,
    bloom: Arc<BloomIndexer>,
    bloom_tx: mpsc::Sender<Retrieval>,
    notifier: Arc<PeerNotifier>,
    heads_tx: mpsc::Sender<HeadUpdate>,
    duty_rx: watch::Receiver<Arc<RoundDuty>>,
    book_rx: watch::Receiver<Arc<EpochBook>>,
    votes_rx: StdMutex<Option<mpsc::Receiver<Verdict>>>,
    lifecycle: Mutex<Lifecycle>,
    services: Services,
}

impl NodeOrchestrator {
    pub(crate) fn from_parts(parts: Parts) -> Self {
        Self {
            ctx: parts.ctx,
            local: parts.local,
            db: parts.db,
            genesis_hash: parts.genesis_hash,
            chain: parts.chain,
            engine: parts.engine,
            txpool: parts.txpool,
            protocol: parts.protocol,
            accounts: parts.accounts,
            mining: parts.mining,
            bloom: parts.bloom,
            bloom_tx: parts.bloom_tx,
            notifier: parts.notifier,
            heads_tx: parts.heads_tx,
            duty_rx: parts.duty_rx,
            book_rx: parts.book_rx,
            votes_rx: StdMutex::new(Some(parts.votes_rx)),
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::Constructed,
                dormant: Some(parts.dormant),
            }),
            services: Services {
                bloom: TaskGroup::new("bloom"),
                follower: TaskGroup::new("follower"),
                network: TaskGroup::new("network"),
                duties: TaskGroup::new("duties"),
            },
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.lock().await.state
    }

    /// Start every service. With light serving enabled, `light_peers` of
    /// the `max_peers` slots are reserved and the rest go to full peers.
    pub async fn start(&self, max_peers: usize) -> Result<(), NodeError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != LifecycleState::Constructed {
            return Err(NodeError::InvalidLifecycle {
                action: "start",
                state: lifecycle.state.as_str(),
            });
        }
        let config = &self.ctx.config;
        let mut full_peers = max_peers;
        if config.light_serv > 0 {
            if config.light_peers >= max_peers {
                return Err(NodeError::InvalidPeerConfig {
                    light: config.light_peers,
                    max: max_peers,
                });
            }
            full_peers = max_peers - config.light_peers;
        }
        let Some(dormant) = lifecycle.dormant.take() else {
            return Err(NodeError::InvalidLifecycle {
                action: "start",
                state: lifecycle.state.as_str(),
            });
        };
        tracing::info!(
            node = %self.local.short(),
            network = %config.network.as_str(),
            max_peers,
            full_peers,
            "tessera node starting"
        );

        start_bloom_handlers(
            self.bloom.clone(),
            dormant.bloom_rx,
            config.bloom_handlers,
            &self.services.bloom,
        );

        self.protocol.start(full_peers);
        let fetcher = Fetcher::new(
            self.protocol.peers().clone(),
            dormant.completed_tx,
            FETCHER_CAPACITY,
        );
        let (handle, join) = fetcher.spawn(FETCHER_QUEUE, self.services.network.subscribe());
        self.services.network.adopt(join);
        self.protocol.attach_fetcher(handle);
        self.ctx
            .metrics
            .peer_count
            .set(self.protocol.peers().len() as i64);

        let follower = &self.services.follower;
        follower.spawn(dormant.follower.run(
            self.genesis_hash,
            dormant.heads_rx,
            follower.subscribe(),
        ));

        let duties = &self.services.duties;
        duties.spawn(run_producer(
            self.ctx.clone(),
            dormant.producer,
            self.mining.clone(),
            dormant.outlet.clone(),
            self.duty_rx.clone(),
            dormant.produce_rx,
            duties.subscribe(),
        ));
        duties.spawn(run_validator(
            self.ctx.clone(),
            dormant.validator,
            dormant.outlet,
            dormant.validate_rx,
            dormant.completed_rx,
            duties.subscribe(),
        ));
        if let Some(votes) = self.take_verdicts() {
            duties.spawn(log_verdicts(votes, duties.subscribe()));
        }

        lifecycle.state = LifecycleState::Started;
        tracing::info!("tessera node started");
        Ok(())
    }

    /// Tear everything down in order. Safe to call more than once and
    /// from any state; storage is closed and the shutdown signal fired
    /// exactly once.
    pub async fn stop(&self) -> Result<(), NodeError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state == LifecycleState::Stopped {
            tracing::debug!("node already stopped");
            return Ok(());
        }
        tracing::info!(from = lifecycle.state.as_str(), "tessera node stopping");

        self.bloom.close();
        self.services.bloom.stop(SHUTDOWN_TIMEOUT).await;

        self.services.follower.stop(SHUTDOWN_TIMEOUT).await;

        self.protocol.stop();
        self.services.network.stop(SHUTDOWN_TIMEOUT).await;

        self.txpool.stop();

        self.mining.stop().await;
        self.ctx.metrics.mining.set(0);
        self.services.duties.stop(SHUTDOWN_TIMEOUT).await;

        self.ctx.events.stop();

        self.db.close();
        tracing::info!("database closed");

        lifecycle.dormant = None;
        lifecycle.state = LifecycleState::Stopped;
        self.ctx.shutdown.shutdown();
        tracing::info!("tessera node stopped");
        Ok(())
    }

    // ── Etherbase and mining ────────────────────────────────────────────

    /// The configured etherbase, else the first account of the first
    /// wallet. The fallback is remembered.
    pub async fn etherbase(&self) -> Result<Address, NodeError> {
        let accounts = &self.accounts;
        let resolved = self
            .mining
            .etherbase_or_else(|| {
                let wallet = accounts.wallets().first()?;
                let account = wallet.accounts().into_iter().next()?;
                tracing::info!(
                    etherbase = %account.address,
                    "etherbase automatically configured"
                );
                Some(account.address)
            })
            .await;
        resolved.ok_or(NodeError::NoEtherbase)
    }

    pub async fn set_etherbase(&self, etherbase: Address) {
        self.mining.set_etherbase(etherbase).await;
        tracing::info!(%etherbase, "etherbase updated");
    }

    /// Turn block production on. With `local`, transactions from peers are
    /// admitted from now on. Returns without waiting for a block.
    pub async fn start_mining(&self, local: bool) -> Result<(), NodeError> {
        let etherbase = self.etherbase().await.inspect_err(|e| {
            tracing::error!(error = %e, "cannot start mining without etherbase");
        })?;

        if let Some(authority) = self.engine.as_authority() {
            let wallet = self
                .accounts
                .find(&etherbase)
                .map_err(|e| NodeError::SignerMissing(e.to_string()))?;
            let signer = WalletSigner::new(wallet, etherbase)
                .map_err(|e| NodeError::SignerMissing(e.to_string()))?;
            authority.authorize(etherbase, Arc::new(signer))?;
        }

        if local {
            self.protocol.set_accept_txs(true);
        }
        self.mining.start().await;
        self.ctx.metrics.mining.set(1);
        self.ctx
            .events
            .emit(&NodeEvent::MiningChanged { mining: true });
        tracing::info!(%etherbase, local, "mining started");
        Ok(())
    }

    pub async fn stop_mining(&self) {
        self.mining.stop().await;
        self.ctx.metrics.mining.set(0);
        self.ctx
            .events
            .emit(&NodeEvent::MiningChanged { mining: false });
        tracing::info!("mining stopped");
    }

    pub async fn is_mining(&self) -> bool {
        self.mining.is_mining().await
    }

    // ── Chain and network surface ───────────────────────────────────────

    /// Announce a block to the duty-holders of its height.
    pub fn fetcher_notify(&self, hash: BlockHash, height: Height) -> NotifyReport {
        self.ctx
            .metrics
            .peer_count
            .set(self.protocol.peers().len() as i64);
        self.notifier.fetcher_notify(hash, height)
    }

    /// Hand an externally imported head to the chain follower.
    pub fn import_head(&self, height: Height, hash: BlockHash) -> Result<(), NodeError> {
        let update = HeadUpdate {
            height,
            hash,
            body: Vec::new(),
        };
        self.heads_tx.try_send(update).map_err(|e| match e {
            TrySendError::Full(_) => NodeError::Network(NetworkError::QueueFull("heads".into())),
            TrySendError::Closed(_) => NodeError::InvalidLifecycle {
                action: "import into",
                state: LifecycleState::Stopped.as_str(),
            },
        })
    }

    /// RPC namespaces: the node's own plus the engine's.
    pub fn apis(&self) -> Vec<ApiDescriptor> {
        let mut apis = vec![
            ApiDescriptor::new("tessera", "node", true),
            ApiDescriptor::new("miner", "mining", false),
            ApiDescriptor::new("net", "network", true),
            ApiDescriptor::new("admin", "admin", false),
            ApiDescriptor::new("debug", "debug", false),
        ];
        apis.extend(self.engine.apis());
        apis
    }

    pub fn handle_transactions(&self, peer: NodeId, txs: Vec<Vec<u8>>) -> Result<usize, NodeError> {
        Ok(self.protocol.handle_transactions(peer, txs)?)
    }

    pub fn handle_message(&self, peer: NodeId, message: Message) -> Result<(), NodeError> {
        Ok(self.protocol.handle_message(peer, message)?)
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn local(&self) -> NodeId {
        self.local
    }

    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis_hash
    }

    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn protocol(&self) -> &Arc<ProtocolManager> {
        &self.protocol
    }

    pub fn bloom(&self) -> &Arc<BloomIndexer> {
        &self.bloom
    }

    /// Channel served by the bloom handlers once started.
    pub fn bloom_requests(&self) -> mpsc::Sender<Retrieval> {
        self.bloom_tx.clone()
    }

    /// Duty for the height after the current head.
    pub fn current_duty(&self) -> Arc<RoundDuty> {
        self.duty_rx.borrow().clone()
    }

    pub fn subscribe_duty(&self) -> watch::Receiver<Arc<RoundDuty>> {
        self.duty_rx.clone()
    }

    pub fn epoch_book(&self) -> Arc<EpochBook> {
        self.book_rx.borrow().clone()
    }

    /// Verdicts for the vote aggregator. Only the first caller gets them,
    /// and only before [`start`](Self::start); an untaken queue is drained
    /// into the log once the node starts.
    pub fn take_verdicts(&self) -> Option<mpsc::Receiver<Verdict>> {
        self.votes_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}
