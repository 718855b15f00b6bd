//! Staged node construction.
//!
//! Each stage is its own type, so components can only be wired in order:
//!
//! 1. [`NodeBuilder::validate`]: sync mode
//! 2. [`Validated::open_storage`]: schema check and migration, genesis
//! 3. [`Storage::select_engine`]: authority or work engine
//! 4. [`Consensus::with_txpool`]
//! 5. [`Pooled::with_network`]: peer set, announcement sink, protocol manager
//! 6. [`Networked::with_committee`]: committee rotation
//! 7. [`Committees::with_beacon`]: randomness per epoch
//! 8. [`Beacon::with_identity`]: role resolver
//! 9. [`Identity::with_production`]: producer, validator, orchestrator
//!
//! A failed stage leaves no orchestrator behind.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use tessera_consensus::{
    BlockBuilder, BlockVerifier, CommitteeRotation, CommitteeSource, Engine, EpochSchedule,
    IdentityRegistry, RoleResolver, RoundDuty, StaticElection, StructuralVerifier,
};
use tessera_network::{AnnouncementSink, DirectAnnouncer, PeerSet, ProtocolManager, TxPool};
use tessera_store::{Database, Migrator};
use tessera_store_lmdb::LmdbStore;
use tessera_types::{BlockHash, ChainConfig, Epoch, Genesis, Height, KeyPair, NodeId};
use tessera_vrf::{BeaconCache, HashChainBeacon, RandomBeacon};
use tessera_wallet_core::AccountManager;

use crate::bloom::{BloomIndexer, BLOOM_REQUEST_QUEUE};
use crate::mining::{make_extra_data, MiningControl};
use crate::notifier::PeerNotifier;
use crate::orchestrator::{Dormant, NodeOrchestrator, Parts};
use crate::pipeline::{ChainFollower, ChainOutlet, DutyChannels};
use crate::producer::BlockProducer;
use crate::rounds::EpochBook;
use crate::txpool::{MemoryTxPool, PoolBuilder};
use crate::validator::BlockValidator;
use crate::{genesis, NodeError, ServiceContext, SyncMode};

/// Pending transactions held by the default pool.
const DEFAULT_POOL_CAPACITY: usize = 4096;
/// Transactions the default builder puts in one block.
const DEFAULT_BLOCK_TXS: usize = 512;
/// Verdicts remembered per validator.
const VERDICT_CACHE: usize = 1024;
/// Queue depth of every pipeline channel.
const PIPELINE_QUEUE: usize = 256;

/// Open (or create) the LMDB database under `config.data_dir/chaindata`.
pub fn open_lmdb(ctx: &ServiceContext) -> Result<Arc<dyn Database>, NodeError> {
    let path = ctx.resolve_path("chaindata");
    std::fs::create_dir_all(&path)?;
    open_lmdb_at(&path, ctx.config.map_size())
}

fn open_lmdb_at(path: &Path, map_size: usize) -> Result<Arc<dyn Database>, NodeError> {
    let store = LmdbStore::open(path, map_size)?;
    tracing::info!(path = %path.display(), map_size, "database opened");
    Ok(Arc::new(store))
}

pub struct NodeBuilder {
    ctx: ServiceContext,
}

impl NodeBuilder {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Refuse sync modes a full node cannot serve.
    pub fn validate(self) -> Result<Validated, NodeError> {
        let sync_mode = self.ctx.config.sync_mode()?;
        if sync_mode == SyncMode::Light {
            return Err(NodeError::LightSyncUnsupported);
        }
        tracing::info!(%sync_mode, network = %self.ctx.config.network.as_str(), "node configuration accepted");
        Ok(Validated {
            ctx: self.ctx,
            sync_mode,
        })
    }
}

pub struct Validated {
    ctx: ServiceContext,
    sync_mode: SyncMode,
}

impl Validated {
    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    /// Check or migrate the schema, then set up genesis.
    ///
    /// On failure the database is closed before the error is returned.
    pub fn open_storage(self, db: Arc<dyn Database>, genesis: Genesis) -> Result<Storage, NodeError> {
        match Self::prepare(&self.ctx, db.as_ref(), &genesis) {
            Ok((genesis_hash, chain)) => Ok(Storage {
                ctx: self.ctx,
                db,
                genesis,
                genesis_hash,
                chain,
            }),
            Err(e) => {
                db.close();
                Err(e)
            }
        }
    }

    /// [`open_storage`](Self::open_storage) on the LMDB store under the
    /// data directory. Nothing touches the disk before configuration has
    /// been accepted.
    pub fn open_default_storage(self, genesis: Genesis) -> Result<Storage, NodeError> {
        let db = open_lmdb(&self.ctx)?;
        self.open_storage(db, genesis)
    }

    fn prepare(
        ctx: &ServiceContext,
        db: &dyn Database,
        genesis: &Genesis,
    ) -> Result<(BlockHash, ChainConfig), NodeError> {
        if ctx.config.skip_version_check {
            tracing::warn!("database schema check skipped by configuration");
        } else {
            let version = Migrator::run(db).map_err(NodeError::from_store)?;
            tracing::info!(version, "database schema ready");
        }
        genesis::setup_genesis(db, genesis)
    }
}

pub struct Storage {
    ctx: ServiceContext,
    db: Arc<dyn Database>,
    genesis: Genesis,
    genesis_hash: BlockHash,
    chain: ChainConfig,
}

impl Storage {
    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis_hash
    }

    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain
    }

    /// Authority engine when the chain config carries one, otherwise the
    /// work engine in the configured mode.
    pub fn select_engine(self) -> Consensus {
        let engine = Arc::new(Engine::select(&self.chain, self.ctx.config.pow_mode));
        Consensus {
            storage: self,
            engine,
        }
    }
}

pub struct Consensus {
    storage: Storage,
    engine: Arc<Engine>,
}

impl Consensus {
    pub fn with_txpool(self, txpool: Arc<dyn TxPool>) -> Pooled {
        Pooled {
            consensus: self,
            txpool,
        }
    }

    pub fn with_default_txpool(self) -> Pooled {
        self.with_txpool(Arc::new(MemoryTxPool::new(DEFAULT_POOL_CAPACITY)))
    }
}

pub struct Pooled {
    consensus: Consensus,
    txpool: Arc<dyn TxPool>,
}

impl Pooled {
    /// Attach the peer set. Without a sink, announcements go straight to
    /// the peer connections.
    pub fn with_network(self, peers: Arc<PeerSet>, sink: Option<Arc<dyn AnnouncementSink>>) -> Networked {
        let sink: Arc<dyn AnnouncementSink> = match sink {
            Some(sink) => sink,
            None => Arc::new(DirectAnnouncer::new(peers.clone())),
        };
        let protocol = Arc::new(ProtocolManager::new(peers.clone(), self.txpool.clone()));
        Networked {
            pooled: self,
            peers,
            sink,
            protocol,
        }
    }

    pub fn with_default_network(self) -> Networked {
        let max_peers = self.consensus.storage.ctx.config.max_peers;
        self.with_network(Arc::new(PeerSet::new(max_peers)), None)
    }
}

pub struct Networked {
    pooled: Pooled,
    peers: Arc<PeerSet>,
    sink: Arc<dyn AnnouncementSink>,
    protocol: Arc<ProtocolManager>,
}

impl Networked {
    pub fn with_committee(
        self,
        source: Arc<dyn CommitteeSource>,
        registry: Arc<dyn IdentityRegistry>,
    ) -> Committees {
        let storage = &self.pooled.consensus.storage;
        let epochs = EpochSchedule::from(&storage.chain);
        let rotation = CommitteeRotation::new(source, epochs, storage.ctx.config.retain_epochs);
        Committees {
            networked: self,
            epochs,
            rotation,
            registry,
        }
    }

    /// Elect from the genesis candidates.
    pub fn with_genesis_committee(self) -> Committees {
        let election = Arc::new(StaticElection::from_genesis(&self.pooled.consensus.storage.genesis));
        self.with_committee(election.clone(), election)
    }
}

pub struct Committees {
    networked: Networked,
    epochs: EpochSchedule,
    rotation: CommitteeRotation,
    registry: Arc<dyn IdentityRegistry>,
}

impl Committees {
    /// Every value `beacon` hands out is verified and bound to its epoch.
    pub fn with_beacon(self, beacon: Arc<dyn RandomBeacon>) -> Beacon {
        let retain = self.networked.pooled.consensus.storage.ctx.config.retain_epochs;
        tracing::info!(beacon = beacon.name(), "random beacon selected");
        let beacon: Arc<dyn RandomBeacon> = Arc::new(BeaconCache::new(beacon, retain.max(1)));
        Beacon {
            committees: self,
            beacon,
        }
    }

    /// Hash chain seeded with the genesis hash.
    pub fn with_genesis_beacon(self) -> Beacon {
        let seed = *self.networked.pooled.consensus.storage.genesis_hash.as_bytes();
        self.with_beacon(Arc::new(HashChainBeacon::new(seed)))
    }
}

pub struct Beacon {
    committees: Committees,
    beacon: Arc<dyn RandomBeacon>,
}

impl Beacon {
    pub fn with_identity(self, identity: KeyPair) -> Identity {
        let local = NodeId::from_public_key(&identity.public);
        tracing::info!(node = %local.short(), "node identity loaded");
        Identity {
            beacon: self,
            identity,
            resolver: RoleResolver::new(local),
        }
    }

    /// The configured identity seed, or a fresh key when none is set.
    pub fn with_configured_identity(self) -> Result<Identity, NodeError> {
        let config = &self.committees.networked.pooled.consensus.storage.ctx.config;
        let identity = match config.identity()? {
            Some(kp) => kp,
            None => {
                tracing::warn!("no identity_seed configured, using an ephemeral identity");
                tessera_crypto::generate_keypair()
            }
        };
        Ok(self.with_identity(identity))
    }
}

pub struct Identity {
    beacon: Beacon,
    identity: KeyPair,
    resolver: RoleResolver,
}

impl Identity {
    pub fn local(&self) -> NodeId {
        self.resolver.local()
    }

    /// Pool-backed block builder and structural body checks.
    pub fn with_default_production(self, accounts: Arc<AccountManager>) -> NodeOrchestrator {
        let txpool = self.beacon.committees.networked.pooled.txpool.clone();
        self.with_production(
            Arc::new(PoolBuilder::new(txpool, DEFAULT_BLOCK_TXS)),
            Arc::new(StructuralVerifier::default()),
            accounts,
        )
    }

    /// Wire the producer, validator and duty pipeline into an orchestrator
    /// in the `Constructed` state.
    pub fn with_production(
        self,
        builder: Arc<dyn BlockBuilder>,
        verifier: Arc<dyn BlockVerifier>,
        accounts: Arc<AccountManager>,
    ) -> NodeOrchestrator {
        let Identity {
            beacon: Beacon { committees, beacon },
            identity,
            resolver,
        } = self;
        let Committees {
            networked,
            epochs,
            rotation,
            registry,
        } = committees;
        let Networked {
            pooled,
            peers,
            sink,
            protocol,
        } = networked;
        let Pooled { consensus, txpool } = pooled;
        let Consensus { storage, engine } = consensus;
        let Storage {
            ctx,
            db,
            genesis_hash,
            chain,
            ..
        } = storage;

        let local = resolver.local();
        let (book_tx, book_rx) = watch::channel(Arc::new(EpochBook::default()));
        let (duty_tx, duty_rx) = watch::channel(Arc::new(RoundDuty::passive(Height::GENESIS, Epoch::new(0))));
        let (produce_tx, produce_rx) = mpsc::channel(PIPELINE_QUEUE);
        let (validate_tx, validate_rx) = mpsc::channel(PIPELINE_QUEUE);
        let (heads_tx, heads_rx) = mpsc::channel(PIPELINE_QUEUE);
        let (votes_tx, votes_rx) = mpsc::channel(PIPELINE_QUEUE);
        let (completed_tx, completed_rx) = mpsc::channel(PIPELINE_QUEUE);
        let (bloom_tx, bloom_rx) = mpsc::channel(BLOOM_REQUEST_QUEUE);

        let bloom = Arc::new(BloomIndexer::new(ctx.config.bloom_section_size));
        let follower = ChainFollower::new(
            resolver,
            rotation,
            beacon,
            registry,
            bloom.clone(),
            DutyChannels {
                book: book_tx,
                duty: duty_tx,
                produce: produce_tx,
                validate: validate_tx,
            },
            ctx.clone(),
        );
        let notifier = Arc::new(PeerNotifier::new(
            local,
            peers.clone(),
            sink,
            book_rx.clone(),
            epochs,
            ctx.metrics.clone(),
        ));
        let producer = Arc::new(BlockProducer::new(
            identity,
            engine.clone(),
            builder,
            make_extra_data(ctx.config.extra_data.as_bytes()),
            ctx.metrics.clone(),
        ));
        let validator = Arc::new(BlockValidator::new(
            engine.clone(),
            verifier,
            votes_tx,
            VERDICT_CACHE,
            ctx.metrics.clone(),
        ));
        let outlet = Arc::new(ChainOutlet {
            protocol: protocol.clone(),
            notifier: notifier.clone(),
            txpool: txpool.clone(),
            heads: heads_tx.clone(),
        });
        let mining = Arc::new(MiningControl::new(ctx.config.etherbase));

        tracing::info!(
            node = %local.short(),
            engine = engine.name(),
            %genesis_hash,
            epoch_length = epochs.epoch_length(),
            "node constructed"
        );
        NodeOrchestrator::from_parts(Parts {
            ctx,
            local,
            db,
            genesis_hash,
            chain,
            engine,
            txpool,
            protocol,
            accounts,
            mining,
            bloom,
            bloom_tx,
            notifier,
            heads_tx,
            duty_rx,
            book_rx,
            votes_rx,
            dormant: Dormant {
                follower,
                outlet,
                producer,
                validator,
                heads_rx,
                produce_rx,
                validate_rx,
                bloom_rx,
                completed_tx,
                completed_rx,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeConfig;
    use tessera_crypto::keypair_from_seed;
    use tessera_nullables::NullStore;
    use tessera_store::{MetaStore, CURRENT_SCHEMA_VERSION};
    use tessera_types::ChainConfig;

    fn genesis() -> Genesis {
        let local = NodeId::from_public_key(&keypair_from_seed(&[1u8; 32]).public);
        crate::dev_genesis(local)
    }

    fn ctx_with(f: impl FnOnce(&mut NodeConfig)) -> ServiceContext {
        let mut config = NodeConfig::default();
        f(&mut config);
        ServiceContext::new(config)
    }

    #[test]
    fn light_sync_is_refused() {
        let ctx = ctx_with(|c| c.sync_mode = "light".into());
        assert!(matches!(
            NodeBuilder::new(ctx).validate(),
            Err(NodeError::LightSyncUnsupported)
        ));
    }

    #[test]
    fn unknown_sync_mode_is_refused() {
        let ctx = ctx_with(|c| c.sync_mode = "turbo".into());
        assert!(matches!(
            NodeBuilder::new(ctx).validate(),
            Err(NodeError::InvalidSyncMode(_))
        ));
    }

    #[test]
    fn fresh_store_is_migrated_and_initialised() {
        let store = Arc::new(NullStore::new());
        let storage = NodeBuilder::new(ctx_with(|_| {}))
            .validate()
            .unwrap()
            .open_storage(store.clone(), genesis())
            .unwrap();
        assert_eq!(store.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(storage.genesis_hash(), genesis().hash());
        assert_eq!(storage.chain_config().committee_size, 1);
    }

    #[test]
    fn newer_schema_fails_and_closes_storage() {
        let store = Arc::new(NullStore::with_schema_version(CURRENT_SCHEMA_VERSION + 1));
        let err = NodeBuilder::new(ctx_with(|_| {}))
            .validate()
            .unwrap()
            .open_storage(store.clone(), genesis())
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::SchemaTooNew { .. }));
        assert_eq!(store.close_count(), 1);
    }

    #[test]
    fn skip_version_check_tolerates_newer_schema() {
        let store = Arc::new(NullStore::with_schema_version(CURRENT_SCHEMA_VERSION + 1));
        let ctx = ctx_with(|c| c.skip_version_check = true);
        assert!(NodeBuilder::new(ctx)
            .validate()
            .unwrap()
            .open_storage(store, genesis())
            .is_ok());
    }

    #[test]
    fn engine_follows_chain_config() {
        let mut g = genesis();
        g.config = ChainConfig::default();
        let consensus = NodeBuilder::new(ctx_with(|_| {}))
            .validate()
            .unwrap()
            .open_storage(Arc::new(NullStore::new()), g)
            .unwrap()
            .select_engine();
        assert_eq!(consensus.engine.name(), "work");
    }

    #[test]
    fn lmdb_store_opens_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with(|c| {
            c.data_dir = dir.path().to_path_buf();
            c.database_cache_mb = 16;
        });
        let db = open_lmdb(&ctx).unwrap();
        assert!(dir.path().join("chaindata").exists());
        db.close();
        assert!(db.is_closed());
    }

    #[test]
    fn refused_config_leaves_data_dir_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("node");
        let ctx = ctx_with(|c| {
            c.data_dir = data_dir.clone();
            c.sync_mode = "light".into();
        });
        let result = NodeBuilder::new(ctx)
            .validate()
            .and_then(|v| v.open_default_storage(genesis()));
        assert!(matches!(result, Err(NodeError::LightSyncUnsupported)));
        assert!(!data_dir.exists());
    }

    #[test]
    fn default_storage_opens_lmdb_after_validation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with(|c| {
            c.data_dir = dir.path().to_path_buf();
            c.database_cache_mb = 16;
        });
        let storage = NodeBuilder::new(ctx)
            .validate()
            .unwrap()
            .open_default_storage(genesis())
            .unwrap();
        assert!(dir.path().join("chaindata").exists());
        assert_eq!(storage.genesis_hash(), genesis().hash());
    }
}
