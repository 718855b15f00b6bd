//! Producer duty: build, seal and sign at most one candidate per height.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tessera_consensus::{BlockBuilder, BuildContext, ConsensusError, Engine, RoundDuty};
use tessera_crypto::sign_header;
use tessera_types::{tx_root, Address, Block, BlockHash, BlockHeader, Height, KeyPair, NodeId, Role};

use crate::{tracing_spans, NodeError, NodeMetrics};

pub struct BlockProducer {
    identity: KeyPair,
    local: NodeId,
    engine: Arc<Engine>,
    builder: Arc<dyn BlockBuilder>,
    extra: Vec<u8>,
    /// Highest height a candidate was attempted for.
    claimed: Mutex<Option<Height>>,
    /// Set on shutdown; an attempt in flight gives up at its next check.
    halted: AtomicBool,
    metrics: Arc<NodeMetrics>,
}

impl BlockProducer {
    pub fn new(
        identity: KeyPair,
        engine: Arc<Engine>,
        builder: Arc<dyn BlockBuilder>,
        extra: Vec<u8>,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        let local = NodeId::from_public_key(&identity.public);
        Self {
            identity,
            local,
            engine,
            builder,
            extra,
            claimed: Mutex::new(None),
            halted: AtomicBool::new(false),
            metrics,
        }
    }

    /// Stop producing for good. An attempt already running is abandoned
    /// before it is sealed or counted.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Relaxed);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    pub fn local(&self) -> NodeId {
        self.local
    }

    /// Highest height a candidate was attempted for.
    pub fn last_claimed(&self) -> Option<Height> {
        *self.claimed.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn claim(&self, height: Height) -> bool {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*claimed, Some(h) if h >= height) {
            return false;
        }
        *claimed = Some(height);
        true
    }

    /// Produce the candidate for `duty.height` on top of `parent`.
    ///
    /// `Ok(None)` when the duty is not Producer, a candidate for this
    /// height was already attempted, or the producer was halted mid-way.
    /// A failed attempt still uses up the height; nothing partial is ever
    /// returned.
    pub fn produce(
        &self,
        duty: &RoundDuty,
        parent: BlockHash,
        coinbase: Address,
        timestamp: u64,
    ) -> Result<Option<Block>, NodeError> {
        if duty.role != Role::Producer || self.is_halted() {
            return Ok(None);
        }
        let height = duty.height;
        if !self.claim(height) {
            tracing::debug!(%height, "candidate already produced for height");
            return Ok(None);
        }

        let _span = tracing_spans::produce_span(height).entered();
        match self.build(duty, parent, coinbase, timestamp) {
            Ok(_) | Err(NodeError::Consensus(ConsensusError::SealInterrupted))
                if self.is_halted() =>
            {
                tracing::info!(%height, "production abandoned on shutdown");
                Ok(None)
            }
            Ok(block) => {
                self.metrics.blocks_produced.inc();
                tracing::info!(
                    %height,
                    hash = %block.hash(),
                    txs = block.body().len(),
                    engine = self.engine.name(),
                    "candidate produced"
                );
                Ok(Some(block))
            }
            Err(e) => {
                self.metrics.production_failures.inc();
                tracing::error!(%height, error = %e, "block production failed");
                Err(e)
            }
        }
    }

    fn build(
        &self,
        duty: &RoundDuty,
        parent: BlockHash,
        coinbase: Address,
        timestamp: u64,
    ) -> Result<Block, NodeError> {
        let ctx = BuildContext {
            height: duty.height,
            epoch: duty.epoch,
            parent,
            producer: self.local,
            coinbase,
            timestamp,
        };
        let body = self.builder.build_body(&ctx)?;
        if self.is_halted() {
            return Err(ConsensusError::SealInterrupted.into());
        }
        let header = BlockHeader {
            parent,
            height: duty.height,
            epoch: duty.epoch,
            producer: self.local,
            coinbase,
            timestamp,
            tx_root: tx_root(&body),
            extra: self.extra.clone(),
            nonce: 0,
        };
        let sealed = self.engine.seal(header, &self.halted)?;
        let signature = sign_header(&sealed, &self.identity.private);
        Ok(Block::new(sealed, body, signature))
    }
}
