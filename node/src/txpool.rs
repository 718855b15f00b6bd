//! In-memory transaction pool and the block builder that drains it.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tessera_consensus::{BlockBuilder, BuildContext, ConsensusError};
use tessera_crypto::blake2b_256;
use tessera_network::TxPool;

struct PoolInner {
    order: VecDeque<Vec<u8>>,
    known: HashSet<[u8; 32]>,
}

/// FIFO pool of opaque transactions, deduplicated by hash and bounded.
pub struct MemoryTxPool {
    capacity: usize,
    inner: Mutex<PoolInner>,
    stopped: AtomicBool,
}

impl MemoryTxPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(PoolInner {
                order: VecDeque::new(),
                known: HashSet::new(),
            }),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl TxPool for MemoryTxPool {
    fn add_remotes(&self, txs: Vec<Vec<u8>>) -> usize {
        if self.is_stopped() {
            return 0;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut added = 0;
        for tx in txs {
            if inner.order.len() >= self.capacity {
                tracing::debug!(capacity = self.capacity, "transaction pool full");
                break;
            }
            if inner.known.insert(blake2b_256(&tx)) {
                inner.order.push_back(tx);
                added += 1;
            }
        }
        added
    }

    fn pending(&self, max: usize) -> Vec<Vec<u8>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.order.iter().take(max).cloned().collect()
    }

    fn remove_included(&self, txs: &[Vec<u8>]) {
        let included: HashSet<[u8; 32]> = txs.iter().map(|t| blake2b_256(t)).collect();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.order.retain(|t| !included.contains(&blake2b_256(t)));
        inner.known.retain(|h| !included.contains(h));
    }

    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).order.len()
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.order.clear();
        inner.known.clear();
        tracing::info!("transaction pool stopped");
    }
}

/// Fills bodies with the oldest pending transactions.
pub struct PoolBuilder {
    pool: Arc<dyn TxPool>,
    max_txs: usize,
}

impl PoolBuilder {
    pub fn new(pool: Arc<dyn TxPool>, max_txs: usize) -> Self {
        Self { pool, max_txs }
    }
}

impl BlockBuilder for PoolBuilder {
    fn build_body(&self, ctx: &BuildContext) -> Result<Vec<Vec<u8>>, ConsensusError> {
        let body = self.pool.pending(self.max_txs);
        tracing::trace!(height = %ctx.height, txs = body.len(), "body assembled");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::{Address, BlockHash, Epoch, Height, NodeId};

    #[test]
    fn duplicates_are_dropped_and_capacity_holds() {
        let pool = MemoryTxPool::new(2);
        assert_eq!(pool.add_remotes(vec![b"a".to_vec(), b"a".to_vec()]), 1);
        assert_eq!(pool.add_remotes(vec![b"b".to_vec(), b"c".to_vec()]), 1);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn included_transactions_leave_the_pool() {
        let pool = MemoryTxPool::new(10);
        pool.add_remotes(vec![b"a".to_vec(), b"b".to_vec()]);
        pool.remove_included(&[b"a".to_vec()]);
        assert_eq!(pool.pending(10), vec![b"b".to_vec()]);
        // a can be re-admitted once included
        assert_eq!(pool.add_remotes(vec![b"a".to_vec()]), 1);
    }

    #[test]
    fn stopped_pool_admits_nothing() {
        let pool = MemoryTxPool::new(10);
        pool.add_remotes(vec![b"a".to_vec()]);
        pool.stop();
        assert!(pool.is_empty());
        assert_eq!(pool.add_remotes(vec![b"b".to_vec()]), 0);
    }

    #[test]
    fn builder_takes_oldest_first() {
        let pool = Arc::new(MemoryTxPool::new(10));
        pool.add_remotes(vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
        let builder = PoolBuilder::new(pool, 2);
        let ctx = BuildContext {
            height: Height::new(1),
            epoch: Epoch::new(0),
            parent: BlockHash::ZERO,
            producer: NodeId::new([1; 32]),
            coinbase: Address::ZERO,
            timestamp: 0,
        };
        assert_eq!(builder.build_body(&ctx).unwrap(), vec![b"1".to_vec(), b"2".to_vec()]);
    }
}
