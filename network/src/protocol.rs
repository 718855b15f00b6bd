//! Protocol manager: inbound message dispatch and transaction admission.
//!
//! Transactions from peers are only admitted once `accept_txs` is set. The
//! node sets it when it considers itself synced or when local mining starts.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tessera_messages::{Message, SignedHeader};
use tessera_types::{Block, BlockHash, NodeId};

use crate::{AnnouncementSink, FetcherHandle, NetworkError, PeerSet, TxPool};

/// Blocks kept to answer header and body requests.
const SERVED_BLOCKS: usize = 256;

pub struct ProtocolManager {
    peers: Arc<PeerSet>,
    txpool: Arc<dyn TxPool>,
    fetcher: Mutex<Option<FetcherHandle>>,
    accept_txs: AtomicBool,
    running: AtomicBool,
    served: Mutex<(HashMap<BlockHash, Block>, VecDeque<BlockHash>)>,
}

impl ProtocolManager {
    pub fn new(peers: Arc<PeerSet>, txpool: Arc<dyn TxPool>) -> Self {
        Self {
            peers,
            txpool,
            fetcher: Mutex::new(None),
            accept_txs: AtomicBool::new(false),
            running: AtomicBool::new(false),
            served: Mutex::new((HashMap::new(), VecDeque::new())),
        }
    }

    pub fn peers(&self) -> &Arc<PeerSet> {
        &self.peers
    }

    /// Attach the fetcher that receives peer announcements.
    pub fn attach_fetcher(&self, handle: FetcherHandle) {
        *self.fetcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Start serving peers with the given connection limit.
    pub fn start(&self, max_peers: usize) {
        self.peers.set_max_peers(max_peers);
        self.running.store(true, Ordering::Release);
        tracing::info!(max_peers, "protocol manager started");
    }

    /// Stop serving: drop every peer and detach the fetcher.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.peers.clear();
        self.fetcher.lock().unwrap_or_else(|e| e.into_inner()).take();
        tracing::info!("protocol manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_accept_txs(&self, accept: bool) {
        let previous = self.accept_txs.swap(accept, Ordering::AcqRel);
        if previous != accept {
            tracing::info!(accept, "transaction admission changed");
        }
    }

    pub fn accepts_txs(&self) -> bool {
        self.accept_txs.load(Ordering::Acquire)
    }

    /// Admit transactions from a peer into the pool.
    pub fn handle_transactions(&self, peer: NodeId, txs: Vec<Vec<u8>>) -> Result<usize, NetworkError> {
        if !self.accepts_txs() {
            tracing::trace!(peer = %peer.short(), count = txs.len(), "transactions refused, not synced");
            return Err(NetworkError::NotSynced);
        }
        let added = self.txpool.add_remotes(txs);
        tracing::debug!(peer = %peer.short(), added, "transactions admitted");
        Ok(added)
    }

    /// Keep a block available for header and body requests.
    pub fn serve_block(&self, block: Block) {
        let mut guard = self.served.lock().unwrap_or_else(|e| e.into_inner());
        let (blocks, order) = &mut *guard;
        let hash = block.hash();
        if blocks.insert(hash, block).is_none() {
            order.push_back(hash);
        }
        while order.len() > SERVED_BLOCKS {
            if let Some(old) = order.pop_front() {
                blocks.remove(&old);
            }
        }
    }

    fn served_block(&self, hash: &BlockHash) -> Option<Block> {
        let guard = self.served.lock().unwrap_or_else(|e| e.into_inner());
        guard.0.get(hash).cloned()
    }

    /// Dispatch one decoded message from `peer`.
    pub fn handle_message(&self, peer: NodeId, message: Message) -> Result<(), NetworkError> {
        if !self.is_running() {
            return Err(NetworkError::NotRunning);
        }
        match message {
            Message::Announce(announcement) => {
                let fetcher = self.fetcher.lock().unwrap_or_else(|e| e.into_inner()).clone();
                match fetcher {
                    Some(fetcher) => fetcher.notify(peer, announcement),
                    None => Ok(()),
                }
            }
            Message::BlockHeader(header) => self.with_fetcher(|f| f.deliver_header(peer, header)),
            Message::BlockBodies { bodies } => self.with_fetcher(|f| f.deliver_bodies(peer, bodies)),
            Message::GetBlockHeader { hash } => {
                let Some(block) = self.served_block(&hash) else {
                    return Ok(());
                };
                let reply = Message::BlockHeader(SignedHeader {
                    header: block.header().clone(),
                    signature: block.signature().clone(),
                });
                self.reply(peer, reply)
            }
            Message::GetBlockBodies { hashes } => {
                let bodies: Vec<_> = hashes
                    .iter()
                    .filter_map(|h| self.served_block(h).map(|b| (*h, b.body().to_vec())))
                    .collect();
                if bodies.is_empty() {
                    return Ok(());
                }
                self.reply(peer, Message::BlockBodies { bodies })
            }
            Message::Transactions(txs) => match self.handle_transactions(peer, txs) {
                Ok(_) | Err(NetworkError::NotSynced) => Ok(()),
                Err(e) => Err(e),
            },
        }
    }

    fn with_fetcher(
        &self,
        f: impl FnOnce(&FetcherHandle) -> Result<(), NetworkError>,
    ) -> Result<(), NetworkError> {
        let fetcher = self.fetcher.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match fetcher {
            Some(fetcher) => f(&fetcher),
            None => Ok(()),
        }
    }

    fn reply(&self, peer: NodeId, message: Message) -> Result<(), NetworkError> {
        let connection = self
            .peers
            .connection(&peer)
            .ok_or_else(|| NetworkError::PeerNotFound(peer.short()))?;
        connection.send(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelConnection, PeerRecord};
    use tessera_messages::Envelope;
    use tessera_types::{Address, BlockHeader, Epoch, Height, NetworkId, Signature};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct CountingPool(Mutex<Vec<Vec<u8>>>);

    impl TxPool for CountingPool {
        fn add_remotes(&self, txs: Vec<Vec<u8>>) -> usize {
            let n = txs.len();
            self.0.lock().unwrap().extend(txs);
            n
        }
        fn pending(&self, max: usize) -> Vec<Vec<u8>> {
            self.0.lock().unwrap().iter().take(max).cloned().collect()
        }
        fn remove_included(&self, _txs: &[Vec<u8>]) {}
        fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }
        fn stop(&self) {}
    }

    fn manager() -> (ProtocolManager, Arc<CountingPool>) {
        let pool = Arc::new(CountingPool::default());
        let pm = ProtocolManager::new(Arc::new(PeerSet::new(8)), pool.clone());
        pm.start(8);
        (pm, pool)
    }

    #[test]
    fn transactions_refused_until_accepting() {
        let (pm, pool) = manager();
        let peer = NodeId::new([1; 32]);
        assert!(matches!(
            pm.handle_transactions(peer, vec![vec![1]]),
            Err(NetworkError::NotSynced)
        ));
        assert_eq!(pool.len(), 0);

        pm.set_accept_txs(true);
        assert_eq!(pm.handle_transactions(peer, vec![vec![1], vec![2]]).unwrap(), 2);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn stopped_manager_rejects_messages() {
        let (pm, _) = manager();
        pm.stop();
        assert!(matches!(
            pm.handle_message(NodeId::new([1; 32]), Message::Transactions(vec![])),
            Err(NetworkError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn serves_header_for_known_block() {
        let (pm, _) = manager();
        let peer = NodeId::new([1; 32]);
        let (tx, mut rx) = mpsc::channel(4);
        pm.peers()
            .register(PeerRecord {
                id: peer,
                connection: Arc::new(ChannelConnection::new(peer, NetworkId::Dev, tx)),
                connected_at_secs: 0,
            })
            .unwrap();

        let header = BlockHeader {
            parent: BlockHash::ZERO,
            height: Height::new(3),
            epoch: Epoch::new(0),
            producer: NodeId::new([2; 32]),
            coinbase: Address::ZERO,
            timestamp: 0,
            tx_root: tessera_types::tx_root(&[]),
            extra: Vec::new(),
            nonce: 0,
        };
        let block = Block::new(header, Vec::new(), Signature::EMPTY);
        let hash = block.hash();
        pm.serve_block(block);

        pm.handle_message(peer, Message::GetBlockHeader { hash }).unwrap();
        let (_, bytes) = rx.recv().await.unwrap();
        match Envelope::decode(&bytes, NetworkId::Dev).unwrap() {
            Message::BlockHeader(signed) => assert_eq!(signed.header.hash(), hash),
            other => panic!("unexpected {:?}", other),
        }
    }
}
