//! Block announcement handling.
//!
//! Sending side: [`DirectAnnouncer`] pushes an `Announce` message straight to
//! one peer's connection.
//!
//! Receiving side: the [`Fetcher`] task takes announcements from peers,
//! drops hashes it has already seen, asks the announcing peer for the header
//! and then for the body, and emits the reassembled block.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use tessera_messages::{Announcement, Message, SignedHeader};
use tessera_types::{tx_root, Block, BlockHash, Height, NodeId};

use crate::{NetworkError, PeerSet, RecentHashes};

/// Somewhere to hand a block announcement destined for (or received from)
/// a peer.
pub trait AnnouncementSink: Send + Sync {
    fn notify(&self, peer: NodeId, announcement: Announcement) -> Result<(), NetworkError>;
}

/// Sends announcements directly over the peer's connection.
pub struct DirectAnnouncer {
    peers: Arc<PeerSet>,
}

impl DirectAnnouncer {
    pub fn new(peers: Arc<PeerSet>) -> Self {
        Self { peers }
    }
}

impl AnnouncementSink for DirectAnnouncer {
    fn notify(&self, peer: NodeId, announcement: Announcement) -> Result<(), NetworkError> {
        let connection = self
            .peers
            .connection(&peer)
            .ok_or_else(|| NetworkError::PeerNotFound(peer.short()))?;
        connection.send(Message::Announce(announcement))
    }
}

enum FetchEvent {
    Announce {
        peer: NodeId,
        announcement: Announcement,
    },
    Header {
        peer: NodeId,
        header: SignedHeader,
    },
    Bodies {
        peer: NodeId,
        bodies: Vec<(BlockHash, Vec<Vec<u8>>)>,
    },
}

/// Feeds the fetcher task.
#[derive(Clone)]
pub struct FetcherHandle {
    events: mpsc::Sender<FetchEvent>,
}

impl FetcherHandle {
    fn push(&self, event: FetchEvent) -> Result<(), NetworkError> {
        self.events
            .try_send(event)
            .map_err(|_| NetworkError::QueueFull("fetcher".into()))
    }

    pub fn deliver_header(&self, peer: NodeId, header: SignedHeader) -> Result<(), NetworkError> {
        self.push(FetchEvent::Header { peer, header })
    }

    pub fn deliver_bodies(
        &self,
        peer: NodeId,
        bodies: Vec<(BlockHash, Vec<Vec<u8>>)>,
    ) -> Result<(), NetworkError> {
        self.push(FetchEvent::Bodies { peer, bodies })
    }
}

impl AnnouncementSink for FetcherHandle {
    fn notify(&self, peer: NodeId, announcement: Announcement) -> Result<(), NetworkError> {
        self.push(FetchEvent::Announce { peer, announcement })
    }
}

pub struct Fetcher {
    peers: Arc<PeerSet>,
    seen: RecentHashes,
    max_pending: usize,
    pending_headers: HashMap<BlockHash, (NodeId, Height)>,
    pending_bodies: HashMap<BlockHash, (NodeId, SignedHeader)>,
    completed: mpsc::Sender<Block>,
}

impl Fetcher {
    pub fn new(peers: Arc<PeerSet>, completed: mpsc::Sender<Block>, capacity: usize) -> Self {
        Self {
            peers,
            seen: RecentHashes::new(capacity),
            max_pending: capacity.max(1),
            pending_headers: HashMap::new(),
            pending_bodies: HashMap::new(),
            completed,
        }
    }

    /// Run the fetcher until `shutdown` fires.
    pub fn spawn(
        mut self,
        queue: usize,
        mut shutdown: broadcast::Receiver<()>,
    ) -> (FetcherHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(queue.max(1));
        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        tracing::info!("fetcher shutting down");
                        break;
                    }
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                self.handle(event).await;
            }
        });
        (FetcherHandle { events: tx }, handle)
    }

    async fn handle(&mut self, event: FetchEvent) {
        match event {
            FetchEvent::Announce { peer, announcement } => self.on_announce(peer, announcement),
            FetchEvent::Header { peer, header } => self.on_header(peer, header),
            FetchEvent::Bodies { peer, bodies } => self.on_bodies(peer, bodies).await,
        }
    }

    fn on_announce(&mut self, peer: NodeId, announcement: Announcement) {
        if self.seen.check_and_insert(&announcement.hash) {
            tracing::trace!(hash = %announcement.hash, "announcement already seen");
            return;
        }
        if self.pending_headers.len() >= self.max_pending {
            tracing::warn!(hash = %announcement.hash, "fetch queue full, dropping announcement");
            return;
        }
        let Some(connection) = self.peers.connection(&peer) else {
            tracing::debug!(peer = %peer.short(), "announcing peer gone");
            return;
        };
        match connection.request_header(announcement.hash) {
            Ok(()) => {
                self.pending_headers
                    .insert(announcement.hash, (peer, announcement.height));
            }
            Err(e) => tracing::debug!(peer = %peer.short(), error = %e, "header request failed"),
        }
    }

    fn on_header(&mut self, peer: NodeId, signed: SignedHeader) {
        let hash = signed.header.hash();
        match self.pending_headers.remove(&hash) {
            Some((from, height)) if from == peer && height == signed.header.height => {}
            Some(entry) => {
                tracing::debug!(peer = %peer.short(), %hash, "header does not match announcement");
                self.pending_headers.insert(hash, entry);
                return;
            }
            None => {
                tracing::debug!(peer = %peer.short(), %hash, "unsolicited header");
                return;
            }
        }
        let Some(connection) = self.peers.connection(&peer) else {
            return;
        };
        match connection.request_bodies(vec![hash]) {
            Ok(()) => {
                self.pending_bodies.insert(hash, (peer, signed));
            }
            Err(e) => tracing::debug!(peer = %peer.short(), error = %e, "body request failed"),
        }
    }

    async fn on_bodies(&mut self, peer: NodeId, bodies: Vec<(BlockHash, Vec<Vec<u8>>)>) {
        for (hash, body) in bodies {
            let Some((from, signed)) = self.pending_bodies.remove(&hash) else {
                continue;
            };
            if from != peer {
                self.pending_bodies.insert(hash, (from, signed));
                continue;
            }
            if tx_root(&body) != signed.header.tx_root {
                tracing::warn!(peer = %peer.short(), %hash, "body does not match header");
                continue;
            }
            let block = Block::new(signed.header, body, signed.signature);
            tracing::debug!(%hash, height = %block.height(), "block fetched");
            if self.completed.send(block).await.is_err() {
                tracing::debug!("fetched block receiver dropped");
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.pending_headers.len() + self.pending_bodies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelConnection, PeerRecord};
    use tessera_crypto::{keypair_from_seed, sign_header};
    use tessera_messages::Envelope;
    use tessera_types::{Address, BlockHeader, Epoch, NetworkId};

    fn signed(body: &[Vec<u8>]) -> SignedHeader {
        let kp = keypair_from_seed(&[3u8; 32]);
        let header = BlockHeader {
            parent: BlockHash::ZERO,
            height: Height::new(7),
            epoch: Epoch::new(0),
            producer: NodeId::from_public_key(&kp.public),
            coinbase: Address::ZERO,
            timestamp: 1,
            tx_root: tx_root(body),
            extra: Vec::new(),
            nonce: 0,
        };
        let signature = sign_header(&header, &kp.private);
        SignedHeader { header, signature }
    }

    #[tokio::test]
    async fn announce_header_bodies_yields_block() {
        let peer = NodeId::new([1; 32]);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let peers = Arc::new(PeerSet::new(4));
        peers
            .register(PeerRecord {
                id: peer,
                connection: Arc::new(ChannelConnection::new(peer, NetworkId::Dev, out_tx)),
                connected_at_secs: 0,
            })
            .unwrap();

        let (done_tx, mut done_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (handle, task) = Fetcher::new(peers, done_tx, 64).spawn(16, shutdown_rx);

        let body = vec![vec![1u8, 2, 3]];
        let header = signed(&body);
        let hash = header.header.hash();
        let announcement = Announcement {
            hash,
            height: Height::new(7),
            timestamp: 1,
        };

        handle.notify(peer, announcement).unwrap();
        let (_, bytes) = out_rx.recv().await.unwrap();
        assert_eq!(
            Envelope::decode(&bytes, NetworkId::Dev).unwrap(),
            Message::GetBlockHeader { hash }
        );

        // A repeated announcement is ignored.
        handle.notify(peer, announcement).unwrap();

        handle.deliver_header(peer, header).unwrap();
        let (_, bytes) = out_rx.recv().await.unwrap();
        assert_eq!(
            Envelope::decode(&bytes, NetworkId::Dev).unwrap(),
            Message::GetBlockBodies { hashes: vec![hash] }
        );

        handle.deliver_bodies(peer, vec![(hash, body)]).unwrap();
        let block = done_rx.recv().await.unwrap();
        assert_eq!(block.hash(), hash);
        assert!(out_rx.try_recv().is_err());

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn direct_announcer_requires_connection() {
        let peers = Arc::new(PeerSet::new(4));
        let announcer = DirectAnnouncer::new(peers);
        let result = announcer.notify(
            NodeId::new([9; 32]),
            Announcement {
                hash: BlockHash::ZERO,
                height: Height::new(1),
                timestamp: 0,
            },
        );
        assert!(matches!(result, Err(NetworkError::PeerNotFound(_))));
    }
}
