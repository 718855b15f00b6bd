//! Live peers keyed by identity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tessera_types::NodeId;

use crate::{NetworkError, PeerConnection};

/// A connected peer.
#[derive(Clone)]
pub struct PeerRecord {
    pub id: NodeId,
    pub connection: Arc<dyn PeerConnection>,
    pub connected_at_secs: u64,
}

/// The set of connected peers, owned by the network layer. Other components
/// only look peers up.
pub struct PeerSet {
    peers: RwLock<HashMap<NodeId, PeerRecord>>,
    max_peers: AtomicUsize,
}

impl PeerSet {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            max_peers: AtomicUsize::new(max_peers),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<NodeId, PeerRecord>> {
        self.peers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<NodeId, PeerRecord>> {
        self.peers.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers.load(Ordering::Relaxed)
    }

    /// Change the limit. Existing peers above the new limit stay connected.
    pub fn set_max_peers(&self, max_peers: usize) {
        self.max_peers.store(max_peers, Ordering::Relaxed);
    }

    /// Add a peer. Re-registering an identity replaces its connection.
    pub fn register(&self, record: PeerRecord) -> Result<(), NetworkError> {
        let mut peers = self.write();
        if !peers.contains_key(&record.id) && peers.len() >= self.max_peers() {
            return Err(NetworkError::TooManyPeers(self.max_peers()));
        }
        tracing::debug!(peer = %record.id.short(), "peer registered");
        peers.insert(record.id, record);
        Ok(())
    }

    pub fn unregister(&self, id: &NodeId) -> Option<PeerRecord> {
        let removed = self.write().remove(id);
        if removed.is_some() {
            tracing::debug!(peer = %id.short(), "peer unregistered");
        }
        removed
    }

    /// Live connection for `id`.
    pub fn connection(&self, id: &NodeId) -> Option<Arc<dyn PeerConnection>> {
        self.read().get(id).map(|r| r.connection.clone())
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.read().contains_key(id)
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every peer.
    pub fn clear(&self) {
        self.write().clear();
    }
}
