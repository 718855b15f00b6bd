//! Nullable network: peers whose messages are recorded, not sent.

use std::sync::{Arc, Mutex};

use tessera_messages::{Announcement, Message};
use tessera_network::{AnnouncementSink, NetworkError, PeerConnection, PeerRecord, PeerSet};
use tessera_types::NodeId;

type Outbox = Arc<Mutex<Vec<(NodeId, Message)>>>;

struct NullConnection {
    peer: NodeId,
    outbox: Outbox,
}

impl PeerConnection for NullConnection {
    fn peer(&self) -> NodeId {
        self.peer
    }

    fn send(&self, message: Message) -> Result<(), NetworkError> {
        self.outbox.lock().unwrap().push((self.peer, message));
        Ok(())
    }
}

/// A peer set whose connections record every message.
pub struct NullNetwork {
    peers: Arc<PeerSet>,
    outbox: Outbox,
}

impl NullNetwork {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: Arc::new(PeerSet::new(max_peers)),
            outbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn peers(&self) -> Arc<PeerSet> {
        self.peers.clone()
    }

    /// Register a recording connection for `id`.
    pub fn connect(&self, id: NodeId) {
        self.peers
            .register(PeerRecord {
                id,
                connection: Arc::new(NullConnection {
                    peer: id,
                    outbox: self.outbox.clone(),
                }),
                connected_at_secs: 0,
            })
            .unwrap();
    }

    pub fn disconnect(&self, id: &NodeId) {
        self.peers.unregister(id);
    }

    /// Every message "sent" so far.
    pub fn sent(&self) -> Vec<(NodeId, Message)> {
        self.outbox.lock().unwrap().clone()
    }
}

/// An announcement sink that records what it is handed.
#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<(NodeId, Announcement)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<(NodeId, Announcement)> {
        self.received.lock().unwrap().clone()
    }

    pub fn peers(&self) -> Vec<NodeId> {
        self.received().into_iter().map(|(p, _)| p).collect()
    }
}

impl AnnouncementSink for RecordingSink {
    fn notify(&self, peer: NodeId, announcement: Announcement) -> Result<(), NetworkError> {
        self.received.lock().unwrap().push((peer, announcement));
        Ok(())
    }
}
