//! Queue-based peer connections.
//!
//! A connection does not write to a socket. It encodes the message and pushes
//! `(peer, bytes)` onto the outbound channel that the transport drains, so a
//! slow peer never blocks the caller.

use tokio::sync::mpsc;

use tessera_messages::{Envelope, Message};
use tessera_types::{BlockHash, NetworkId, NodeId};

use crate::NetworkError;

/// Handle to one live peer.
pub trait PeerConnection: Send + Sync {
    fn peer(&self) -> NodeId;

    /// Queue a message for the peer without waiting.
    fn send(&self, message: Message) -> Result<(), NetworkError>;

    fn request_header(&self, hash: BlockHash) -> Result<(), NetworkError> {
        self.send(Message::GetBlockHeader { hash })
    }

    fn request_bodies(&self, hashes: Vec<BlockHash>) -> Result<(), NetworkError> {
        self.send(Message::GetBlockBodies { hashes })
    }
}

pub struct ChannelConnection {
    peer: NodeId,
    network: NetworkId,
    outbound: mpsc::Sender<(NodeId, Vec<u8>)>,
}

impl ChannelConnection {
    pub fn new(peer: NodeId, network: NetworkId, outbound: mpsc::Sender<(NodeId, Vec<u8>)>) -> Self {
        Self {
            peer,
            network,
            outbound,
        }
    }
}

impl PeerConnection for ChannelConnection {
    fn peer(&self) -> NodeId {
        self.peer
    }

    fn send(&self, message: Message) -> Result<(), NetworkError> {
        let kind = message.kind();
        let bytes = Envelope::new(self.network, message).encode()?;
        match self.outbound.try_send((self.peer, bytes)) {
            Ok(()) => {
                tracing::trace!(peer = %self.peer.short(), kind, "queued message");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(NetworkError::QueueFull(self.peer.short())),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(NetworkError::ConnectionClosed(self.peer.short()))
            }
        }
    }
}
