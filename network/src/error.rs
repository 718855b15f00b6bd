use thiserror::Error;

use tessera_messages::MessageError;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connection to {0} closed")]
    ConnectionClosed(String),

    #[error("peer {0} not found")]
    PeerNotFound(String),

    #[error("peer limit of {0} reached")]
    TooManyPeers(usize),

    #[error("outbound queue full for peer {0}")]
    QueueFull(String),

    #[error("transactions refused: node is not synced")]
    NotSynced,

    #[error("protocol manager is not running")]
    NotRunning,

    #[error("message error: {0}")]
    Message(#[from] MessageError),
}
