//! Wire message types for Tessera node-to-node communication.
//!
//! Messages are bincode-encoded inside an [`Envelope`] carrying the network
//! id and protocol version; a node drops envelopes from other networks or
//! with an unsupported version before looking at the payload.

use serde::{Deserialize, Serialize};
use tessera_types::{BlockHash, BlockHeader, Height, NetworkId, Signature};
use thiserror::Error;

/// Protocol version spoken by this node.
pub const PROTOCOL_VERSION: u16 = 1;

/// Upper bound on an encoded envelope.
pub const MAX_MESSAGE_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("message for network {got:?}, expected {expected:?}")]
    WrongNetwork { expected: NetworkId, got: NetworkId },

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),
}

/// "I have this block": sent to duty-holding peers when a block becomes
/// available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub hash: BlockHash,
    pub height: Height,
    /// Unix seconds at which the announcer learned of the block.
    pub timestamp: u64,
}

/// A header with the producer's signature, enough to rebuild the block once
/// its body arrives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedHeader {
    pub header: BlockHeader,
    pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Announce(Announcement),
    GetBlockHeader { hash: BlockHash },
    BlockHeader(SignedHeader),
    GetBlockBodies { hashes: Vec<BlockHash> },
    BlockBodies { bodies: Vec<(BlockHash, Vec<Vec<u8>>)> },
    Transactions(Vec<Vec<u8>>),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Announce(_) => "announce",
            Message::GetBlockHeader { .. } => "get_block_header",
            Message::BlockHeader(_) => "block_header",
            Message::GetBlockBodies { .. } => "get_block_bodies",
            Message::BlockBodies { .. } => "block_bodies",
            Message::Transactions(_) => "transactions",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub network_id: NetworkId,
    pub protocol_version: u16,
    pub payload: Message,
}

impl Envelope {
    pub fn new(network_id: NetworkId, payload: Message) -> Self {
        Self {
            network_id,
            protocol_version: PROTOCOL_VERSION,
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode and check network and version.
    pub fn decode(bytes: &[u8], expected: NetworkId) -> Result<Message, MessageError> {
        use bincode::Options;
        let envelope: Envelope = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(MAX_MESSAGE_SIZE)
            .deserialize(bytes)?;
        if envelope.network_id != expected {
            return Err(MessageError::WrongNetwork {
                expected,
                got: envelope.network_id,
            });
        }
        if envelope.protocol_version != PROTOCOL_VERSION {
            return Err(MessageError::UnsupportedVersion(envelope.protocol_version));
        }
        Ok(envelope.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announce() -> Message {
        Message::Announce(Announcement {
            hash: BlockHash::new([7u8; 32]),
            height: Height::new(42),
            timestamp: 1_700_000_000,
        })
    }

    #[test]
    fn envelope_decodes_on_same_network() {
        let bytes = Envelope::new(NetworkId::Dev, announce()).encode().unwrap();
        assert_eq!(Envelope::decode(&bytes, NetworkId::Dev).unwrap(), announce());
    }

    #[test]
    fn other_network_is_rejected() {
        let bytes = Envelope::new(NetworkId::Test, announce()).encode().unwrap();
        assert!(matches!(
            Envelope::decode(&bytes, NetworkId::Live),
            Err(MessageError::WrongNetwork { .. })
        ));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut envelope = Envelope::new(NetworkId::Dev, announce());
        envelope.protocol_version = PROTOCOL_VERSION + 1;
        let bytes = envelope.encode().unwrap();
        assert!(matches!(
            Envelope::decode(&bytes, NetworkId::Dev),
            Err(MessageError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn garbage_is_codec_error() {
        assert!(matches!(
            Envelope::decode(&[0xff; 3], NetworkId::Dev),
            Err(MessageError::Codec(_))
        ));
    }
}
