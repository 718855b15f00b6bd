//! Block, header and block hash types.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Address, Epoch, Height, NodeId, Signature};

type Blake2b256 = Blake2b<U32>;

/// A 32-byte block hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl Default for BlockHash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl BlockHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "\u{2026})")
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Block header. The producer signs [`BlockHeader::hash`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent: BlockHash,
    pub height: Height,
    pub epoch: Epoch,
    /// Identity scheduled to produce this height.
    pub producer: NodeId,
    /// Address credited with the production reward.
    pub coinbase: Address,
    /// Unix seconds.
    pub timestamp: u64,
    /// Commitment to the body, see [`tx_root`].
    pub tx_root: [u8; 32],
    pub extra: Vec<u8>,
    /// Engine seal (proof-of-work nonce; zero under proof-of-authority).
    pub nonce: u64,
}

impl BlockHeader {
    /// Blake2b-256 over every header field in declaration order.
    pub fn hash(&self) -> BlockHash {
        let mut hasher = Blake2b256::new();
        hasher.update(self.parent.as_bytes());
        hasher.update(self.height.as_u64().to_be_bytes());
        hasher.update(self.epoch.as_u64().to_be_bytes());
        hasher.update(self.producer.as_bytes());
        hasher.update(self.coinbase.as_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update(self.tx_root);
        hasher.update((self.extra.len() as u64).to_be_bytes());
        hasher.update(&self.extra);
        hasher.update(self.nonce.to_be_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        BlockHash::new(out)
    }

    /// Hash of the header with the seal zeroed, the input to proof-of-work.
    pub fn seal_hash(&self) -> BlockHash {
        let mut unsealed = self.clone();
        unsealed.nonce = 0;
        unsealed.hash()
    }
}

/// Commitment over an ordered list of opaque transactions.
pub fn tx_root(body: &[Vec<u8>]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update((body.len() as u64).to_be_bytes());
    for tx in body {
        hasher.update((tx.len() as u64).to_be_bytes());
        hasher.update(tx);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// A signed block: header, body and the producer's signature.
///
/// Fields are only readable once constructed; a signed block is immutable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    header: BlockHeader,
    body: Vec<Vec<u8>>,
    signature: Signature,
}

impl Block {
    pub fn new(header: BlockHeader, body: Vec<Vec<u8>>, signature: Signature) -> Self {
        Self {
            header,
            body,
            signature,
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn body(&self) -> &[Vec<u8>] {
        &self.body
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn height(&self) -> Height {
        self.header.height
    }
}
