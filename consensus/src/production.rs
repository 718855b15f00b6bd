//! Block production and verification seams.
//!
//! The duty pipeline decides *when* a block is built or checked; these traits
//! decide *what* goes into a body and whether a body is acceptable.

use tessera_types::{Address, Block, BlockHash, Epoch, Height, NodeId};

use crate::ConsensusError;

/// Everything a builder may need to fill a body for one height.
#[derive(Clone, Debug)]
pub struct BuildContext {
    pub height: Height,
    pub epoch: Epoch,
    pub parent: BlockHash,
    pub producer: NodeId,
    pub coinbase: Address,
    pub timestamp: u64,
}

pub trait BlockBuilder: Send + Sync {
    /// Opaque transactions for the block at `ctx.height`.
    fn build_body(&self, ctx: &BuildContext) -> Result<Vec<Vec<u8>>, ConsensusError>;
}

pub trait BlockVerifier: Send + Sync {
    /// Body-level checks. Header, seal and signature are checked before this
    /// is called.
    fn verify_body(&self, block: &Block) -> Result<(), String>;
}

/// Limits on transaction count and size; accepts any content within them.
pub struct StructuralVerifier {
    pub max_txs: usize,
    pub max_tx_bytes: usize,
}

impl Default for StructuralVerifier {
    fn default() -> Self {
        Self {
            max_txs: 10_000,
            max_tx_bytes: 128 * 1024,
        }
    }
}

impl BlockVerifier for StructuralVerifier {
    fn verify_body(&self, block: &Block) -> Result<(), String> {
        if block.body().len() > self.max_txs {
            return Err(format!(
                "{} transactions exceed limit {}",
                block.body().len(),
                self.max_txs
            ));
        }
        if let Some((i, tx)) = block
            .body()
            .iter()
            .enumerate()
            .find(|(_, tx)| tx.is_empty() || tx.len() > self.max_tx_bytes)
        {
            return Err(format!("transaction {} has invalid size {}", i, tx.len()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::{BlockHeader, Signature};

    fn block(body: Vec<Vec<u8>>) -> Block {
        let header = BlockHeader {
            parent: BlockHash::ZERO,
            height: Height::new(1),
            epoch: Epoch::new(0),
            producer: NodeId::new([1; 32]),
            coinbase: Address::ZERO,
            timestamp: 0,
            tx_root: tessera_types::tx_root(&body),
            extra: Vec::new(),
            nonce: 0,
        };
        Block::new(header, body, Signature::EMPTY)
    }

    #[test]
    fn accepts_within_limits() {
        let v = StructuralVerifier::default();
        assert!(v.verify_body(&block(vec![vec![1, 2, 3]])).is_ok());
    }

    #[test]
    fn rejects_empty_transaction() {
        let v = StructuralVerifier::default();
        assert!(v.verify_body(&block(vec![vec![]])).is_err());
    }

    #[test]
    fn rejects_too_many_transactions() {
        let v = StructuralVerifier {
            max_txs: 1,
            max_tx_bytes: 10,
        };
        assert!(v.verify_body(&block(vec![vec![1], vec![2]])).is_err());
    }
}
