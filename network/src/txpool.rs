//! Transaction pool seam.

/// The node's pool of pending, opaque transactions.
pub trait TxPool: Send + Sync {
    /// Add transactions received from peers. Returns how many were new.
    fn add_remotes(&self, txs: Vec<Vec<u8>>) -> usize;

    /// Up to `max` pending transactions, oldest first.
    fn pending(&self, max: usize) -> Vec<Vec<u8>>;

    /// Drop transactions included in a block.
    fn remove_included(&self, txs: &[Vec<u8>]);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting transactions and release resources.
    fn stop(&self);
}
