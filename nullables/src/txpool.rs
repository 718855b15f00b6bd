//! Nullable transaction pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tessera_network::TxPool;

#[derive(Default)]
pub struct NullTxPool {
    txs: Mutex<Vec<Vec<u8>>>,
    stopped: AtomicBool,
}

impl NullTxPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl TxPool for NullTxPool {
    fn add_remotes(&self, txs: Vec<Vec<u8>>) -> usize {
        let n = txs.len();
        self.txs.lock().unwrap().extend(txs);
        n
    }

    fn pending(&self, max: usize) -> Vec<Vec<u8>> {
        self.txs.lock().unwrap().iter().take(max).cloned().collect()
    }

    fn remove_included(&self, txs: &[Vec<u8>]) {
        self.txs.lock().unwrap().retain(|t| !txs.contains(t));
    }

    fn len(&self) -> usize {
        self.txs.lock().unwrap().len()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
