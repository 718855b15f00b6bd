//! Account manager: the set of wallets the node may use.

use std::path::Path;
use std::sync::Arc;

use tessera_types::Address;

use crate::{Account, KeystoreWallet, Wallet, WalletError};

#[derive(Clone, Default)]
pub struct AccountManager {
    wallets: Vec<Arc<dyn Wallet>>,
}

impl AccountManager {
    pub fn new(wallets: Vec<Arc<dyn Wallet>>) -> Self {
        Self { wallets }
    }

    /// Unlock every `*.json` keystore in `dir` with `password`, in file name
    /// order. A missing directory yields an empty manager.
    pub fn from_keystore_dir(dir: &Path, password: &str) -> Result<Self, WalletError> {
        if !dir.exists() {
            return Ok(Self::default());
        }
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        paths.sort();

        let mut wallets: Vec<Arc<dyn Wallet>> = Vec::with_capacity(paths.len());
        for path in paths {
            match KeystoreWallet::unlock(&path, password) {
                Ok(wallet) => wallets.push(Arc::new(wallet)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping keystore file")
                }
            }
        }
        tracing::info!(wallets = wallets.len(), dir = %dir.display(), "keystore loaded");
        Ok(Self { wallets })
    }

    pub fn wallets(&self) -> &[Arc<dyn Wallet>] {
        &self.wallets
    }

    pub fn add(&mut self, wallet: Arc<dyn Wallet>) {
        self.wallets.push(wallet);
    }

    /// Wallet holding `address`.
    pub fn find(&self, address: &Address) -> Result<Arc<dyn Wallet>, WalletError> {
        self.wallets
            .iter()
            .find(|w| w.contains(address))
            .cloned()
            .ok_or(WalletError::UnknownAccount(*address))
    }

    /// All accounts across wallets, wallet order first.
    pub fn accounts(&self) -> Vec<Account> {
        self.wallets.iter().flat_map(|w| w.accounts()).collect()
    }
}
