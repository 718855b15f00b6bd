//! Nullable accounts: an in-memory wallet that counts queries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tessera_crypto::{derive_address, keypair_from_seed, sign_message};
use tessera_types::{Address, KeyPair, Signature};
use tessera_wallet_core::{Account, Wallet, WalletError};

pub struct NullWallet {
    keys: Vec<KeyPair>,
    queries: Arc<AtomicUsize>,
}

impl NullWallet {
    /// One account per seed, in order.
    pub fn from_seeds(seeds: &[[u8; 32]]) -> Self {
        Self {
            keys: seeds.iter().map(keypair_from_seed).collect(),
            queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn empty() -> Self {
        Self::from_seeds(&[])
    }

    /// Number of `accounts()` calls so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn address(&self, index: usize) -> Address {
        derive_address(&self.keys[index].public)
    }
}

impl Wallet for NullWallet {
    fn url(&self) -> String {
        "null://wallet".to_string()
    }

    fn accounts(&self) -> Vec<Account> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.keys
            .iter()
            .map(|kp| Account {
                address: derive_address(&kp.public),
                public_key: kp.public,
                url: self.url(),
            })
            .collect()
    }

    fn contains(&self, address: &Address) -> bool {
        self.keys
            .iter()
            .any(|kp| derive_address(&kp.public) == *address)
    }

    fn sign_hash(&self, address: &Address, hash: &[u8; 32]) -> Result<Signature, WalletError> {
        let key = self
            .keys
            .iter()
            .find(|kp| derive_address(&kp.public) == *address)
            .ok_or(WalletError::UnknownAccount(*address))?;
        Ok(sign_message(hash, &key.private))
    }
}
