//! Wallets: holders of one or more accounts that can sign.

use std::path::Path;

use tessera_crypto::{derive_address, keypair_from_seed, sign_message};
use tessera_types::{Address, KeyPair, Signature};

use crate::keystore::KeystoreFile;
use crate::{Account, WalletError};

pub trait Wallet: Send + Sync {
    /// Where this wallet's keys live.
    fn url(&self) -> String;

    /// Accounts in a stable order.
    fn accounts(&self) -> Vec<Account>;

    fn contains(&self, address: &Address) -> bool {
        self.accounts().iter().any(|a| a.address == *address)
    }

    /// Sign a 32-byte hash with the key of `address`.
    fn sign_hash(&self, address: &Address, hash: &[u8; 32]) -> Result<Signature, WalletError>;
}

/// One unlocked key, from a keystore file or held in memory.
pub struct KeystoreWallet {
    url: String,
    keypair: KeyPair,
    address: Address,
}

impl KeystoreWallet {
    /// Decrypt the keystore file at `path`.
    pub fn unlock(path: &Path, password: &str) -> Result<Self, WalletError> {
        let secret = KeystoreFile::load(path)?.open(password)?;
        Ok(Self::from_keypair(
            keypair_from_seed(&secret),
            format!("keystore://{}", path.display()),
        ))
    }

    pub fn from_keypair(keypair: KeyPair, url: String) -> Self {
        let address = derive_address(&keypair.public);
        Self {
            url,
            keypair,
            address,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

impl Wallet for KeystoreWallet {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn accounts(&self) -> Vec<Account> {
        vec![Account {
            address: self.address,
            public_key: self.keypair.public,
            url: self.url.clone(),
        }]
    }

    fn contains(&self, address: &Address) -> bool {
        self.address == *address
    }

    fn sign_hash(&self, address: &Address, hash: &[u8; 32]) -> Result<Signature, WalletError> {
        if *address != self.address {
            return Err(WalletError::UnknownAccount(*address));
        }
        Ok(sign_message(hash, &self.keypair.private))
    }
}
