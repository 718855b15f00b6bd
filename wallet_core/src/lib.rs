//! Account management for the Tessera node.
//!
//! - Argon2id + AES-256-GCM encrypted keystore files
//! - Wallets that expose accounts and sign hashes
//! - The [`AccountManager`] the node asks for its etherbase and signer

pub mod account;
pub mod error;
pub mod keystore;
pub mod manager;
pub mod wallet;

pub use account::Account;
pub use error::WalletError;
pub use keystore::{import_key, KdfParams, KeystoreFile};
pub use manager::AccountManager;
pub use wallet::{KeystoreWallet, Wallet};
