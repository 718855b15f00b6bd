use thiserror::Error;

use tessera_types::Address;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("unknown account {0}")]
    UnknownAccount(Address),

    #[error("wrong password or corrupted keystore")]
    Decryption,

    #[error("keystore field `{field}` is malformed: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("keystore version {0} is not supported")]
    UnsupportedVersion(u32),

    #[error("keystore key does not control {0}")]
    AddressMismatch(Address),

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("keystore json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("keystore io: {0}")]
    Io(#[from] std::io::Error),
}
