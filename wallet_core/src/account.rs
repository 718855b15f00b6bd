use serde::{Deserialize, Serialize};
use tessera_types::{Address, PublicKey};

/// An account held by a wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub public_key: PublicKey,
    /// Where the key lives, e.g. `keystore:///path/to/file.json`.
    pub url: String,
}
