//! Mining state, the wallet-backed seal signer and header vanity data.

use std::sync::Arc;

use tokio::sync::{Notify, RwLock};

use tessera_consensus::{ConsensusError, SealSigner};
use tessera_types::{Address, BlockHash, PublicKey, Signature};
use tessera_wallet_core::{Wallet, WalletError};

/// Maximum vanity bytes a producer puts in a header.
pub const MAX_EXTRA_DATA: usize = 32;

const CLIENT_NAME: &str = "tessera";

/// Reward address and mining flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MiningState {
    pub etherbase: Address,
    pub mining: bool,
}

/// The one lock-protected piece of node state. Only the orchestrator writes
/// it; the producer worker reads it and waits on [`MiningControl::nudged`].
#[derive(Default)]
pub struct MiningControl {
    state: RwLock<MiningState>,
    nudge: Notify,
}

impl MiningControl {
    pub fn new(etherbase: Address) -> Self {
        Self {
            state: RwLock::new(MiningState {
                etherbase,
                mining: false,
            }),
            nudge: Notify::new(),
        }
    }

    pub async fn snapshot(&self) -> MiningState {
        *self.state.read().await
    }

    pub async fn is_mining(&self) -> bool {
        self.state.read().await.mining
    }

    pub async fn etherbase(&self) -> Address {
        self.state.read().await.etherbase
    }

    pub async fn set_etherbase(&self, etherbase: Address) {
        self.state.write().await.etherbase = etherbase;
    }

    /// The etherbase in effect, falling back to `fallback` while none is
    /// set. A fallback result is stored, so it is consulted at most once.
    pub async fn etherbase_or_else<F>(&self, fallback: F) -> Option<Address>
    where
        F: FnOnce() -> Option<Address>,
    {
        let mut state = self.state.write().await;
        if state.etherbase.is_zero() {
            state.etherbase = fallback()?;
        }
        Some(state.etherbase)
    }

    /// Turn mining on and wake the producer without waiting for it.
    pub async fn start(&self) {
        self.state.write().await.mining = true;
        self.nudge.notify_one();
    }

    pub async fn stop(&self) {
        self.state.write().await.mining = false;
    }

    /// Resolves after the next [`MiningControl::start`].
    pub async fn nudged(&self) {
        self.nudge.notified().await
    }
}

/// Signs authority seals with an account held by a wallet.
pub struct WalletSigner {
    wallet: Arc<dyn Wallet>,
    address: Address,
    public_key: PublicKey,
}

impl WalletSigner {
    pub fn new(wallet: Arc<dyn Wallet>, address: Address) -> Result<Self, WalletError> {
        let public_key = wallet
            .accounts()
            .into_iter()
            .find(|a| a.address == address)
            .map(|a| a.public_key)
            .ok_or(WalletError::UnknownAccount(address))?;
        Ok(Self {
            wallet,
            address,
            public_key,
        })
    }
}

impl SealSigner for WalletSigner {
    fn public_key(&self) -> PublicKey {
        self.public_key
    }

    fn sign(&self, hash: &BlockHash) -> Result<Signature, ConsensusError> {
        self.wallet
            .sign_hash(&self.address, hash.as_bytes())
            .map_err(|e| ConsensusError::Other(format!("wallet signing failed: {e}")))
    }
}

/// Vanity data for mined headers.
///
/// Empty input selects `[0, major, minor, patch] ++ "tessera" ++ os`. Input
/// longer than [`MAX_EXTRA_DATA`] is truncated with a warning.
pub fn make_extra_data(extra: &[u8]) -> Vec<u8> {
    let mut extra = if extra.is_empty() {
        default_extra_data()
    } else {
        extra.to_vec()
    };
    if extra.len() > MAX_EXTRA_DATA {
        tracing::warn!(
            extra = %hex::encode(&extra),
            limit = MAX_EXTRA_DATA,
            "miner extra data exceeds limit, truncating"
        );
        extra.truncate(MAX_EXTRA_DATA);
    }
    extra
}

fn default_extra_data() -> Vec<u8> {
    let mut version = env!("CARGO_PKG_VERSION")
        .split('.')
        .map(|p| p.parse::<u8>().unwrap_or(0));
    let mut out = vec![
        0,
        version.next().unwrap_or(0),
        version.next().unwrap_or(0),
        version.next().unwrap_or(0),
    ];
    out.extend_from_slice(CLIENT_NAME.as_bytes());
    out.extend_from_slice(std::env::consts::OS.as_bytes());
    out
}
