//! Consensus engine selection and header sealing.
//!
//! Two engines exist: proof-of-authority when the chain config carries an
//! authority section, proof-of-work otherwise. The choice is made once per
//! node from the chain config and the configured [`PowMode`].
//!
//! Authority seal layout: `extra = vanity || signer public key (32) ||
//! signature (64)`, the signature covering the header hash with the seal
//! stripped from `extra`.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tessera_crypto::{blake2b_256_multi, derive_address, verify_signature};
use tessera_types::{
    Address, AuthorityConfig, BlockHash, BlockHeader, ChainConfig, PublicKey, Signature,
};

use crate::ConsensusError;

const SEAL_LEN: usize = 32 + 64;

/// Upper bound on nonces tried before a work seal gives up.
const MAX_SEAL_ATTEMPTS: u64 = 1 << 28;

/// Nonces tried between checks of the interrupt flag.
const INTERRUPT_STRIDE: u64 = 4096;

/// Work-engine operating mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowMode {
    #[default]
    Normal,
    /// Accepts every seal; for tests and benchmarks.
    Fake,
    /// Low difficulty for test networks.
    Test,
    /// One engine instance shared by every chain in the process.
    Shared,
}

impl PowMode {
    /// Required leading zero bits of the work hash.
    pub fn target_bits(&self) -> u32 {
        match self {
            Self::Normal | Self::Shared => 16,
            Self::Test => 4,
            Self::Fake => 0,
        }
    }
}

impl fmt::Display for PowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Fake => "fake",
            Self::Test => "test",
            Self::Shared => "shared",
        })
    }
}

impl FromStr for PowMode {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "fake" => Ok(Self::Fake),
            "test" => Ok(Self::Test),
            "shared" => Ok(Self::Shared),
            other => Err(ConsensusError::Other(format!("unknown pow mode '{}'", other))),
        }
    }
}

/// An RPC namespace offered by a node component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDescriptor {
    pub namespace: String,
    pub version: String,
    pub service: String,
    pub public: bool,
}

impl ApiDescriptor {
    pub fn new(namespace: &str, service: &str, public: bool) -> Self {
        Self {
            namespace: namespace.to_string(),
            version: "1.0".to_string(),
            service: service.to_string(),
            public,
        }
    }
}

/// Signs authority seals on behalf of an account.
pub trait SealSigner: Send + Sync {
    fn public_key(&self) -> PublicKey;
    fn sign(&self, hash: &BlockHash) -> Result<Signature, ConsensusError>;
}

pub struct AuthorityEngine {
    config: AuthorityConfig,
    signer: RwLock<Option<(Address, Arc<dyn SealSigner>)>>,
}

impl AuthorityEngine {
    pub fn new(config: AuthorityConfig) -> Self {
        Self {
            config,
            signer: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    pub fn is_authority(&self, address: &Address) -> bool {
        self.config.signers.contains(address)
    }

    /// Install the local sealing account.
    pub fn authorize(
        &self,
        address: Address,
        signer: Arc<dyn SealSigner>,
    ) -> Result<(), ConsensusError> {
        if derive_address(&signer.public_key()) != address {
            return Err(ConsensusError::InvalidSeal(format!(
                "signer key does not control {}",
                address
            )));
        }
        let mut slot = self
            .signer
            .write()
            .map_err(|_| ConsensusError::Other("authority signer lock poisoned".into()))?;
        *slot = Some((address, signer));
        tracing::info!(%address, "authority signer authorized");
        Ok(())
    }

    pub fn authorized(&self) -> Option<Address> {
        self.signer
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|(addr, _)| *addr))
    }

    fn seal(&self, mut header: BlockHeader) -> Result<BlockHeader, ConsensusError> {
        let (address, signer) = self
            .signer
            .read()
            .map_err(|_| ConsensusError::Other("authority signer lock poisoned".into()))?
            .clone()
            .ok_or(ConsensusError::SignerMissing)?;
        if !self.is_authority(&address) {
            return Err(ConsensusError::UnauthorizedSigner(address));
        }
        header.coinbase = address;
        header.nonce = 0;
        let signature = signer.sign(&header.hash())?;
        header.extra.extend_from_slice(signer.public_key().as_bytes());
        header.extra.extend_from_slice(signature.as_bytes());
        Ok(header)
    }

    fn verify_header(&self, header: &BlockHeader) -> Result<(), ConsensusError> {
        if header.extra.len() < SEAL_LEN {
            return Err(ConsensusError::InvalidSeal("missing authority seal".into()));
        }
        let vanity = header.extra.len() - SEAL_LEN;
        let mut key = [0u8; 32];
        key.copy_from_slice(&header.extra[vanity..vanity + 32]);
        let mut sig = [0u8; 64];
        sig.copy_from_slice(&header.extra[vanity + 32..]);
        let key = PublicKey(key);

        if derive_address(&key) != header.coinbase {
            return Err(ConsensusError::InvalidSeal(
                "seal key does not match coinbase".into(),
            ));
        }
        if !self.is_authority(&header.coinbase) {
            return Err(ConsensusError::UnauthorizedSigner(header.coinbase));
        }
        let mut unsealed = header.clone();
        unsealed.extra.truncate(vanity);
        if !verify_signature(unsealed.hash().as_bytes(), &Signature(sig), &key) {
            return Err(ConsensusError::InvalidSeal("bad authority signature".into()));
        }
        Ok(())
    }
}

pub struct WorkEngine {
    mode: PowMode,
}

impl WorkEngine {
    pub fn new(mode: PowMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> PowMode {
        self.mode
    }

    fn work_hash(seal_hash: &BlockHash, nonce: u64) -> [u8; 32] {
        blake2b_256_multi(&[&seal_hash.as_bytes()[..], &nonce.to_be_bytes()[..]])
    }

    fn meets_target(hash: &[u8; 32], bits: u32) -> bool {
        let mut zeros = 0u32;
        for byte in hash {
            if *byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros();
                break;
            }
        }
        zeros >= bits
    }

    fn seal(
        &self,
        mut header: BlockHeader,
        interrupt: &AtomicBool,
    ) -> Result<BlockHeader, ConsensusError> {
        let bits = self.mode.target_bits();
        let seal_hash = header.seal_hash();
        for nonce in 0..MAX_SEAL_ATTEMPTS {
            if nonce % INTERRUPT_STRIDE == 0 && interrupt.load(Ordering::Relaxed) {
                return Err(ConsensusError::SealInterrupted);
            }
            if Self::meets_target(&Self::work_hash(&seal_hash, nonce), bits) {
                header.nonce = nonce;
                return Ok(header);
            }
        }
        Err(ConsensusError::SealExhausted(MAX_SEAL_ATTEMPTS))
    }

    fn verify_header(&self, header: &BlockHeader) -> Result<(), ConsensusError> {
        if self.mode == PowMode::Fake {
            return Ok(());
        }
        let hash = Self::work_hash(&header.seal_hash(), header.nonce);
        if !Self::meets_target(&hash, self.mode.target_bits()) {
            return Err(ConsensusError::InvalidSeal(format!(
                "work below {} bits",
                self.mode.target_bits()
            )));
        }
        Ok(())
    }
}

/// The node's consensus engine.
pub enum Engine {
    Authority(AuthorityEngine),
    Work(WorkEngine),
}

impl Engine {
    /// Authority when the chain config asks for it, work otherwise.
    pub fn select(chain: &ChainConfig, pow: PowMode) -> Self {
        match &chain.authority {
            Some(authority) => {
                tracing::info!(
                    signers = authority.signers.len(),
                    period_secs = authority.period_secs,
                    "selected authority engine"
                );
                Engine::Authority(AuthorityEngine::new(authority.clone()))
            }
            None => {
                tracing::info!(mode = %pow, "selected work engine");
                Engine::Work(WorkEngine::new(pow))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Engine::Authority(_) => "authority",
            Engine::Work(_) => "work",
        }
    }

    pub fn as_authority(&self) -> Option<&AuthorityEngine> {
        match self {
            Engine::Authority(a) => Some(a),
            Engine::Work(_) => None,
        }
    }

    /// RPC namespaces this engine contributes.
    pub fn apis(&self) -> Vec<ApiDescriptor> {
        match self {
            Engine::Authority(_) => vec![ApiDescriptor::new("authority", "authority", false)],
            Engine::Work(_) => vec![ApiDescriptor::new("work", "work", true)],
        }
    }

    /// Seal `header`. A work seal polls `interrupt` while searching and
    /// gives up with [`ConsensusError::SealInterrupted`] once it is set.
    pub fn seal(
        &self,
        header: BlockHeader,
        interrupt: &AtomicBool,
    ) -> Result<BlockHeader, ConsensusError> {
        if interrupt.load(Ordering::Relaxed) {
            return Err(ConsensusError::SealInterrupted);
        }
        match self {
            Engine::Authority(a) => a.seal(header),
            Engine::Work(w) => w.seal(header, interrupt),
        }
    }

    pub fn verify_header(&self, header: &BlockHeader) -> Result<(), ConsensusError> {
        match self {
            Engine::Authority(a) => a.verify_header(header),
            Engine::Work(w) => w.verify_header(header),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_crypto::{keypair_from_seed, sign_message};
    use tessera_types::{Epoch, Height, KeyPair, NodeId};

    struct KeySigner(KeyPair);

    impl SealSigner for KeySigner {
        fn public_key(&self) -> PublicKey {
            self.0.public
        }
        fn sign(&self, hash: &BlockHash) -> Result<Signature, ConsensusError> {
            Ok(sign_message(hash.as_bytes(), &self.0.private))
        }
    }

    fn header() -> BlockHeader {
        BlockHeader {
            parent: BlockHash::ZERO,
            height: Height::new(1),
            epoch: Epoch::new(0),
            producer: NodeId::new([1; 32]),
            coinbase: Address::ZERO,
            timestamp: 1,
            tx_root: tessera_types::tx_root(&[]),
            extra: b"tessera".to_vec(),
            nonce: 0,
        }
    }

    fn authority_chain(signer: Address) -> ChainConfig {
        ChainConfig {
            authority: Some(AuthorityConfig {
                period_secs: 5,
                signers: vec![signer],
            }),
            ..ChainConfig::default()
        }
    }

    #[test]
    fn selects_by_chain_config() {
        let work = Engine::select(&ChainConfig::default(), PowMode::Test);
        assert_eq!(work.name(), "work");
        let auth = Engine::select(&authority_chain(Address::ZERO), PowMode::Normal);
        assert_eq!(auth.name(), "authority");
        assert_eq!(auth.apis()[0].namespace, "authority");
    }

    #[test]
    fn work_seal_verifies() {
        let engine = Engine::select(&ChainConfig::default(), PowMode::Test);
        let sealed = engine.seal(header(), &AtomicBool::new(false)).unwrap();
        engine.verify_header(&sealed).unwrap();
    }

    #[test]
    fn interrupted_work_seal_gives_up() {
        let interrupt = AtomicBool::new(true);
        let engine = Engine::Work(WorkEngine::new(PowMode::Normal));
        assert!(matches!(
            engine.seal(header(), &interrupt),
            Err(ConsensusError::SealInterrupted)
        ));
        // the nonce loop polls the flag too
        assert!(matches!(
            WorkEngine::new(PowMode::Normal).seal(header(), &interrupt),
            Err(ConsensusError::SealInterrupted)
        ));
    }

    #[test]
    fn fake_mode_accepts_anything() {
        let engine = Engine::Work(WorkEngine::new(PowMode::Fake));
        let mut h = header();
        h.nonce = 12345;
        engine.verify_header(&h).unwrap();
    }

    #[test]
    fn authority_seal_requires_signer() {
        let kp = keypair_from_seed(&[8u8; 32]);
        let engine = Engine::select(&authority_chain(derive_address(&kp.public)), PowMode::Normal);
        assert!(matches!(
            engine.seal(header(), &AtomicBool::new(false)),
            Err(ConsensusError::SignerMissing)
        ));
    }

    #[test]
    fn authority_seal_roundtrip() {
        let kp = keypair_from_seed(&[8u8; 32]);
        let address = derive_address(&kp.public);
        let engine = Engine::select(&authority_chain(address), PowMode::Normal);
        engine
            .as_authority()
            .unwrap()
            .authorize(address, Arc::new(KeySigner(kp)))
            .unwrap();
        let sealed = engine.seal(header(), &AtomicBool::new(false)).unwrap();
        assert_eq!(sealed.coinbase, address);
        engine.verify_header(&sealed).unwrap();

        let mut forged = sealed.clone();
        forged.timestamp += 1;
        assert!(engine.verify_header(&forged).is_err());
    }

    #[test]
    fn non_authority_cannot_seal() {
        let kp = keypair_from_seed(&[8u8; 32]);
        let address = derive_address(&kp.public);
        let engine = Engine::select(&authority_chain(Address::new([1; 20])), PowMode::Normal);
        engine
            .as_authority()
            .unwrap()
            .authorize(address, Arc::new(KeySigner(kp)))
            .unwrap();
        assert!(matches!(
            engine.seal(header(), &AtomicBool::new(false)),
            Err(ConsensusError::UnauthorizedSigner(_))
        ));
    }

    #[test]
    fn pow_mode_parses() {
        assert_eq!("FAKE".parse::<PowMode>().unwrap(), PowMode::Fake);
        assert!("turbo".parse::<PowMode>().is_err());
    }
}
