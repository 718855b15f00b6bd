//! Password-sealed keystore files.
//!
//! Each file holds one Ed25519 seed, sealed with AES-256-GCM under a key
//! stretched from the password by Argon2id. The JSON document also records
//! the account address, so a wallet can list its account before unlocking.

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tessera_crypto::{derive_address, keypair_from_seed};
use tessera_types::Address;

use crate::error::WalletError;

const FORMAT_VERSION: u32 = 1;
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory in KiB.
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// 64 MiB, 3 passes.
    pub const STANDARD: Self = Self {
        memory: 65_536,
        iterations: 3,
        parallelism: 1,
    };

    /// Cheap parameters for development keys and tests.
    pub const LIGHT: Self = Self {
        memory: 1_024,
        iterations: 1,
        parallelism: 1,
    };

    fn cipher(&self, password: &str, salt: &[u8]) -> Result<Aes256Gcm, WalletError> {
        let params = Params::new(self.memory, self.iterations, self.parallelism, Some(32))
            .map_err(|e| WalletError::Kdf(e.to_string()))?;
        let mut key = [0u8; 32];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(password.as_bytes(), salt, &mut key)
            .map_err(|e| WalletError::Kdf(e.to_string()))?;
        Aes256Gcm::new_from_slice(&key).map_err(|e| WalletError::Kdf(e.to_string()))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeystoreFile {
    pub version: u32,
    pub address: Address,
    pub kdf: KdfParams,
    /// Hex fields.
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

impl KeystoreFile {
    /// Seal `seed` under `password`.
    pub fn seal(seed: &[u8; 32], password: &str, kdf: KdfParams) -> Result<Self, WalletError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let ciphertext = kdf
            .cipher(password, &salt)?
            .encrypt(Nonce::from_slice(&nonce), seed.as_slice())
            .map_err(|_| WalletError::Decryption)?;

        Ok(Self {
            version: FORMAT_VERSION,
            address: address_of(seed),
            kdf,
            salt: hex::encode(salt),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        })
    }

    /// Recover the seed. Fails unless it controls the recorded address.
    pub fn open(&self, password: &str) -> Result<[u8; 32], WalletError> {
        if self.version != FORMAT_VERSION {
            return Err(WalletError::UnsupportedVersion(self.version));
        }
        let salt = unhex("salt", &self.salt)?;
        let nonce = unhex("nonce", &self.nonce)?;
        let ciphertext = unhex("ciphertext", &self.ciphertext)?;
        if nonce.len() != NONCE_LEN {
            return Err(WalletError::Malformed {
                field: "nonce",
                reason: format!("{} bytes, want {NONCE_LEN}", nonce.len()),
            });
        }

        let plain = self
            .kdf
            .cipher(password, &salt)?
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| WalletError::Decryption)?;
        let seed: [u8; 32] = plain.as_slice().try_into().map_err(|_| WalletError::Malformed {
            field: "ciphertext",
            reason: format!("sealed {} bytes, want 32", plain.len()),
        })?;

        if address_of(&seed) != self.address {
            return Err(WalletError::AddressMismatch(self.address));
        }
        Ok(seed)
    }

    pub fn load(path: &Path) -> Result<Self, WalletError> {
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), WalletError> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// Seal `seed` into `dir/key--<address>.json`, creating `dir` if needed.
pub fn import_key(
    dir: &Path,
    seed: &[u8; 32],
    password: &str,
    kdf: KdfParams,
) -> Result<PathBuf, WalletError> {
    std::fs::create_dir_all(dir)?;
    let file = KeystoreFile::seal(seed, password, kdf)?;
    let path = dir.join(format!("key--{}.json", hex::encode(file.address.as_bytes())));
    file.save(&path)?;
    tracing::info!(address = %file.address, path = %path.display(), "key imported");
    Ok(path)
}

fn address_of(seed: &[u8; 32]) -> Address {
    derive_address(&keypair_from_seed(seed).public)
}

fn unhex(field: &'static str, value: &str) -> Result<Vec<u8>, WalletError> {
    hex::decode(value).map_err(|e| WalletError::Malformed {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed(seed: u8) -> KeystoreFile {
        KeystoreFile::seal(&[seed; 32], "pw", KdfParams::LIGHT).unwrap()
    }

    #[test]
    fn opens_with_the_sealing_password() {
        assert_eq!(sealed(42).open("pw").unwrap(), [42u8; 32]);
        assert!(matches!(sealed(42).open("nope"), Err(WalletError::Decryption)));
    }

    #[test]
    fn address_is_readable_before_unlock() {
        assert_eq!(sealed(7).address, address_of(&[7u8; 32]));
    }

    #[test]
    fn swapped_address_is_caught() {
        let mut file = sealed(7);
        file.address = Address::new([1; 20]);
        assert!(matches!(file.open("pw"), Err(WalletError::AddressMismatch(_))));
    }

    #[test]
    fn future_versions_are_refused() {
        let mut file = sealed(0);
        file.version = 2;
        assert!(matches!(file.open("pw"), Err(WalletError::UnsupportedVersion(2))));
    }

    #[test]
    fn bad_hex_names_the_field() {
        let mut file = sealed(0);
        file.salt = "zz".into();
        match file.open("pw") {
            Err(WalletError::Malformed { field, .. }) => assert_eq!(field, "salt"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn imported_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = import_key(&dir.path().join("keys"), &[9u8; 32], "pw", KdfParams::LIGHT).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("key--"));
        assert_eq!(KeystoreFile::load(&path).unwrap().open("pw").unwrap(), [9u8; 32]);
        assert!(KeystoreFile::load(&dir.path().join("missing.json")).is_err());
    }
}
