//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tessera_consensus::PowMode;
use tessera_types::{Address, KeyPair, NetworkId};

use crate::NodeError;

/// How the node catches up with the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Fast,
    /// Header-only sync. Refused by a full node.
    Light,
}

impl FromStr for SyncMode {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "fast" => Ok(Self::Fast),
            "light" => Ok(Self::Light),
            _ => Err(NodeError::InvalidSyncMode(s.to_string())),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::Fast => "fast",
            Self::Light => "light",
        })
    }
}

/// Configuration for a Tessera node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to connect to.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Data directory for the node database and keystore.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// "full", "fast" or "light". Validated when the node is built.
    #[serde(default = "default_sync_mode")]
    pub sync_mode: String,

    /// Maximum number of peer connections.
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,

    /// Percentage of capacity given to light clients; 0 disables serving.
    #[serde(default)]
    pub light_serv: u32,

    /// Peer slots reserved for light clients when serving.
    #[serde(default = "default_light_peers")]
    pub light_peers: usize,

    /// Mining reward address. Zero means "first local account".
    #[serde(default)]
    pub etherbase: Address,

    /// Work-engine mode when the chain has no authority config.
    #[serde(default)]
    pub pow_mode: PowMode,

    /// Open the database without checking its schema version.
    #[serde(default)]
    pub skip_version_check: bool,

    /// LMDB map size in MiB.
    #[serde(default = "default_database_cache_mb")]
    pub database_cache_mb: usize,

    /// Tasks serving bloom-bits retrieval requests.
    #[serde(default = "default_bloom_handlers")]
    pub bloom_handlers: usize,

    /// Blocks per bloom-bits section.
    #[serde(default = "default_bloom_section_size")]
    pub bloom_section_size: u64,

    /// Trailing epochs whose committees stay addressable.
    #[serde(default = "default_retain_epochs")]
    pub retain_epochs: u64,

    /// Vanity bytes placed in mined headers. Empty selects a default.
    #[serde(default)]
    pub extra_data: String,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Hex-encoded 32-byte seed of the node identity key. A fresh key is
    /// generated when absent.
    #[serde(default)]
    pub identity_seed: Option<String>,

    /// Directory of encrypted account keystores.
    #[serde(default)]
    pub keystore_dir: Option<PathBuf>,

    /// Genesis description (JSON). A single-node development genesis is
    /// used when absent.
    #[serde(default)]
    pub genesis: Option<PathBuf>,

    /// Start mining once the node is running.
    #[serde(default)]
    pub mine: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Dev
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./tessera_data")
}

fn default_sync_mode() -> String {
    "full".to_string()
}

fn default_max_peers() -> usize {
    50
}

fn default_light_peers() -> usize {
    100
}

fn default_database_cache_mb() -> usize {
    1024
}

fn default_bloom_handlers() -> usize {
    3
}

fn default_bloom_section_size() -> u64 {
    4096
}

fn default_retain_epochs() -> u64 {
    2
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn sync_mode(&self) -> Result<SyncMode, NodeError> {
        self.sync_mode.parse()
    }

    /// The node identity key from `identity_seed`, if configured.
    pub fn identity(&self) -> Result<Option<KeyPair>, NodeError> {
        let Some(seed) = &self.identity_seed else {
            return Ok(None);
        };
        let bytes = hex::decode(seed.trim_start_matches("0x"))
            .map_err(|e| NodeError::Config(format!("identity_seed: {e}")))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| NodeError::Config("identity_seed must be 32 bytes".into()))?;
        Ok(Some(tessera_crypto::keypair_from_seed(&seed)))
    }

    /// LMDB map size in bytes.
    pub fn map_size(&self) -> usize {
        self.database_cache_mb.max(1).saturating_mul(1024 * 1024)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            data_dir: default_data_dir(),
            sync_mode: default_sync_mode(),
            max_peers: default_max_peers(),
            light_serv: 0,
            light_peers: default_light_peers(),
            etherbase: Address::ZERO,
            pow_mode: PowMode::default(),
            skip_version_check: false,
            database_cache_mb: default_database_cache_mb(),
            bloom_handlers: default_bloom_handlers(),
            bloom_section_size: default_bloom_section_size(),
            retain_epochs: default_retain_epochs(),
            extra_data: String::new(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            identity_seed: None,
            keystore_dir: None,
            genesis: None,
            mine: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.max_peers, config.max_peers);
        assert_eq!(parsed.etherbase, Address::ZERO);
        assert_eq!(parsed.pow_mode, PowMode::Normal);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.max_peers, 50);
        assert_eq!(config.log_format, "human");
        assert_eq!(config.sync_mode().unwrap(), SyncMode::Full);
        assert_eq!(config.retain_epochs, 2);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            max_peers = 100
            pow_mode = "fake"
            light_serv = 25
            etherbase = "0x0101010101010101010101010101010101010101"
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.max_peers, 100);
        assert_eq!(config.pow_mode, PowMode::Fake);
        assert_eq!(config.light_serv, 25);
        assert_eq!(config.etherbase, Address::new([1; 20]));
        assert_eq!(config.log_format, "human");
    }

    #[test]
    fn unknown_sync_mode_is_rejected() {
        let config = NodeConfig {
            sync_mode: "turbo".into(),
            ..Default::default()
        };
        assert!(matches!(config.sync_mode(), Err(NodeError::InvalidSyncMode(m)) if m == "turbo"));
    }

    #[test]
    fn identity_seed_must_be_32_bytes() {
        let mut config = NodeConfig {
            identity_seed: Some("abcd".into()),
            ..Default::default()
        };
        assert!(matches!(config.identity(), Err(NodeError::Config(_))));

        config.identity_seed = Some(hex::encode([7u8; 32]));
        let kp = config.identity().unwrap().unwrap();
        assert_eq!(kp.public, tessera_crypto::keypair_from_seed(&[7u8; 32]).public);
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/tessera.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
