//! YAML configuration surface.
//!
//! Loads the per-chain settings callers hand to the adapter constructors.
//! The adapters themselves never read files or globals.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Secret string material (private keys) with a redacted `Debug`.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret. Callers must not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Top-level configuration; each chain section is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// EVM payout contract settings.
    #[serde(default)]
    pub evm: Option<EvmConfig>,
    /// NEO payout contract settings.
    #[serde(default)]
    pub neo: Option<NeoConfig>,
}

/// Settings for the EVM payout adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct EvmConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
    /// Hex-encoded secp256k1 private key of the contract owner.
    pub private_key: Secret,
    /// Deployed payout contract address.
    #[serde(default)]
    pub contract: Option<String>,
}

/// Settings for the NEO payout adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct NeoConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
    /// WIF-encoded secp256r1 private key of the contract owner.
    pub private_key: Secret,
    /// Deployed contract script hash (0x-prefixed, display byte order).
    #[serde(default)]
    pub contract: Option<String>,
    /// Deploy the contract on startup and bind to the resulting hash.
    #[serde(default)]
    pub deploy: bool,
    /// Compiled contract (NEF) used when `deploy` is set.
    #[serde(default = "default_nef_path")]
    pub nef_path: PathBuf,
    /// Contract manifest used when `deploy` is set.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,
}

fn default_nef_path() -> PathBuf {
    PathBuf::from("./PayoutNeo.nef")
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("./PayoutNeo.manifest.json")
}

impl Config {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }
}
