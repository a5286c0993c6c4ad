// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{FederatorError, FederatorResult};
use crate::retry::RetryPolicy;
use anyhow::Result;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `private-key`.
pub const FEDERATOR_KEY_ENV: &str = "FEDERATOR_KEY";
/// Setting this to `true` disables the https host check.
pub const SKIP_HTTPS_ENV: &str = "BRIDGE_SKIP_HTTPS";

const LOCAL_HOST_PREFIXES: &[&str] = &[
    "https://",
    "http://127.0.0.1",
    "http://172.17.0.1",
    "http://localhost",
    "http://0.0.0.0",
];

/// YAML or JSON backed configuration file.
pub trait Config: Serialize + DeserializeOwned {
    fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        Ok(config)
    }

    fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => serde_json::to_string_pretty(self)?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    // Human readable name, used as log prefix and metric label.
    pub name: String,
    // Expected chain id, checked against the node at startup.
    pub chain_id: u64,
    // JSON-RPC endpoint.
    pub host: String,
    pub bridge: Address,
    // Resolved through bridge.getFederation() when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation: Option<Address>,
    // Resolved through bridge.allowTokens() when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_tokens: Option<Address>,
    // First block that may contain bridge events.
    #[serde(default)]
    pub from_block: u64,
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
}

impl ChainConfig {
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct FederatorConfig {
    pub mainchain: ChainConfig,
    pub sidechain: Vec<ChainConfig>,
    #[serde(default = "default_run_every_minutes")]
    pub run_every_minutes: u64,
    // Directory holding cursors, reverted ledgers and the manual check log.
    pub storage_path: PathBuf,
    // Hex encoded secp256k1 key. FEDERATOR_KEY takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etherscan_api_key: Option<String>,
    #[serde(default = "default_federator_retries")]
    pub federator_retries: u32,
    #[serde(default = "default_check_https")]
    pub check_https: bool,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub rpc_retry: RetryPolicy,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "receipt-timeout-secs", default = "default_receipt_timeout")]
    pub receipt_timeout: Duration,
}

impl Config for FederatorConfig {}

fn default_block_time_ms() -> u64 {
    30_000
}

fn default_run_every_minutes() -> u64 {
    2
}

fn default_federator_retries() -> u32 {
    3
}

fn default_check_https() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9184
}

fn default_receipt_timeout() -> Duration {
    Duration::from_secs(750)
}

/// Accepts https endpoints and the local addresses a node runs on in
/// development or next to the federator in docker.
pub fn check_https_or_localhost(host: &str) -> FederatorResult<()> {
    if LOCAL_HOST_PREFIXES
        .iter()
        .any(|prefix| host.starts_with(prefix))
    {
        Ok(())
    } else {
        Err(FederatorError::InsecureEndpoint(host.to_string()))
    }
}

fn parse_private_key(key: &str) -> FederatorResult<LocalWallet> {
    let key = key.trim();
    key.strip_prefix("0x")
        .unwrap_or(key)
        .parse::<LocalWallet>()
        .map_err(|e| FederatorError::SignerError(format!("Invalid private key: {}", e)))
}

impl FederatorConfig {
    pub fn run_every(&self) -> Duration {
        Duration::from_secs(self.run_every_minutes * 60)
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainConfig> {
        std::iter::once(&self.mainchain).chain(self.sidechain.iter())
    }

    pub fn manual_check_path(&self) -> PathBuf {
        self.storage_path.join("manuallyCheck.txt")
    }

    /// Storage for the side chain to main chain federator.
    pub fn side_storage_path(&self) -> PathBuf {
        self.storage_path.join("side-fed")
    }

    fn effective_private_key(&self, env_key: Option<String>) -> Option<String> {
        env_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.private_key.clone())
    }

    /// Wallet used to sign votes, or `None` to fall back to the node's
    /// first unlocked account.
    pub fn signer(&self) -> FederatorResult<Option<LocalWallet>> {
        self.signer_with_env(std::env::var(FEDERATOR_KEY_ENV).ok())
    }

    fn signer_with_env(&self, env_key: Option<String>) -> FederatorResult<Option<LocalWallet>> {
        self.effective_private_key(env_key)
            .map(|key| parse_private_key(&key))
            .transpose()
    }

    pub fn validate(&self) -> FederatorResult<()> {
        let skip_https = std::env::var(SKIP_HTTPS_ENV)
            .map(|v| v == "true")
            .unwrap_or(false);
        self.validate_with(skip_https, std::env::var(FEDERATOR_KEY_ENV).ok())
    }

    fn validate_with(&self, skip_https: bool, env_key: Option<String>) -> FederatorResult<()> {
        if self.sidechain.is_empty() {
            return Err(FederatorError::ConfigError(
                "At least one sidechain must be configured".to_string(),
            ));
        }
        if self.run_every_minutes == 0 {
            return Err(FederatorError::ConfigError(
                "run-every-minutes must be greater than zero".to_string(),
            ));
        }
        if self.federator_retries == 0 {
            return Err(FederatorError::ConfigError(
                "federator-retries must be greater than zero".to_string(),
            ));
        }
        for chain in self.chains() {
            if chain.block_time_ms == 0 {
                return Err(FederatorError::ConfigError(format!(
                    "[{}] block-time-ms must be greater than zero",
                    chain.name
                )));
            }
        }
        if self.check_https && !skip_https {
            for chain in self.chains() {
                check_https_or_localhost(&chain.host)?;
            }
        }
        if let Some(wallet) = self.signer_with_env(env_key)? {
            tracing::info!("Federator signing address: {:?}", wallet.address());
        } else {
            tracing::warn!("No private key configured, votes are sent from the node account");
        }
        Ok(())
    }
}
