//! Configuration module for the load tester
//!
//! Loads a TOML file into [`LoadConfig`], applies `.env` / environment
//! overrides for secrets, validates ranges, and derives the immutable
//! [`ChainConfig`] that every account shares for the lifetime of the run.

use alloy_primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::account::RetryPolicy;
use crate::group::scenario::ScenarioKind;

/// Environment variable that overrides `funding.rich_private_key`
pub const RICH_KEY_ENV: &str = "RICH_PRIVATE_KEY";

/// Routing contract that receives every routed payload unless configured otherwise
pub const DEFAULT_ROUTING_ADDRESS: Address = address!("0000000000000000000000000000000000001000");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Invalid amount for {field}: {value:?}")]
    InvalidAmount { field: &'static str, value: String },

    #[error("No rich account key configured (set funding.rich_private_key or RICH_PRIVATE_KEY)")]
    MissingRichKey,
}

impl ConfigError {
    pub fn category(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "config_io",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
            ConfigError::InvalidAmount { .. } => "config_amount",
            ConfigError::MissingRichKey => "config_missing_key",
        }
    }

    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Main load-test configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Chain parameters shared by every account
    pub chain: ChainSection,

    /// RPC endpoint and client pool
    pub rpc: RpcSection,

    /// Account population and snapshot location
    #[serde(default)]
    pub accounts: AccountsSection,

    /// Funding source and distribution tree
    #[serde(default)]
    pub funding: FundingSection,

    /// Scenarios the run will execute
    #[serde(default)]
    pub scenarios: Vec<ScenarioKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSection {
    pub chain_id: u64,

    /// Gas price in wei for direct-submit transfers
    #[serde(default = "default_gas_price")]
    pub gas_price: u64,

    #[serde(default)]
    pub base_fee: u64,

    /// Envelopes per batch submission
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_routing_address")]
    pub routing_address: Address,

    #[serde(default = "default_transfer_gas_limit")]
    pub transfer_gas_limit: u64,

    /// Gas limit for direct-submit transactions carrying calldata
    #[serde(default = "default_call_gas_limit")]
    pub call_gas_limit: u64,

    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSection {
    pub endpoint: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum number of concurrently checked-out RPC clients
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsSection {
    #[serde(default = "default_signed_accounts")]
    pub signed: usize,

    #[serde(default)]
    pub unsigned: usize,

    #[serde(default)]
    pub newly_created: usize,

    /// Directory scanned for and receiving `accounts-*.json` snapshots
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// Leading fraction of each list kept active after funding
    #[serde(default = "default_active_percent")]
    pub active_percent: u32,

    /// Derive account keys deterministically from this seed
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingSection {
    /// Hex secret of the funded source account
    #[serde(default)]
    pub rich_private_key: Option<String>,

    /// Native amount each valid account receives, decimal or 0x-hex wei
    #[serde(default = "default_zero_amount")]
    pub charge_value: String,

    /// Per-transfer gas provision, defaults to gas_price * transfer_gas_limit
    #[serde(default)]
    pub gas_reserve: Option<String>,

    #[serde(default = "default_branching_factor")]
    pub branching_factor: usize,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_inclusion_timeout_ms")]
    pub inclusion_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Tokens distributed on the routed path
    #[serde(default)]
    pub tokens: Vec<String>,

    #[serde(default = "default_zero_amount")]
    pub token_charge_value: String,
}

fn default_gas_price() -> u64 { 25_000_000_000 }
fn default_batch_size() -> usize { 100 }
fn default_routing_address() -> Address { DEFAULT_ROUTING_ADDRESS }
fn default_transfer_gas_limit() -> u64 { 21_000 }
fn default_call_gas_limit() -> u64 { 100_000 }
fn default_session_ttl_secs() -> u64 { 3_600 }
fn default_request_timeout_ms() -> u64 { 10_000 }
fn default_pool_capacity() -> usize { 64 }
fn default_signed_accounts() -> usize { 100 }
fn default_snapshot_dir() -> PathBuf { PathBuf::from(".") }
fn default_active_percent() -> u32 { 100 }
fn default_zero_amount() -> String { "0".to_string() }
fn default_branching_factor() -> usize { 4 }
fn default_retry_backoff_ms() -> u64 { 1_000 }
fn default_inclusion_timeout_ms() -> u64 { 30_000 }
fn default_poll_interval_ms() -> u64 { 500 }

impl Default for AccountsSection {
    fn default() -> Self {
        Self {
            signed: default_signed_accounts(),
            unsigned: 0,
            newly_created: 0,
            snapshot_dir: default_snapshot_dir(),
            active_percent: default_active_percent(),
            seed: None,
        }
    }
}

impl Default for FundingSection {
    fn default() -> Self {
        Self {
            rich_private_key: None,
            charge_value: default_zero_amount(),
            gas_reserve: None,
            branching_factor: default_branching_factor(),
            retry_backoff_ms: default_retry_backoff_ms(),
            inclusion_timeout_ms: default_inclusion_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            tokens: Vec::new(),
            token_charge_value: default_zero_amount(),
        }
    }
}

impl LoadConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load configuration, then apply `.env` and environment overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        if let Ok(key) = std::env::var(RICH_KEY_ENV) {
            config.funding.rich_private_key = Some(key);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reject out-of-range values before anything touches the network
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.chain_id == 0 {
            return Err(ConfigError::invalid("chain.chain_id", "must be non-zero"));
        }
        if self.chain.batch_size == 0 {
            return Err(ConfigError::invalid("chain.batch_size", "must be at least 1"));
        }
        if self.rpc.endpoint.trim().is_empty() {
            return Err(ConfigError::invalid("rpc.endpoint", "must not be empty"));
        }
        if self.rpc.pool_capacity == 0 {
            return Err(ConfigError::invalid("rpc.pool_capacity", "must be at least 1"));
        }
        if self.accounts.active_percent > 100 {
            return Err(ConfigError::invalid(
                "accounts.active_percent",
                format!("{} exceeds 100", self.accounts.active_percent),
            ));
        }
        if self.funding.branching_factor < 2 {
            return Err(ConfigError::invalid(
                "funding.branching_factor",
                format!("{} is below 2", self.funding.branching_factor),
            ));
        }
        if self.funding.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("funding.poll_interval_ms", "must be non-zero"));
        }

        self.charge_value()?;
        self.token_charge_value()?;
        self.gas_reserve()?;
        Ok(())
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            chain_id: self.chain.chain_id,
            gas_price: u128::from(self.chain.gas_price),
            base_fee: u128::from(self.chain.base_fee),
            batch_size: self.chain.batch_size,
            routing_address: self.chain.routing_address,
            transfer_gas_limit: self.chain.transfer_gas_limit,
            call_gas_limit: self.chain.call_gas_limit,
            session_ttl: Duration::from_secs(self.chain.session_ttl_secs),
        }
    }

    pub fn charge_value(&self) -> Result<U256, ConfigError> {
        parse_amount("funding.charge_value", &self.funding.charge_value)
    }

    pub fn token_charge_value(&self) -> Result<U256, ConfigError> {
        parse_amount("funding.token_charge_value", &self.funding.token_charge_value)
    }

    /// Gas provision per distribution transfer
    pub fn gas_reserve(&self) -> Result<U256, ConfigError> {
        match &self.funding.gas_reserve {
            Some(value) => parse_amount("funding.gas_reserve", value),
            None => Ok(self.chain_config().transfer_gas_cost()),
        }
    }

    pub fn rich_private_key(&self) -> Result<&str, ConfigError> {
        self.funding
            .rich_private_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingRichKey)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff: Duration::from_millis(self.funding.retry_backoff_ms),
            inclusion_timeout: Duration::from_millis(self.funding.inclusion_timeout_ms),
            poll_interval: Duration::from_millis(self.funding.poll_interval_ms),
        }
    }
}

fn parse_amount(field: &'static str, value: &str) -> Result<U256, ConfigError> {
    U256::from_str(value.trim()).map_err(|_| ConfigError::InvalidAmount {
        field,
        value: value.to_string(),
    })
}

/// Chain parameters fixed at startup and shared by every account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub gas_price: u128,
    pub base_fee: u128,
    pub batch_size: usize,
    pub routing_address: Address,
    pub transfer_gas_limit: u64,
    pub call_gas_limit: u64,
    pub session_ttl: Duration,
}

impl ChainConfig {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            gas_price: u128::from(default_gas_price()),
            base_fee: 0,
            batch_size: default_batch_size(),
            routing_address: DEFAULT_ROUTING_ADDRESS,
            transfer_gas_limit: default_transfer_gas_limit(),
            call_gas_limit: default_call_gas_limit(),
            session_ttl: Duration::from_secs(default_session_ttl_secs()),
        }
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = gas_price;
        self
    }

    pub fn with_routing_address(mut self, routing_address: Address) -> Self {
        self.routing_address = routing_address;
        self
    }

    /// Cost of one plain value transfer at the configured gas price
    pub fn transfer_gas_cost(&self) -> U256 {
        U256::from(self.gas_price) * U256::from(self.transfer_gas_limit)
    }

    /// Gas limit for a direct-submit transaction with the given calldata length
    pub fn gas_limit_for(&self, input_len: usize) -> u64 {
        if input_len == 0 {
            self.transfer_gas_limit
        } else {
            self.call_gas_limit
        }
    }
}
