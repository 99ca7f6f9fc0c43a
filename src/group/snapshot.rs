//! Account group snapshots
//!
//! Snapshots are JSON files named `accounts-YYYYMMDD_HHMMSS.json`. The newest
//! file sorts last by name. Each account is stored as its address, its
//! zero-padded 64 hex char private key, and both counters. Empty contract
//! slots are written as `null`; empty records written by older tools are read
//! back as empty slots too.

use alloy_primitives::Address;
use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::{AccountGroup, AccountPurpose, TestContract};
use crate::account::{Account, LogicalClock, SequenceCounter};
use crate::config::ChainConfig;
use crate::keys::{KeyError, KeyMaterial};

pub const SNAPSHOT_PREFIX: &str = "accounts-";
pub const SNAPSHOT_EXTENSION: &str = ".json";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot JSON invalid ({context}): {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid private key at {location}: {source}")]
    InvalidKey {
        location: String,
        #[source]
        source: KeyError,
    },

    #[error("Invalid address at {location}: {value:?}")]
    InvalidAddress { location: String, value: String },

    #[error("Address mismatch at {location}: stored {stored}, key derives {derived}")]
    AddressMismatch {
        location: String,
        stored: Address,
        derived: Address,
    },

    #[error("Snapshot has {found} account lists, at most {max} supported")]
    TooManyLists { found: usize, max: usize },

    #[error("Snapshot has {found} contract slots, at most {max} supported")]
    TooManyContracts { found: usize, max: usize },
}

impl SnapshotError {
    pub fn category(&self) -> &'static str {
        match self {
            SnapshotError::Io { .. } => "snapshot_io",
            SnapshotError::Json { .. } => "snapshot_json",
            SnapshotError::InvalidKey { .. } => "snapshot_key",
            SnapshotError::InvalidAddress { .. } => "snapshot_address",
            SnapshotError::AddressMismatch { .. } => "snapshot_mismatch",
            SnapshotError::TooManyLists { .. } | SnapshotError::TooManyContracts { .. } => {
                "snapshot_shape"
            }
        }
    }
}

/// Persisted form of one account
///
/// Every field defaults, so an empty `{}` record reads as a vacant slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotAccount {
    pub address: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
    pub nonce: u64,
    #[serde(rename = "timeNonce")]
    pub time_nonce: u64,
}

impl SnapshotAccount {
    pub async fn capture(account: &Account) -> Self {
        let (nonce, time_nonce) = account.counters().await;
        Self {
            address: account.address().to_checksum(None),
            private_key: account.private_key_hex().to_string(),
            nonce,
            time_nonce,
        }
    }

    fn is_vacant(&self) -> bool {
        self.address.is_empty() && self.private_key.is_empty()
    }

    /// Rebuild the account, checking the stored address against the key
    pub fn restore(
        &self,
        id: u64,
        location: &str,
        chain: Arc<ChainConfig>,
    ) -> Result<Account, SnapshotError> {
        let keys = KeyMaterial::from_hex(&self.private_key).map_err(|source| {
            SnapshotError::InvalidKey {
                location: location.to_string(),
                source,
            }
        })?;
        let stored = Address::from_str(self.address.trim()).map_err(|_| {
            SnapshotError::InvalidAddress {
                location: location.to_string(),
                value: self.address.clone(),
            }
        })?;
        let derived = keys.address();
        if stored != derived {
            return Err(SnapshotError::AddressMismatch {
                location: location.to_string(),
                stored,
                derived,
            });
        }

        Ok(Account::with_counters(
            id,
            keys,
            SequenceCounter::restored(self.nonce),
            LogicalClock::restored(self.time_nonce),
            chain,
        ))
    }
}

/// Persisted form of an [`AccountGroup`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountGroupSnapshot {
    #[serde(rename = "containsUnsignedAccGrp")]
    pub contains_unsigned: bool,
    #[serde(rename = "Accounts")]
    pub accounts: Vec<Vec<SnapshotAccount>>,
    #[serde(rename = "Contracts", default)]
    pub contracts: Vec<Option<SnapshotAccount>>,
}

impl AccountGroupSnapshot {
    pub async fn capture(group: &AccountGroup) -> Self {
        let mut accounts = Vec::with_capacity(AccountPurpose::COUNT);
        for list in &group.lists {
            let mut records = Vec::with_capacity(list.len());
            for account in list {
                records.push(SnapshotAccount::capture(account).await);
            }
            accounts.push(records);
        }

        let mut contracts = Vec::with_capacity(TestContract::COUNT);
        for slot in &group.contracts {
            contracts.push(match slot {
                Some(account) => Some(SnapshotAccount::capture(account).await),
                None => None,
            });
        }

        Self {
            contains_unsigned: group.includes_unsigned,
            accounts,
            contracts,
        }
    }

    /// Rebuild the group; missing trailing lists and slots come back empty
    pub fn restore(&self, chain: Arc<ChainConfig>) -> Result<AccountGroup, SnapshotError> {
        if self.accounts.len() > AccountPurpose::COUNT {
            return Err(SnapshotError::TooManyLists {
                found: self.accounts.len(),
                max: AccountPurpose::COUNT,
            });
        }
        if self.contracts.len() > TestContract::COUNT {
            return Err(SnapshotError::TooManyContracts {
                found: self.contracts.len(),
                max: TestContract::COUNT,
            });
        }

        let mut group = AccountGroup::new(Arc::clone(&chain), self.contains_unsigned);
        for (purpose, records) in AccountPurpose::ALL.iter().zip(&self.accounts) {
            for (i, record) in records.iter().enumerate() {
                let location = format!("{}[{}]", purpose.name(), i);
                let account = record.restore(i as u64, &location, Arc::clone(&chain))?;
                group.push(*purpose, Arc::new(account));
            }
        }
        for (contract, slot) in TestContract::ALL.iter().zip(&self.contracts) {
            if let Some(record) = slot.as_ref().filter(|record| !record.is_vacant()) {
                let location = format!("contract[{}]", contract.index());
                let account = record.restore(0, &location, Arc::clone(&chain))?;
                group.set_contract(*contract, Arc::new(account));
            }
        }
        Ok(group)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec_pretty(self).map_err(|source| SnapshotError::Json {
            context: "encode".to_string(),
            source,
        })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, SnapshotError> {
        serde_json::from_slice(bytes).map_err(|source| SnapshotError::Json {
            context: "decode".to_string(),
            source,
        })
    }
}

/// Directory holding timestamped snapshot files
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name_at(time: DateTime<Local>) -> String {
        format!(
            "{}{}{}",
            SNAPSHOT_PREFIX,
            time.format(TIMESTAMP_FORMAT),
            SNAPSHOT_EXTENSION
        )
    }

    /// Whether `name` follows the snapshot naming convention
    pub fn is_snapshot_name(name: &str) -> bool {
        name.strip_prefix(SNAPSHOT_PREFIX)
            .and_then(|rest| rest.strip_suffix(SNAPSHOT_EXTENSION))
            .map(|stamp| NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok())
            .unwrap_or(false)
    }

    /// Lexicographically greatest snapshot file, if any
    pub async fn latest(&self) -> Result<Option<PathBuf>, SnapshotError> {
        let io_error = |source| SnapshotError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(source)),
        };

        let mut latest: Option<String> = None;
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if Self::is_snapshot_name(&name) && latest.as_ref().map_or(true, |best| name > *best) {
                latest = Some(name);
            }
        }
        Ok(latest.map(|name| self.dir.join(name)))
    }

    pub async fn save(&self, group: &AccountGroup) -> Result<PathBuf, SnapshotError> {
        self.save_at(group, Local::now()).await
    }

    pub async fn save_at(
        &self,
        group: &AccountGroup,
        time: DateTime<Local>,
    ) -> Result<PathBuf, SnapshotError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SnapshotError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.dir.join(Self::file_name_at(time));
        let bytes = AccountGroupSnapshot::capture(group).await.to_json()?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| SnapshotError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), accounts = group.total_count(), "Snapshot written");
        Ok(path)
    }

    pub async fn load(
        &self,
        path: &Path,
        chain: Arc<ChainConfig>,
    ) -> Result<AccountGroup, SnapshotError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        AccountGroupSnapshot::from_json(&bytes)?.restore(chain)
    }
}
