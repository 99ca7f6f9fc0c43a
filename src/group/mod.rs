//! Account groups
//!
//! An [`AccountGroup`] partitions the run's accounts into five purpose lists
//! and six named contract slots. It is built once during setup, either by
//! restoring the newest snapshot that holds enough accounts or by generating
//! fresh accounts and saving them, and is read-only once scenarios start.

pub mod scenario;
pub mod snapshot;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::account::Account;
use crate::config::ChainConfig;
use crate::transport::TransportError;

pub use scenario::{PurposeCounts, ScenarioKind, ScenarioSet};
pub use snapshot::{AccountGroupSnapshot, SnapshotAccount, SnapshotError, SnapshotStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountPurpose {
    /// Senders of signed transactions
    Signed,
    /// Senders whose keys the node holds (unlocked accounts)
    Unsigned,
    /// Accounts created during the run
    NewlyCreated,
    GaslessRevert,
    GaslessApprove,
}

impl AccountPurpose {
    pub const COUNT: usize = 5;

    pub const ALL: [AccountPurpose; Self::COUNT] = [
        AccountPurpose::Signed,
        AccountPurpose::Unsigned,
        AccountPurpose::NewlyCreated,
        AccountPurpose::GaslessRevert,
        AccountPurpose::GaslessApprove,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            AccountPurpose::Signed => "signed",
            AccountPurpose::Unsigned => "unsigned",
            AccountPurpose::NewlyCreated => "newly_created",
            AccountPurpose::GaslessRevert => "gasless_revert",
            AccountPurpose::GaslessApprove => "gasless_approve",
        }
    }
}

/// Singleton accounts standing for deployed test contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestContract {
    Erc20,
    Erc721,
    StorageTrie,
    General,
    GaslessToken,
    GaslessRouter,
}

impl TestContract {
    pub const COUNT: usize = 6;

    pub const ALL: [TestContract; Self::COUNT] = [
        TestContract::Erc20,
        TestContract::Erc721,
        TestContract::StorageTrie,
        TestContract::General,
        TestContract::GaslessToken,
        TestContract::GaslessRouter,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Unlocks node-held accounts for unsigned transfers
#[async_trait]
pub trait AccountUnlocker: Send + Sync {
    async fn unlock(&self, account: &Account, endpoint: &str) -> Result<(), TransportError>;
}

/// Unlocker for nodes that need no unlock step
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUnlocker;

#[async_trait]
impl AccountUnlocker for NoopUnlocker {
    async fn unlock(&self, _account: &Account, _endpoint: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

/// What populate-or-restore should produce
#[derive(Debug, Clone)]
pub struct PopulateRequest {
    pub counts: PurposeCounts,
    pub scenarios: ScenarioSet,
    /// Endpoint handed to the unlocker
    pub endpoint: String,
    /// Derive keys from this seed instead of the OS random source
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulateOutcome {
    Restored(PathBuf),
    Generated(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AccountGroup {
    includes_unsigned: bool,
    lists: [Vec<Arc<Account>>; AccountPurpose::COUNT],
    contracts: [Option<Arc<Account>>; TestContract::COUNT],
    chain: Arc<ChainConfig>,
}

impl AccountGroup {
    pub fn new(chain: Arc<ChainConfig>, includes_unsigned: bool) -> Self {
        Self {
            includes_unsigned,
            lists: Default::default(),
            contracts: Default::default(),
            chain,
        }
    }

    pub fn chain(&self) -> &Arc<ChainConfig> {
        &self.chain
    }

    /// Whether [`valid_accounts`](Self::valid_accounts) includes the unsigned list
    pub fn includes_unsigned(&self) -> bool {
        self.includes_unsigned
    }

    pub fn list(&self, purpose: AccountPurpose) -> &[Arc<Account>] {
        &self.lists[purpose.index()]
    }

    pub fn push(&mut self, purpose: AccountPurpose, account: Arc<Account>) {
        self.lists[purpose.index()].push(account);
    }

    pub fn contract(&self, contract: TestContract) -> Option<&Arc<Account>> {
        self.contracts[contract.index()].as_ref()
    }

    pub fn set_contract(&mut self, contract: TestContract, account: Arc<Account>) {
        self.contracts[contract.index()] = Some(account);
    }

    /// Accounts across every purpose list
    pub fn total_count(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    /// Accounts that need balance: signed, plus unsigned when flagged
    pub fn valid_accounts(&self) -> Vec<Arc<Account>> {
        let mut valid = self.list(AccountPurpose::Signed).to_vec();
        if self.includes_unsigned {
            valid.extend_from_slice(self.list(AccountPurpose::Unsigned));
        }
        valid
    }

    /// Truncate every list to its leading `len * percent / 100` accounts
    pub fn apply_active_percent(&mut self, percent: u32) {
        for (purpose, list) in AccountPurpose::ALL.iter().zip(self.lists.iter_mut()) {
            let keep = list.len().saturating_mul(percent as usize) / 100;
            list.truncate(keep);
            info!(list = purpose.name(), active = list.len(), percent, "Applied active percent");
        }
    }

    /// Generate `counts` fresh accounts per purpose
    pub fn generate(&mut self, counts: &PurposeCounts, seed: Option<u64>) {
        let mut next_seed = seed;
        for purpose in AccountPurpose::ALL {
            let count = counts.get(purpose);
            let list = &mut self.lists[purpose.index()];
            list.reserve(count);
            for i in 0..count {
                let account = match next_seed {
                    Some(seed) => {
                        next_seed = Some(seed.wrapping_add(1));
                        Account::from_seed(i as u64, seed, Arc::clone(&self.chain))
                    }
                    None => Account::generate(i as u64, Arc::clone(&self.chain)),
                };
                list.push(Arc::new(account));
            }
        }
    }

    /// Restore the newest snapshot if it is large enough, else generate and save
    ///
    /// The capacity check is on total count only: a snapshot with enough
    /// accounts in different proportions is still accepted. Unlocking only
    /// happens for freshly generated groups.
    pub async fn populate_or_restore(
        chain: Arc<ChainConfig>,
        request: &PopulateRequest,
        store: &SnapshotStore,
        unlocker: &dyn AccountUnlocker,
    ) -> Result<(Self, PopulateOutcome), SnapshotError> {
        let needed = request.counts.total();

        if let Some(path) = store.latest().await? {
            match store.load(&path, Arc::clone(&chain)).await {
                Ok(group) if group.total_count() >= needed => {
                    info!(
                        path = %path.display(),
                        accounts = group.total_count(),
                        needed,
                        "Restored account group from snapshot"
                    );
                    return Ok((group, PopulateOutcome::Restored(path)));
                }
                Ok(group) => info!(
                    path = %path.display(),
                    accounts = group.total_count(),
                    needed,
                    "Snapshot too small, generating new accounts"
                ),
                Err(err) => warn!(
                    path = %path.display(),
                    error = %err,
                    "Failed to load snapshot, generating new accounts"
                ),
            }
        }

        let mut group = Self::new(chain, request.scenarios.includes_unsigned());
        group.generate(&request.counts, request.seed);
        let path = store.save(&group).await?;
        info!(path = %path.display(), accounts = group.total_count(), "Generated account group");

        if request.scenarios.requires_unlock() {
            for account in group.list(AccountPurpose::Unsigned) {
                if let Err(err) = unlocker.unlock(account, &request.endpoint).await {
                    warn!(address = %account.address(), error = %err, "Failed to unlock account");
                }
            }
        }

        Ok((group, PopulateOutcome::Generated(path)))
    }
}
