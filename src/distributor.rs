//! Hierarchical funds distribution
//!
//! Funds N accounts from one source without pushing every transfer through a
//! single account's sequence and without fanning out N ways at once.
//!
//! With branching factor B:
//!
//! - N <= B: the source pays each target in order
//! - N > B: the targets split into contiguous chunks of `ceil(N / B)`. Each
//!   chunk gets a fresh reservoir account, funded with exactly what its
//!   subtree spends, and the chunks then run concurrently, each recursing
//!   with its reservoir as source
//!
//! The amount a reservoir receives is `value * len + gas_reserve *
//! tx_count(len, B)`, where [`tx_count`] is a pure function of the chunk size,
//! so every reservoir ends the run empty. A parent waits for all its subtrees
//! to finish before it returns, even when one of them fails.

use alloy_primitives::U256;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, Instrument};

use crate::account::{Account, AccountError};
use crate::metrics::metrics;

pub const DEFAULT_BRANCHING_FACTOR: usize = 4;

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("Per-account value must be non-zero")]
    ZeroValue,

    #[error("Branching factor must be at least 2, got {0}")]
    InvalidBranchingFactor(usize),

    #[error("Transfer failed: {0}")]
    Transfer(#[from] AccountError),

    #[error("Funding {targets} targets overflows a 256-bit amount")]
    FundingOverflow { targets: usize },

    #[error("Distribution task panicked: {0}")]
    TaskPanicked(String),
}

impl DistributionError {
    /// Every distribution failure stops the run; retries happen inside the transfer
    pub fn is_fatal(&self) -> bool {
        true
    }

    pub fn category(&self) -> &'static str {
        match self {
            DistributionError::ZeroValue => "zero_value",
            DistributionError::InvalidBranchingFactor(_) => "branching_factor",
            DistributionError::Transfer(e) => e.category(),
            DistributionError::FundingOverflow { .. } => "funding_overflow",
            DistributionError::TaskPanicked(_) => "task_panicked",
        }
    }
}

/// Moves value between two accounts; retry policy is the implementor's concern
#[async_trait]
pub trait FundsTransfer: Send + Sync {
    async fn transfer(
        &self,
        from: Arc<Account>,
        to: Arc<Account>,
        value: U256,
    ) -> Result<(), AccountError>;
}

#[async_trait]
impl<F, Fut> FundsTransfer for F
where
    F: Fn(Arc<Account>, Arc<Account>, U256) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), AccountError>> + Send,
{
    async fn transfer(
        &self,
        from: Arc<Account>,
        to: Arc<Account>,
        value: U256,
    ) -> Result<(), AccountError> {
        (self)(from, to, value).await
    }
}

/// Sizes of the contiguous chunks `n` targets split into
pub fn chunk_sizes(n: usize, branching_factor: usize) -> impl Iterator<Item = usize> {
    let size = n.div_ceil(branching_factor.max(1)).max(1);
    (0..n).step_by(size).map(move |start| size.min(n - start))
}

/// Transactions a subtree over `n` targets executes, funding transfers included
pub fn tx_count(n: usize, branching_factor: usize) -> u64 {
    if n <= branching_factor {
        return n as u64;
    }
    chunk_sizes(n, branching_factor)
        .map(|chunk| 1 + tx_count(chunk, branching_factor))
        .sum()
}

/// Balance a source needs to fund `n` targets with `value` each
pub fn required_funding(
    n: usize,
    value: U256,
    gas_reserve: U256,
    branching_factor: usize,
) -> Result<U256, DistributionError> {
    let overflow = || DistributionError::FundingOverflow { targets: n };
    let values = value.checked_mul(U256::from(n)).ok_or_else(overflow)?;
    let gas = gas_reserve
        .checked_mul(U256::from(tx_count(n, branching_factor)))
        .ok_or_else(overflow)?;
    values.checked_add(gas).ok_or_else(overflow)
}

/// Counts of what a distribution executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributionReport {
    /// Transfers into target accounts
    pub leaf_transfers: u64,
    /// Transfers into intermediate reservoirs
    pub funding_transfers: u64,
}

impl DistributionReport {
    pub fn total_transfers(&self) -> u64 {
        self.leaf_transfers + self.funding_transfers
    }

    fn merge(&mut self, other: DistributionReport) {
        self.leaf_transfers += other.leaf_transfers;
        self.funding_transfers += other.funding_transfers;
    }
}

#[derive(Clone)]
pub struct Distributor {
    transfer: Arc<dyn FundsTransfer>,
    branching_factor: usize,
    gas_reserve: U256,
}

impl Distributor {
    pub fn new(transfer: Arc<dyn FundsTransfer>) -> Self {
        Self {
            transfer,
            branching_factor: DEFAULT_BRANCHING_FACTOR,
            gas_reserve: U256::ZERO,
        }
    }

    pub fn with_branching_factor(mut self, branching_factor: usize) -> Self {
        self.branching_factor = branching_factor;
        self
    }

    /// Gas cost provisioned per transfer in the tree
    pub fn with_gas_reserve(mut self, gas_reserve: U256) -> Self {
        self.gas_reserve = gas_reserve;
        self
    }

    pub fn branching_factor(&self) -> usize {
        self.branching_factor
    }

    /// Amount `source` must hold before [`distribute`](Self::distribute)
    pub fn required_funding(&self, n: usize, value: U256) -> Result<U256, DistributionError> {
        required_funding(n, value, self.gas_reserve, self.branching_factor)
    }

    /// Pay `value` to every target, returning once the whole tree completed
    pub async fn distribute(
        &self,
        source: Arc<Account>,
        targets: &[Arc<Account>],
        value: U256,
    ) -> Result<DistributionReport, DistributionError> {
        if value.is_zero() {
            return Err(DistributionError::ZeroValue);
        }
        if self.branching_factor < 2 {
            return Err(DistributionError::InvalidBranchingFactor(
                self.branching_factor,
            ));
        }
        let total = self.required_funding(targets.len(), value)?;

        info!(
            source = %source.address(),
            targets = targets.len(),
            %value,
            %total,
            branching_factor = self.branching_factor,
            expected_transfers = tx_count(targets.len(), self.branching_factor),
            "Starting hierarchical distribution"
        );
        let report = self.clone().subtree(source, targets.to_vec(), value, 0).await?;
        info!(
            leaf_transfers = report.leaf_transfers,
            funding_transfers = report.funding_transfers,
            "Distribution complete"
        );
        Ok(report)
    }

    fn subtree(
        self,
        source: Arc<Account>,
        targets: Vec<Arc<Account>>,
        value: U256,
        depth: usize,
    ) -> BoxFuture<'static, Result<DistributionReport, DistributionError>> {
        async move {
            metrics().distribution_active_subtrees.inc();
            scopeguard::defer! { metrics().distribution_active_subtrees.dec(); }

            let mut report = DistributionReport::default();

            if targets.len() <= self.branching_factor {
                for target in targets {
                    self.transfer.transfer(Arc::clone(&source), target, value).await?;
                    metrics().distribution_transfers.inc();
                    report.leaf_transfers += 1;
                }
                return Ok(report);
            }

            let mut children = JoinSet::new();
            let mut rest = targets.as_slice();
            for (chunk_index, size) in chunk_sizes(targets.len(), self.branching_factor).enumerate() {
                let (chunk, tail) = rest.split_at(size);
                rest = tail;

                let chunk = chunk.to_vec();
                let reservoir = Arc::new(Account::generate(0, Arc::clone(source.chain())));
                let amount = required_funding(chunk.len(), value, self.gas_reserve, self.branching_factor)?;
                let source = Arc::clone(&source);
                let this = self.clone();
                let span = info_span!("subtree", depth = depth + 1, chunk = chunk_index, size = chunk.len());

                children.spawn(
                    async move {
                        debug!(reservoir = %reservoir.address(), %amount, "Funding reservoir");
                        this.transfer
                            .transfer(source, Arc::clone(&reservoir), amount)
                            .await?;
                        metrics().distribution_transfers.inc();

                        let mut child = this.subtree(reservoir, chunk, value, depth + 1).await?;
                        child.funding_transfers += 1;
                        Ok::<_, DistributionError>(child)
                    }
                    .instrument(span),
                );
            }

            // Join every child even after a failure, then report the first error
            let mut first_error = None;
            while let Some(joined) = children.join_next().await {
                match joined {
                    Ok(Ok(child)) => report.merge(child),
                    Ok(Err(err)) => {
                        first_error.get_or_insert(err);
                    }
                    Err(join_err) => {
                        first_error.get_or_insert(DistributionError::TaskPanicked(join_err.to_string()));
                    }
                }
            }

            match first_error {
                Some(err) => Err(err),
                None => Ok(report),
            }
        }
        .boxed()
    }
}
