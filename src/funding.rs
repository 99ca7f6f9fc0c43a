//! Funding phase
//!
//! Moves value from the funded "rich" account to every valid account before
//! scenarios start:
//!
//! 1. create a local reservoir account
//! 2. charge it from the rich account with exactly what the distribution tree
//!    spends, using the guaranteed-retry transfer
//! 3. distribute to the group's valid accounts through [`Distributor`]
//! 4. truncate each purpose list to its active percent
//!
//! Native-value scenarios get native transfers with a gas reserve per tree
//! edge, after checking the rich balance covers the whole tree. All other
//! scenarios get one routed token distribution per configured token, which
//! costs no gas.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::account::{Account, AccountError, RetryPolicy};
use crate::config::{ConfigError, LoadConfig};
use crate::distributor::{DistributionError, DistributionReport, Distributor, FundsTransfer};
use crate::group::{AccountGroup, ScenarioSet};
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum FundingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Charging the local reservoir failed: {0}")]
    Charge(#[from] AccountError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("Rich account {address} holds {balance}, funding needs {required}")]
    InsufficientBalance {
        address: Address,
        balance: U256,
        required: U256,
    },
}

impl FundingError {
    pub fn category(&self) -> &'static str {
        match self {
            FundingError::Config(e) => e.category(),
            FundingError::Charge(e) => e.category(),
            FundingError::Distribution(e) => e.category(),
            FundingError::InsufficientBalance { .. } => "insufficient_balance",
        }
    }
}

/// What a distribution moves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    Native,
    Token(String),
}

/// [`FundsTransfer`] backed by the guaranteed-retry helpers
#[derive(Clone)]
pub struct GuaranteedTransfer {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    asset: Asset,
}

impl GuaranteedTransfer {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, asset: Asset) -> Self {
        Self {
            transport,
            policy,
            asset,
        }
    }
}

#[async_trait]
impl FundsTransfer for GuaranteedTransfer {
    async fn transfer(
        &self,
        from: Arc<Account>,
        to: Arc<Account>,
        value: U256,
    ) -> Result<(), AccountError> {
        let transport = self.transport.as_ref();
        match &self.asset {
            Asset::Native => {
                from.transfer_with_guaranteed_retry(transport, to.address(), value, &self.policy)
                    .await?;
            }
            Asset::Token(token) => {
                from.token_transfer_with_guaranteed_retry(
                    transport,
                    to.address(),
                    token,
                    value,
                    &self.policy,
                )
                .await?;
            }
        }
        Ok(())
    }
}

/// Funding parameters resolved from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingPlan {
    /// Native value per valid account; zero skips funding entirely
    pub charge_value: U256,
    pub gas_reserve: U256,
    pub branching_factor: usize,
    /// Use the native path instead of token distributions
    pub native: bool,
    pub tokens: Vec<String>,
    pub token_charge_value: U256,
    pub active_percent: u32,
    pub retry: RetryPolicy,
}

impl FundingPlan {
    pub fn from_config(config: &LoadConfig, scenarios: &ScenarioSet) -> Result<Self, ConfigError> {
        Ok(Self {
            charge_value: config.charge_value()?,
            gas_reserve: config.gas_reserve()?,
            branching_factor: config.funding.branching_factor,
            native: scenarios.funds_native(),
            tokens: config.funding.tokens.clone(),
            token_charge_value: config.token_charge_value()?,
            active_percent: config.accounts.active_percent,
            retry: config.retry_policy(),
        })
    }
}

/// Outcome of the funding phase
#[derive(Debug, Clone, Default)]
pub struct FundingSummary {
    /// The local reservoir that fed the distribution tree
    pub reservoir: Option<Arc<Account>>,
    pub funded_accounts: usize,
    pub reports: Vec<DistributionReport>,
}

/// Fail fast when `rich` cannot pay `charge` plus the gas of its own transfer
///
/// An underfunded charge would otherwise sit in the unbounded retry loop.
async fn ensure_native_balance(
    rich: &Account,
    transport: &dyn Transport,
    charge: U256,
    targets: usize,
) -> Result<(), FundingError> {
    let chain = rich.chain();
    let own_gas = U256::from(chain.gas_price) * U256::from(chain.transfer_gas_limit);
    let required = charge
        .checked_add(own_gas)
        .ok_or(DistributionError::FundingOverflow { targets })?;

    let balance = rich.get_balance(transport).await?;
    info!(rich = %rich.address(), %balance, %required, "Rich account balance checked");
    if balance < required {
        return Err(FundingError::InsufficientBalance {
            address: rich.address(),
            balance,
            required,
        });
    }
    Ok(())
}

/// Fund the group's valid accounts from `rich`, then apply the active percent
pub async fn prepare_accounts(
    group: &mut AccountGroup,
    rich: Arc<Account>,
    transport: Arc<dyn Transport>,
    plan: &FundingPlan,
) -> Result<FundingSummary, FundingError> {
    if plan.charge_value.is_zero() {
        info!("Charge value is zero, skipping funding");
        return Ok(FundingSummary::default());
    }

    let reservoir = Arc::new(Account::generate(0, Arc::clone(group.chain())));
    let targets = group.valid_accounts();
    let mut summary = FundingSummary {
        reservoir: Some(Arc::clone(&reservoir)),
        funded_accounts: targets.len(),
        reports: Vec::new(),
    };
    info!(
        rich = %rich.address(),
        reservoir = %reservoir.address(),
        targets = targets.len(),
        native = plan.native,
        "Funding valid accounts"
    );

    if plan.native {
        let transfer = GuaranteedTransfer::new(Arc::clone(&transport), plan.retry.clone(), Asset::Native);
        let distributor = Distributor::new(Arc::new(transfer))
            .with_branching_factor(plan.branching_factor)
            .with_gas_reserve(plan.gas_reserve);

        let charge = distributor.required_funding(targets.len(), plan.charge_value)?;
        ensure_native_balance(&rich, transport.as_ref(), charge, targets.len()).await?;
        rich.transfer_with_guaranteed_retry(
            transport.as_ref(),
            reservoir.address(),
            charge,
            &plan.retry,
        )
        .await?;
        info!(%charge, "Local reservoir charged");

        if !targets.is_empty() {
            let report = distributor
                .distribute(Arc::clone(&reservoir), &targets, plan.charge_value)
                .await?;
            summary.reports.push(report);
        }
    } else {
        for token in &plan.tokens {
            let transfer = GuaranteedTransfer::new(
                Arc::clone(&transport),
                plan.retry.clone(),
                Asset::Token(token.clone()),
            );
            let distributor = Distributor::new(Arc::new(transfer))
                .with_branching_factor(plan.branching_factor);

            let charge = distributor.required_funding(targets.len(), plan.token_charge_value)?;
            rich.token_transfer_with_guaranteed_retry(
                transport.as_ref(),
                reservoir.address(),
                token,
                charge,
                &plan.retry,
            )
            .await?;
            info!(%token, %charge, "Local reservoir charged with token");

            if !targets.is_empty() {
                let report = distributor
                    .distribute(Arc::clone(&reservoir), &targets, plan.token_charge_value)
                    .await?;
                summary.reports.push(report);
            }
        }
    }

    group.apply_active_percent(plan.active_percent);
    Ok(summary)
}
