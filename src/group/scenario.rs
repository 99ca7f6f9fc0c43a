//! Scenario kinds known to the load tester
//!
//! The scenario runner lives elsewhere; account setup only needs to know
//! which purpose lists a run draws from, whether unsigned accounts must be
//! unlocked, and which funding path applies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::AccountPurpose;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScenarioKind {
    #[serde(rename = "transferTxTC")]
    TransferTx,
    #[serde(rename = "ethLegacyTxTC")]
    EthLegacyTx,
    #[serde(rename = "transferUnsignedTx")]
    TransferUnsignedTx,
    #[serde(rename = "sessionTxTC")]
    SessionTx,
    #[serde(rename = "dexTxSessionTC")]
    DexTxSession,
    #[serde(rename = "tokenTransferTxTC")]
    TokenTransferTx,
    #[serde(rename = "newOrderTxTC")]
    NewOrderTx,
    #[serde(rename = "limitOrderTxTC")]
    LimitOrderTx,
    #[serde(rename = "limitOrderLPTxTC")]
    LimitOrderLpTx,
    #[serde(rename = "limitOrderFewTxTC")]
    LimitOrderFewTx,
    #[serde(rename = "limitOrderTxStackTC")]
    LimitOrderTxStack,
    #[serde(rename = "marketOrderTxTC")]
    MarketOrderTx,
    #[serde(rename = "stopOrderTxTC")]
    StopOrderTx,
    #[serde(rename = "tpslOrderTxTpTC")]
    TpslOrderTxTp,
    #[serde(rename = "tpslOrderTxSlTC")]
    TpslOrderTxSl,
    #[serde(rename = "cancelOrderTxTC")]
    CancelOrderTx,
    #[serde(rename = "gaslessRevertTransactionTC")]
    GaslessRevertTransaction,
    #[serde(rename = "gaslessOnlyApproveTC")]
    GaslessOnlyApprove,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 18] = [
        ScenarioKind::TransferTx,
        ScenarioKind::EthLegacyTx,
        ScenarioKind::TransferUnsignedTx,
        ScenarioKind::SessionTx,
        ScenarioKind::DexTxSession,
        ScenarioKind::TokenTransferTx,
        ScenarioKind::NewOrderTx,
        ScenarioKind::LimitOrderTx,
        ScenarioKind::LimitOrderLpTx,
        ScenarioKind::LimitOrderFewTx,
        ScenarioKind::LimitOrderTxStack,
        ScenarioKind::MarketOrderTx,
        ScenarioKind::StopOrderTx,
        ScenarioKind::TpslOrderTxTp,
        ScenarioKind::TpslOrderTxSl,
        ScenarioKind::CancelOrderTx,
        ScenarioKind::GaslessRevertTransaction,
        ScenarioKind::GaslessOnlyApprove,
    ];

    /// Name used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::TransferTx => "transferTxTC",
            ScenarioKind::EthLegacyTx => "ethLegacyTxTC",
            ScenarioKind::TransferUnsignedTx => "transferUnsignedTx",
            ScenarioKind::SessionTx => "sessionTxTC",
            ScenarioKind::DexTxSession => "dexTxSessionTC",
            ScenarioKind::TokenTransferTx => "tokenTransferTxTC",
            ScenarioKind::NewOrderTx => "newOrderTxTC",
            ScenarioKind::LimitOrderTx => "limitOrderTxTC",
            ScenarioKind::LimitOrderLpTx => "limitOrderLPTxTC",
            ScenarioKind::LimitOrderFewTx => "limitOrderFewTxTC",
            ScenarioKind::LimitOrderTxStack => "limitOrderTxStackTC",
            ScenarioKind::MarketOrderTx => "marketOrderTxTC",
            ScenarioKind::StopOrderTx => "stopOrderTxTC",
            ScenarioKind::TpslOrderTxTp => "tpslOrderTxTpTC",
            ScenarioKind::TpslOrderTxSl => "tpslOrderTxSlTC",
            ScenarioKind::CancelOrderTx => "cancelOrderTxTC",
            ScenarioKind::GaslessRevertTransaction => "gaslessRevertTransactionTC",
            ScenarioKind::GaslessOnlyApprove => "gaslessOnlyApproveTC",
        }
    }

    /// Unsigned-transfer accounts must be unlocked on the node first
    pub fn requires_unlock(&self) -> bool {
        matches!(self, ScenarioKind::TransferUnsignedTx)
    }

    /// Purpose list the scenario draws its senders from
    pub fn account_purpose(&self) -> AccountPurpose {
        match self {
            ScenarioKind::TransferUnsignedTx => AccountPurpose::Unsigned,
            ScenarioKind::GaslessRevertTransaction => AccountPurpose::GaslessRevert,
            ScenarioKind::GaslessOnlyApprove => AccountPurpose::GaslessApprove,
            _ => AccountPurpose::Signed,
        }
    }

    /// Native-value funding; every other scenario is funded with tokens
    pub fn funds_native(&self) -> bool {
        matches!(self, ScenarioKind::TransferTx | ScenarioKind::EthLegacyTx)
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown scenario {s:?}"))
    }
}

/// Requested account count per purpose list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurposeCounts([usize; AccountPurpose::COUNT]);

impl PurposeCounts {
    pub fn get(&self, purpose: AccountPurpose) -> usize {
        self.0[purpose.index()]
    }

    pub fn set(&mut self, purpose: AccountPurpose, count: usize) {
        self.0[purpose.index()] = count;
    }

    pub fn with(mut self, purpose: AccountPurpose, count: usize) -> Self {
        self.set(purpose, count);
        self
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }
}

/// The scenarios enabled for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioSet {
    kinds: Vec<ScenarioKind>,
}

impl ScenarioSet {
    pub fn new(kinds: impl IntoIterator<Item = ScenarioKind>) -> Self {
        let mut set = Self::default();
        for kind in kinds {
            if !set.kinds.contains(&kind) {
                set.kinds.push(kind);
            }
        }
        set
    }

    pub fn contains(&self, kind: ScenarioKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = ScenarioKind> + '_ {
        self.kinds.iter().copied()
    }

    /// Whether unsigned accounts join the valid (funded) set
    pub fn includes_unsigned(&self) -> bool {
        self.requires_unlock()
    }

    pub fn requires_unlock(&self) -> bool {
        self.kinds.iter().any(ScenarioKind::requires_unlock)
    }

    /// Native funding applies when any native-value scenario is enabled
    pub fn funds_native(&self) -> bool {
        self.kinds.iter().any(ScenarioKind::funds_native)
    }

    /// Per-purpose counts; gasless lists mirror the signed count when enabled
    pub fn purpose_counts(&self, n_signed: usize, n_unsigned: usize, n_new: usize) -> PurposeCounts {
        let gasless = |kind| if self.contains(kind) { n_signed } else { 0 };
        PurposeCounts::default()
            .with(AccountPurpose::Signed, n_signed)
            .with(AccountPurpose::Unsigned, n_unsigned)
            .with(AccountPurpose::NewlyCreated, n_new)
            .with(
                AccountPurpose::GaslessRevert,
                gasless(ScenarioKind::GaslessRevertTransaction),
            )
            .with(
                AccountPurpose::GaslessApprove,
                gasless(ScenarioKind::GaslessOnlyApprove),
            )
    }
}

impl FromIterator<ScenarioKind> for ScenarioSet {
    fn from_iter<I: IntoIterator<Item = ScenarioKind>>(iter: I) -> Self {
        Self::new(iter)
    }
}
