use alloy_primitives::{Address, TxHash, U256};
use thiserror::Error;

use crate::keys::KeyError;
use crate::transport::TransportError;
use crate::tx_builder::TxBuildError;

/// Errors raised by account-level operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Build(#[from] TxBuildError),

    /// Chain query failed (sequence, balance, receipt)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Submission failed for {address} (nonce {nonce}): {source}")]
    Submission {
        address: Address,
        nonce: u64,
        #[source]
        source: TransportError,
    },

    #[error("Transaction {hash} from {from} not included within {timeout_ms}ms")]
    InclusionTimeout {
        hash: TxHash,
        from: Address,
        timeout_ms: u64,
    },

    #[error("Transaction {hash} from {from} was included but failed")]
    InclusionFailed { hash: TxHash, from: Address },

    #[error("Balance mismatch for {address}: expected {expected}, actual {actual}")]
    BalanceMismatch {
        address: Address,
        expected: U256,
        actual: U256,
    },
}

impl AccountError {
    /// Transient transport conditions; retried by the guaranteed-retry helper
    pub fn is_retryable(&self) -> bool {
        match self {
            AccountError::Transport(e) => e.is_retryable(),
            AccountError::Submission { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Failures the guaranteed-retry loop resubmits after
    ///
    /// Every transport failure on the submit path qualifies. Key and build
    /// errors would repeat on every attempt, and inclusion outcomes are final.
    pub fn is_resubmittable(&self) -> bool {
        matches!(
            self,
            AccountError::Transport(_) | AccountError::Submission { .. }
        )
    }

    /// The funding invariant can no longer be trusted; the run must stop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AccountError::InclusionTimeout { .. }
                | AccountError::InclusionFailed { .. }
                | AccountError::BalanceMismatch { .. }
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            AccountError::Key(e) => e.category(),
            AccountError::Build(e) => e.category(),
            AccountError::Transport(e) => e.category(),
            AccountError::Submission { source, .. } => source.category(),
            AccountError::InclusionTimeout { .. } => "inclusion_timeout",
            AccountError::InclusionFailed { .. } => "inclusion_failed",
            AccountError::BalanceMismatch { .. } => "balance_mismatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_and_fatal_are_disjoint() {
        let pool_full = AccountError::Submission {
            address: Address::ZERO,
            nonce: 0,
            source: TransportError::PoolFull {
                endpoint: "node".to_string(),
            },
        };
        assert!(pool_full.is_retryable());
        assert!(!pool_full.is_fatal());
        assert_eq!(pool_full.category(), "pool_full");

        let failed = AccountError::InclusionFailed {
            hash: TxHash::ZERO,
            from: Address::ZERO,
        };
        assert!(failed.is_fatal());
        assert!(!failed.is_retryable());

        let build = AccountError::from(TxBuildError::signing_failed("bad"));
        assert!(!build.is_retryable());
        assert!(!build.is_resubmittable());
        assert!(!build.is_fatal());

        let decode = AccountError::Submission {
            address: Address::ZERO,
            nonce: 0,
            source: TransportError::Decode {
                endpoint: "node".to_string(),
                message: "bad".to_string(),
            },
        };
        assert!(!decode.is_retryable());
        assert!(decode.is_resubmittable());
        assert!(!failed.is_resubmittable());
    }
}
