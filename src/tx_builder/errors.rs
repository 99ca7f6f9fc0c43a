//! Error types for the transaction factory
//!
//! Every failure here is structural: retrying the same build with the same
//! inputs produces the same error. Callers surface these immediately instead
//! of feeding them into a retry loop.

use thiserror::Error;

use super::order::OrderValidationError;

/// Error type for every payload build and signing operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxBuildError {
    /// Order parameters rejected before anything was signed
    #[error("Order validation failed: {0}")]
    Validation(#[from] OrderValidationError),

    /// Serialising a routed payload failed
    ///
    /// Contains the payload kind and the serializer's message
    #[error("Payload encoding failed (kind={kind}): {reason}")]
    Encoding {
        kind: &'static str,
        reason: String,
    },

    /// Routed payload bytes could not be parsed back
    #[error("Payload decoding failed: {0}")]
    Decoding(String),

    /// The signer rejected the prehash
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Session delete named an index the account never created
    #[error("Session index {index} out of range (sessions: {len})")]
    SessionIndexOutOfRange { index: usize, len: usize },

    /// The request kind cannot be built through this path
    ///
    /// Direct-submit transfers need a chain-synced sequence and go through
    /// the async builder instead.
    #[error("Unsupported request on this path: {0}")]
    Unsupported(&'static str),
}

impl TxBuildError {
    /// Build errors are deterministic and never worth retrying
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Encoding { .. } => "encoding",
            Self::Decoding(_) => "decoding",
            Self::Signing(_) => "signing",
            Self::SessionIndexOutOfRange { .. } => "session_index",
            Self::Unsupported(_) => "unsupported",
        }
    }
}

// Convenience constructors for common error scenarios
impl TxBuildError {
    pub fn encoding_failed(kind: &'static str, reason: impl ToString) -> Self {
        Self::Encoding {
            kind,
            reason: reason.to_string(),
        }
    }

    pub fn signing_failed(reason: impl ToString) -> Self {
        Self::Signing(reason.to_string())
    }

    pub fn decoding_failed(reason: impl ToString) -> Self {
        Self::Decoding(reason.to_string())
    }
}
