use thiserror::Error;

/// Errors reported by a [`Transport`](super::Transport) implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Node rejected the transaction because its pool is saturated
    #[error("Transaction pool is full (endpoint: {endpoint})")]
    PoolFull { endpoint: String },

    /// Node already has a transaction with this or a later sequence
    #[error("Nonce too low: {message} (endpoint: {endpoint})")]
    NonceTooLow { endpoint: String, message: String },

    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// JSON-RPC error object returned by the node
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    Rpc {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Connection or HTTP status failure
    #[error("HTTP error: {message} (endpoint: {endpoint})")]
    Http { endpoint: String, message: String },

    /// Response did not have the expected shape
    #[error("Malformed response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Client pool closed")]
    PoolClosed,
}

impl TransportError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::PoolFull { .. } => true,
            TransportError::NonceTooLow { .. } => true,
            TransportError::Timeout { .. } => true,
            TransportError::Rpc { .. } => true,
            TransportError::Http { .. } => true,

            TransportError::Decode { .. } => false,
            TransportError::PoolClosed => false,
        }
    }

    pub fn is_nonce_too_low(&self) -> bool {
        matches!(self, TransportError::NonceTooLow { .. })
    }

    /// Label for logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::PoolFull { .. } => "pool_full",
            TransportError::NonceTooLow { .. } => "nonce_too_low",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Rpc { .. } => "rpc",
            TransportError::Http { .. } => "http",
            TransportError::Decode { .. } => "decode",
            TransportError::PoolClosed => "pool_closed",
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            TransportError::PoolFull { endpoint }
            | TransportError::NonceTooLow { endpoint, .. }
            | TransportError::Timeout { endpoint, .. }
            | TransportError::Rpc { endpoint, .. }
            | TransportError::Http { endpoint, .. }
            | TransportError::Decode { endpoint, .. } => Some(endpoint),
            TransportError::PoolClosed => None,
        }
    }

    /// Classify a JSON-RPC error object by its message
    pub fn from_rpc_error(endpoint: &str, code: Option<i64>, message: &str) -> Self {
        let lowered = message.to_lowercase();

        if lowered.contains("nonce too low") {
            TransportError::NonceTooLow {
                endpoint: endpoint.to_string(),
                message: message.to_string(),
            }
        } else if lowered.contains("txpool is full")
            || lowered.contains("pool is full")
            || lowered.contains("transaction pool full")
        {
            TransportError::PoolFull {
                endpoint: endpoint.to_string(),
            }
        } else {
            TransportError::Rpc {
                endpoint: endpoint.to_string(),
                message: message.to_string(),
                code,
            }
        }
    }

    pub fn from_reqwest(endpoint: &str, timeout_ms: u64, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms,
            }
        } else if err.is_decode() {
            TransportError::Decode {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else {
            TransportError::Http {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}
