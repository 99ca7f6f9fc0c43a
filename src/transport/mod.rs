//! Chain access for the load tester
//!
//! Everything that talks to a node goes through the [`Transport`] trait:
//! sequence queries, single and batch submission, receipt polling and balance
//! lookups. Two implementations live here:
//!
//! - [`JsonRpcTransport`]: a `reqwest` JSON-RPC client bound to one endpoint
//! - [`ClientPool`]: a bounded pool of transports that acquires a client per
//!   call and releases it when the call finishes
//!
//! Tests use `test_utils::MockTransport`, an in-memory ledger.

pub mod errors;
pub mod json_rpc;
pub mod pool;

use alloy_primitives::{Address, TxHash, U256};
use async_trait::async_trait;

use crate::tx_builder::SignedEnvelope;

pub use errors::TransportError;
pub use json_rpc::JsonRpcTransport;
pub use pool::{ClientFactory, ClientPool, PooledClient};

pub type TransportResult<T> = Result<T, TransportError>;

/// Inclusion state of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// Not yet mined
    Pending,
    Success,
    /// Mined but reverted
    Failed,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Next sequence number the node expects from `address`, pending pool included
    async fn get_sequence(&self, address: Address) -> TransportResult<u64>;

    async fn submit(&self, envelope: &SignedEnvelope) -> TransportResult<TxHash>;

    /// Submit several envelopes, returning one result per input in order
    async fn submit_batch(&self, envelopes: &[SignedEnvelope]) -> Vec<TransportResult<TxHash>> {
        let mut results = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            results.push(self.submit(envelope).await);
        }
        results
    }

    async fn get_receipt(&self, hash: TxHash) -> TransportResult<ReceiptStatus>;

    async fn get_balance(&self, address: Address) -> TransportResult<U256>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn get_sequence(&self, address: Address) -> TransportResult<u64> {
        (**self).get_sequence(address).await
    }

    async fn submit(&self, envelope: &SignedEnvelope) -> TransportResult<TxHash> {
        (**self).submit(envelope).await
    }

    async fn submit_batch(&self, envelopes: &[SignedEnvelope]) -> Vec<TransportResult<TxHash>> {
        (**self).submit_batch(envelopes).await
    }

    async fn get_receipt(&self, hash: TxHash) -> TransportResult<ReceiptStatus> {
        (**self).get_receipt(hash).await
    }

    async fn get_balance(&self, address: Address) -> TransportResult<U256> {
        (**self).get_balance(address).await
    }
}
