//! Test utilities
//!
//! [`MockTransport`] is an in-memory chain: it decodes every submitted
//! envelope, requires raw transfers to carry exactly the next sequence, moves
//! native and token balances, and records receipts. Failures, receipt outcomes
//! and tolerance for sequence gaps can be set per test.
//!
//! Only compiled for tests or with the `test_utils` feature.

#![cfg(any(test, feature = "test_utils"))]

use alloy_primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::ChainConfig;
use crate::transport::{ReceiptStatus, Transport, TransportError, TransportResult};
use crate::tx_builder::{RoutedPayload, SignedEnvelope};

pub const MOCK_ENDPOINT: &str = "mock://local";

#[derive(Debug, Default)]
struct Ledger {
    nonces: HashMap<Address, u64>,
    balances: HashMap<Address, U256>,
    tokens: HashMap<(Address, String), U256>,
}

impl Ledger {
    fn debit(&mut self, from: Address, amount: U256) -> TransportResult<()> {
        let balance = self.balances.get(&from).copied().unwrap_or_default();
        if balance < amount {
            return Err(insufficient_funds(from, balance, amount));
        }
        self.balances.insert(from, balance - amount);
        Ok(())
    }

    fn credit(&mut self, to: Address, amount: U256) {
        *self.balances.entry(to).or_default() += amount;
    }

    fn move_token(&mut self, from: Address, to: Address, token: &str, amount: U256) -> TransportResult<()> {
        let key = (from, token.to_string());
        let balance = self.tokens.get(&key).copied().unwrap_or_default();
        if balance < amount {
            return Err(insufficient_funds(from, balance, amount));
        }
        self.tokens.insert(key, balance - amount);
        *self.tokens.entry((to, token.to_string())).or_default() += amount;
        Ok(())
    }
}

fn insufficient_funds(from: Address, balance: U256, amount: U256) -> TransportError {
    TransportError::Rpc {
        endpoint: MOCK_ENDPOINT.to_string(),
        message: format!("insufficient funds for {from}: have {balance}, need {amount}"),
        code: Some(-32000),
    }
}

fn decode_error(message: impl ToString) -> TransportError {
    TransportError::Decode {
        endpoint: MOCK_ENDPOINT.to_string(),
        message: message.to_string(),
    }
}

/// In-memory [`Transport`] for deterministic tests
#[derive(Default)]
pub struct MockTransport {
    ledger: Mutex<Ledger>,
    receipts: DashMap<TxHash, ReceiptStatus>,
    scripted_failures: Mutex<VecDeque<TransportError>>,
    forced_receipt: Mutex<Option<ReceiptStatus>>,
    submitted: Mutex<Vec<SignedEnvelope>>,
    sequence_queries: AtomicUsize,
    submit_calls: AtomicUsize,
    accept_gaps: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.ledger.lock().balances.insert(address, balance);
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.ledger
            .lock()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_token_balance(&self, address: Address, token: &str, balance: U256) {
        self.ledger
            .lock()
            .tokens
            .insert((address, token.to_string()), balance);
    }

    pub fn token_balance(&self, address: Address, token: &str) -> U256 {
        self.ledger
            .lock()
            .tokens
            .get(&(address, token.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Pretend `address` already has `nonce` transactions on chain
    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.ledger.lock().nonces.insert(address, nonce);
    }

    pub fn nonce_of(&self, address: Address) -> u64 {
        self.ledger.lock().nonces.get(&address).copied().unwrap_or(0)
    }

    /// Accept raw transfers whose nonce skips ahead of the next sequence
    pub fn accept_nonce_gaps(&self) {
        self.accept_gaps.store(true, Ordering::Relaxed);
    }

    /// Reject the next submission with `error`
    pub fn fail_next(&self, error: TransportError) {
        self.scripted_failures.lock().push_back(error);
    }

    pub fn fail_next_n(&self, n: usize, error: TransportError) {
        let mut failures = self.scripted_failures.lock();
        for _ in 0..n {
            failures.push_back(error.clone());
        }
    }

    /// Report `status` for every receipt query from now on
    pub fn force_receipt(&self, status: ReceiptStatus) {
        *self.forced_receipt.lock() = Some(status);
    }

    /// Accepted envelopes in submission order
    pub fn submitted(&self) -> Vec<SignedEnvelope> {
        self.submitted.lock().clone()
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().len()
    }

    /// Submission attempts, rejected ones included
    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::Relaxed)
    }

    pub fn sequence_queries(&self) -> usize {
        self.sequence_queries.load(Ordering::Relaxed)
    }

    pub fn pool_full() -> TransportError {
        TransportError::PoolFull {
            endpoint: MOCK_ENDPOINT.to_string(),
        }
    }

    pub fn nonce_too_low() -> TransportError {
        TransportError::NonceTooLow {
            endpoint: MOCK_ENDPOINT.to_string(),
            message: "nonce too low".to_string(),
        }
    }

    fn apply(&self, envelope: &SignedEnvelope) -> TransportResult<()> {
        let mut ledger = self.ledger.lock();

        if envelope.kind().is_routed() {
            match envelope.routed_payload().map_err(decode_error)? {
                RoutedPayload::Transfer(ctx) => {
                    ledger.debit(ctx.owner, ctx.value)?;
                    ledger.credit(ctx.to, ctx.value);
                }
                RoutedPayload::TokenTransfer(ctx) => {
                    ledger.move_token(ctx.owner, ctx.to, &ctx.token, ctx.value)?;
                }
                _ => {}
            }
            return Ok(());
        }

        let decoded = envelope.decode().map_err(decode_error)?;
        let tx = decoded
            .as_legacy()
            .ok_or_else(|| decode_error("not a legacy transaction"))?
            .tx();
        let from = envelope.signer();
        let expected = ledger.nonces.get(&from).copied().unwrap_or(0);
        if tx.nonce < expected {
            return Err(TransportError::NonceTooLow {
                endpoint: MOCK_ENDPOINT.to_string(),
                message: format!("nonce too low: next nonce {expected}, tx nonce {}", tx.nonce),
            });
        }
        if tx.nonce > expected && !self.accept_gaps.load(Ordering::Relaxed) {
            return Err(TransportError::Rpc {
                endpoint: MOCK_ENDPOINT.to_string(),
                message: format!("nonce gap: next nonce {expected}, tx nonce {}", tx.nonce),
                code: Some(-32000),
            });
        }

        let gas = U256::from(tx.gas_price) * U256::from(tx.gas_limit);
        ledger.debit(from, tx.value + gas)?;
        ledger.credit(envelope.to(), tx.value);
        ledger.nonces.insert(from, tx.nonce + 1);
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_sequence(&self, address: Address) -> TransportResult<u64> {
        self.sequence_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.nonce_of(address))
    }

    async fn submit(&self, envelope: &SignedEnvelope) -> TransportResult<TxHash> {
        self.submit_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.scripted_failures.lock().pop_front() {
            return Err(error);
        }

        self.apply(envelope)?;
        self.receipts.insert(envelope.hash(), ReceiptStatus::Success);
        self.submitted.lock().push(envelope.clone());
        Ok(envelope.hash())
    }

    async fn get_receipt(&self, hash: TxHash) -> TransportResult<ReceiptStatus> {
        if let Some(status) = *self.forced_receipt.lock() {
            return Ok(status);
        }
        Ok(self
            .receipts
            .get(&hash)
            .map(|status| *status)
            .unwrap_or(ReceiptStatus::Pending))
    }

    async fn get_balance(&self, address: Address) -> TransportResult<U256> {
        Ok(self.balance(address))
    }
}

/// Chain parameters used across tests: chain id 1337, default gas settings
pub fn test_chain() -> Arc<ChainConfig> {
    Arc::new(ChainConfig::new(1337))
}

/// Chain with zero gas price, so balances move by value only
pub fn gasless_chain() -> Arc<ChainConfig> {
    Arc::new(ChainConfig::new(1337).with_gas_price(0))
}

/// Retry policy with millisecond timings
pub fn fast_retry() -> crate::account::RetryPolicy {
    crate::account::RetryPolicy {
        backoff: std::time::Duration::from_millis(5),
        inclusion_timeout: std::time::Duration::from_millis(200),
        poll_interval: std::time::Duration::from_millis(5),
    }
}
