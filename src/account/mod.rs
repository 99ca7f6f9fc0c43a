//! Load-test accounts
//!
//! An [`Account`] owns a signing key, two independent counters and a list of
//! delegated session keys. All mutable state sits behind one async mutex:
//!
//! - [`Account::lock`] returns an [`AccountGuard`], the only way to allocate a
//!   sequence, tick the logical clock, or append a session
//! - operations on the guard never lock again, so a caller holding the guard
//!   can compose them without re-entrant deadlock
//! - convenience methods on `Account` take the lock for one operation and
//!   release it before any wait for inclusion
//!
//! ## Counters
//!
//! | Counter             | Used by                | Seeded from                  |
//! |---------------------|------------------------|------------------------------|
//! | [`SequenceCounter`] | raw legacy transfers   | chain pending count, once    |
//! | [`LogicalClock`]    | every routed payload   | wall-clock ms at first use   |

pub mod errors;
pub mod retry;
pub mod sequence;
pub mod session;

use alloy_primitives::{Address, Bytes, TxHash, U256};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::config::ChainConfig;
use crate::keys::{KeyError, KeyMaterial};
use crate::metrics::metrics;
use crate::transport::Transport;
use crate::tx_builder::{SignedEnvelope, TxBuildError, TxRequest};

pub use errors::AccountError;
pub use retry::{wait_for_inclusion, RetryPolicy};
pub use sequence::{LogicalClock, SequenceCounter};
pub use session::{SessionBook, SessionRecord, SessionStatus};

/// Mutable per-account state, only reachable through [`AccountGuard`]
#[derive(Debug, Default)]
pub struct AccountState {
    pub(crate) sequence: SequenceCounter,
    pub(crate) clock: LogicalClock,
    pub(crate) sessions: SessionBook,
}

pub struct Account {
    id: u64,
    keys: KeyMaterial,
    address: Address,
    chain: Arc<ChainConfig>,
    state: Mutex<AccountState>,
}

impl Account {
    /// Fresh random account; no network access
    pub fn generate(id: u64, chain: Arc<ChainConfig>) -> Self {
        Self::from_keys(id, KeyMaterial::generate(), chain)
    }

    /// Deterministic account for reproducible runs and tests
    pub fn from_seed(id: u64, seed: u64, chain: Arc<ChainConfig>) -> Self {
        Self::from_keys(id, KeyMaterial::from_seed(seed), chain)
    }

    /// Import a known secret, e.g. the funded source account
    pub fn import(id: u64, secret: &str, chain: Arc<ChainConfig>) -> Result<Self, KeyError> {
        Ok(Self::from_keys(id, KeyMaterial::from_hex(secret)?, chain))
    }

    pub fn from_keys(id: u64, keys: KeyMaterial, chain: Arc<ChainConfig>) -> Self {
        Self::with_counters(id, keys, SequenceCounter::new(), LogicalClock::new(), chain)
    }

    pub(crate) fn with_counters(
        id: u64,
        keys: KeyMaterial,
        sequence: SequenceCounter,
        clock: LogicalClock,
        chain: Arc<ChainConfig>,
    ) -> Self {
        let address = keys.address();
        Self {
            id,
            keys,
            address,
            chain,
            state: Mutex::new(AccountState {
                sequence,
                clock,
                sessions: SessionBook::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain(&self) -> &Arc<ChainConfig> {
        &self.chain
    }

    pub(crate) fn keys(&self) -> &KeyMaterial {
        &self.keys
    }

    /// Zero-padded `0x` hex secret, for snapshot persistence only
    pub fn private_key_hex(&self) -> Zeroizing<String> {
        self.keys.to_hex()
    }

    /// Acquire exclusive access to the account's counters and sessions
    pub async fn lock(&self) -> AccountGuard<'_> {
        AccountGuard {
            account: self,
            state: self.state.lock().await,
        }
    }

    /// `(sequence, logical clock)` as persisted in snapshots
    pub async fn counters(&self) -> (u64, u64) {
        let state = self.state.lock().await;
        (state.sequence.peek(), state.clock.current())
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Build and sign one transaction under the lock
    pub async fn build_and_sign(
        &self,
        request: TxRequest,
        transport: &dyn Transport,
    ) -> Result<SignedEnvelope, AccountError> {
        self.lock().await.build_and_sign(request, transport).await
    }

    /// Submit a signed envelope; does not touch account state
    pub async fn send(
        &self,
        transport: &dyn Transport,
        envelope: &SignedEnvelope,
    ) -> Result<TxHash, AccountError> {
        transport
            .submit(envelope)
            .await
            .map_err(|source| self.submission_error(envelope.nonce(), source))
    }

    /// Submit several envelopes in one call, one result per envelope
    pub async fn send_batch(
        &self,
        transport: &dyn Transport,
        envelopes: &[SignedEnvelope],
    ) -> Vec<Result<TxHash, AccountError>> {
        transport
            .submit_batch(envelopes)
            .await
            .into_iter()
            .zip(envelopes)
            .map(|(result, envelope)| {
                result.map_err(|source| self.submission_error(envelope.nonce(), source))
            })
            .collect()
    }

    /// Build, sign and submit under the lock, returning the envelope
    pub async fn submit_request(
        &self,
        request: TxRequest,
        transport: &dyn Transport,
    ) -> Result<SignedEnvelope, AccountError> {
        self.lock().await.submit_request(request, transport).await
    }

    /// Direct-submit value transfer with chain-sequence handling
    pub async fn transfer_signed(
        &self,
        transport: &dyn Transport,
        to: Address,
        value: U256,
    ) -> Result<SignedEnvelope, AccountError> {
        let request = TxRequest::RawLegacyTransfer {
            to,
            value,
            input: Bytes::new(),
        };
        self.submit_request(request, transport).await
    }

    /// Create a session and submit its descriptor, returning the session index
    pub async fn register_session(
        &self,
        transport: &dyn Transport,
    ) -> Result<(usize, SignedEnvelope), AccountError> {
        let mut guard = self.lock().await;
        let (index, envelope) = guard.create_session()?;
        drop(guard);

        self.send(transport, &envelope).await?;
        debug!(address = %self.address, index, hash = %envelope.hash(), "Session registered");
        Ok((index, envelope))
    }

    pub async fn get_balance(&self, transport: &dyn Transport) -> Result<U256, AccountError> {
        Ok(transport.get_balance(self.address).await?)
    }

    /// Compare the on-chain balance with `expected`
    pub async fn check_balance(
        &self,
        transport: &dyn Transport,
        expected: U256,
    ) -> Result<(), AccountError> {
        let actual = self.get_balance(transport).await?;
        if actual != expected {
            return Err(AccountError::BalanceMismatch {
                address: self.address,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn submission_error(&self, nonce: u64, source: crate::transport::TransportError) -> AccountError {
        metrics()
            .tx_submit_failures
            .with_label_values(&[source.category()])
            .inc();
        AccountError::Submission {
            address: self.address,
            nonce,
            source,
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Account");
        out.field("id", &self.id).field("address", &self.address);
        match self.state.try_lock() {
            Ok(state) => out
                .field("sequence", &state.sequence.peek())
                .field("clock", &state.clock.current())
                .field("sessions", &state.sessions.len()),
            Err(_) => out.field("state", &"<locked>"),
        };
        out.finish()
    }
}

/// Exclusive access to one account's mutable state
///
/// Dropping the guard releases the lock.
pub struct AccountGuard<'a> {
    pub(crate) account: &'a Account,
    pub(crate) state: MutexGuard<'a, AccountState>,
}

impl<'a> AccountGuard<'a> {
    pub fn account(&self) -> &'a Account {
        self.account
    }

    pub fn sequence(&self) -> &SequenceCounter {
        &self.state.sequence
    }

    pub fn clock(&self) -> &LogicalClock {
        &self.state.clock
    }

    pub fn sessions(&self) -> &SessionBook {
        &self.state.sessions
    }

    /// Next direct-submit sequence, querying the chain only on first use
    pub async fn allocate_sequence(&mut self, transport: &dyn Transport) -> Result<u64, AccountError> {
        if !self.state.sequence.is_synced() {
            let chain_next = transport.get_sequence(self.account.address).await?;
            debug!(
                address = %self.account.address,
                chain_next,
                local = self.state.sequence.peek(),
                "Sequence synced from chain"
            );
            self.state.sequence.observe_chain(chain_next);
        }
        Ok(self.state.sequence.allocate())
    }

    /// Next routed ordering value; never touches the network
    pub fn allocate_logical(&mut self) -> u64 {
        self.state.clock.tick()
    }

    pub fn confirm_session(&mut self, index: usize) -> Result<(), TxBuildError> {
        self.state.sessions.confirm(index)
    }

    /// Build, sign and submit while holding the lock
    ///
    /// On a direct-submit failure the sequence is rolled back so the value is
    /// reused, except for a nonce-too-low rejection: the counter then stays
    /// advanced and is not re-queried. Routed failures leave the clock
    /// advanced; gaps there are harmless.
    pub async fn submit_request(
        &mut self,
        request: TxRequest,
        transport: &dyn Transport,
    ) -> Result<SignedEnvelope, AccountError> {
        let envelope = self.build_and_sign(request, transport).await?;

        match transport.submit(&envelope).await {
            Ok(_) => Ok(envelope),
            Err(source) => {
                if !envelope.kind().is_routed() {
                    if source.is_nonce_too_low() {
                        warn!(
                            address = %self.account.address,
                            nonce = envelope.nonce(),
                            "Nonce too low, keeping local sequence advanced"
                        );
                    } else {
                        self.state.sequence.release(envelope.nonce());
                    }
                }
                Err(self.account.submission_error(envelope.nonce(), source))
            }
        }
    }
}

/// Run `f` for every account with at most `concurrency` calls in flight
///
/// Results come back in account order.
pub async fn concurrent_send<F, Fut, T>(
    accounts: &[Arc<Account>],
    concurrency: usize,
    f: F,
) -> Vec<T>
where
    F: FnMut(Arc<Account>) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(accounts.iter().cloned())
        .map(f)
        .buffered(concurrency.max(1))
        .collect()
        .await
}
