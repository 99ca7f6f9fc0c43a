//! Guaranteed-retry submission
//!
//! The funding path cannot proceed until a transfer lands, so submission is
//! retried with a fixed backoff and no attempt limit after any transport
//! failure. Key and build errors stop the loop at once. Each attempt holds the
//! account lock only for build, sign and submit. Inclusion is awaited
//! afterwards without the lock; a timeout or a failed receipt is returned as a
//! fatal error and never retried.

use alloy_primitives::{Address, Bytes, U256};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{debug, error, warn};

use super::{Account, AccountError};
use crate::metrics::{metrics, Timer};
use crate::transport::{ReceiptStatus, Transport};
use crate::tx_builder::{SignedEnvelope, TxRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep between failed submission attempts
    pub backoff: Duration,
    /// Upper bound on the wait for a successful receipt
    pub inclusion_timeout: Duration,
    /// Receipt polling interval
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
            inclusion_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl Account {
    /// Submit `request` until the node accepts it, then wait for inclusion
    pub async fn send_with_guaranteed_retry(
        &self,
        transport: &dyn Transport,
        request: TxRequest,
        policy: &RetryPolicy,
    ) -> Result<SignedEnvelope, AccountError> {
        let attempts = AtomicU32::new(0);
        let request = &request;
        let attempts_ref = &attempts;

        let envelope = RetryIf::spawn(
            FixedInterval::new(policy.backoff),
            move || async move {
                let attempt = attempts_ref.fetch_add(1, Ordering::Relaxed) + 1;
                if attempt > 1 {
                    metrics().guaranteed_retry_attempts.inc();
                }

                let result = self.submit_request(request.clone(), transport).await;
                if let Err(err) = &result {
                    if err.is_resubmittable() {
                        warn!(
                            address = %self.address(),
                            attempt,
                            category = err.category(),
                            transient = err.is_retryable(),
                            error = %err,
                            "Submission failed, retrying after backoff"
                        );
                    }
                }
                result
            },
            |err: &AccountError| err.is_resubmittable(),
        )
        .await?;

        debug!(
            address = %self.address(),
            hash = %envelope.hash(),
            attempts = attempts.load(Ordering::Relaxed),
            "Submission accepted, waiting for inclusion"
        );
        wait_for_inclusion(transport, &envelope, policy).await?;
        Ok(envelope)
    }

    /// Native value transfer that must succeed
    pub async fn transfer_with_guaranteed_retry(
        &self,
        transport: &dyn Transport,
        to: Address,
        value: U256,
        policy: &RetryPolicy,
    ) -> Result<SignedEnvelope, AccountError> {
        let request = TxRequest::RawLegacyTransfer {
            to,
            value,
            input: Bytes::new(),
        };
        self.send_with_guaranteed_retry(transport, request, policy).await
    }

    /// Routed token transfer that must succeed
    pub async fn token_transfer_with_guaranteed_retry(
        &self,
        transport: &dyn Transport,
        to: Address,
        token: &str,
        value: U256,
        policy: &RetryPolicy,
    ) -> Result<SignedEnvelope, AccountError> {
        let request = TxRequest::TokenTransfer {
            to,
            token: token.to_string(),
            value,
        };
        self.send_with_guaranteed_retry(transport, request, policy).await
    }
}

/// Poll for a receipt until success, failure, or `policy.inclusion_timeout`
pub async fn wait_for_inclusion(
    transport: &dyn Transport,
    envelope: &SignedEnvelope,
    policy: &RetryPolicy,
) -> Result<(), AccountError> {
    let timer = Timer::new();
    let hash = envelope.hash();
    let from = envelope.signer();

    let poll = async {
        loop {
            match transport.get_receipt(hash).await {
                Ok(ReceiptStatus::Success) => return Ok(()),
                Ok(ReceiptStatus::Failed) => {
                    return Err(AccountError::InclusionFailed { hash, from });
                }
                Ok(ReceiptStatus::Pending) => {}
                Err(err) => debug!(%hash, error = %err, "Receipt query failed, polling again"),
            }
            tokio::time::sleep(policy.poll_interval).await;
        }
    };

    let outcome = match tokio::time::timeout(policy.inclusion_timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(AccountError::InclusionTimeout {
            hash,
            from,
            timeout_ms: policy.inclusion_timeout.as_millis() as u64,
        }),
    };
    timer.observe_duration(&metrics().inclusion_wait);

    if let Err(err) = &outcome {
        error!(
            %hash,
            %from,
            to = %envelope.to(),
            value = %envelope.value(),
            nonce = envelope.nonce(),
            kind = envelope.kind().as_str(),
            error = %err,
            "Transaction did not land"
        );
    }
    outcome
}
