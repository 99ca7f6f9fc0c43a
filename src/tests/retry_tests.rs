//! Guaranteed-retry transfer tests
//!
//! Submission failures are retried until the node accepts the transfer;
//! build errors, inclusion failures and timeouts come back at once.

#[cfg(test)]
mod retry_tests {
    use crate::account::{wait_for_inclusion, Account, AccountError};
    use crate::test_utils::{fast_retry, gasless_chain, test_chain, MockTransport};
    use crate::transport::{ReceiptStatus, TransportError};
    use crate::tx_builder::{OrderParams, Side, TxRequest};
    use alloy_primitives::{Address, U256};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_full_is_retried_until_accepted() {
        let transport = MockTransport::new();
        let account = Account::from_seed(0, 10, test_chain());
        let recipient = Address::repeat_byte(0x10);
        transport.set_balance(account.address(), U256::MAX);
        transport.fail_next_n(3, MockTransport::pool_full());

        let envelope = timeout(
            Duration::from_secs(5),
            account.transfer_with_guaranteed_retry(&transport, recipient, U256::from(42), &fast_retry()),
        )
        .await
        .expect("retry loop should finish")
        .unwrap();

        assert_eq!(transport.submit_calls(), 4);
        assert_eq!(transport.submitted_count(), 1);
        assert_eq!(envelope.nonce(), 0);
        assert_eq!(transport.balance(recipient), U256::from(42));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_nonce_too_low_retry_uses_next_sequence() {
        let transport = MockTransport::new();
        let account = Account::from_seed(0, 11, gasless_chain());
        transport.set_balance(account.address(), U256::from(100));
        transport.accept_nonce_gaps();
        transport.fail_next(MockTransport::nonce_too_low());

        let envelope = timeout(
            Duration::from_secs(5),
            account.transfer_with_guaranteed_retry(
                &transport,
                Address::repeat_byte(0x11),
                U256::from(10),
                &fast_retry(),
            ),
        )
        .await
        .expect("retry loop should finish")
        .unwrap();

        assert_eq!(envelope.nonce(), 1);
        assert_eq!(transport.sequence_queries(), 1);
        assert_eq!(account.counters().await.0, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_malformed_response_is_resubmitted() {
        let transport = MockTransport::new();
        let account = Account::from_seed(0, 12, gasless_chain());
        let recipient = Address::repeat_byte(0x12);
        transport.set_balance(account.address(), U256::from(100));
        transport.fail_next(TransportError::Decode {
            endpoint: "mock".to_string(),
            message: "garbage".to_string(),
        });
        transport.fail_next(TransportError::PoolClosed);

        let envelope = timeout(
            Duration::from_secs(5),
            account.transfer_with_guaranteed_retry(&transport, recipient, U256::from(1), &fast_retry()),
        )
        .await
        .expect("retry loop should finish")
        .unwrap();

        assert_eq!(transport.submit_calls(), 3);
        assert_eq!(transport.submitted_count(), 1);
        assert_eq!(envelope.nonce(), 0);
        assert_eq!(transport.balance(recipient), U256::from(1));
    }

    #[tokio::test]
    async fn test_build_error_stops_retry_loop() {
        let transport = MockTransport::new();
        let account = Account::from_seed(0, 16, gasless_chain());

        let order = OrderParams::limit("BTC", "USDT", Side::Buy, U256::from(100), U256::ZERO);

        let err = account
            .send_with_guaranteed_retry(&transport, TxRequest::NewOrder(order), &fast_retry())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Build(_)));
        assert_eq!(transport.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_receipt_is_fatal() {
        let transport = MockTransport::new();
        let account = Account::from_seed(0, 13, gasless_chain());
        transport.set_balance(account.address(), U256::from(100));
        transport.force_receipt(ReceiptStatus::Failed);

        let err = account
            .transfer_with_guaranteed_retry(&transport, Address::repeat_byte(0x13), U256::from(1), &fast_retry())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::InclusionFailed { .. }));
        assert!(err.is_fatal());
        assert_eq!(transport.submit_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_receipt_times_out() {
        let transport = MockTransport::new();
        let account = Account::from_seed(0, 14, gasless_chain());
        transport.set_balance(account.address(), U256::from(100));
        transport.force_receipt(ReceiptStatus::Pending);

        let policy = fast_retry();
        let envelope = account
            .transfer_signed(&transport, Address::repeat_byte(0x14), U256::from(1))
            .await
            .unwrap();
        let err = wait_for_inclusion(&transport, &envelope, &policy)
            .await
            .unwrap_err();

        match err {
            AccountError::InclusionTimeout { hash, from, timeout_ms } => {
                assert_eq!(hash, envelope.hash());
                assert_eq!(from, account.address());
                assert_eq!(timeout_ms, policy.inclusion_timeout.as_millis() as u64);
            }
            other => panic!("expected inclusion timeout, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_token_transfer_retry_moves_tokens() {
        let transport = MockTransport::new();
        let account = Account::from_seed(0, 15, gasless_chain());
        let recipient = Address::repeat_byte(0x15);
        transport.set_token_balance(account.address(), "USDT", U256::from(1_000));
        transport.fail_next(MockTransport::pool_full());

        account
            .token_transfer_with_guaranteed_retry(&transport, recipient, "USDT", U256::from(250), &fast_retry())
            .await
            .unwrap();

        assert_eq!(transport.token_balance(recipient, "USDT"), U256::from(250));
        assert_eq!(transport.token_balance(account.address(), "USDT"), U256::from(750));
        assert_eq!(transport.sequence_queries(), 0);
    }
}
