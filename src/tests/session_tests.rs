//! Session key lifecycle tests

#[cfg(test)]
mod session_tests {
    use crate::account::{Account, SessionStatus};
    use crate::test_utils::{test_chain, MockTransport};
    use crate::tx_builder::{PayloadKind, RoutedPayload, SessionCommand, TxBuildError, TxRequest};

    #[tokio::test]
    async fn test_create_session_appends_record_after_signing() {
        let account = Account::from_seed(0, 20, test_chain());
        let mut guard = account.lock().await;

        let (index, envelope) = guard.create_session().unwrap();
        assert_eq!(index, 0);
        assert_eq!(envelope.kind(), PayloadKind::SessionCreate);

        let sessions = guard.sessions();
        assert_eq!(sessions.len(), 1);
        let record = sessions.record(0).unwrap();
        assert_eq!(record.status, SessionStatus::AssumedActive);
        assert_eq!(record.last_nonce, envelope.nonce());
        assert_eq!(sessions.key(0).unwrap().address(), record.public_key);
    }

    #[tokio::test]
    async fn test_session_envelope_is_signed_by_session_key() {
        let account = Account::from_seed(0, 21, test_chain());
        let mut guard = account.lock().await;
        let (index, envelope) = guard.create_session().unwrap();
        let session_key = guard.sessions().key(index).unwrap().address();

        assert_eq!(envelope.signer(), session_key);
        assert_eq!(envelope.recover_signer().unwrap(), session_key);
        assert_ne!(session_key, account.address());

        match envelope.routed_payload().unwrap() {
            RoutedPayload::Session(ctx) => {
                assert_eq!(ctx.command, SessionCommand::Create);
                assert_eq!(ctx.session.owner, account.address());
                assert_eq!(ctx.session.public_key, session_key);
                assert_eq!(ctx.session.nonce, envelope.nonce());
                assert_eq!(ctx.recover_authority().unwrap(), account.address());
            }
            other => panic!("expected session payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_session_expiry_follows_ttl() {
        let chain = test_chain();
        let account = Account::from_seed(0, 22, chain.clone());
        let before = chrono::Utc::now().timestamp() as u64;
        let (_, _) = account.lock().await.create_session().unwrap();
        let after = chrono::Utc::now().timestamp() as u64;

        let guard = account.lock().await;
        let expiry = guard.sessions().record(0).unwrap().expiry;
        let ttl = chain.session_ttl.as_secs();
        assert!(expiry >= before + ttl && expiry <= after + ttl);
    }

    #[tokio::test]
    async fn test_delete_out_of_range_leaves_state_untouched() {
        let account = Account::from_seed(0, 23, test_chain());
        let mut guard = account.lock().await;
        guard.create_session().unwrap();
        let clock_before = guard.clock().current();

        let err = guard.delete_session(1).unwrap_err();
        assert_eq!(err, TxBuildError::SessionIndexOutOfRange { index: 1, len: 1 });
        assert_eq!(guard.clock().current(), clock_before);
        assert_eq!(guard.sessions().len(), 1);
        assert_eq!(
            guard.sessions().record(0).unwrap().status,
            SessionStatus::AssumedActive
        );
    }

    #[tokio::test]
    async fn test_delete_marks_record_and_keeps_it() {
        let account = Account::from_seed(0, 24, test_chain());
        let mut guard = account.lock().await;
        let (index, _) = guard.create_session().unwrap();
        let session_key = guard.sessions().key(index).unwrap().address();

        let envelope = guard.delete_session(index).unwrap();
        assert_eq!(envelope.kind(), PayloadKind::SessionDelete);
        assert_eq!(envelope.signer(), session_key);

        let record = guard.sessions().record(index).unwrap();
        assert_eq!(record.status, SessionStatus::DeleteRequested);
        assert_eq!(record.last_nonce, envelope.nonce());
        assert_eq!(guard.sessions().len(), 1);

        match envelope.routed_payload().unwrap() {
            RoutedPayload::Session(ctx) => {
                assert_eq!(ctx.command, SessionCommand::Delete);
                assert_eq!(ctx.recover_authority().unwrap(), account.address());
            }
            other => panic!("expected session payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_confirm_promotes_only_assumed_sessions() {
        let account = Account::from_seed(0, 25, test_chain());
        let mut guard = account.lock().await;
        let (first, _) = guard.create_session().unwrap();
        let (second, _) = guard.create_session().unwrap();
        guard.delete_session(second).unwrap();

        guard.confirm_session(first).unwrap();
        guard.confirm_session(second).unwrap();
        assert!(guard.confirm_session(2).is_err());

        assert_eq!(guard.sessions().record(first).unwrap().status, SessionStatus::Confirmed);
        assert_eq!(
            guard.sessions().record(second).unwrap().status,
            SessionStatus::DeleteRequested
        );
    }

    #[tokio::test]
    async fn test_register_session_submits_descriptor() {
        let transport = MockTransport::new();
        let account = Account::from_seed(0, 26, test_chain());

        let (index, envelope) = account.register_session(&transport).await.unwrap();
        assert_eq!(index, 0);
        assert_eq!(account.session_count().await, 1);
        assert_eq!(transport.submitted(), vec![envelope]);

        let delete = account
            .build_and_sign(TxRequest::SessionDelete { index: 5 }, &transport)
            .await;
        assert!(delete.is_err());
        assert_eq!(transport.sequence_queries(), 0);
    }
}
