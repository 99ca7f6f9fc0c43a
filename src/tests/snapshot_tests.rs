//! Snapshot persistence tests

#[cfg(test)]
mod snapshot_tests {
    use crate::account::Account;
    use crate::group::{
        AccountGroup, AccountGroupSnapshot, AccountPurpose, SnapshotAccount, SnapshotError,
        SnapshotStore, TestContract,
    };
    use crate::test_utils::{test_chain, MockTransport};
    use alloy_primitives::{Address, U256};
    use chrono::{Local, TimeZone};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample_group() -> AccountGroup {
        let chain = test_chain();
        let mut group = AccountGroup::new(Arc::clone(&chain), true);
        for i in 0..3u64 {
            group.push(
                AccountPurpose::Signed,
                Arc::new(Account::from_seed(i, 40 + i, Arc::clone(&chain))),
            );
        }
        group.push(
            AccountPurpose::Unsigned,
            Arc::new(Account::from_seed(0, 50, Arc::clone(&chain))),
        );
        group.set_contract(
            TestContract::Erc20,
            Arc::new(Account::from_seed(0, 60, Arc::clone(&chain))),
        );
        group
    }

    fn addresses(list: &[Arc<Account>]) -> Vec<Address> {
        list.iter().map(|account| account.address()).collect()
    }

    #[tokio::test]
    async fn test_save_and_load_preserves_group() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let group = sample_group();

        // advance one account's sequence so counters are persisted
        let transport = MockTransport::new();
        let sender = Arc::clone(&group.list(AccountPurpose::Signed)[0]);
        transport.set_balance(sender.address(), U256::MAX);
        sender
            .transfer_signed(&transport, Address::repeat_byte(1), U256::from(1))
            .await
            .unwrap();

        let path = store.save(&group).await.unwrap();
        let restored = store.load(&path, test_chain()).await.unwrap();

        assert!(restored.includes_unsigned());
        for purpose in AccountPurpose::ALL {
            assert_eq!(
                addresses(restored.list(purpose)),
                addresses(group.list(purpose)),
                "list {} differs",
                purpose.name()
            );
        }
        assert_eq!(
            restored.contract(TestContract::Erc20).map(|a| a.address()),
            group.contract(TestContract::Erc20).map(|a| a.address())
        );
        assert!(restored.contract(TestContract::Erc721).is_none());

        let restored_sender = &restored.list(AccountPurpose::Signed)[0];
        assert_eq!(restored_sender.counters().await.0, 1);
        assert_eq!(
            *restored_sender.private_key_hex(),
            *sender.private_key_hex()
        );
    }

    #[tokio::test]
    async fn test_snapshot_json_layout() {
        let snapshot = AccountGroupSnapshot::capture(&sample_group()).await;
        let json: serde_json::Value = serde_json::from_slice(&snapshot.to_json().unwrap()).unwrap();

        assert_eq!(json["containsUnsignedAccGrp"], true);
        assert_eq!(json["Accounts"].as_array().unwrap().len(), AccountPurpose::COUNT);
        assert_eq!(json["Contracts"].as_array().unwrap().len(), TestContract::COUNT);
        assert!(json["Contracts"][1].is_null());

        let first = &json["Accounts"][0][0];
        let key = first["privateKey"].as_str().unwrap();
        assert_eq!(key.len(), 66);
        assert!(key.starts_with("0x"));
        assert!(first["address"].as_str().unwrap().starts_with("0x"));
        assert!(first["nonce"].is_u64());
        assert!(first["timeNonce"].is_u64());
    }

    #[tokio::test]
    async fn test_latest_picks_greatest_name() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert_eq!(store.latest().await.unwrap(), None);

        for name in [
            "accounts-20240101_000000.json",
            "accounts-20250315_120000.json",
            "accounts-20241231_235959.json",
            "accounts-99999999_999999.json",
            "accounts-latest.json",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), b"{}").unwrap();
        }

        assert_eq!(
            store.latest().await.unwrap(),
            Some(dir.path().join("accounts-20250315_120000.json"))
        );
    }

    #[tokio::test]
    async fn test_latest_on_missing_dir_is_none() {
        let store = SnapshotStore::new("/nonexistent/snapshots/dir");
        assert_eq!(store.latest().await.unwrap(), None);
    }

    #[test]
    fn test_file_name_format() {
        let time = Local.with_ymd_and_hms(2024, 7, 9, 8, 5, 3).unwrap();
        let name = SnapshotStore::file_name_at(time);
        assert_eq!(name, "accounts-20240709_080503.json");
        assert!(SnapshotStore::is_snapshot_name(&name));
        assert!(!SnapshotStore::is_snapshot_name("accounts-2024.json"));
    }

    #[tokio::test]
    async fn test_vacant_contract_record_reads_as_empty() {
        let mut snapshot = AccountGroupSnapshot::capture(&sample_group()).await;
        snapshot.contracts[2] = Some(SnapshotAccount {
            address: String::new(),
            private_key: String::new(),
            nonce: 0,
            time_nonce: 0,
        });
        snapshot.contracts.truncate(3);
        snapshot.accounts.truncate(2);

        let group = snapshot.restore(test_chain()).unwrap();
        assert!(group.contract(TestContract::StorageTrie).is_none());
        assert!(group.contract(TestContract::Erc20).is_some());
        assert!(group.list(AccountPurpose::GaslessApprove).is_empty());
        assert_eq!(group.list(AccountPurpose::Signed).len(), 3);
    }

    #[test]
    fn test_empty_object_contract_entries_decode_as_vacant() {
        let account = Account::from_seed(0, 60, test_chain());
        let json = format!(
            r#"{{
                "containsUnsignedAccGrp": false,
                "Accounts": [[{{
                    "address": "{}",
                    "privateKey": "{}",
                    "nonce": 4,
                    "timeNonce": 9
                }}]],
                "Contracts": [{{}}, null, {{}}]
            }}"#,
            account.address().to_checksum(None),
            account.private_key_hex().as_str(),
        );

        let snapshot = AccountGroupSnapshot::from_json(json.as_bytes()).unwrap();
        assert_eq!(snapshot.contracts[0], Some(SnapshotAccount::default()));

        let group = snapshot.restore(test_chain()).unwrap();
        assert!(TestContract::ALL.iter().all(|c| group.contract(*c).is_none()));
        assert_eq!(group.list(AccountPurpose::Signed).len(), 1);
        assert_eq!(group.list(AccountPurpose::Signed)[0].address(), account.address());
    }

    #[tokio::test]
    async fn test_restore_rejects_inconsistent_records() {
        let base = AccountGroupSnapshot::capture(&sample_group()).await;

        let mut mismatched = base.clone();
        mismatched.accounts[0][1].address = Address::repeat_byte(0xaa).to_checksum(None);
        assert!(matches!(
            mismatched.restore(test_chain()),
            Err(SnapshotError::AddressMismatch { .. })
        ));

        let mut short_key = base.clone();
        short_key.accounts[0][0].private_key = "0x1234".to_string();
        match short_key.restore(test_chain()) {
            Err(SnapshotError::InvalidKey { location, .. }) => assert_eq!(location, "signed[0]"),
            other => panic!("expected invalid key, got {other:?}"),
        }

        let mut extra = base.clone();
        extra.accounts.push(Vec::new());
        assert!(matches!(
            extra.restore(test_chain()),
            Err(SnapshotError::TooManyLists { found: 6, max: 5 })
        ));

        assert!(matches!(
            AccountGroupSnapshot::from_json(b"not json"),
            Err(SnapshotError::Json { .. })
        ));
    }

    #[tokio::test]
    async fn test_restored_clock_never_goes_backwards() {
        let chain = test_chain();
        let mut group = AccountGroup::new(Arc::clone(&chain), false);
        group.push(
            AccountPurpose::Signed,
            Arc::new(Account::from_seed(0, 70, Arc::clone(&chain))),
        );

        let mut snapshot = AccountGroupSnapshot::capture(&group).await;
        let far_future = u64::MAX / 2;
        snapshot.accounts[0][0].time_nonce = far_future;

        let restored = snapshot.restore(chain).unwrap();
        let account = &restored.list(AccountPurpose::Signed)[0];
        let envelope = account
            .lock()
            .await
            .build_routed(crate::tx_builder::TxRequest::CancelAll)
            .unwrap();
        assert_eq!(envelope.nonce(), far_future);
    }
}
