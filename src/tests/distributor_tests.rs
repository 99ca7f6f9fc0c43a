//! Hierarchical distribution tests
//!
//! Transfers run against an in-memory balance map so the funding arithmetic
//! can be checked exactly: every target ends with the value and every
//! reservoir ends empty.

#[cfg(test)]
mod distributor_tests {
    use crate::account::{Account, AccountError};
    use crate::distributor::{
        chunk_sizes, required_funding, tx_count, DistributionError, Distributor, FundsTransfer,
    };
    use crate::test_utils::test_chain;
    use alloy_primitives::{Address, TxHash, U256};
    use dashmap::DashMap;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Balances plus every account that ever received funds
    #[derive(Default)]
    struct Books {
        balances: DashMap<Address, U256>,
        transfers: AtomicU64,
        recipients: Mutex<Vec<Address>>,
    }

    impl Books {
        fn balance(&self, address: Address) -> U256 {
            self.balances.get(&address).map(|b| *b).unwrap_or_default()
        }
    }

    fn ledger_transfer(
        books: Arc<Books>,
        gas: U256,
        fail_for: Option<Address>,
    ) -> Arc<dyn FundsTransfer> {
        Arc::new(move |from: Arc<Account>, to: Arc<Account>, value: U256| {
            let books = Arc::clone(&books);
            async move {
                if fail_for == Some(to.address()) {
                    return Err(AccountError::InclusionFailed {
                        hash: TxHash::ZERO,
                        from: from.address(),
                    });
                }

                let cost = value + gas;
                {
                    let mut balance = books.balances.entry(from.address()).or_default();
                    if *balance < cost {
                        return Err(AccountError::BalanceMismatch {
                            address: from.address(),
                            expected: cost,
                            actual: *balance,
                        });
                    }
                    *balance -= cost;
                }
                *books.balances.entry(to.address()).or_default() += value;
                books.transfers.fetch_add(1, Ordering::Relaxed);
                books.recipients.lock().push(to.address());

                tokio::task::yield_now().await;
                Ok(())
            }
        })
    }

    fn targets(n: usize, seed_base: u64) -> Vec<Arc<Account>> {
        let chain = test_chain();
        (0..n as u64)
            .map(|i| Arc::new(Account::from_seed(i, seed_base + i, Arc::clone(&chain))))
            .collect()
    }

    #[test]
    fn test_chunk_sizes_are_contiguous_ceil_splits() {
        assert_eq!(chunk_sizes(10, 4).collect::<Vec<_>>(), vec![3, 3, 3, 1]);
        assert_eq!(chunk_sizes(8, 4).collect::<Vec<_>>(), vec![2, 2, 2, 2]);
        assert_eq!(chunk_sizes(5, 4).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(chunk_sizes(10_000, 4).collect::<Vec<_>>(), vec![2_500; 4]);
        assert_eq!(chunk_sizes(0, 4).count(), 0);
    }

    #[test]
    fn test_tx_count_small_trees() {
        assert_eq!(tx_count(0, 4), 0);
        assert_eq!(tx_count(3, 4), 3);
        assert_eq!(tx_count(4, 4), 4);
        // 5 -> chunks 2,2,1: three reservoir fundings plus five leaves
        assert_eq!(tx_count(5, 4), 8);
        // 10 -> chunks 3,3,3,1
        assert_eq!(tx_count(10, 4), 14);
    }

    #[test]
    fn test_required_funding_matches_tree_cost() {
        let value = U256::from(10_000);
        let gas = U256::from(21);
        assert_eq!(
            required_funding(4, value, gas, 4).unwrap(),
            U256::from(4 * 10_000 + 4 * 21)
        );
        assert_eq!(
            required_funding(10, value, gas, 4).unwrap(),
            U256::from(10 * 10_000 + 14 * 21)
        );
        assert_eq!(required_funding(10, value, U256::ZERO, 4).unwrap(), U256::from(100_000));
    }

    proptest! {
        #[test]
        fn prop_reservoir_funding_sums_to_parent(n in 1usize..5_000, b in 2usize..10, gas in 0u64..1_000) {
            let value = U256::from(7);
            let gas = U256::from(gas);
            let parent = required_funding(n, value, gas, b).unwrap();

            if n > b {
                // Parent pays each chunk its funding plus the gas for that edge
                let spent: U256 = chunk_sizes(n, b)
                    .map(|chunk| required_funding(chunk, value, gas, b).unwrap() + gas)
                    .fold(U256::ZERO, |acc, x| acc + x);
                prop_assert_eq!(spent, parent);
            } else {
                prop_assert_eq!(parent, (value + gas) * U256::from(n));
            }
        }

        #[test]
        fn prop_chunks_cover_all_targets(n in 0usize..20_000, b in 2usize..16) {
            let sizes: Vec<usize> = chunk_sizes(n, b).collect();
            prop_assert_eq!(sizes.iter().sum::<usize>(), n);
            prop_assert!(sizes.len() <= b);
            if let Some((last, rest)) = sizes.split_last() {
                prop_assert!(rest.iter().all(|&s| s == sizes[0]));
                prop_assert!(*last <= sizes[0]);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distribution_leaves_no_surplus() {
        let books = Arc::new(Books::default());
        let gas = U256::from(21);
        let value = U256::from(10_000);
        let distributor = Distributor::new(ledger_transfer(Arc::clone(&books), gas, None))
            .with_branching_factor(4)
            .with_gas_reserve(gas);

        let targets = targets(1_000, 10_000);
        let source = Arc::new(Account::from_seed(0, 1, test_chain()));
        let needed = distributor.required_funding(targets.len(), value).unwrap();
        books.balances.insert(source.address(), needed);

        let report = timeout(
            Duration::from_secs(60),
            distributor.distribute(Arc::clone(&source), &targets, value),
        )
        .await
        .expect("distribution timed out")
        .unwrap();

        assert_eq!(report.leaf_transfers, 1_000);
        assert_eq!(report.total_transfers(), tx_count(1_000, 4));
        assert_eq!(books.transfers.load(Ordering::Relaxed), tx_count(1_000, 4));

        let target_set: HashSet<Address> = targets.iter().map(|t| t.address()).collect();
        for target in &targets {
            assert_eq!(books.balance(target.address()), value);
        }
        assert_eq!(books.balance(source.address()), U256::ZERO);

        let reservoirs: HashSet<Address> = books
            .recipients
            .lock()
            .iter()
            .copied()
            .filter(|a| !target_set.contains(a))
            .collect();
        assert_eq!(reservoirs.len() as u64, report.funding_transfers);
        for reservoir in reservoirs {
            assert_eq!(books.balance(reservoir), U256::ZERO, "reservoir {reservoir} kept funds");
        }
    }

    #[tokio::test]
    async fn test_small_group_is_paid_directly_in_order() {
        let books = Arc::new(Books::default());
        let distributor = Distributor::new(ledger_transfer(Arc::clone(&books), U256::ZERO, None))
            .with_branching_factor(4);
        let targets = targets(3, 500);
        let source = Arc::new(Account::from_seed(0, 2, test_chain()));
        books.balances.insert(source.address(), U256::from(30));

        let report = distributor
            .distribute(Arc::clone(&source), &targets, U256::from(10))
            .await
            .unwrap();

        assert_eq!(report.leaf_transfers, 3);
        assert_eq!(report.funding_transfers, 0);
        let expected: Vec<Address> = targets.iter().map(|t| t.address()).collect();
        assert_eq!(*books.recipients.lock(), expected);
        assert_eq!(books.balance(source.address()), U256::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_surfaces_after_siblings_complete() {
        let books = Arc::new(Books::default());
        let targets = targets(20, 900);
        let failing = targets[0].address();
        let value = U256::from(100);
        let distributor = Distributor::new(ledger_transfer(Arc::clone(&books), U256::ZERO, Some(failing)))
            .with_branching_factor(4);
        let source = Arc::new(Account::from_seed(0, 3, test_chain()));
        books
            .balances
            .insert(source.address(), distributor.required_funding(targets.len(), value).unwrap());

        let err = distributor
            .distribute(source, &targets, value)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DistributionError::Transfer(AccountError::InclusionFailed { .. })
        ));
        assert_eq!(err.category(), "inclusion_failed");

        // Target 1 shares the failing leaf loop; every other subtree finished
        assert_eq!(books.balance(targets[1].address()), U256::ZERO);
        for target in &targets[2..] {
            assert_eq!(books.balance(target.address()), value);
        }
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected() {
        let books = Arc::new(Books::default());
        let targets = targets(2, 700);
        let source = Arc::new(Account::from_seed(0, 4, test_chain()));

        let distributor = Distributor::new(ledger_transfer(Arc::clone(&books), U256::ZERO, None));
        assert!(matches!(
            distributor.distribute(Arc::clone(&source), &targets, U256::ZERO).await,
            Err(DistributionError::ZeroValue)
        ));

        let distributor = distributor.with_branching_factor(1);
        assert!(matches!(
            distributor.distribute(source, &targets, U256::from(1)).await,
            Err(DistributionError::InvalidBranchingFactor(1))
        ));
        assert_eq!(books.transfers.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_required_funding_reports_overflow() {
        let half = U256::MAX / U256::from(2) + U256::from(1);
        assert!(matches!(
            required_funding(2, half, U256::ZERO, 4),
            Err(DistributionError::FundingOverflow { targets: 2 })
        ));
        assert!(matches!(
            required_funding(1, U256::MAX, U256::from(1), 4),
            Err(DistributionError::FundingOverflow { targets: 1 })
        ));
        assert_eq!(required_funding(1, U256::MAX, U256::ZERO, 4).unwrap(), U256::MAX);
    }

    #[tokio::test]
    async fn test_overflowing_distribution_sends_nothing() {
        let books = Arc::new(Books::default());
        let targets = targets(9, 600);
        let source = Arc::new(Account::from_seed(0, 6, test_chain()));
        let distributor = Distributor::new(ledger_transfer(Arc::clone(&books), U256::ZERO, None));

        let err = distributor
            .distribute(source, &targets, U256::MAX / U256::from(4))
            .await
            .unwrap_err();
        assert!(matches!(err, DistributionError::FundingOverflow { targets: 9 }));
        assert_eq!(err.category(), "funding_overflow");
        assert_eq!(books.transfers.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_empty_target_list_is_a_no_op() {
        let books = Arc::new(Books::default());
        let distributor = Distributor::new(ledger_transfer(Arc::clone(&books), U256::ZERO, None));
        let source = Arc::new(Account::from_seed(0, 5, test_chain()));

        let report = distributor.distribute(source, &[], U256::from(1)).await.unwrap();
        assert_eq!(report.total_transfers(), 0);
    }
}
