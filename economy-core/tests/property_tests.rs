//! Property-based tests for economy invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conservation: Σ(balances) == Σ(purchases in) − Σ(withdrawals out)
//! - No double spend: conflicting debits never both commit
//! - Derived balance: recomputation always reproduces the same value
//! - Additive reversal: history survives, effect inverts exactly once
//! - Idempotency: duplicate external events apply exactly once

use economy_core::{
    Config, EconomyLedger, EntryStatus, Error, OpContext, UserId,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

const USERS: [&str; 3] = ["alice", "bob", "carol"];

fn dec(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// One randomly generated economic operation
#[derive(Debug, Clone)]
enum Op {
    Purchase { user: usize, cents: i64 },
    Transfer { from: usize, to: usize, cents: i64 },
    Marketplace { buyer: usize, seller: usize, cents: i64 },
}

fn cents_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3, cents_strategy()).prop_map(|(user, cents)| Op::Purchase { user, cents }),
        (0usize..3, 0usize..3, cents_strategy())
            .prop_map(|(from, to, cents)| Op::Transfer { from, to, cents }),
        (0usize..3, 0usize..3, cents_strategy())
            .prop_map(|(buyer, seller, cents)| Op::Marketplace { buyer, seller, cents }),
    ]
}

async fn create_test_ledger() -> (EconomyLedger, tempfile::TempDir) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .try_init();

    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();

    (EconomyLedger::open(config).await.unwrap(), temp_dir)
}

/// Apply an op, ignoring validation rejections (they are part of the input
/// space: self-transfers and overdrafts must simply leave no trace)
async fn apply_op(economy: &EconomyLedger, op: &Op) {
    let ctx = OpContext::default();
    match op {
        Op::Purchase { user, cents } => {
            let _ = economy
                .execute_purchase(UserId::new(USERS[*user]), dec(*cents), ctx)
                .await;
        }
        Op::Transfer { from, to, cents } => {
            let _ = economy
                .execute_transfer(
                    UserId::new(USERS[*from]),
                    UserId::new(USERS[*to]),
                    dec(*cents),
                    ctx,
                )
                .await;
        }
        Op::Marketplace {
            buyer,
            seller,
            cents,
        } => {
            let _ = economy
                .execute_marketplace_purchase(
                    UserId::new(USERS[*buyer]),
                    UserId::new(USERS[*seller]),
                    dec(*cents),
                    "listing-prop",
                    ctx,
                )
                .await;
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(25))]

    /// Property: no sequence of operations creates or destroys money
    #[test]
    fn prop_conservation(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (economy, _temp) = create_test_ledger().await;

            for op in &ops {
                apply_op(&economy, op).await;
            }

            let report = economy.check_conservation().unwrap();
            prop_assert!(report.conserved, "conservation violated: {:?}", report);
            prop_assert_eq!(report.total_withdrawn, Decimal::ZERO);
            prop_assert_eq!(report.total_balances, report.total_purchased);

            // Validators must also have kept every balance non-negative
            for user in USERS {
                let summary = economy.get_balance(&UserId::new(user)).unwrap();
                prop_assert!(summary.balance >= Decimal::ZERO);
            }

            economy.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: transfer fee is 1.46 % rounded half-up to 2 decimals
    #[test]
    fn prop_transfer_fee_rounding(cents in 1i64..1_000_000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (economy, _temp) = create_test_ledger().await;
            let ctx = OpContext::default();

            economy
                .execute_purchase(UserId::new("alice"), dec(cents), ctx.clone())
                .await
                .unwrap();
            let receipt = economy
                .execute_transfer(UserId::new("alice"), UserId::new("bob"), dec(cents), ctx)
                .await
                .unwrap();

            // Independent integer oracle: fee_cents = cents * 0.0146, half-up
            let numerator = cents * 146;
            let expected_fee_cents = numerator / 10_000 + i64::from(numerator % 10_000 >= 5_000);
            prop_assert_eq!(receipt.fee, dec(expected_fee_cents));
            prop_assert_eq!(receipt.net, dec(cents - expected_fee_cents));

            economy.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: balance is purely derived — recomputing reproduces it
    #[test]
    fn prop_balance_rederivation(ops in prop::collection::vec(op_strategy(), 1..20)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (economy, _temp) = create_test_ledger().await;

            for op in &ops {
                apply_op(&economy, op).await;
            }

            for user in USERS {
                let user = UserId::new(user);
                let first = economy.get_balance(&user).unwrap();
                let second = economy.get_balance(&user).unwrap();
                prop_assert_eq!(first, second);

                // The components always reconcile
                prop_assert_eq!(first.balance, first.total_credits - first.total_debits);
            }

            economy.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: reversal inverts exactly the original entry's effect
    #[test]
    fn prop_reversal_inverse(funding in 2i64..1_000_000, spend_ratio in 1u32..100) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (economy, _temp) = create_test_ledger().await;
            let ctx = OpContext::default();
            let alice = UserId::new("alice");
            let bob = UserId::new("bob");
            let platform = UserId::new("platform");

            economy
                .execute_purchase(alice.clone(), dec(funding), ctx.clone())
                .await
                .unwrap();

            let spend = std::cmp::max(1, funding * i64::from(spend_ratio) / 100);
            let before_alice = economy.get_balance(&alice).unwrap();
            let before_bob = economy.get_balance(&bob).unwrap();
            let before_platform = economy.get_balance(&platform).unwrap();

            let receipt = economy
                .execute_transfer(alice.clone(), bob.clone(), dec(spend), ctx.clone())
                .await
                .unwrap();
            let main_id = receipt.entries[0].id;

            economy
                .execute_reversal(main_id, "property check", ctx)
                .await
                .unwrap();

            // Balances return exactly to their pre-transfer values
            prop_assert_eq!(economy.get_balance(&alice).unwrap(), before_alice);
            prop_assert_eq!(economy.get_balance(&bob).unwrap(), before_bob);
            prop_assert_eq!(economy.get_balance(&platform).unwrap(), before_platform);

            // The original row survives, flipped
            let original = economy.get_entry(main_id).unwrap();
            prop_assert_eq!(original.status, EntryStatus::Reversed);
            prop_assert_eq!(original.amount, dec(spend));

            let report = economy.check_conservation().unwrap();
            prop_assert!(report.conserved);

            economy.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: an external event id applies exactly once
    #[test]
    fn prop_idempotent_events(cents in 1i64..1_000_000, replays in 1usize..4) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (economy, _temp) = create_test_ledger().await;
            let payload = serde_json::json!({
                "user_id": "alice",
                "amount": dec(cents).to_string(),
            });

            let first = economy
                .apply_external_event("evt_prop", "payment.confirmed", payload.clone(), OpContext::default())
                .await
                .unwrap();
            prop_assert!(first.applied);

            for _ in 0..replays {
                let replay = economy
                    .apply_external_event("evt_prop", "payment.confirmed", payload.clone(), OpContext::default())
                    .await
                    .unwrap();
                prop_assert!(!replay.applied);
                prop_assert_eq!(&replay.entry_ids, &first.entry_ids);
            }

            let summary = economy.get_balance(&UserId::new("alice")).unwrap();
            prop_assert_eq!(summary.balance, dec(cents));

            economy.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}

mod integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_transfer_then_overdrawn_withdrawal_scenario() {
        let (economy, _temp) = create_test_ledger().await;
        let ctx = OpContext::default();
        let a = UserId::new("user-a");
        let b = UserId::new("user-b");

        // A purchases 100 tokens
        economy
            .execute_purchase(a.clone(), dec(10000), ctx.clone())
            .await
            .unwrap();
        assert_eq!(economy.get_balance(&a).unwrap().balance, dec(10000));

        // A transfers 100 to B: fee 1.46, net 98.54
        let receipt = economy
            .execute_transfer(a.clone(), b.clone(), dec(10000), ctx.clone())
            .await
            .unwrap();
        assert_eq!(receipt.fee, dec(146));
        assert_eq!(receipt.net, dec(9854));
        assert_eq!(economy.get_balance(&a).unwrap().balance, Decimal::ZERO);
        assert_eq!(economy.get_balance(&b).unwrap().balance, dec(9854));
        assert_eq!(
            economy.get_balance(&UserId::new("platform")).unwrap().balance,
            dec(146)
        );

        // A requests a withdrawal of 50 with balance 0
        let err = economy
            .request_withdrawal(a, dec(5000), ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientAvailableBalance { .. }));

        economy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_marketplace_purchase_scenario() {
        let (economy, _temp) = create_test_ledger().await;
        let ctx = OpContext::default();
        let buyer = UserId::new("buyer");
        let seller = UserId::new("seller");

        economy
            .execute_purchase(buyer.clone(), dec(50000), ctx.clone())
            .await
            .unwrap();
        let receipt = economy
            .execute_marketplace_purchase(buyer.clone(), seller.clone(), dec(10000), "listing-7", ctx)
            .await
            .unwrap();

        assert_eq!(receipt.fee, dec(500));
        assert_eq!(receipt.net, dec(9500));
        assert_eq!(economy.get_balance(&seller).unwrap().balance, dec(9500));
        assert_eq!(economy.get_balance(&buyer).unwrap().balance, dec(40000));

        economy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_double_spend_under_concurrency() {
        let (economy, _temp) = create_test_ledger().await;
        let economy = Arc::new(economy);
        let ctx = OpContext::default();
        let alice = UserId::new("alice");

        economy
            .execute_purchase(alice.clone(), dec(10000), ctx)
            .await
            .unwrap();

        // Ten concurrent transfers of 30.00 against a 100.00 balance: at
        // most three can commit
        let mut handles = Vec::new();
        for i in 0..10 {
            let economy = economy.clone();
            let alice = alice.clone();
            handles.push(tokio::spawn(async move {
                economy
                    .execute_transfer(
                        alice,
                        UserId::new(format!("rcpt-{}", i)),
                        dec(3000),
                        OpContext::default(),
                    )
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 3, "only three 30.00 debits fit in 100.00");
        let remaining = economy.get_balance(&alice).unwrap().balance;
        assert_eq!(remaining, dec(1000));
        assert!(economy.check_conservation().unwrap().conserved);

        // Dropping the last handle closes the actor mailbox
        drop(economy);
    }

    #[tokio::test]
    async fn test_withdrawal_lifecycle_conserves() {
        let (economy, _temp) = create_test_ledger().await;
        let ctx = OpContext::default();
        let alice = UserId::new("alice");
        let reviewer = UserId::new("reviewer-1");

        economy
            .execute_purchase(alice.clone(), dec(20000), ctx.clone())
            .await
            .unwrap();

        let w = economy
            .request_withdrawal(alice.clone(), dec(12000), ctx.clone())
            .await
            .unwrap();
        let w = economy
            .approve_withdrawal(w.id, reviewer, ctx.clone())
            .await
            .unwrap();
        let w = economy.process_withdrawal(w.id, ctx.clone()).await.unwrap();
        let w = economy.complete_withdrawal(w.id, ctx).await.unwrap();

        assert_eq!(economy.get_balance(&alice).unwrap().balance, dec(8000));
        assert_eq!(
            economy.get_entry(w.ledger_entry_id.unwrap()).unwrap().amount,
            dec(12000)
        );

        let report = economy.check_conservation().unwrap();
        assert!(report.conserved);
        assert_eq!(report.total_purchased, dec(20000));
        assert_eq!(report.total_withdrawn, dec(12000));
        assert_eq!(report.total_balances, dec(8000));

        economy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_withdrawal_releases_hold_symmetrically() {
        let (economy, _temp) = create_test_ledger().await;
        let ctx = OpContext::default();
        let alice = UserId::new("alice");

        economy
            .execute_purchase(alice.clone(), dec(10000), ctx.clone())
            .await
            .unwrap();

        // Cancel from pending
        let w1 = economy
            .request_withdrawal(alice.clone(), dec(9000), ctx.clone())
            .await
            .unwrap();
        economy
            .cancel_withdrawal(w1.id, alice.clone(), ctx.clone())
            .await
            .unwrap();

        // Cancel from approved
        let w2 = economy
            .request_withdrawal(alice.clone(), dec(9000), ctx.clone())
            .await
            .unwrap();
        let w2 = economy
            .approve_withdrawal(w2.id, UserId::new("reviewer-1"), ctx.clone())
            .await
            .unwrap();
        economy
            .cancel_withdrawal(w2.id, alice.clone(), ctx.clone())
            .await
            .unwrap();

        // Both holds released: the full balance is requestable again
        assert!(economy
            .request_withdrawal(alice.clone(), dec(10000), ctx)
            .await
            .is_ok());
        assert_eq!(economy.get_balance(&alice).unwrap().balance, dec(10000));

        economy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reversal_is_additive() {
        let (economy, _temp) = create_test_ledger().await;
        let ctx = OpContext::default();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        economy
            .execute_purchase(alice.clone(), dec(10000), ctx.clone())
            .await
            .unwrap();
        let receipt = economy
            .execute_transfer(alice.clone(), bob.clone(), dec(10000), ctx.clone())
            .await
            .unwrap();
        let main_id = receipt.entries[0].id;

        let rows_before = economy.user_entries(&alice).unwrap().len();
        economy
            .execute_reversal(main_id, "dispute upheld", ctx)
            .await
            .unwrap();
        let rows_after = economy.user_entries(&alice).unwrap().len();

        // History grew; nothing was deleted
        assert_eq!(rows_after, rows_before + 1);
        assert_eq!(
            economy.get_entry(main_id).unwrap().status,
            EntryStatus::Reversed
        );
        assert_eq!(economy.get_balance(&alice).unwrap().balance, dec(10000));
        assert_eq!(economy.get_balance(&bob).unwrap().balance, Decimal::ZERO);

        economy.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_chargeback_event_idempotent() {
        let (economy, _temp) = create_test_ledger().await;
        let ctx = OpContext::default();
        let alice = UserId::new("alice");

        let outcome = economy
            .apply_external_event(
                "evt_purchase",
                "payment.confirmed",
                serde_json::json!({ "user_id": "alice", "amount": "100.00" }),
                ctx.clone(),
            )
            .await
            .unwrap();
        let purchase_id = outcome.entry_ids[0];
        assert_eq!(economy.get_balance(&alice).unwrap().balance, dec(10000));

        let chargeback = serde_json::json!({ "entry_id": purchase_id.to_string() });
        let first = economy
            .apply_external_event("evt_cb", "payment.chargeback", chargeback.clone(), ctx.clone())
            .await
            .unwrap();
        assert!(first.applied);
        assert_eq!(economy.get_balance(&alice).unwrap().balance, Decimal::ZERO);

        // Replaying the same chargeback id is a no-op, not AlreadyReversed
        let replay = economy
            .apply_external_event("evt_cb", "payment.chargeback", chargeback, ctx)
            .await
            .unwrap();
        assert!(!replay.applied);
        assert_eq!(economy.get_balance(&alice).unwrap().balance, Decimal::ZERO);

        economy.shutdown().await.unwrap();
    }
}
