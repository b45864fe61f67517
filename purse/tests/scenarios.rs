use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use purse::checkout::{place_order, CheckoutError, OrderRepository, OrderRequest, OrderStoreError};
use purse::{
    Direction, FlowFilter, HistoryGroup, LedgerError, MonthlyStats, PurseConfig, TransactionKind,
    TransactionQuery, WalletFilter, WalletService, WalletType,
};
use tempfile::TempDir;

fn sqlite_service() -> Result<(TempDir, WalletService)> {
    let dir = tempfile::tempdir()?;
    let mut config = PurseConfig::default();
    config.ledger.path = dir.path().join("ledger.db");
    let service = WalletService::from_config(&config)?;
    Ok((dir, service))
}

fn seed(service: &WalletService, user: &str, wallet: WalletType, amount: i64) -> Result<()> {
    service.adjust(user, wallet, Direction::Credit, amount, None, "opening balance")?;
    Ok(())
}

#[derive(Default)]
struct InMemoryOrders {
    orders: Mutex<BTreeSet<String>>,
    fail_delete: bool,
}

impl OrderRepository for InMemoryOrders {
    fn insert_order(&self, order: &OrderRequest) -> Result<(), OrderStoreError> {
        if !self.orders.lock().insert(order.order_id.clone()) {
            return Err(OrderStoreError(format!("duplicate order {}", order.order_id)));
        }
        Ok(())
    }

    fn delete_order(&self, order_id: &str) -> Result<(), OrderStoreError> {
        if self.fail_delete {
            return Err(OrderStoreError("order store unavailable".into()));
        }
        self.orders.lock().remove(order_id);
        Ok(())
    }
}

#[test]
fn cashback_credits_virtual_wallet() -> Result<()> {
    let (_dir, service) = sqlite_service()?;
    service.open_account("u")?;

    let posting = service.credit_cashback("u", 50, "O1")?;

    assert_eq!(service.balance("u")?.virtual_balance, 50);
    let [txn] = posting.transactions.as_slice() else {
        panic!("expected one row");
    };
    assert_eq!(txn.wallet_type, WalletType::Virtual);
    assert_eq!(txn.direction, Direction::Credit);
    assert_eq!(txn.kind, TransactionKind::Cashback);
    assert_eq!(txn.amount, 50);
    assert_eq!(txn.balance_after, 50);
    assert_eq!(txn.order_id.as_deref(), Some("O1"));
    Ok(())
}

#[test]
fn redemption_beyond_balance_changes_nothing() -> Result<()> {
    let (_dir, service) = sqlite_service()?;
    service.open_account("u")?;
    seed(&service, "u", WalletType::Actual, 100)?;

    let posting = service.redeem_actual("u", 40, "O2")?;
    assert_eq!(posting.balances().actual_balance, 60);
    assert_eq!(posting.transactions[0].balance_after, 60);

    let before = service.list_transactions("u", TransactionQuery::default())?;
    let err = service.redeem_actual("u", 200, "O2b").unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientBalance {
            requested: 200,
            available: 60,
            ..
        }
    ));
    assert_eq!(service.balance("u")?.actual_balance, 60);
    assert_eq!(
        service.list_transactions("u", TransactionQuery::default())?,
        before
    );
    Ok(())
}

#[test]
fn referral_conversion_moves_value_atomically() -> Result<()> {
    let (_dir, service) = sqlite_service()?;
    service.open_account("R")?;
    seed(&service, "R", WalletType::Virtual, 80)?;
    seed(&service, "R", WalletType::Actual, 20)?;

    let posting = service.convert_referral("R", "E", "O3", 30)?;

    let balances = service.balance("R")?;
    assert_eq!((balances.virtual_balance, balances.actual_balance), (50, 50));
    let [debit, credit] = posting.transactions.as_slice() else {
        panic!("expected two legs");
    };
    assert_eq!(debit.kind, TransactionKind::Adjustment);
    assert_eq!(debit.balance_after, 50);
    assert_eq!(credit.kind, TransactionKind::ReferralReward);
    assert_eq!(credit.balance_after, 50);

    let conversions = service.conversions("R")?;
    assert_eq!(conversions.len(), 1);
    assert_eq!(conversions[0].virtual_debit_txn_id, debit.id);
    assert_eq!(conversions[0].actual_credit_txn_id, credit.id);
    assert_eq!(conversions[0].referee_id, "E");

    let groups = purse::group_transactions(&posting.transactions);
    assert_eq!(groups.len(), 1);
    assert!(matches!(&groups[0], HistoryGroup::Conversion { debit: d, credit: c, .. }
        if d.id == debit.id && c.id == credit.id));

    let history = service.grouped_history("R", WalletFilter::Actual, FlowFilter::Conversions)?;
    assert_eq!(history.len(), 1);
    assert!(service.verify_account("R")?.is_clean());
    Ok(())
}

#[test]
fn failed_redemption_deletes_the_order() -> Result<()> {
    let (_dir, service) = sqlite_service()?;
    service.open_account("u")?;
    seed(&service, "u", WalletType::Actual, 30)?;
    let rows_before = service.list_transactions("u", TransactionQuery::default())?.len();
    let orders = InMemoryOrders::default();

    let err = place_order(
        &orders,
        &service,
        &OrderRequest {
            order_id: "O4".into(),
            user_id: "u".into(),
            total: 100,
            wallet_used: 50,
        },
    )
    .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Redemption {
            source: LedgerError::InsufficientBalance { .. },
            ..
        }
    ));
    assert!(orders.orders.lock().is_empty());
    assert_eq!(
        service.list_transactions("u", TransactionQuery::default())?.len(),
        rows_before
    );
    assert_eq!(service.balance("u")?.actual_balance, 30);
    Ok(())
}

#[test]
fn successful_checkout_keeps_the_order() -> Result<()> {
    let (_dir, service) = sqlite_service()?;
    service.open_account("u")?;
    seed(&service, "u", WalletType::Actual, 80)?;
    let orders = InMemoryOrders::default();

    let receipt = place_order(
        &orders,
        &service,
        &OrderRequest {
            order_id: "O5".into(),
            user_id: "u".into(),
            total: 100,
            wallet_used: 50,
        },
    )?;

    let redemption = receipt.redemption.expect("wallet was used");
    assert_eq!(redemption.balances().actual_balance, 30);
    assert_eq!(redemption.transactions[0].kind, TransactionKind::OrderPayment);
    assert!(orders.orders.lock().contains("O5"));
    Ok(())
}

#[test]
fn failed_compensation_reports_both_errors() -> Result<()> {
    let service = WalletService::in_memory();
    service.open_account("u")?;
    let orders = InMemoryOrders {
        fail_delete: true,
        ..InMemoryOrders::default()
    };

    let err = place_order(
        &orders,
        &service,
        &OrderRequest {
            order_id: "O6".into(),
            user_id: "u".into(),
            total: 10,
            wallet_used: 10,
        },
    )
    .unwrap_err();

    match &err {
        CheckoutError::CompensationFailed {
            redemption,
            compensation,
            ..
        } => {
            assert!(matches!(redemption, LedgerError::InsufficientBalance { .. }));
            assert_eq!(compensation.0, "order store unavailable");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(orders.orders.lock().contains("O6"));
    Ok(())
}

#[test]
fn monthly_stats_cover_the_current_month() -> Result<()> {
    let (_dir, service) = sqlite_service()?;
    service.open_account("u")?;
    seed(&service, "u", WalletType::Actual, 100)?;
    service.credit_cashback("u", 50, "O1")?;
    service.redeem_actual("u", 40, "O2")?;
    assert!(service.redeem_actual("u", 200, "O2b").is_err());
    service.convert_referral("u", "E", "O3", 30)?;

    let stats = service.monthly_stats_at("u", Utc::now())?;
    assert_eq!(
        stats,
        MonthlyStats {
            virtual_income: 50,
            actual_income: 30,
            actual_spends: 40,
            conversions: 30,
        }
    );
    Ok(())
}

#[test]
fn history_filters_and_buckets() -> Result<()> {
    let service = WalletService::in_memory();
    service.open_account("u")?;
    service.credit_cashback("u", 50, "O1")?;
    seed(&service, "u", WalletType::Actual, 100)?;
    service.redeem_actual("u", 40, "O2")?;
    service.convert_referral("u", "E", "O3", 30)?;

    let all = service.grouped_history("u", WalletFilter::All, FlowFilter::All)?;
    assert_eq!(all.len(), 4);
    let spends = service.grouped_history("u", WalletFilter::Actual, FlowFilter::Spends)?;
    assert_eq!(spends.len(), 1);
    let income = service.grouped_history("u", WalletFilter::Virtual, FlowFilter::Income)?;
    assert_eq!(income.len(), 1);

    let buckets = service.dated_history("u", WalletFilter::All, FlowFilter::All, &Utc)?;
    let grouped: usize = buckets.iter().map(|bucket| bucket.groups.len()).sum();
    assert_eq!(grouped, 4);
    assert!(buckets.windows(2).all(|pair| pair[0].date > pair[1].date));
    Ok(())
}

#[test]
fn verify_on_read_freezes_tampered_accounts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = PurseConfig::default();
    config.ledger.path = dir.path().join("ledger.db");
    assert!(config.service.verify_on_read);
    let service = WalletService::from_config(&config)?;
    service.open_account("u")?;
    service.credit_cashback("u", 25, "O1")?;
    assert_eq!(service.balance("u")?.virtual_balance, 25);

    let conn = rusqlite::Connection::open(&config.ledger.path)?;
    conn.execute(
        "UPDATE accounts SET virtual_balance = 999 WHERE user_id = 'u'",
        [],
    )?;

    assert!(matches!(
        service.balance("u"),
        Err(LedgerError::InvariantViolation { .. })
    ));
    assert!(matches!(
        service.credit_cashback("u", 1, "O2"),
        Err(LedgerError::AccountFrozen { .. })
    ));
    Ok(())
}

#[test]
fn shared_service_serialises_concurrent_redemptions() -> Result<()> {
    let (_dir, service) = sqlite_service()?;
    service.open_account("u")?;
    seed(&service, "u", WalletType::Actual, 100)?;
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|idx| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || service.redeem_actual("u", 30, &format!("P{idx}")).is_ok())
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker panicked"))
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 3);
    assert_eq!(service.balance("u")?.actual_balance, 10);
    assert!(service.verify_ledger()?.is_clean());
    Ok(())
}

#[test]
fn balance_reads_during_writes_never_freeze() -> Result<()> {
    let (_dir, service) = sqlite_service()?;
    service.open_account("u")?;
    let service = Arc::new(service);

    let writer = {
        let service = Arc::clone(&service);
        std::thread::spawn(move || -> Result<()> {
            for idx in 0..150 {
                service.credit_cashback("u", 2, &format!("C{idx}"))?;
            }
            Ok(())
        })
    };
    let mut last = 0;
    while !writer.is_finished() {
        let seen = service.balance("u")?.virtual_balance;
        assert!(seen >= last);
        last = seen;
    }
    writer.join().expect("writer panicked")?;

    assert_eq!(service.balance("u")?.virtual_balance, 300);
    assert!(!service.account("u")?.is_frozen());
    Ok(())
}
