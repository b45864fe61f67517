use chrono::{DateTime, Datelike, TimeZone, Utc};
use purse_core::{Direction, Transaction, TransactionKind, WalletType};
use serde::{Deserialize, Serialize};

/// Per-month totals derived from raw (ungrouped) transactions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyStats {
    /// Cashback credited to the virtual wallet.
    pub virtual_income: i64,
    /// Referral rewards and refunds credited to the actual wallet.
    pub actual_income: i64,
    /// Order payments debited from the actual wallet.
    pub actual_spends: i64,
    /// Referral rewards credited to the actual wallet.
    pub conversions: i64,
}

impl MonthlyStats {
    fn record(&mut self, txn: &Transaction) {
        use Direction::*;
        use TransactionKind::*;
        use WalletType::*;

        match (txn.wallet_type, txn.direction, txn.kind) {
            (Virtual, Credit, Cashback) => {
                self.virtual_income = self.virtual_income.saturating_add(txn.amount);
            }
            (Actual, Credit, ReferralReward) => {
                self.actual_income = self.actual_income.saturating_add(txn.amount);
                self.conversions = self.conversions.saturating_add(txn.amount);
            }
            (Actual, Credit, Refund) => {
                self.actual_income = self.actual_income.saturating_add(txn.amount);
            }
            (Actual, Debit, OrderPayment) => {
                self.actual_spends = self.actual_spends.saturating_add(txn.amount);
            }
            _ => {}
        }
    }
}

/// Totals for the calendar month containing `at`, evaluated in `at`'s time zone.
pub fn monthly_stats_at<Tz: TimeZone>(transactions: &[Transaction], at: &DateTime<Tz>) -> MonthlyStats {
    let zone = at.timezone();
    let (year, month) = (at.year(), at.month());
    let mut stats = MonthlyStats::default();
    for txn in transactions {
        let local = txn.timestamp.with_timezone(&zone);
        if local.year() == year && local.month() == month {
            stats.record(txn);
        }
    }
    stats
}

/// Totals for the current UTC month.
pub fn monthly_stats(transactions: &[Transaction]) -> MonthlyStats {
    monthly_stats_at(transactions, &Utc::now())
}
