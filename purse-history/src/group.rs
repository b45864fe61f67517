use std::collections::HashSet;

use chrono::{DateTime, Utc};
use purse_core::{Transaction, TransactionId, TransactionKind, WalletType};
use serde::Serialize;

/// Maximum distance, exclusive, between the two legs of a referral conversion.
pub const DEFAULT_CONVERSION_WINDOW_MS: i64 = 60_000;

/// One display row of a user's history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "group", rename_all = "snake_case")]
pub enum HistoryGroup {
    Single {
        transaction: Transaction,
    },
    /// The virtual debit and actual credit written by one referral conversion, stamped
    /// with the newer leg.
    Conversion {
        debit: Transaction,
        credit: Transaction,
        timestamp: DateTime<Utc>,
    },
}

impl HistoryGroup {
    /// Representative time used for ordering and date bucketing.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            HistoryGroup::Single { transaction } => transaction.timestamp,
            HistoryGroup::Conversion { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_conversion(&self) -> bool {
        matches!(self, HistoryGroup::Conversion { .. })
    }

    pub fn transactions(&self) -> Vec<&Transaction> {
        match self {
            HistoryGroup::Single { transaction } => vec![transaction],
            HistoryGroup::Conversion { debit, credit, .. } => vec![debit, credit],
        }
    }

    /// True when any row of the group touches `wallet`.
    pub fn touches_wallet(&self, wallet: WalletType) -> bool {
        self.transactions()
            .iter()
            .any(|txn| txn.wallet_type == wallet)
    }
}

/// Stateless engine pairing conversion legs by order id, kind, and time proximity.
#[derive(Clone, Copy, Debug)]
pub struct ConversionGrouper {
    window_ms: i64,
}

impl Default for ConversionGrouper {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERSION_WINDOW_MS)
    }
}

impl ConversionGrouper {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms: window_ms.max(0),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Group `transactions`, newest first.
    ///
    /// Input order does not matter: rows are sorted by `(timestamp DESC, id)` before the
    /// scan, and each row lands in exactly one group.
    pub fn group(&self, transactions: &[Transaction]) -> Vec<HistoryGroup> {
        let mut ordered: Vec<&Transaction> = transactions.iter().collect();
        ordered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.id.cmp(&b.id)));

        let mut processed: HashSet<TransactionId> = HashSet::with_capacity(ordered.len());
        let mut groups = Vec::with_capacity(ordered.len());
        for txn in ordered.iter().copied() {
            if processed.contains(&txn.id) {
                continue;
            }
            let partner_kind = match txn.kind {
                TransactionKind::Adjustment => Some(TransactionKind::ReferralReward),
                TransactionKind::ReferralReward => Some(TransactionKind::Adjustment),
                _ => None,
            };
            let partner = partner_kind
                .and_then(|kind| self.find_partner(txn, kind, &ordered, &processed));

            processed.insert(txn.id);
            match partner {
                Some(partner) => {
                    processed.insert(partner.id);
                    let (debit, credit) = if txn.kind == TransactionKind::Adjustment {
                        (txn, partner)
                    } else {
                        (partner, txn)
                    };
                    groups.push(HistoryGroup::Conversion {
                        debit: debit.clone(),
                        credit: credit.clone(),
                        timestamp: txn.timestamp,
                    });
                }
                None => groups.push(HistoryGroup::Single {
                    transaction: txn.clone(),
                }),
            }
        }
        groups
    }

    /// Closest unprocessed row of `kind` sharing the order id, ties broken by id.
    fn find_partner<'a>(
        &self,
        txn: &Transaction,
        kind: TransactionKind,
        candidates: &[&'a Transaction],
        processed: &HashSet<TransactionId>,
    ) -> Option<&'a Transaction> {
        let order_id = txn.order_id.as_deref()?;
        candidates
            .iter()
            .copied()
            .filter(|other| {
                other.id != txn.id
                    && other.kind == kind
                    && other.order_id.as_deref() == Some(order_id)
                    && !processed.contains(&other.id)
            })
            .map(|other| {
                let gap = (other.timestamp_millis() - txn.timestamp_millis()).abs();
                (gap, other)
            })
            .filter(|(gap, _)| *gap < self.window_ms)
            .min_by(|(gap_a, a), (gap_b, b)| gap_a.cmp(gap_b).then(a.id.cmp(&b.id)))
            .map(|(_, other)| other)
    }
}

/// Group with the default sixty second window.
pub fn group_transactions(transactions: &[Transaction]) -> Vec<HistoryGroup> {
    ConversionGrouper::default().group(transactions)
}
