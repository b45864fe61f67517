use chrono::{DateTime, Utc};
use purse_core::{Direction, Transaction, TransactionKind, UserId, WalletType};

/// Filter describing which transactions to load from storage.
///
/// Results are newest first unless [`TransactionQuery::ascending`] is set. Ties on
/// timestamp are broken by insertion sequence in both directions.
#[derive(Clone, Debug, Default)]
pub struct TransactionQuery {
    pub user_id: Option<UserId>,
    pub wallet_type: Option<WalletType>,
    pub direction: Option<Direction>,
    pub kind: Option<TransactionKind>,
    pub order_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub ascending: bool,
}

impl TransactionQuery {
    pub fn for_user(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_wallet(mut self, wallet_type: WalletType) -> Self {
        self.wallet_type = Some(wallet_type);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    /// Inclusive on both ends.
    pub fn with_time_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Oldest first, the order used for replay.
    pub fn ascending(mut self) -> Self {
        self.ascending = true;
        self
    }

    /// In-process equivalent of the SQL predicate, ignoring ordering and limit.
    pub fn matches(&self, txn: &Transaction) -> bool {
        self.user_id.as_ref().map_or(true, |id| *id == txn.user_id)
            && self.wallet_type.map_or(true, |w| w == txn.wallet_type)
            && self.direction.map_or(true, |d| d == txn.direction)
            && self.kind.map_or(true, |k| k == txn.kind)
            && self
                .order_id
                .as_ref()
                .map_or(true, |id| txn.order_id.as_ref() == Some(id))
            && self.start_time.map_or(true, |start| txn.timestamp >= start)
            && self.end_time.map_or(true, |end| txn.timestamp <= end)
    }

    /// Sort and truncate an already filtered list the way storage would.
    pub fn arrange(&self, mut transactions: Vec<Transaction>) -> Vec<Transaction> {
        transactions.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.sequence.cmp(&b.sequence))
        });
        if !self.ascending {
            transactions.reverse();
        }
        if let Some(limit) = self.limit {
            transactions.truncate(limit);
        }
        transactions
    }
}
