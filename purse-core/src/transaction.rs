use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ConversionId, Direction, OrderId, TransactionId, TransactionKind, UserId, WalletType};

/// Immutable ledger row describing a single balance movement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Store-assigned insertion order, used to break timestamp ties during replay.
    pub sequence: u64,
    pub user_id: UserId,
    pub wallet_type: WalletType,
    pub direction: Direction,
    pub kind: TransactionKind,
    /// Positive magnitude; the sign lives in `direction`.
    pub amount: i64,
    pub order_id: Option<OrderId>,
    pub referee_user_id: Option<UserId>,
    pub conversion_id: Option<ConversionId>,
    pub description: String,
    pub balance_after: i64,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Creates a row with a fresh id and a zero sequence number.
    pub fn new(
        user_id: impl Into<UserId>,
        wallet_type: WalletType,
        direction: Direction,
        kind: TransactionKind,
        amount: i64,
        balance_after: i64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            user_id: user_id.into(),
            wallet_type,
            direction,
            kind,
            amount,
            order_id: None,
            referee_user_id: None,
            conversion_id: None,
            description: String::new(),
            balance_after,
            timestamp,
        }
    }

    pub fn with_order(mut self, order_id: Option<OrderId>) -> Self {
        self.order_id = order_id;
        self
    }

    pub fn with_referee(mut self, referee_user_id: impl Into<UserId>) -> Self {
        self.referee_user_id = Some(referee_user_id.into());
        self
    }

    pub fn with_conversion(mut self, conversion_id: ConversionId) -> Self {
        self.conversion_id = Some(conversion_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Amount with the direction applied: credits positive, debits negative.
    pub fn signed_amount(&self) -> i64 {
        self.direction.signed(self.amount)
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    pub fn is_credit(&self) -> bool {
        self.direction == Direction::Credit
    }
}
