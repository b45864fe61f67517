use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConversionId, OrderId, TransactionId, UserId};

/// Record linking the two legs written by one referral conversion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralConversion {
    pub id: ConversionId,
    pub referrer_id: UserId,
    pub referee_id: UserId,
    pub order_id: OrderId,
    pub amount: i64,
    pub virtual_debit_txn_id: TransactionId,
    pub actual_credit_txn_id: TransactionId,
    pub created_at: DateTime<Utc>,
}
