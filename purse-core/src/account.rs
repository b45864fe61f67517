use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{UserId, WalletType};

/// Snapshot of both balances for one user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub virtual_balance: i64,
    pub actual_balance: i64,
}

impl Balances {
    pub fn new(virtual_balance: i64, actual_balance: i64) -> Self {
        Self {
            virtual_balance,
            actual_balance,
        }
    }

    pub fn get(&self, wallet: WalletType) -> i64 {
        match wallet {
            WalletType::Virtual => self.virtual_balance,
            WalletType::Actual => self.actual_balance,
        }
    }

    pub fn set(&mut self, wallet: WalletType, value: i64) {
        match wallet {
            WalletType::Virtual => self.virtual_balance = value,
            WalletType::Actual => self.actual_balance = value,
        }
    }
}

/// Ledger account row. One per user, created with zero balances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub balances: Balances,
    /// Set when an integrity check failed; a frozen account accepts no writes.
    pub frozen_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            balances: Balances::default(),
            frozen_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn balance(&self, wallet: WalletType) -> i64 {
        self.balances.get(wallet)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen_reason.is_some()
    }
}
