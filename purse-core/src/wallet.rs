use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two balances every account carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletType {
    /// Non-spendable value that only becomes spendable through a referral conversion.
    Virtual,
    /// Spendable value usable at checkout.
    Actual,
}

impl WalletType {
    pub const ALL: [WalletType; 2] = [WalletType::Virtual, WalletType::Actual];

    pub fn as_str(self) -> &'static str {
        match self {
            WalletType::Virtual => "virtual",
            WalletType::Actual => "actual",
        }
    }
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "virtual" => Ok(WalletType::Virtual),
            "actual" => Ok(WalletType::Actual),
            other => Err(format!("unknown wallet type: {other}")),
        }
    }
}

/// Whether a transaction adds to or removes from its wallet.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }

    /// Signed amount: credits positive, debits negative.
    pub fn signed(self, amount: i64) -> i64 {
        match self {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Direction::Credit),
            "debit" => Ok(Direction::Debit),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Business reason attached to every ledger row.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Cashback,
    ReferralReward,
    Refund,
    OrderPayment,
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Cashback => "cashback",
            TransactionKind::ReferralReward => "referral_reward",
            TransactionKind::Refund => "refund",
            TransactionKind::OrderPayment => "order_payment",
            TransactionKind::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cashback" => Ok(TransactionKind::Cashback),
            "referral_reward" => Ok(TransactionKind::ReferralReward),
            "refund" => Ok(TransactionKind::Refund),
            "order_payment" => Ok(TransactionKind::OrderPayment),
            "adjustment" => Ok(TransactionKind::Adjustment),
            other => Err(format!("unknown transaction kind: {other}")),
        }
    }
}
