use purse_core::{Direction, OrderId, UserId, WalletType};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, LedgerResult};

/// Balance-affecting operations. Executing one is the only way to change an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerCommand {
    /// Credit the virtual wallet for the user's own completed order.
    CreditCashback {
        user_id: UserId,
        amount: i64,
        order_id: OrderId,
    },
    /// Pay for an order from the actual wallet.
    RedeemActual {
        user_id: UserId,
        amount: i64,
        order_id: OrderId,
    },
    /// Move value from the referrer's virtual wallet to their actual wallet.
    ConvertReferral {
        referrer_id: UserId,
        referee_id: UserId,
        order_id: OrderId,
        amount: i64,
    },
    /// Return value to the actual wallet.
    RefundActual {
        user_id: UserId,
        amount: i64,
        order_id: OrderId,
    },
    /// Manual correction on either wallet.
    Adjust {
        user_id: UserId,
        wallet_type: WalletType,
        direction: Direction,
        amount: i64,
        order_id: Option<OrderId>,
        description: String,
    },
}

impl LedgerCommand {
    /// The account the command mutates.
    pub fn user_id(&self) -> &str {
        match self {
            LedgerCommand::CreditCashback { user_id, .. }
            | LedgerCommand::RedeemActual { user_id, .. }
            | LedgerCommand::RefundActual { user_id, .. }
            | LedgerCommand::Adjust { user_id, .. } => user_id,
            LedgerCommand::ConvertReferral { referrer_id, .. } => referrer_id,
        }
    }

    pub fn amount(&self) -> i64 {
        match self {
            LedgerCommand::CreditCashback { amount, .. }
            | LedgerCommand::RedeemActual { amount, .. }
            | LedgerCommand::ConvertReferral { amount, .. }
            | LedgerCommand::RefundActual { amount, .. }
            | LedgerCommand::Adjust { amount, .. } => *amount,
        }
    }

    pub fn order_id(&self) -> Option<&str> {
        match self {
            LedgerCommand::CreditCashback { order_id, .. }
            | LedgerCommand::RedeemActual { order_id, .. }
            | LedgerCommand::ConvertReferral { order_id, .. }
            | LedgerCommand::RefundActual { order_id, .. } => Some(order_id),
            LedgerCommand::Adjust { order_id, .. } => order_id.as_deref(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LedgerCommand::CreditCashback { .. } => "credit_cashback",
            LedgerCommand::RedeemActual { .. } => "redeem_actual",
            LedgerCommand::ConvertReferral { .. } => "convert_referral",
            LedgerCommand::RefundActual { .. } => "refund_actual",
            LedgerCommand::Adjust { .. } => "adjust",
        }
    }

    /// Stateless checks performed before the account is read.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.user_id().trim().is_empty() {
            return Err(LedgerError::InvalidCommand("user id is empty".into()));
        }
        let amount = self.amount();
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "amount must be positive, got {amount}"
            )));
        }
        if let Some(order_id) = self.order_id() {
            if order_id.trim().is_empty() {
                return Err(LedgerError::InvalidCommand("order id is empty".into()));
            }
        }
        match self {
            LedgerCommand::ConvertReferral {
                referrer_id,
                referee_id,
                ..
            } => {
                if referee_id.trim().is_empty() {
                    return Err(LedgerError::InvalidCommand("referee id is empty".into()));
                }
                if referee_id == referrer_id {
                    return Err(LedgerError::InvalidCommand(format!(
                        "user {referrer_id} cannot refer themselves"
                    )));
                }
            }
            LedgerCommand::Adjust { description, .. } if description.trim().is_empty() => {
                return Err(LedgerError::InvalidCommand(
                    "adjustments require a description".into(),
                ));
            }
            _ => {}
        }
        Ok(())
    }
}
