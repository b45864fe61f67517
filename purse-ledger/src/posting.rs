use chrono::{DateTime, TimeZone, Utc};
use purse_core::{
    Account, Balances, Direction, ReferralConversion, Transaction, TransactionKind, WalletType,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{LedgerCommand, LedgerError, LedgerResult};

/// Everything one command wrote: the account after the command, the new rows, and the
/// conversion record when the command was a referral conversion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub account: Account,
    pub transactions: Vec<Transaction>,
    pub conversion: Option<ReferralConversion>,
}

impl Posting {
    pub fn balances(&self) -> Balances {
        self.account.balances
    }
}

/// Timestamp for the next row of an account.
///
/// Truncated to milliseconds (the storage resolution) and never earlier than the
/// account's latest row, so timestamp order always matches application order.
pub fn posting_clock(now: DateTime<Utc>, latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = truncate_millis(now);
    match latest {
        Some(latest) if latest > now => latest,
        _ => now,
    }
}

pub(crate) fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts.timestamp_millis())
        .single()
        .unwrap_or(ts)
}

/// Compute the effect of `command` on `account` without touching storage.
///
/// Stores call this after locking the account and persist the result verbatim; a
/// rejected command therefore never reaches a write.
pub fn plan_posting(
    command: &LedgerCommand,
    account: &Account,
    at: DateTime<Utc>,
) -> LedgerResult<Posting> {
    command.validate()?;
    if account.user_id != command.user_id() {
        return Err(LedgerError::InvalidCommand(format!(
            "command for {} applied to account {}",
            command.user_id(),
            account.user_id
        )));
    }
    if let Some(reason) = &account.frozen_reason {
        return Err(LedgerError::AccountFrozen {
            user_id: account.user_id.clone(),
            reason: reason.clone(),
        });
    }

    let user_id = account.user_id.as_str();
    let mut balances = account.balances;
    let mut transactions = Vec::with_capacity(2);
    let mut conversion = None;

    match command {
        LedgerCommand::CreditCashback {
            amount, order_id, ..
        } => {
            let after = credit(&mut balances, WalletType::Virtual, *amount)?;
            transactions.push(
                Transaction::new(
                    user_id,
                    WalletType::Virtual,
                    Direction::Credit,
                    TransactionKind::Cashback,
                    *amount,
                    after,
                    at,
                )
                .with_order(Some(order_id.clone()))
                .with_description(format!("Cashback for order {order_id}")),
            );
        }
        LedgerCommand::RedeemActual {
            amount, order_id, ..
        } => {
            let after = debit(&mut balances, WalletType::Actual, *amount)?;
            transactions.push(
                Transaction::new(
                    user_id,
                    WalletType::Actual,
                    Direction::Debit,
                    TransactionKind::OrderPayment,
                    *amount,
                    after,
                    at,
                )
                .with_order(Some(order_id.clone()))
                .with_description(format!("Payment for order {order_id}")),
            );
        }
        LedgerCommand::ConvertReferral {
            referee_id,
            order_id,
            amount,
            ..
        } => {
            let virtual_after = debit(&mut balances, WalletType::Virtual, *amount)?;
            let actual_after = credit(&mut balances, WalletType::Actual, *amount)?;
            let conversion_id = Uuid::new_v4();
            let debit_leg = Transaction::new(
                user_id,
                WalletType::Virtual,
                Direction::Debit,
                TransactionKind::Adjustment,
                *amount,
                virtual_after,
                at,
            )
            .with_order(Some(order_id.clone()))
            .with_referee(referee_id.clone())
            .with_conversion(conversion_id)
            .with_description(format!(
                "Converted to spendable balance for referral order {order_id}"
            ));
            let credit_leg = Transaction::new(
                user_id,
                WalletType::Actual,
                Direction::Credit,
                TransactionKind::ReferralReward,
                *amount,
                actual_after,
                at,
            )
            .with_order(Some(order_id.clone()))
            .with_referee(referee_id.clone())
            .with_conversion(conversion_id)
            .with_description(format!(
                "Referral reward from {referee_id} for order {order_id}"
            ));
            conversion = Some(ReferralConversion {
                id: conversion_id,
                referrer_id: user_id.to_string(),
                referee_id: referee_id.clone(),
                order_id: order_id.clone(),
                amount: *amount,
                virtual_debit_txn_id: debit_leg.id,
                actual_credit_txn_id: credit_leg.id,
                created_at: at,
            });
            transactions.push(debit_leg);
            transactions.push(credit_leg);
        }
        LedgerCommand::RefundActual {
            amount, order_id, ..
        } => {
            let after = credit(&mut balances, WalletType::Actual, *amount)?;
            transactions.push(
                Transaction::new(
                    user_id,
                    WalletType::Actual,
                    Direction::Credit,
                    TransactionKind::Refund,
                    *amount,
                    after,
                    at,
                )
                .with_order(Some(order_id.clone()))
                .with_description(format!("Refund for order {order_id}")),
            );
        }
        LedgerCommand::Adjust {
            wallet_type,
            direction,
            amount,
            order_id,
            description,
            ..
        } => {
            let after = match direction {
                Direction::Credit => credit(&mut balances, *wallet_type, *amount)?,
                Direction::Debit => debit(&mut balances, *wallet_type, *amount)?,
            };
            transactions.push(
                Transaction::new(
                    user_id,
                    *wallet_type,
                    *direction,
                    TransactionKind::Adjustment,
                    *amount,
                    after,
                    at,
                )
                .with_order(order_id.clone())
                .with_description(description.clone()),
            );
        }
    }

    let mut account = account.clone();
    account.balances = balances;
    Ok(Posting {
        account,
        transactions,
        conversion,
    })
}

fn credit(balances: &mut Balances, wallet: WalletType, amount: i64) -> LedgerResult<i64> {
    let next = balances.get(wallet).checked_add(amount).ok_or_else(|| {
        LedgerError::InvalidAmount(format!("crediting {amount} overflows the {wallet} balance"))
    })?;
    balances.set(wallet, next);
    Ok(next)
}

fn debit(balances: &mut Balances, wallet: WalletType, amount: i64) -> LedgerResult<i64> {
    let available = balances.get(wallet);
    if amount > available {
        return Err(LedgerError::InsufficientBalance {
            wallet,
            requested: amount,
            available,
        });
    }
    let next = available - amount;
    balances.set(wallet, next);
    Ok(next)
}
