use std::collections::{HashMap, HashSet};
use std::fmt;

use purse_core::{
    Account, Direction, ReferralConversion, Transaction, TransactionId, TransactionKind, UserId,
    WalletType,
};
use tracing::{error, info};

use crate::{AccountSnapshot, LedgerError, LedgerRepository, LedgerResult};

/// A single way in which stored state disagrees with the transaction log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Discrepancy {
    /// Replaying up to this row produced a different balance than the row recorded.
    BalanceAfter {
        txn_id: TransactionId,
        wallet: WalletType,
        replayed: i64,
        recorded: i64,
    },
    /// The running total dipped below zero.
    NegativeBalance {
        txn_id: TransactionId,
        wallet: WalletType,
        replayed: i64,
    },
    /// The replayed total does not match the account row.
    FinalBalance {
        wallet: WalletType,
        replayed: i64,
        stored: i64,
    },
    /// A conversion record whose legs are missing or inconsistent, or a leg with no record.
    Conversion {
        conversion_id: uuid::Uuid,
        detail: String,
    },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::BalanceAfter {
                txn_id,
                wallet,
                replayed,
                recorded,
            } => write!(
                f,
                "{wallet} row {txn_id} records balance {recorded}, replay gives {replayed}"
            ),
            Discrepancy::NegativeBalance {
                txn_id,
                wallet,
                replayed,
            } => write!(f, "{wallet} balance replays to {replayed} at row {txn_id}"),
            Discrepancy::FinalBalance {
                wallet,
                replayed,
                stored,
            } => write!(
                f,
                "{wallet} balance stored as {stored}, replay gives {replayed}"
            ),
            Discrepancy::Conversion {
                conversion_id,
                detail,
            } => write!(f, "conversion {conversion_id}: {detail}"),
        }
    }
}

/// Replay the rows of one wallet in `(timestamp, sequence)` order starting from zero.
///
/// Returns the final balance, or the first row that disagrees with the running total.
pub fn replay(transactions: &[Transaction], wallet: WalletType) -> Result<i64, Discrepancy> {
    let mut rows: Vec<&Transaction> = transactions
        .iter()
        .filter(|txn| txn.wallet_type == wallet)
        .collect();
    rows.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.sequence.cmp(&b.sequence))
    });

    let mut running: i64 = 0;
    for txn in rows {
        running = running.saturating_add(txn.signed_amount());
        if running < 0 {
            return Err(Discrepancy::NegativeBalance {
                txn_id: txn.id,
                wallet,
                replayed: running,
            });
        }
        if running != txn.balance_after {
            return Err(Discrepancy::BalanceAfter {
                txn_id: txn.id,
                wallet,
                replayed: running,
                recorded: txn.balance_after,
            });
        }
    }
    Ok(running)
}

/// Integrity findings for one account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountAudit {
    pub user_id: UserId,
    pub transactions: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl AccountAudit {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }

    pub fn summary(&self) -> String {
        self.discrepancies
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Check an account against its full transaction log and its conversion records.
pub fn audit_account(
    account: &Account,
    transactions: &[Transaction],
    conversions: &[ReferralConversion],
) -> AccountAudit {
    let mut discrepancies = Vec::new();
    for wallet in WalletType::ALL {
        match replay(transactions, wallet) {
            Ok(replayed) => {
                let stored = account.balance(wallet);
                if replayed != stored {
                    discrepancies.push(Discrepancy::FinalBalance {
                        wallet,
                        replayed,
                        stored,
                    });
                }
            }
            Err(found) => discrepancies.push(found),
        }
    }

    let by_id: HashMap<TransactionId, &Transaction> =
        transactions.iter().map(|txn| (txn.id, txn)).collect();
    for conversion in conversions {
        let debit = by_id.get(&conversion.virtual_debit_txn_id).copied();
        let credit = by_id.get(&conversion.actual_credit_txn_id).copied();
        if let Some(detail) = conversion_problem(conversion, debit, credit) {
            discrepancies.push(Discrepancy::Conversion {
                conversion_id: conversion.id,
                detail,
            });
        }
    }

    let recorded: HashSet<uuid::Uuid> = conversions.iter().map(|c| c.id).collect();
    for txn in transactions {
        if let Some(conversion_id) = txn.conversion_id {
            if !recorded.contains(&conversion_id) {
                discrepancies.push(Discrepancy::Conversion {
                    conversion_id,
                    detail: format!("leg {} has no conversion record", txn.id),
                });
            }
        }
    }

    AccountAudit {
        user_id: account.user_id.clone(),
        transactions: transactions.len(),
        discrepancies,
    }
}

fn conversion_problem(
    conversion: &ReferralConversion,
    debit: Option<&Transaction>,
    credit: Option<&Transaction>,
) -> Option<String> {
    let (debit, credit) = match (debit, credit) {
        (Some(debit), Some(credit)) => (debit, credit),
        (None, _) => return Some("virtual debit leg is missing".into()),
        (_, None) => return Some("actual credit leg is missing".into()),
    };
    let expected = [
        (debit, WalletType::Virtual, Direction::Debit, TransactionKind::Adjustment),
        (credit, WalletType::Actual, Direction::Credit, TransactionKind::ReferralReward),
    ];
    for (leg, wallet, direction, kind) in expected {
        if leg.conversion_id != Some(conversion.id) {
            return Some(format!("leg {} is not linked to this conversion", leg.id));
        }
        if leg.user_id != conversion.referrer_id {
            return Some(format!("leg {} belongs to {}", leg.id, leg.user_id));
        }
        if leg.amount != conversion.amount {
            return Some(format!(
                "leg {} moves {} instead of {}",
                leg.id, leg.amount, conversion.amount
            ));
        }
        if leg.wallet_type != wallet || leg.direction != direction || leg.kind != kind {
            return Some(format!(
                "leg {} is a {} {} {}",
                leg.id, leg.wallet_type, leg.direction, leg.kind
            ));
        }
    }
    None
}

/// Replay one account from a consistent storage snapshot.
///
/// A dirty account is frozen with the findings as the reason and reported as
/// [`LedgerError::InvariantViolation`]; it needs manual reconciliation before it accepts
/// writes again.
pub fn verify_account(repo: &dyn LedgerRepository, user_id: &str) -> LedgerResult<AccountAudit> {
    let snapshot = repo
        .snapshot(user_id)?
        .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;
    let audit = audit_snapshot(&snapshot);
    if audit.is_clean() {
        return Ok(audit);
    }

    let detail = audit.summary();
    error!(user_id, %detail, "ledger invariant violated, freezing account");
    repo.freeze_account(user_id, &detail)?;
    Err(LedgerError::InvariantViolation {
        user_id: user_id.to_string(),
        detail,
    })
}

pub fn audit_snapshot(snapshot: &AccountSnapshot) -> AccountAudit {
    audit_account(
        &snapshot.account,
        &snapshot.transactions,
        &snapshot.conversions,
    )
}

/// Result of auditing every account in a repository.
#[derive(Clone, Debug, Default)]
pub struct LedgerAudit {
    pub accounts_checked: usize,
    pub violations: Vec<AccountAudit>,
}

impl LedgerAudit {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Audit every account, freezing the ones that fail.
pub fn verify_ledger(repo: &dyn LedgerRepository) -> LedgerResult<LedgerAudit> {
    let mut report = LedgerAudit::default();
    for listed in repo.accounts()? {
        let Some(snapshot) = repo.snapshot(&listed.user_id)? else {
            continue;
        };
        report.accounts_checked += 1;
        let audit = audit_snapshot(&snapshot);
        if audit.is_clean() {
            continue;
        }
        let detail = audit.summary();
        error!(user_id = %listed.user_id, %detail, "ledger invariant violated, freezing account");
        repo.freeze_account(&listed.user_id, &detail)?;
        report.violations.push(audit);
    }
    info!(
        accounts = report.accounts_checked,
        violations = report.violations.len(),
        "ledger verification complete"
    );
    Ok(report)
}
