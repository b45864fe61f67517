use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::Mutex;
use purse_core::{Account, ReferralConversion, Transaction, UserId};

use crate::posting::{plan_posting, posting_clock};
use crate::{
    AccountSnapshot, LedgerCommand, LedgerError, LedgerRepository, LedgerResult, Posting,
    TransactionQuery,
};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: BTreeMap<UserId, Account>,
    transactions: Vec<Transaction>,
    conversions: Vec<ReferralConversion>,
    last_sequence: u64,
}

/// Process-local ledger repository.
///
/// A single mutex guards every table, so commands are serialised across all accounts.
/// Planning happens before any state is touched and the apply step cannot fail, which
/// gives the same all-or-nothing contract as the SQLite store.
#[derive(Debug, Default)]
pub struct MemoryLedgerRepository {
    state: Mutex<MemoryState>,
}

impl MemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerRepository for MemoryLedgerRepository {
    fn open_account(&self, user_id: &str) -> LedgerResult<Account> {
        if user_id.trim().is_empty() {
            return Err(LedgerError::InvalidCommand("user id is empty".into()));
        }
        let mut state = self.state.lock();
        let account = state
            .accounts
            .entry(user_id.to_string())
            .or_insert_with(|| Account::new(user_id));
        Ok(account.clone())
    }

    fn account(&self, user_id: &str) -> LedgerResult<Option<Account>> {
        Ok(self.state.lock().accounts.get(user_id).cloned())
    }

    fn accounts(&self) -> LedgerResult<Vec<Account>> {
        Ok(self.state.lock().accounts.values().cloned().collect())
    }

    fn execute(&self, command: &LedgerCommand) -> LedgerResult<Posting> {
        command.validate()?;
        let mut state = self.state.lock();
        let user_id = command.user_id();
        let account = state
            .accounts
            .get(user_id)
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;
        let latest = state
            .transactions
            .iter()
            .filter(|txn| txn.user_id == user_id)
            .map(|txn| txn.timestamp)
            .max();
        let mut posting = plan_posting(command, account, posting_clock(Utc::now(), latest))?;

        for txn in &mut posting.transactions {
            state.last_sequence += 1;
            txn.sequence = state.last_sequence;
        }
        state
            .accounts
            .insert(user_id.to_string(), posting.account.clone());
        state
            .transactions
            .extend(posting.transactions.iter().cloned());
        if let Some(conversion) = &posting.conversion {
            state.conversions.push(conversion.clone());
        }
        Ok(posting)
    }

    fn query(&self, query: TransactionQuery) -> LedgerResult<Vec<Transaction>> {
        let matched = self
            .state
            .lock()
            .transactions
            .iter()
            .filter(|txn| query.matches(txn))
            .cloned()
            .collect();
        Ok(query.arrange(matched))
    }

    fn conversions(&self, referrer_id: &str) -> LedgerResult<Vec<ReferralConversion>> {
        Ok(self
            .state
            .lock()
            .conversions
            .iter()
            .filter(|conversion| conversion.referrer_id == referrer_id)
            .cloned()
            .collect())
    }

    fn snapshot(&self, user_id: &str) -> LedgerResult<Option<AccountSnapshot>> {
        let state = self.state.lock();
        let Some(account) = state.accounts.get(user_id).cloned() else {
            return Ok(None);
        };
        let history = TransactionQuery::for_user(user_id).ascending();
        let transactions = state
            .transactions
            .iter()
            .filter(|txn| history.matches(txn))
            .cloned()
            .collect();
        let conversions = state
            .conversions
            .iter()
            .filter(|conversion| conversion.referrer_id == user_id)
            .cloned()
            .collect();
        Ok(Some(AccountSnapshot {
            account,
            transactions: history.arrange(transactions),
            conversions,
        }))
    }

    fn freeze_account(&self, user_id: &str, reason: &str) -> LedgerResult<()> {
        let mut state = self.state.lock();
        let account = state
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;
        account.frozen_reason = Some(reason.to_string());
        Ok(())
    }
}
