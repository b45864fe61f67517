use purse_core::{Account, ReferralConversion, Transaction};

use crate::{LedgerCommand, LedgerResult, Posting, TransactionQuery};

/// One account together with its log and conversion records, read at a single point in time.
#[derive(Clone, Debug)]
pub struct AccountSnapshot {
    pub account: Account,
    /// Oldest first.
    pub transactions: Vec<Transaction>,
    pub conversions: Vec<ReferralConversion>,
}

/// Abstraction over durable ledger storage engines.
///
/// `execute` is the only method that changes balances. Implementations must run it as
/// one atomic unit that is serialised against every other `execute` on the same account.
pub trait LedgerRepository: Send + Sync {
    /// Create the account with zero balances, or return the existing one untouched.
    fn open_account(&self, user_id: &str) -> LedgerResult<Account>;

    fn account(&self, user_id: &str) -> LedgerResult<Option<Account>>;

    fn accounts(&self) -> LedgerResult<Vec<Account>>;

    /// Lock the account, plan the command with [`crate::plan_posting`], persist the
    /// posting, and commit. Any failure leaves storage unchanged.
    fn execute(&self, command: &LedgerCommand) -> LedgerResult<Posting>;

    /// Load transactions matching the supplied query.
    fn query(&self, query: TransactionQuery) -> LedgerResult<Vec<Transaction>>;

    /// Conversion records where `referrer_id` is the referrer.
    fn conversions(&self, referrer_id: &str) -> LedgerResult<Vec<ReferralConversion>>;

    /// Read the account row, its full log and its conversion records without any
    /// `execute` landing in between. `None` when the account does not exist.
    fn snapshot(&self, user_id: &str) -> LedgerResult<Option<AccountSnapshot>>;

    /// Block further writes to the account until an operator intervenes.
    fn freeze_account(&self, user_id: &str, reason: &str) -> LedgerResult<()>;
}
