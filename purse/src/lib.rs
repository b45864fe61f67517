//! Purse: a dual-wallet (virtual and actual) ledger with referral conversions.
//!
//! [`WalletService`] is the entry point for collaborators. [`checkout::place_order`]
//! couples order creation with wallet redemption.

pub mod checkout;
mod service;

pub use service::WalletService;

pub use purse_config::{load_config, PurseConfig};
pub use purse_core::{
    Account, Balances, Direction, ReferralConversion, Transaction, TransactionKind, WalletType,
};
pub use purse_history::{
    group_transactions, DateBucket, FlowFilter, HistoryGroup, MonthlyStats, WalletFilter,
};
pub use purse_ledger::{
    AccountAudit, AccountSnapshot, LedgerAudit, LedgerError, LedgerRepository, LedgerResult,
    MemoryLedgerRepository, Posting, SqliteLedgerRepository, TransactionQuery,
};
