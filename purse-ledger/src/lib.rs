//! Dual-wallet ledger storage and the transaction writer used by the Purse service.

pub mod audit;
mod command;
mod error;
mod memory;
mod posting;
mod query;
mod repository;
mod sqlite;
mod writer;

pub use audit::{
    audit_account, audit_snapshot, replay, verify_account, verify_ledger, AccountAudit,
    Discrepancy, LedgerAudit,
};
pub use command::LedgerCommand;
pub use error::{LedgerError, LedgerResult};
pub use memory::MemoryLedgerRepository;
pub use posting::{plan_posting, posting_clock, Posting};
pub use query::TransactionQuery;
pub use repository::{AccountSnapshot, LedgerRepository};
pub use sqlite::SqliteLedgerRepository;
pub use writer::TransactionWriter;
