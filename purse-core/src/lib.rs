//! Core domain types shared by the Purse ledger, history, and service crates.

mod account;
mod conversion;
mod transaction;
mod wallet;

pub use account::{Account, Balances};
pub use conversion::ReferralConversion;
pub use transaction::Transaction;
pub use wallet::{Direction, TransactionKind, WalletType};

/// External user identifier. Accounts are keyed by it.
pub type UserId = String;
/// External order identifier carried on order-related rows.
pub type OrderId = String;
pub type TransactionId = uuid::Uuid;
pub type ConversionId = uuid::Uuid;
