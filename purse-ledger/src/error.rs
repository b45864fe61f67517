use purse_core::{UserId, WalletType};
use thiserror::Error;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no ledger account for user {0}")]
    AccountNotFound(UserId),
    #[error("account {user_id} is frozen: {reason}")]
    AccountFrozen { user_id: UserId, reason: String },
    #[error("insufficient {wallet} balance: requested {requested}, available {available}")]
    InsufficientBalance {
        wallet: WalletType,
        requested: i64,
        available: i64,
    },
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("ledger write failed: {0}")]
    WriteFailed(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("ledger invariant violated for {user_id}: {detail}")]
    InvariantViolation { user_id: UserId, detail: String },
}

impl LedgerError {
    /// Expected business outcomes the caller reports to the user instead of retrying.
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::AccountNotFound(_)
                | LedgerError::InsufficientBalance { .. }
                | LedgerError::InvalidAmount(_)
                | LedgerError::InvalidCommand(_)
        )
    }

    /// Storage failures: the whole operation was rolled back and may be retried as a unit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::WriteFailed(_))
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::WriteFailed(value.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::WriteFailed(value.to_string())
    }
}
