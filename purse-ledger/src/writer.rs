use std::sync::Arc;

use purse_core::{Direction, WalletType};
use tracing::{error, info, warn};

use crate::{LedgerCommand, LedgerRepository, LedgerResult, Posting};

/// Entry point for every balance mutation.
///
/// Thin typed front over [`LedgerRepository::execute`] that adds structured logging for
/// committed, rejected, and failed commands.
#[derive(Clone)]
pub struct TransactionWriter {
    repo: Arc<dyn LedgerRepository>,
}

impl TransactionWriter {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    pub fn credit_cashback(
        &self,
        user_id: &str,
        amount: i64,
        order_id: &str,
    ) -> LedgerResult<Posting> {
        self.submit(LedgerCommand::CreditCashback {
            user_id: user_id.to_string(),
            amount,
            order_id: order_id.to_string(),
        })
    }

    pub fn redeem_actual(&self, user_id: &str, amount: i64, order_id: &str) -> LedgerResult<Posting> {
        self.submit(LedgerCommand::RedeemActual {
            user_id: user_id.to_string(),
            amount,
            order_id: order_id.to_string(),
        })
    }

    pub fn convert_referral(
        &self,
        referrer_id: &str,
        referee_id: &str,
        order_id: &str,
        amount: i64,
    ) -> LedgerResult<Posting> {
        self.submit(LedgerCommand::ConvertReferral {
            referrer_id: referrer_id.to_string(),
            referee_id: referee_id.to_string(),
            order_id: order_id.to_string(),
            amount,
        })
    }

    pub fn refund_actual(&self, user_id: &str, amount: i64, order_id: &str) -> LedgerResult<Posting> {
        self.submit(LedgerCommand::RefundActual {
            user_id: user_id.to_string(),
            amount,
            order_id: order_id.to_string(),
        })
    }

    pub fn adjust(
        &self,
        user_id: &str,
        wallet_type: WalletType,
        direction: Direction,
        amount: i64,
        order_id: Option<&str>,
        description: &str,
    ) -> LedgerResult<Posting> {
        self.submit(LedgerCommand::Adjust {
            user_id: user_id.to_string(),
            wallet_type,
            direction,
            amount,
            order_id: order_id.map(str::to_string),
            description: description.to_string(),
        })
    }

    /// Execute a prepared command.
    pub fn submit(&self, command: LedgerCommand) -> LedgerResult<Posting> {
        match self.repo.execute(&command) {
            Ok(posting) => {
                info!(
                    op = command.name(),
                    user_id = command.user_id(),
                    amount = command.amount(),
                    order_id = command.order_id(),
                    rows = posting.transactions.len(),
                    virtual_balance = posting.account.balances.virtual_balance,
                    actual_balance = posting.account.balances.actual_balance,
                    "ledger command committed"
                );
                Ok(posting)
            }
            Err(err) if err.is_business_rejection() => {
                warn!(
                    op = command.name(),
                    user_id = command.user_id(),
                    amount = command.amount(),
                    error = %err,
                    "ledger command rejected"
                );
                Err(err)
            }
            Err(err) => {
                error!(
                    op = command.name(),
                    user_id = command.user_id(),
                    amount = command.amount(),
                    error = %err,
                    "ledger command failed and was rolled back"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LedgerError, MemoryLedgerRepository};

    fn writer() -> (Arc<MemoryLedgerRepository>, TransactionWriter) {
        let repo = Arc::new(MemoryLedgerRepository::new());
        let writer = TransactionWriter::new(repo.clone());
        (repo, writer)
    }

    #[test]
    fn cashback_then_conversion() {
        let (repo, writer) = writer();
        repo.open_account("r").unwrap();
        writer.credit_cashback("r", 80, "O1").unwrap();
        writer.refund_actual("r", 20, "O0").unwrap();
        let posting = writer.convert_referral("r", "e", "O3", 30).unwrap();
        assert_eq!(posting.account.balances.virtual_balance, 50);
        assert_eq!(posting.account.balances.actual_balance, 50);
        assert!(posting.conversion.is_some());
    }

    #[test]
    fn adjust_records_description() {
        let (repo, writer) = writer();
        repo.open_account("u").unwrap();
        let posting = writer
            .adjust(
                "u",
                WalletType::Actual,
                Direction::Credit,
                100,
                None,
                "opening balance",
            )
            .unwrap();
        assert_eq!(posting.transactions[0].description, "opening balance");
        assert_eq!(posting.transactions[0].order_id, None);
    }

    #[test]
    fn rejections_surface_typed_errors() {
        let (repo, writer) = writer();
        assert!(matches!(
            writer.refund_actual("nobody", 5, "O1"),
            Err(LedgerError::AccountNotFound(_))
        ));
        repo.open_account("u").unwrap();
        let err = writer.redeem_actual("u", 5, "O1").unwrap_err();
        assert!(err.is_business_rejection());
        assert!(!err.is_retryable());
    }
}
