use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use purse_config::{HistoryConfig, PurseConfig, ServiceConfig};
use purse_core::{Account, Balances, Direction, ReferralConversion, Transaction, WalletType};
use purse_history::{
    apply_filters, bucket_by_date, monthly_stats_at, ConversionGrouper, DateBucket, FlowFilter,
    HistoryGroup, MonthlyStats, WalletFilter,
};
use purse_ledger::{
    verify_account, verify_ledger, AccountAudit, LedgerAudit, LedgerError, LedgerRepository,
    LedgerResult, MemoryLedgerRepository, Posting, SqliteLedgerRepository, TransactionQuery,
    TransactionWriter,
};
use tracing::debug;

/// Collaborator-facing wallet API.
///
/// Writes go through the [`TransactionWriter`]; reads load a snapshot from the
/// repository and run the history engine over it.
#[derive(Clone)]
pub struct WalletService {
    repo: Arc<dyn LedgerRepository>,
    writer: TransactionWriter,
    grouper: ConversionGrouper,
    verify_on_read: bool,
}

impl WalletService {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self::with_settings(repo, &HistoryConfig::default(), &ServiceConfig::default())
    }

    pub fn with_settings(
        repo: Arc<dyn LedgerRepository>,
        history: &HistoryConfig,
        service: &ServiceConfig,
    ) -> Self {
        Self {
            writer: TransactionWriter::new(repo.clone()),
            repo,
            grouper: ConversionGrouper::new(history.conversion_window_ms),
            verify_on_read: service.verify_on_read,
        }
    }

    /// Open the SQLite ledger named by `config.ledger`.
    pub fn from_config(config: &PurseConfig) -> LedgerResult<Self> {
        let repo =
            SqliteLedgerRepository::with_busy_timeout(&config.ledger.path, config.ledger.busy_timeout())?;
        Ok(Self::with_settings(
            Arc::new(repo),
            &config.history,
            &config.service,
        ))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLedgerRepository::new()))
    }

    pub fn repository(&self) -> &Arc<dyn LedgerRepository> {
        &self.repo
    }

    pub fn writer(&self) -> &TransactionWriter {
        &self.writer
    }

    pub fn open_account(&self, user_id: &str) -> LedgerResult<Account> {
        self.repo.open_account(user_id)
    }

    pub fn account(&self, user_id: &str) -> LedgerResult<Account> {
        self.repo
            .account(user_id)?
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))
    }

    pub fn balance(&self, user_id: &str) -> LedgerResult<Balances> {
        if self.verify_on_read {
            verify_account(self.repo.as_ref(), user_id)?;
        }
        Ok(self.account(user_id)?.balances)
    }

    pub fn credit_cashback(&self, user_id: &str, amount: i64, order_id: &str) -> LedgerResult<Posting> {
        self.writer.credit_cashback(user_id, amount, order_id)
    }

    pub fn redeem_actual(&self, user_id: &str, amount: i64, order_id: &str) -> LedgerResult<Posting> {
        self.writer.redeem_actual(user_id, amount, order_id)
    }

    pub fn convert_referral(
        &self,
        referrer_id: &str,
        referee_id: &str,
        order_id: &str,
        amount: i64,
    ) -> LedgerResult<Posting> {
        self.writer
            .convert_referral(referrer_id, referee_id, order_id, amount)
    }

    pub fn refund_actual(&self, user_id: &str, amount: i64, order_id: &str) -> LedgerResult<Posting> {
        self.writer.refund_actual(user_id, amount, order_id)
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
        self.writer
            .adjust(user_id, wallet_type, direction, amount, order_id, description)
    }

    /// Raw rows for one user; the query's own user filter is replaced.
    pub fn list_transactions(
        &self,
        user_id: &str,
        filters: TransactionQuery,
    ) -> LedgerResult<Vec<Transaction>> {
        self.account(user_id)?;
        self.repo.query(TransactionQuery {
            user_id: Some(user_id.to_string()),
            ..filters
        })
    }

    pub fn conversions(&self, referrer_id: &str) -> LedgerResult<Vec<ReferralConversion>> {
        self.account(referrer_id)?;
        self.repo.conversions(referrer_id)
    }

    pub fn grouped_history(
        &self,
        user_id: &str,
        wallet: WalletFilter,
        flow: FlowFilter,
    ) -> LedgerResult<Vec<HistoryGroup>> {
        let transactions = self.user_log(user_id)?;
        let groups = self.grouper.group(&transactions);
        let filtered = apply_filters(groups, wallet, flow);
        debug!(
            user_id,
            rows = transactions.len(),
            groups = filtered.len(),
            %wallet,
            %flow,
            "grouped history"
        );
        Ok(filtered)
    }

    /// Grouped history bucketed by calendar date in `tz`, most recent date first.
    pub fn dated_history<Tz: TimeZone>(
        &self,
        user_id: &str,
        wallet: WalletFilter,
        flow: FlowFilter,
        tz: &Tz,
    ) -> LedgerResult<Vec<DateBucket>> {
        let groups = self.grouped_history(user_id, wallet, flow)?;
        Ok(bucket_by_date(groups, tz))
    }

    pub fn monthly_stats(&self, user_id: &str) -> LedgerResult<MonthlyStats> {
        self.monthly_stats_at(user_id, Utc::now())
    }

    pub fn monthly_stats_at(&self, user_id: &str, at: DateTime<Utc>) -> LedgerResult<MonthlyStats> {
        let transactions = self.user_log(user_id)?;
        Ok(monthly_stats_at(&transactions, &at))
    }

    pub fn verify_account(&self, user_id: &str) -> LedgerResult<AccountAudit> {
        verify_account(self.repo.as_ref(), user_id)
    }

    pub fn verify_ledger(&self) -> LedgerResult<LedgerAudit> {
        verify_ledger(self.repo.as_ref())
    }

    fn user_log(&self, user_id: &str) -> LedgerResult<Vec<Transaction>> {
        self.account(user_id)?;
        self.repo.query(TransactionQuery::for_user(user_id))
    }
}
