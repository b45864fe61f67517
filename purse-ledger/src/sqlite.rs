use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use purse_core::{Account, Balances, ReferralConversion, Transaction};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};
use uuid::Uuid;

use crate::posting::{plan_posting, posting_clock};
use crate::{
    AccountSnapshot, LedgerCommand, LedgerError, LedgerRepository, LedgerResult, Posting,
    TransactionQuery,
};

const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    user_id TEXT PRIMARY KEY,
    virtual_balance INTEGER NOT NULL DEFAULT 0 CHECK (virtual_balance >= 0),
    actual_balance INTEGER NOT NULL DEFAULT 0 CHECK (actual_balance >= 0),
    frozen_reason TEXT,
    created_at_ms INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS transactions (
    sequence INTEGER PRIMARY KEY,
    txn_id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL REFERENCES accounts(user_id),
    wallet_type TEXT NOT NULL,
    direction TEXT NOT NULL,
    kind TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    order_id TEXT,
    referee_user_id TEXT,
    conversion_id TEXT,
    description TEXT NOT NULL,
    balance_after INTEGER NOT NULL CHECK (balance_after >= 0),
    timestamp_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS transactions_idx_user_time
    ON transactions(user_id, timestamp_ms, sequence);
CREATE INDEX IF NOT EXISTS transactions_idx_order
    ON transactions(order_id);
CREATE TRIGGER IF NOT EXISTS transactions_no_update
    BEFORE UPDATE ON transactions
    BEGIN SELECT RAISE(ABORT, 'transactions are append-only'); END;
CREATE TRIGGER IF NOT EXISTS transactions_no_delete
    BEFORE DELETE ON transactions
    BEGIN SELECT RAISE(ABORT, 'transactions are append-only'); END;
CREATE TABLE IF NOT EXISTS referral_conversions (
    conversion_id TEXT PRIMARY KEY,
    referrer_id TEXT NOT NULL REFERENCES accounts(user_id),
    referee_id TEXT NOT NULL,
    order_id TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    virtual_debit_txn_id TEXT NOT NULL REFERENCES transactions(txn_id),
    actual_credit_txn_id TEXT NOT NULL REFERENCES transactions(txn_id),
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS referral_conversions_idx_referrer
    ON referral_conversions(referrer_id);
"#;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed ledger repository.
///
/// Each command runs in a `BEGIN IMMEDIATE` transaction, which takes the database write
/// lock before the account is read. Concurrent writers queue on the busy timeout.
#[derive(Clone, Debug)]
pub struct SqliteLedgerRepository {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteLedgerRepository {
    pub fn new(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        Self::with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn with_busy_timeout(path: impl Into<PathBuf>, busy_timeout: Duration) -> LedgerResult<Self> {
        let repo = Self {
            path: path.into(),
            busy_timeout,
        };
        repo.initialize_schema()?;
        Ok(repo)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn initialize_schema(&self) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> LedgerResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;",
        )?;
        Ok(conn)
    }
}

impl LedgerRepository for SqliteLedgerRepository {
    fn open_account(&self, user_id: &str) -> LedgerResult<Account> {
        if user_id.trim().is_empty() {
            return Err(LedgerError::InvalidCommand("user id is empty".into()));
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT OR IGNORE INTO accounts (user_id, virtual_balance, actual_balance, created_at_ms)
             VALUES (?1, 0, 0, ?2)",
            params![user_id, Utc::now().timestamp_millis()],
        )?;
        let account = load_account(&tx, user_id)?
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;
        tx.commit()?;
        Ok(account)
    }

    fn account(&self, user_id: &str) -> LedgerResult<Option<Account>> {
        let conn = self.connect()?;
        load_account(&conn, user_id)
    }

    fn accounts(&self) -> LedgerResult<Vec<Account>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, virtual_balance, actual_balance, frozen_reason, created_at_ms
             FROM accounts ORDER BY user_id",
        )?;
        let mut rows = stmt.query([])?;
        let mut accounts = Vec::new();
        while let Some(row) = rows.next()? {
            accounts.push(row_to_account(row)?);
        }
        Ok(accounts)
    }

    fn execute(&self, command: &LedgerCommand) -> LedgerResult<Posting> {
        command.validate()?;
        let user_id = command.user_id();
        let mut conn = self.connect()?;
        // Dropping `tx` on any early return rolls back every statement below.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let account = load_account(&tx, user_id)?
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;
        let latest: Option<i64> = tx.query_row(
            "SELECT MAX(timestamp_ms) FROM transactions WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        let latest = latest.map(millis_to_datetime).transpose()?;
        let mut posting = plan_posting(command, &account, posting_clock(Utc::now(), latest))?;

        let balances = posting.account.balances;
        tx.execute(
            "UPDATE accounts SET virtual_balance = ?2, actual_balance = ?3 WHERE user_id = ?1",
            params![user_id, balances.virtual_balance, balances.actual_balance],
        )?;
        for txn in &mut posting.transactions {
            tx.execute(
                "INSERT INTO transactions (
                    txn_id, user_id, wallet_type, direction, kind, amount, order_id,
                    referee_user_id, conversion_id, description, balance_after, timestamp_ms
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    txn.id.to_string(),
                    txn.user_id,
                    txn.wallet_type.as_str(),
                    txn.direction.as_str(),
                    txn.kind.as_str(),
                    txn.amount,
                    txn.order_id,
                    txn.referee_user_id,
                    txn.conversion_id.map(|id| id.to_string()),
                    txn.description,
                    txn.balance_after,
                    txn.timestamp.timestamp_millis(),
                ],
            )?;
            txn.sequence = tx.last_insert_rowid() as u64;
        }
        if let Some(conversion) = &posting.conversion {
            tx.execute(
                "INSERT INTO referral_conversions (
                    conversion_id, referrer_id, referee_id, order_id, amount,
                    virtual_debit_txn_id, actual_credit_txn_id, created_at_ms
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    conversion.id.to_string(),
                    conversion.referrer_id,
                    conversion.referee_id,
                    conversion.order_id,
                    conversion.amount,
                    conversion.virtual_debit_txn_id.to_string(),
                    conversion.actual_credit_txn_id.to_string(),
                    conversion.created_at.timestamp_millis(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(posting)
    }

    fn query(&self, query: TransactionQuery) -> LedgerResult<Vec<Transaction>> {
        let conn = self.connect()?;
        select_transactions(&conn, query)
    }

    fn conversions(&self, referrer_id: &str) -> LedgerResult<Vec<ReferralConversion>> {
        let conn = self.connect()?;
        select_conversions(&conn, referrer_id)
    }

    fn snapshot(&self, user_id: &str) -> LedgerResult<Option<AccountSnapshot>> {
        let mut conn = self.connect()?;
        // WAL readers see one consistent database state for the whole transaction.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let Some(account) = load_account(&tx, user_id)? else {
            return Ok(None);
        };
        let transactions =
            select_transactions(&tx, TransactionQuery::for_user(user_id).ascending())?;
        let conversions = select_conversions(&tx, user_id)?;
        tx.commit()?;
        Ok(Some(AccountSnapshot {
            account,
            transactions,
            conversions,
        }))
    }

    fn freeze_account(&self, user_id: &str, reason: &str) -> LedgerResult<()> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE accounts SET frozen_reason = ?2 WHERE user_id = ?1",
            params![user_id, reason],
        )?;
        if updated == 0 {
            return Err(LedgerError::AccountNotFound(user_id.to_string()));
        }
        Ok(())
    }
}

fn load_account(conn: &Connection, user_id: &str) -> LedgerResult<Option<Account>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, virtual_balance, actual_balance, frozen_reason, created_at_ms
         FROM accounts WHERE user_id = ?1",
    )?;
    let mut rows = stmt.query(params![user_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_account(row)?)),
        None => Ok(None),
    }
}

fn select_transactions(
    conn: &Connection,
    query: TransactionQuery,
) -> LedgerResult<Vec<Transaction>> {
    let mut sql = String::from(
        "SELECT sequence, txn_id, user_id, wallet_type, direction, kind, amount, order_id,
                referee_user_id, conversion_id, description, balance_after, timestamp_ms
         FROM transactions
         WHERE (?1 IS NULL OR user_id = ?1)
           AND (?2 IS NULL OR wallet_type = ?2)
           AND (?3 IS NULL OR direction = ?3)
           AND (?4 IS NULL OR kind = ?4)
           AND (?5 IS NULL OR order_id = ?5)
           AND (?6 IS NULL OR timestamp_ms >= ?6)
           AND (?7 IS NULL OR timestamp_ms <= ?7)",
    );
    sql.push_str(if query.ascending {
        " ORDER BY timestamp_ms ASC, sequence ASC"
    } else {
        " ORDER BY timestamp_ms DESC, sequence DESC"
    });
    if query.limit.is_some() {
        sql.push_str(" LIMIT ?8");
    }

    let mut params: Vec<Value> = Vec::with_capacity(8);
    params.push(optional_text(query.user_id));
    params.push(optional_text(
        query.wallet_type.map(|w| w.as_str().to_string()),
    ));
    params.push(optional_text(
        query.direction.map(|d| d.as_str().to_string()),
    ));
    params.push(optional_text(query.kind.map(|k| k.as_str().to_string())));
    params.push(optional_text(query.order_id));
    params.push(optional_int(query.start_time.map(ceil_millis)));
    params.push(optional_int(query.end_time.map(|ts| ts.timestamp_millis())));
    if let Some(limit) = query.limit {
        params.push(Value::Integer(limit as i64));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut transactions = Vec::new();
    while let Some(row) = rows.next()? {
        transactions.push(row_to_transaction(row)?);
    }
    Ok(transactions)
}

fn select_conversions(
    conn: &Connection,
    referrer_id: &str,
) -> LedgerResult<Vec<ReferralConversion>> {
    let mut stmt = conn.prepare(
        "SELECT conversion_id, referrer_id, referee_id, order_id, amount,
                virtual_debit_txn_id, actual_credit_txn_id, created_at_ms
         FROM referral_conversions
         WHERE referrer_id = ?1
         ORDER BY created_at_ms ASC, conversion_id ASC",
    )?;
    let mut rows = stmt.query(params![referrer_id])?;
    let mut conversions = Vec::new();
    while let Some(row) = rows.next()? {
        conversions.push(row_to_conversion(row)?);
    }
    Ok(conversions)
}

fn optional_text(value: Option<String>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn optional_int(value: Option<i64>) -> Value {
    value.map(Value::Integer).unwrap_or(Value::Null)
}

/// Smallest stored millisecond at or after `ts`, so a sub-millisecond lower bound
/// excludes the row it would otherwise truncate onto.
fn ceil_millis(ts: DateTime<Utc>) -> i64 {
    let millis = ts.timestamp_millis();
    if ts.timestamp_subsec_nanos() % 1_000_000 == 0 {
        millis
    } else {
        millis + 1
    }
}

fn millis_to_datetime(millis: i64) -> LedgerResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| LedgerError::Serialization(format!("invalid timestamp {millis}")))
}

fn parse_uuid(value: &str, what: &str) -> LedgerResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|err| LedgerError::Serialization(format!("invalid {what} {value}: {err}")))
}

fn row_to_account(row: &rusqlite::Row<'_>) -> LedgerResult<Account> {
    let user_id: String = row.get(0)?;
    let virtual_balance: i64 = row.get(1)?;
    let actual_balance: i64 = row.get(2)?;
    let frozen_reason: Option<String> = row.get(3)?;
    let created_at_ms: i64 = row.get(4)?;
    Ok(Account {
        user_id,
        balances: Balances::new(virtual_balance, actual_balance),
        frozen_reason,
        created_at: millis_to_datetime(created_at_ms)?,
    })
}

fn row_to_transaction(row: &rusqlite::Row<'_>) -> LedgerResult<Transaction> {
    let sequence: i64 = row.get(0)?;
    let txn_id: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let wallet_str: String = row.get(3)?;
    let direction_str: String = row.get(4)?;
    let kind_str: String = row.get(5)?;
    let amount: i64 = row.get(6)?;
    let order_id: Option<String> = row.get(7)?;
    let referee_user_id: Option<String> = row.get(8)?;
    let conversion_str: Option<String> = row.get(9)?;
    let description: String = row.get(10)?;
    let balance_after: i64 = row.get(11)?;
    let timestamp_ms: i64 = row.get(12)?;

    let conversion_id = conversion_str
        .as_deref()
        .map(|value| parse_uuid(value, "conversion id"))
        .transpose()?;

    Ok(Transaction {
        id: parse_uuid(&txn_id, "transaction id")?,
        sequence: sequence as u64,
        user_id,
        wallet_type: FromStr::from_str(&wallet_str).map_err(LedgerError::Serialization)?,
        direction: FromStr::from_str(&direction_str).map_err(LedgerError::Serialization)?,
        kind: FromStr::from_str(&kind_str).map_err(LedgerError::Serialization)?,
        amount,
        order_id,
        referee_user_id,
        conversion_id,
        description,
        balance_after,
        timestamp: millis_to_datetime(timestamp_ms)?,
    })
}

fn row_to_conversion(row: &rusqlite::Row<'_>) -> LedgerResult<ReferralConversion> {
    let conversion_id: String = row.get(0)?;
    let referrer_id: String = row.get(1)?;
    let referee_id: String = row.get(2)?;
    let order_id: String = row.get(3)?;
    let amount: i64 = row.get(4)?;
    let debit_id: String = row.get(5)?;
    let credit_id: String = row.get(6)?;
    let created_at_ms: i64 = row.get(7)?;
    Ok(ReferralConversion {
        id: parse_uuid(&conversion_id, "conversion id")?,
        referrer_id,
        referee_id,
        order_id,
        amount,
        virtual_debit_txn_id: parse_uuid(&debit_id, "transaction id")?,
        actual_credit_txn_id: parse_uuid(&credit_id, "transaction id")?,
        created_at: millis_to_datetime(created_at_ms)?,
    })
}
