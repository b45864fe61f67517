use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use purse::{
    AccountAudit, Direction, FlowFilter, TransactionKind, TransactionQuery, WalletFilter,
    WalletService, WalletType,
};
use purse_config::load_config;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::telemetry;

#[derive(Parser)]
#[command(author, version, about = "Operate a Purse dual-wallet ledger")]
pub struct Cli {
    /// Configuration environment, loaded from `<config-dir>/<env>.toml` on top of `default.toml`
    #[arg(long, global = true, default_value = "default")]
    env: String,
    /// Directory holding the configuration files
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    /// Ledger database path, overriding `ledger.path`
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an account with zero balances (no-op when it already exists)
    Open(UserArgs),
    /// Show both wallet balances
    Balance(UserArgs),
    /// Credit cashback to the virtual wallet
    Cashback(OrderAmountArgs),
    /// Pay for an order from the actual wallet
    Redeem(OrderAmountArgs),
    /// Refund an order into the actual wallet
    Refund(OrderAmountArgs),
    /// Move value from the referrer's virtual wallet to their actual wallet
    Convert(ConvertArgs),
    /// Post a manual correction
    Adjust(AdjustArgs),
    /// List raw transactions
    Transactions(TransactionsArgs),
    /// Show grouped history with conversions paired
    History(HistoryArgs),
    /// List referral conversion records
    Conversions(UserArgs),
    /// Monthly income, spend, and conversion totals
    Stats(StatsArgs),
    /// Replay the log against stored balances, freezing inconsistent accounts
    Verify(VerifyArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args)]
pub struct UserArgs {
    #[arg(long)]
    user: String,
}

#[derive(Args)]
pub struct OrderAmountArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    amount: i64,
    #[arg(long)]
    order: String,
}

#[derive(Args)]
pub struct ConvertArgs {
    #[arg(long)]
    referrer: String,
    #[arg(long)]
    referee: String,
    #[arg(long)]
    order: String,
    #[arg(long)]
    amount: i64,
}

#[derive(Args)]
pub struct AdjustArgs {
    #[arg(long)]
    user: String,
    /// virtual or actual
    #[arg(long)]
    wallet: WalletType,
    /// credit or debit
    #[arg(long)]
    direction: Direction,
    #[arg(long)]
    amount: i64,
    #[arg(long)]
    order: Option<String>,
    #[arg(long)]
    description: String,
}

#[derive(Args)]
pub struct TransactionsArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    wallet: Option<WalletType>,
    #[arg(long)]
    direction: Option<Direction>,
    #[arg(long)]
    kind: Option<TransactionKind>,
    #[arg(long)]
    order: Option<String>,
    /// Inclusive lower bound (RFC 3339)
    #[arg(long)]
    since: Option<DateTime<Utc>>,
    /// Inclusive upper bound (RFC 3339)
    #[arg(long)]
    until: Option<DateTime<Utc>>,
    #[arg(long)]
    limit: Option<usize>,
    /// Oldest first
    #[arg(long)]
    ascending: bool,
}

#[derive(Args)]
pub struct HistoryArgs {
    #[arg(long)]
    user: String,
    /// all, virtual, or actual
    #[arg(long, default_value = "all")]
    wallet: WalletFilter,
    /// all, income, spends, or conversions
    #[arg(long, default_value = "all")]
    flow: FlowFilter,
    /// Bucket groups by UTC calendar date
    #[arg(long)]
    by_date: bool,
}

#[derive(Args)]
pub struct StatsArgs {
    #[arg(long)]
    user: String,
    /// Month to report as YYYY-MM; defaults to the current month
    #[arg(long)]
    month: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Check one account instead of the whole ledger
    #[arg(long)]
    user: Option<String>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(Some(&cli.env), cli.config_dir.as_deref())?;
    if let Some(db) = &cli.db {
        config.ledger.path = db.clone();
    }
    let _guard = telemetry::init_tracing(&config.telemetry)?;

    if let Command::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let service = WalletService::from_config(&config)
        .with_context(|| format!("failed to open ledger at {}", config.ledger.path.display()))?;
    info!(env = %cli.env, ledger = %config.ledger.path.display(), "purse ready");
    execute(&service, cli.command)
}

fn execute(service: &WalletService, command: Command) -> Result<()> {
    match command {
        Command::Open(args) => emit(&service.open_account(&args.user)?),
        Command::Balance(args) => emit(&service.balance(&args.user)?),
        Command::Cashback(args) => {
            emit(&service.credit_cashback(&args.user, args.amount, &args.order)?)
        }
        Command::Redeem(args) => emit(&service.redeem_actual(&args.user, args.amount, &args.order)?),
        Command::Refund(args) => emit(&service.refund_actual(&args.user, args.amount, &args.order)?),
        Command::Convert(args) => emit(&service.convert_referral(
            &args.referrer,
            &args.referee,
            &args.order,
            args.amount,
        )?),
        Command::Adjust(args) => emit(&service.adjust(
            &args.user,
            args.wallet,
            args.direction,
            args.amount,
            args.order.as_deref(),
            &args.description,
        )?),
        Command::Transactions(args) => {
            let query = TransactionQuery {
                user_id: None,
                wallet_type: args.wallet,
                direction: args.direction,
                kind: args.kind,
                order_id: args.order,
                start_time: args.since,
                end_time: args.until,
                limit: args.limit,
                ascending: args.ascending,
            };
            emit(&service.list_transactions(&args.user, query)?)
        }
        Command::History(args) => {
            if args.by_date {
                emit(&service.dated_history(&args.user, args.wallet, args.flow, &Utc)?)
            } else {
                emit(&service.grouped_history(&args.user, args.wallet, args.flow)?)
            }
        }
        Command::Conversions(args) => emit(&service.conversions(&args.user)?),
        Command::Stats(args) => {
            let at = match args.month.as_deref() {
                Some(month) => month_start(month)?,
                None => Utc::now(),
            };
            emit(&service.monthly_stats_at(&args.user, at)?)
        }
        Command::Verify(args) => match args.user {
            Some(user) => emit(&audit_json(&service.verify_account(&user)?)),
            None => {
                let report = service.verify_ledger()?;
                let violations: Vec<_> = report.violations.iter().map(audit_json).collect();
                emit(&json!({
                    "accounts_checked": report.accounts_checked,
                    "violations": violations,
                }))?;
                if !report.is_clean() {
                    bail!(
                        "{} account(s) failed verification and were frozen",
                        report.violations.len()
                    );
                }
                Ok(())
            }
        },
        Command::Config => Ok(()),
    }
}

fn audit_json(audit: &AccountAudit) -> serde_json::Value {
    json!({
        "user_id": audit.user_id,
        "transactions": audit.transactions,
        "clean": audit.is_clean(),
        "discrepancies": audit
            .discrepancies
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
    })
}

fn month_start(month: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d")
        .with_context(|| format!("invalid month '{month}', expected YYYY-MM"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("invalid month '{month}'"))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
