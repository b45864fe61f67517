use std::path::Path;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn purse(workdir: &Path, args: &[&str]) -> Command {
    let binary = assert_cmd::cargo::cargo_bin!("purse");
    let mut cmd = Command::new(binary);
    cmd.current_dir(workdir)
        .env_remove("PURSE_LOG")
        .env("PURSE__TELEMETRY__LEVEL", "warn")
        .arg("--db")
        .arg(workdir.join("ledger.db"))
        .args(args);
    cmd
}

fn run_json(workdir: &Path, args: &[&str]) -> Result<Value> {
    let output = purse(workdir, args).assert().success().get_output().stdout.clone();
    Ok(serde_json::from_slice(&output)?)
}

#[test]
fn cashback_redeem_and_convert() -> Result<()> {
    let temp = tempdir()?;
    let dir = temp.path();

    let account = run_json(dir, &["open", "--user", "alice"])?;
    assert_eq!(account["user_id"], "alice");

    let posting = run_json(
        dir,
        &["cashback", "--user", "alice", "--amount", "80", "--order", "O1"],
    )?;
    assert_eq!(posting["transactions"][0]["kind"], "cashback");
    assert_eq!(posting["account"]["balances"]["virtual_balance"], 80);

    run_json(
        dir,
        &[
            "adjust",
            "--user",
            "alice",
            "--wallet",
            "actual",
            "--direction",
            "credit",
            "--amount",
            "20",
            "--description",
            "opening balance",
        ],
    )?;

    let conversion = run_json(
        dir,
        &[
            "convert",
            "--referrer",
            "alice",
            "--referee",
            "bob",
            "--order",
            "O3",
            "--amount",
            "30",
        ],
    )?;
    assert_eq!(conversion["conversion"]["referee_id"], "bob");

    let balances = run_json(dir, &["balance", "--user", "alice"])?;
    assert_eq!(balances["virtual_balance"], 50);
    assert_eq!(balances["actual_balance"], 50);

    let history = run_json(
        dir,
        &["history", "--user", "alice", "--flow", "conversions"],
    )?;
    let groups = history.as_array().expect("history is a list");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["group"], "conversion");

    let stats = run_json(dir, &["stats", "--user", "alice"])?;
    assert_eq!(stats["virtual_income"], 80);
    assert_eq!(stats["conversions"], 30);

    let report = run_json(dir, &["verify"])?;
    assert_eq!(report["accounts_checked"], 1);
    assert_eq!(report["violations"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn insufficient_balance_exits_non_zero() -> Result<()> {
    let temp = tempdir()?;
    let dir = temp.path();
    run_json(dir, &["open", "--user", "carol"])?;

    let output = purse(
        dir,
        &["redeem", "--user", "carol", "--amount", "5", "--order", "O2"],
    )
    .assert()
    .failure()
    .get_output()
    .clone();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("insufficient actual balance"), "{stderr}");

    let transactions = run_json(dir, &["transactions", "--user", "carol"])?;
    assert_eq!(transactions.as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn unknown_account_and_bad_amount_are_rejected() -> Result<()> {
    let temp = tempdir()?;
    let dir = temp.path();
    purse(dir, &["balance", "--user", "nobody"])
        .assert()
        .failure();

    run_json(dir, &["open", "--user", "dave"])?;
    purse(
        dir,
        &["refund", "--user", "dave", "--amount", "0", "--order", "O1"],
    )
    .assert()
    .failure();
    Ok(())
}

#[test]
fn transactions_filter_by_wallet() -> Result<()> {
    let temp = tempdir()?;
    let dir = temp.path();
    run_json(dir, &["open", "--user", "erin"])?;
    run_json(
        dir,
        &["cashback", "--user", "erin", "--amount", "10", "--order", "O1"],
    )?;
    run_json(
        dir,
        &["refund", "--user", "erin", "--amount", "7", "--order", "O2"],
    )?;

    let rows = run_json(
        dir,
        &["transactions", "--user", "erin", "--wallet", "actual"],
    )?;
    let rows = rows.as_array().expect("rows are a list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["kind"], "refund");
    assert_eq!(rows[0]["balance_after"], 7);
    Ok(())
}

#[test]
fn prints_effective_config() -> Result<()> {
    let temp = tempdir()?;
    let output = purse(temp.path(), &["config"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let rendered = String::from_utf8(output)?;
    assert!(rendered.contains("conversion_window_ms = 60000"));
    assert!(rendered.contains("ledger.db"));
    Ok(())
}
