//! Typed settings for Purse, layered from TOML files and `PURSE__*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Directory searched for `default.toml` and `{env}.toml` when none is given.
pub const DEFAULT_CONFIG_DIR: &str = "config";
/// Prefix for environment overrides, e.g. `PURSE__LEDGER__PATH`.
pub const ENV_PREFIX: &str = "PURSE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurseConfig {
    pub ledger: LedgerConfig,
    pub history: HistoryConfig,
    pub service: ServiceConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// How long a writer waits for the database lock before failing.
    pub busy_timeout_ms: u64,
}

impl LedgerConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/purse.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum distance, exclusive, between the two legs of a conversion.
    pub conversion_window_ms: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            conversion_window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Replay the account before answering a balance query.
    pub verify_on_read: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            verify_on_read: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directive used when `PURSE_LOG` is unset.
    pub level: String,
    pub json: bool,
    /// Daily rolling log files are written here when set.
    pub log_dir: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            log_dir: None,
        }
    }
}

impl PurseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history.conversion_window_ms <= 0 {
            bail!(
                "history.conversion_window_ms must be positive, got {}",
                self.history.conversion_window_ms
            );
        }
        if self.ledger.path.as_os_str().is_empty() {
            bail!("ledger.path must not be empty");
        }
        if self.telemetry.level.trim().is_empty() {
            bail!("telemetry.level must not be empty");
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration as TOML")
    }
}

/// Load `default.toml`, then `{env}.toml`, then `PURSE__*` overrides from `config_dir`.
///
/// Missing files are skipped; every field falls back to its built-in default.
pub fn load_config(env: Option<&str>, config_dir: Option<&Path>) -> Result<PurseConfig> {
    let dir = config_dir.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_DIR));
    let mut builder = Config::builder().add_source(
        File::from(dir.join("default.toml"))
            .format(FileFormat::Toml)
            .required(false),
    );
    if let Some(env) = env.filter(|env| *env != "default") {
        builder = builder.add_source(
            File::from(dir.join(format!("{env}.toml")))
                .format(FileFormat::Toml)
                .required(false),
        );
    }
    let settings = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to read configuration from {}", dir.display()))?;
    let config: PurseConfig = settings
        .try_deserialize()
        .context("invalid configuration")?;
    config.validate()?;
    Ok(config)
}
