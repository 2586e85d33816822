//! Application configuration loaded from TOML.
//!
//! Default path: `~/.papertrade/config.toml`
//! Can be overridden with `PAPERTRADE_CONFIG` environment variable.
//! A missing file yields the defaults; missing keys take their default values.

use crate::fees::FeeSchedule;
use crate::ledger::LedgerStore;
use crate::session::SessionStore;
use crate::store::default_data_path;
use crate::types::EngineConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at the config file.
pub const CONFIG_FILE_ENV: &str = "PAPERTRADE_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
    pub engine: EngineConfig,
    pub fees: FeeSchedule,
    pub paths: PathsConfig,
    pub runner: RunnerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            engine: EngineConfig::default(),
            fees: FeeSchedule::default(),
            paths: PathsConfig::default(),
            runner: RunnerConfig::default(),
        }
    }
}

/// File locations. Unset entries fall back to the `~/.papertrade/` defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub ledger_file: Option<PathBuf>,
    pub session_file: Option<PathBuf>,
    /// JSON quote file used as market data by the runner
    pub quotes_file: Option<PathBuf>,
}

/// Runner task intervals in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    pub schedule_tick_ms: u64,
    pub position_check_ms: u64,
    pub equity_sample_ms: u64,
    /// Zero disables the watchlist poller
    pub watchlist_poll_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            schedule_tick_ms: 1_000,
            position_check_ms: 3_000,
            equity_sample_ms: 5_000,
            watchlist_poll_ms: 5_000,
        }
    }
}

impl RunnerConfig {
    pub fn schedule_tick(&self) -> Duration {
        Duration::from_millis(self.schedule_tick_ms.max(1))
    }

    pub fn position_check(&self) -> Duration {
        Duration::from_millis(self.position_check_ms.max(1))
    }

    pub fn equity_sample(&self) -> Duration {
        Duration::from_millis(self.equity_sample_ms.max(1))
    }

    pub fn watchlist_poll(&self) -> Option<Duration> {
        (self.watchlist_poll_ms > 0).then(|| Duration::from_millis(self.watchlist_poll_ms))
    }
}

impl AppConfig {
    /// Default config file path.
    pub fn default_path() -> PathBuf {
        default_data_path(CONFIG_FILE_ENV, "config.toml")
    }

    /// Load from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load from a specific file. A missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Reject numeric settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if !(engine.max_slippage.is_finite() && engine.max_slippage >= 0.0) {
            return Err(Error::InvalidOperation(format!(
                "engine.maxSlippage must be a finite non-negative fraction, got {}",
                engine.max_slippage
            )));
        }
        if !(engine.starting_balance.is_finite() && engine.starting_balance > 0.0) {
            return Err(Error::InvalidOperation(format!(
                "engine.startingBalance must be positive, got {}",
                engine.starting_balance
            )));
        }
        if let Some(commission) = engine.commission_override.or(self.fees.commission_override) {
            if !(commission.is_finite() && commission >= 0.0) {
                return Err(Error::InvalidOperation(format!(
                    "commission override must be non-negative, got {}",
                    commission
                )));
            }
        }
        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.paths
            .ledger_file
            .clone()
            .unwrap_or_else(LedgerStore::default_path)
    }

    pub fn session_path(&self) -> PathBuf {
        self.paths
            .session_file
            .clone()
            .unwrap_or_else(SessionStore::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductType;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.runner.position_check(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
log_filter = "papertrade_core=debug"

[engine]
startingBalance = 50000.0
defaultProduct = "intraday"

[fees]
commission_override = 20.0

[paths]
ledger_file = "/tmp/ledger.json"

[runner]
watchlist_poll_ms = 0
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.log_filter, "papertrade_core=debug");
        assert_eq!(config.engine.starting_balance, 50_000.0);
        assert_eq!(config.engine.default_product, ProductType::Intraday);
        assert_eq!(config.engine.currency, "INR");
        assert_eq!(config.fees.commission_override, Some(20.0));
        assert_eq!(config.ledger_path(), PathBuf::from("/tmp/ledger.json"));
        assert!(config.runner.watchlist_poll().is_none());
        assert_eq!(config.runner.schedule_tick_ms, 1_000);
    }

    #[test]
    fn test_non_finite_slippage_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        for value in ["nan", "inf", "-0.01"] {
            fs::write(&path, format!("[engine]\nmaxSlippage = {value}\n")).unwrap();
            assert!(
                matches!(AppConfig::load_from(&path), Err(crate::Error::InvalidOperation(_))),
                "maxSlippage = {value}"
            );
        }
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[engine\nbroken").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(crate::Error::Config(_))
        ));
    }
}
