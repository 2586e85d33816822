//! Automated session settings.

use super::strategies;
use crate::types::{normalize_symbol, ProductType};
use crate::{Error, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Low / medium / high bucket used by the volume and volatility filters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Low => write!(f, "low"),
            Tier::Medium => write!(f, "medium"),
            Tier::High => write!(f, "high"),
        }
    }
}

/// Direction of price relative to its recent average.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Bullish => write!(f, "bullish"),
            Trend::Bearish => write!(f, "bearish"),
            Trend::Neutral => write!(f, "neutral"),
        }
    }
}

/// Candidate screening. `None` disables a filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterConfig {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Minimum volume tier
    pub volume_tier: Option<Tier>,
    /// Exact volatility tier
    pub volatility_tier: Option<Tier>,
    pub trend_bias: Option<Trend>,
}

/// Whether entry orders are placed or only logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionMode {
    #[default]
    Paper,
    DryRun,
}

/// Cap on the amount spent per instrument.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum PositionSizing {
    /// At most this much cash per instrument
    FixedAmount(f64),
    /// At most this percentage of the effective budget per instrument
    Percent(f64),
}

impl PositionSizing {
    /// Cap an even split of `budget` according to this sizing.
    pub fn cap(&self, even_split: f64, budget: f64) -> f64 {
        match *self {
            PositionSizing::FixedAmount(amount) => even_split.min(amount),
            PositionSizing::Percent(pct) => even_split.min(budget * pct / 100.0),
        }
    }
}

impl Default for PositionSizing {
    fn default() -> Self {
        PositionSizing::Percent(100.0)
    }
}

/// Settings of one automated session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Instruments to screen; empty means the default universe
    pub universe: Vec<String>,
    pub filters: FilterConfig,
    /// Strategy id from the built-in catalog
    pub strategy: String,
    pub mode: ExecutionMode,
    /// Total cash the session may spend
    pub budget: f64,
    pub sizing: PositionSizing,
    pub max_trades_per_day: usize,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub entry_time: NaiveTime,
    pub exit_time: NaiveTime,
    pub product: ProductType,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            universe: Vec::new(),
            filters: FilterConfig::default(),
            strategy: "balanced".to_string(),
            mode: ExecutionMode::Paper,
            budget: 10_000.0,
            sizing: PositionSizing::default(),
            max_trades_per_day: 5,
            stop_loss_pct: Some(1.0),
            take_profit_pct: Some(2.0),
            entry_time: NaiveTime::from_hms_opt(9, 20, 0).unwrap_or_default(),
            exit_time: NaiveTime::from_hms_opt(15, 10, 0).unwrap_or_default(),
            product: ProductType::Intraday,
        }
    }
}

impl SessionConfig {
    /// Check the settings for consistency.
    pub fn validate(&self) -> Result<()> {
        if strategies::get_strategy(&self.strategy).is_none() {
            return Err(Error::UnknownStrategy(self.strategy.clone()));
        }
        if !(self.budget.is_finite() && self.budget > 0.0) {
            return Err(invalid(format!("Budget must be positive, got {}", self.budget)));
        }
        if self.max_trades_per_day == 0 {
            return Err(invalid("Max trades per day must be at least 1".to_string()));
        }
        if self.entry_time >= self.exit_time {
            return Err(invalid(format!(
                "Entry time {} must be before exit time {}",
                self.entry_time, self.exit_time
            )));
        }

        let size = match self.sizing {
            PositionSizing::FixedAmount(v) | PositionSizing::Percent(v) => v,
        };
        if !(size.is_finite() && size > 0.0) {
            return Err(invalid(format!("Position size must be positive, got {}", size)));
        }
        if let PositionSizing::Percent(pct) = self.sizing {
            if pct > 100.0 {
                return Err(invalid(format!("Position percent {} exceeds 100", pct)));
            }
        }

        for (name, pct) in [
            ("Stop-loss", self.stop_loss_pct),
            ("Take-profit", self.take_profit_pct),
        ] {
            if let Some(p) = pct {
                if !(p.is_finite() && p > 0.0 && p < 100.0) {
                    return Err(invalid(format!(
                        "{} percent must be between 0 and 100, got {}",
                        name, p
                    )));
                }
            }
        }

        if let (Some(min), Some(max)) = (self.filters.min_price, self.filters.max_price) {
            if min > max {
                return Err(invalid(format!(
                    "Minimum price {} exceeds maximum price {}",
                    min, max
                )));
            }
        }
        Ok(())
    }

    /// Normalized universe, falling back to `default` when empty.
    pub fn universe_or(&self, default: &[&str]) -> Vec<String> {
        let mut symbols: Vec<String> = if self.universe.is_empty() {
            default.iter().map(|s| s.to_string()).collect()
        } else {
            self.universe.iter().map(|s| normalize_symbol(s)).collect()
        };
        let mut seen = std::collections::HashSet::new();
        symbols.retain(|s| !s.is_empty() && seen.insert(s.clone()));
        symbols
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidOperation(message)
}
