//! Automated trading sessions.
//!
//! A session screens a universe of instruments at a configured entry time,
//! buys the survivors with an evenly split budget, guards them with
//! percentage stop-loss / take-profit thresholds and sells everything it
//! opened at the exit time.

pub mod clock;
pub mod config;
pub mod filters;
pub mod market;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod strategies;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ExecutionMode, FilterConfig, PositionSizing, SessionConfig, Tier, Trend};
pub use market::{MarketData, Quote, QuoteFile, StaticMarket};
pub use runner::{RunnerHandle, RunnerIntervals, SessionRunner};
pub use scheduler::{AutoTrader, DEFAULT_UNIVERSE, MIN_SESSION_BUDGET};
pub use state::{
    LogEntry, OpenedPosition, SessionSnapshot, SessionStage, SessionState, SessionStore,
};
pub use strategies::{get_strategy, list_strategies, Strategy, StrategyStyle};
