//! Papertrade Core - simulated brokerage and automated session engine.
//!
//! This crate provides:
//!
//! - **Ledger**: wallet, positions, order history, price cache and equity history
//!   persisted as one JSON document
//! - **Fees**: a jurisdiction-style fee schedule (brokerage, transaction tax,
//!   exchange/regulatory charges, stamp duty, settlement charge, service tax)
//! - **Execution**: simulated fills with pluggable slippage
//! - **Protective exits**: stop-loss / take-profit thresholds enforced on price ticks
//! - **Automated sessions**: scheduled entry, budget sizing and timed unwind
//!
//! # Example
//!
//! ```rust
//! use papertrade_core::{EngineConfig, OrderEngine, OrderRequest, OrderSize, PaperBroker};
//! use papertrade_core::engine::NoSlippage;
//! use papertrade_core::ledger::LedgerStore;
//!
//! let broker = PaperBroker::new(
//!     LedgerStore::in_memory(EngineConfig::default()),
//!     OrderEngine::new(NoSlippage),
//! );
//!
//! broker.set_price("SYM", 100.0).unwrap();
//! let order = broker.submit(OrderRequest::buy("SYM", OrderSize::Quantity(10.0))).unwrap();
//!
//! assert!((order.net_amount - 1001.19).abs() < 1e-6);
//! assert!((broker.cash() - 98_998.81).abs() < 1e-6);
//! ```

pub mod analytics;
pub mod broker;
pub mod config;
pub mod engine;
pub mod fees;
pub mod ledger;
pub mod notify;
pub mod position;
pub mod protective;
pub mod report;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use types::{
    ApiResponse, ChargeBreakdown, EngineConfig, EquitySnapshot, OrderRecord, OrderRequest,
    OrderSize, ProductType, Side,
};

// Re-export main functionality
pub use broker::{AccountStatus, PaperBroker};
pub use config::AppConfig;
pub use engine::{OrderEngine, RejectReason, Rejection, SubmitOutcome};
pub use fees::{calculate_charges, FeeQuote, FeeSchedule};
pub use ledger::{Ledger, LedgerStore};
pub use notify::{EventBus, TradeEvent};
pub use position::{apply_fill, Position, PositionView};
pub use protective::{ExitTrigger, ProtectiveExit};
pub use report::PerformanceReport;
pub use session::{AutoTrader, SessionConfig, SessionRunner, SessionSnapshot, SessionStage};

/// Error types for papertrade-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
}

/// Result type for papertrade-core operations.
pub type Result<T> = std::result::Result<T, Error>;
