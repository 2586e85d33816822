//! Simulated brokerage ledger and its transactional store.
//!
//! The [`Ledger`] is the persisted document: configuration, wallet, positions,
//! order history (newest first), price cache, watchlist and equity history.
//! [`LedgerStore`] owns the current ledger and applies every mutation as one
//! read-modify-write unit through [`LedgerStore::write_atomic`].

pub mod equity;

use crate::position::Position;
use crate::store::{default_data_path, Backend, FileBackend, MemoryBackend};
use crate::types::{normalize_symbol, EngineConfig, EquitySnapshot, OrderRecord, PriceEntry, Wallet};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Environment variable overriding the default ledger file.
pub const LEDGER_FILE_ENV: &str = "PAPERTRADE_LEDGER_FILE";

/// The full persisted ledger document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    #[serde(default)]
    pub config: EngineConfig,
    pub wallet: Wallet,
    #[serde(default)]
    pub positions: BTreeMap<String, Position>,
    /// Executed orders, newest first
    #[serde(default)]
    pub orders: Vec<OrderRecord>,
    #[serde(default)]
    pub prices: BTreeMap<String, PriceEntry>,
    #[serde(default)]
    pub watchlist: Vec<String>,
    #[serde(default)]
    pub equity_history: Vec<EquitySnapshot>,
}

impl Ledger {
    /// Fresh ledger funded with the configured starting balance.
    pub fn new(config: EngineConfig) -> Self {
        let cash = config.starting_balance;
        Self {
            config,
            wallet: Wallet { cash },
            positions: BTreeMap::new(),
            orders: Vec::new(),
            prices: BTreeMap::new(),
            watchlist: Vec::new(),
            equity_history: Vec::new(),
        }
    }

    /// Last cached price for a symbol.
    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).map(|entry| entry.price)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Units held of a symbol (zero when flat).
    pub fn held_quantity(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).map(|p| p.quantity).unwrap_or(0.0)
    }

    /// Store a price in the cache.
    pub fn record_price(&mut self, symbol: &str, price: f64, now: DateTime<Utc>) {
        self.prices
            .insert(symbol.to_string(), PriceEntry { price, timestamp: now });
    }

    /// Add a symbol to the watchlist. Returns false if already present.
    pub fn watch(&mut self, symbol: &str) -> bool {
        let symbol = normalize_symbol(symbol);
        if self.watchlist.contains(&symbol) {
            return false;
        }
        self.watchlist.push(symbol);
        true
    }

    /// Remove a symbol from the watchlist. Returns false if it was absent.
    pub fn unwatch(&mut self, symbol: &str) -> bool {
        let symbol = normalize_symbol(symbol);
        let before = self.watchlist.len();
        self.watchlist.retain(|s| *s != symbol);
        self.watchlist.len() != before
    }

    /// Latest equity valuation.
    pub fn equity(&self) -> EquitySnapshot {
        equity::snapshot(self, Utc::now())
    }

    /// Wallet, positions, orders and equity history back to a fresh state.
    ///
    /// Configuration, watchlist and the price cache survive.
    fn reset(&mut self) {
        self.wallet = Wallet {
            cash: self.config.starting_balance,
        };
        self.positions.clear();
        self.orders.clear();
        self.equity_history.clear();
    }
}

/// Owner of the current ledger.
#[derive(Debug)]
pub struct LedgerStore {
    backend: Box<dyn Backend>,
    ledger: Mutex<Ledger>,
}

impl LedgerStore {
    /// Load the persisted ledger, or create and persist a default one.
    ///
    /// Calling this again on the same backend yields the same ledger.
    /// A document that fails to parse is replaced by a fresh ledger.
    pub fn initialize(backend: impl Backend + 'static, config: EngineConfig) -> Result<Self> {
        let loaded = match backend.load()? {
            Some(contents) => match serde_json::from_str::<Ledger>(&contents) {
                Ok(ledger) => Some(ledger),
                Err(e) => {
                    tracing::warn!(error = %e, "Persisted ledger is corrupted, starting fresh");
                    None
                }
            },
            None => None,
        };

        let store = match loaded {
            Some(ledger) => Self {
                backend: Box::new(backend),
                ledger: Mutex::new(ledger),
            },
            None => {
                let mut ledger = Ledger::new(config);
                equity::record(&mut ledger, Utc::now());
                let store = Self {
                    backend: Box::new(backend),
                    ledger: Mutex::new(ledger),
                };
                store.persist(&store.lock())?;
                tracing::info!("Initialized new ledger");
                store
            }
        };

        Ok(store)
    }

    /// Ledger stored in a file (see [`Self::default_path`]).
    pub fn open(path: impl Into<PathBuf>, config: EngineConfig) -> Result<Self> {
        Self::initialize(FileBackend::new(path), config)
    }

    /// Ephemeral ledger with no file behind it.
    pub fn in_memory(config: EngineConfig) -> Self {
        let mut ledger = Ledger::new(config);
        equity::record(&mut ledger, Utc::now());
        Self {
            backend: Box::new(MemoryBackend::new()),
            ledger: Mutex::new(ledger),
        }
    }

    /// Default ledger file path.
    ///
    /// Default path: `~/.papertrade/ledger.json`
    /// Can be overridden with `PAPERTRADE_LEDGER_FILE` environment variable.
    pub fn default_path() -> PathBuf {
        default_data_path(LEDGER_FILE_ENV, "ledger.json")
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, ledger: &Ledger) -> Result<()> {
        let contents = serde_json::to_string_pretty(ledger)?;
        self.backend.save(&contents)
    }

    /// Snapshot of the current ledger.
    pub fn read(&self) -> Ledger {
        self.lock().clone()
    }

    /// Borrow the current ledger without cloning it.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&self.lock())
    }

    /// Apply a mutation as a single unit.
    ///
    /// The mutator runs against a working copy. On `Ok` the equity snapshot is
    /// recomputed, the copy becomes the current ledger and is persisted. On
    /// `Err` the current ledger is left untouched.
    pub fn write_atomic<T, E>(
        &self,
        mutator: impl FnOnce(&mut Ledger) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let mut guard = self.lock();
        let mut working = guard.clone();

        let output = mutator(&mut working)?;
        equity::record(&mut working, Utc::now());

        if let Err(e) = self.persist(&working) {
            tracing::error!(error = %e, "Failed to persist ledger");
        }
        *guard = working;

        Ok(output)
    }

    /// Serialize the whole ledger.
    pub fn export_snapshot(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.lock())?)
    }

    /// Replace the ledger with a previously exported document.
    pub fn import_snapshot(&self, json: &str) -> Result<()> {
        let imported: Ledger = serde_json::from_str(json)?;
        let mut guard = self.lock();
        self.persist(&imported)?;
        *guard = imported;
        tracing::info!("Imported ledger snapshot");
        Ok(())
    }

    /// Restore a fresh wallet and clear positions, orders and equity history.
    pub fn reset_session(&self) -> Result<()> {
        let mut guard = self.lock();
        let mut working = guard.clone();
        working.reset();
        equity::record(&mut working, Utc::now());
        self.persist(&working)?;
        *guard = working;
        tracing::info!(cash = guard.wallet.cash, "Ledger reset");
        Ok(())
    }
}
