//! Market data sources for the session scheduler and the watchlist poller.

use crate::types::normalize_symbol;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

/// Snapshot of an instrument's trading day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub volume: f64,
    /// Change against the previous close, in percent
    #[serde(default)]
    pub change_percent: f64,
    #[serde(default)]
    pub day_high: f64,
    #[serde(default)]
    pub day_low: f64,
    /// Recent daily closes, oldest first
    #[serde(default)]
    pub closes: Vec<f64>,
}

impl Quote {
    /// Quote with only a price; the remaining fields are zero.
    pub fn new(symbol: &str, price: f64) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            price,
            volume: 0.0,
            change_percent: 0.0,
            day_high: price,
            day_low: price,
            closes: Vec::new(),
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_change(mut self, change_percent: f64) -> Self {
        self.change_percent = change_percent;
        self
    }

    pub fn with_range(mut self, day_low: f64, day_high: f64) -> Self {
        self.day_low = day_low;
        self.day_high = day_high;
        self
    }

    pub fn with_closes(mut self, closes: Vec<f64>) -> Self {
        self.closes = closes;
        self
    }
}

/// Asynchronous quote provider.
pub trait MarketData: Send + Sync {
    fn quote(&self, symbol: &str) -> impl Future<Output = Result<Quote>> + Send;
}

/// In-memory quotes, settable at runtime.
#[derive(Debug, Default)]
pub struct StaticMarket {
    quotes: RwLock<HashMap<String, Quote>>,
}

impl StaticMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quotes(quotes: impl IntoIterator<Item = Quote>) -> Self {
        let market = Self::new();
        for quote in quotes {
            market.set_quote(quote);
        }
        market
    }

    pub fn set_quote(&self, quote: Quote) {
        let symbol = normalize_symbol(&quote.symbol);
        self.quotes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol, quote);
    }

    pub fn remove(&self, symbol: &str) {
        self.quotes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&normalize_symbol(symbol));
    }
}

impl MarketData for StaticMarket {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let symbol = normalize_symbol(symbol);
        self.quotes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&symbol)
            .cloned()
            .ok_or_else(|| Error::MarketData(format!("No quote for {}", symbol)))
    }
}

/// Quotes read from a JSON array file on every fetch.
///
/// Lets an external process feed prices by rewriting the file.
#[derive(Debug, Clone)]
pub struct QuoteFile {
    path: PathBuf,
}

impl QuoteFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MarketData for QuoteFile {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let symbol = normalize_symbol(symbol);
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let quotes: Vec<Quote> = serde_json::from_str(&contents)?;

        quotes
            .into_iter()
            .find(|q| normalize_symbol(&q.symbol) == symbol)
            .ok_or_else(|| {
                Error::MarketData(format!(
                    "No quote for {} in {}",
                    symbol,
                    self.path.display()
                ))
            })
    }
}
