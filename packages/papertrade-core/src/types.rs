//! Core data types shared across the ledger, engine and session scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Fee regime a fill is charged under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    /// Held beyond the trading session.
    #[default]
    Delivery,
    /// Opened and closed within the trading session.
    Intraday,
}

/// Individual fee components of a fill, each rounded to two decimals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChargeBreakdown {
    pub brokerage: f64,
    pub transaction_tax: f64,
    pub exchange_charge: f64,
    pub regulatory_charge: f64,
    pub stamp_duty: f64,
    pub settlement_charge: f64,
    /// Tax levied on brokerage, exchange and regulatory charges.
    pub service_tax: f64,
}

impl ChargeBreakdown {
    /// Sum of every component.
    pub fn total(&self) -> f64 {
        self.brokerage
            + self.transaction_tax
            + self.exchange_charge
            + self.regulatory_charge
            + self.stamp_duty
            + self.settlement_charge
            + self.service_tax
    }
}

/// Order lifecycle status. Simulated orders fill in full or are rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Filled,
}

/// An executed order. Immutable once appended to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub product_type: ProductType,
    pub quantity: f64,
    /// Cached price the fill was derived from
    pub reference_price: f64,
    /// Fill price after slippage
    pub price: f64,
    pub gross_amount: f64,
    pub charges: ChargeBreakdown,
    pub total_charges: f64,
    /// Cash debited (BUY) or credited (SELL)
    pub net_amount: f64,
    pub status: OrderStatus,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Proceeds net of sell charges minus the cost basis of the units sold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<f64>,
}

/// Last known price for a symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time cash plus mark-to-market value of all positions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EquitySnapshot {
    pub timestamp: DateTime<Utc>,
    pub cash: f64,
    pub holdings_value: f64,
    pub equity: f64,
}

/// Simulated cash account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub cash: f64,
}

/// Execution settings persisted with the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Cash a fresh ledger starts with
    pub starting_balance: f64,
    /// Upper bound of the adverse slippage fraction (0.0005 = 0.05%)
    pub max_slippage: f64,
    /// Flat brokerage per order replacing the schedule's brokerage
    pub commission_override: Option<f64>,
    /// Allow fractional quantities. Otherwise amounts floor to whole units
    /// and explicit fractional quantities are rejected.
    pub allow_fractional: bool,
    pub default_product: ProductType,
    pub currency: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_balance: 100_000.0,
            max_slippage: 0.0005,
            commission_override: None,
            allow_fractional: false,
            default_product: ProductType::Delivery,
            currency: "INR".to_string(),
        }
    }
}

/// How much to trade: a unit count, or a cash amount converted at the cached price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum OrderSize {
    Quantity(f64),
    Amount(f64),
}

/// A request to the order execution engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub size: OrderSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    /// Overrides the configured default product type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl OrderRequest {
    /// Create a request for the given side.
    pub fn new(symbol: &str, side: Side, size: OrderSize) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            side,
            size,
            stop_loss: None,
            take_profit: None,
            product: None,
            tag: None,
        }
    }

    pub fn buy(symbol: &str, size: OrderSize) -> Self {
        Self::new(symbol, Side::Buy, size)
    }

    pub fn sell(symbol: &str, size: OrderSize) -> Self {
        Self::new(symbol, Side::Sell, size)
    }

    pub fn with_stop_loss(mut self, price: f64) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn with_take_profit(mut self, price: f64) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_product(mut self, product: ProductType) -> Self {
        self.product = Some(product);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Canonical form of a ticker symbol.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Round to two decimals (currency precision).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// API response wrapper used by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_request_normalizes_symbol() {
        let request = OrderRequest::buy(" reliance ", OrderSize::Quantity(5.0))
            .with_stop_loss(90.0)
            .with_tag("manual");

        assert_eq!(request.symbol, "RELIANCE");
        assert_eq!(request.side, Side::Buy);
        assert_eq!(request.stop_loss, Some(90.0));
        assert_eq!(request.tag.as_deref(), Some("manual"));
        assert!(request.product.is_none());
    }

    #[test]
    fn test_side_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"SELL\"");
        assert_eq!(
            serde_json::to_string(&ProductType::Intraday).unwrap(),
            "\"intraday\""
        );
    }

    #[test]
    fn test_engine_config_defaults_fill_missing_fields() {
        let config: EngineConfig = serde_json::from_str(r#"{"startingBalance": 5000.0}"#).unwrap();
        assert_eq!(config.starting_balance, 5000.0);
        assert_eq!(config.currency, "INR");
        assert!(!config.allow_fractional);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.0297), 0.03);
        assert_eq!(round2(0.001), 0.0);
        assert_eq!(round2(1.186), 1.19);
    }

    #[test]
    fn test_api_response() {
        let response: ApiResponse<String> = ApiResponse::ok("test".to_string());
        assert!(response.ok);
        assert_eq!(response.data, Some("test".to_string()));

        let err_response: ApiResponse<String> = ApiResponse::err("error");
        assert!(!err_response.ok);
        assert_eq!(err_response.error, Some("error".to_string()));
    }
}
