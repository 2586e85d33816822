//! Position lifecycle: weighted average cost on buys, removal when flat.

use crate::types::{ProductType, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quantities below this are treated as zero.
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// A long holding in a single instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Units held (always positive)
    pub quantity: f64,
    /// Weighted average cost per unit
    pub average_price: f64,
    /// Fee regime the position was opened under
    #[serde(default)]
    pub product: ProductType,
    /// Absolute price at or below which the position is closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    /// Absolute price at or above which the position is closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Create a new position from an opening fill.
    pub fn new(quantity: f64, average_price: f64, now: DateTime<Utc>) -> Self {
        Self {
            quantity,
            average_price,
            product: ProductType::default(),
            stop_loss: None,
            take_profit: None,
            opened_at: now,
            updated_at: now,
        }
    }

    /// Cost basis of the whole position.
    pub fn total_cost(&self) -> f64 {
        self.quantity * self.average_price
    }

    /// Whether any protective threshold is armed.
    pub fn has_protection(&self) -> bool {
        self.stop_loss.is_some() || self.take_profit.is_some()
    }

    /// Valuation of this position at the given price.
    pub fn view(&self, symbol: &str, current_price: Option<f64>) -> PositionView {
        let total_cost = self.total_cost();
        let (market_value, unrealized_pnl, pnl_percent) = match current_price {
            Some(price) => {
                let market_value = self.quantity * price;
                let pnl = market_value - total_cost;
                let pct = if total_cost > 0.0 {
                    (pnl / total_cost) * 100.0
                } else {
                    0.0
                };
                (Some(market_value), Some(pnl), Some(pct))
            }
            None => (None, None, None),
        };

        PositionView {
            symbol: symbol.to_string(),
            quantity: self.quantity,
            average_price: self.average_price,
            total_cost,
            current_price,
            market_value,
            unrealized_pnl,
            pnl_percent,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
        }
    }
}

/// Position valued at the latest cached price, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
    pub total_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrealized_pnl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
}

/// Apply a fill to a position.
///
/// - BUY: quantity grows and the average cost becomes the quantity-weighted
///   mean of the old average and the fill price.
/// - SELL: quantity shrinks with the average cost unchanged; the position is
///   gone (`None`) once the remainder is within [`QUANTITY_EPSILON`] of zero.
///
/// Callers must reject sells larger than the held quantity before calling.
pub fn apply_fill(
    position: Option<Position>,
    side: Side,
    quantity: f64,
    fill_price: f64,
    now: DateTime<Utc>,
) -> Option<Position> {
    match (side, position) {
        (Side::Buy, None) => Some(Position::new(quantity, fill_price, now)),
        (Side::Buy, Some(mut pos)) => {
            let total_quantity = pos.quantity + quantity;
            pos.average_price =
                (pos.quantity * pos.average_price + quantity * fill_price) / total_quantity;
            pos.quantity = total_quantity;
            pos.updated_at = now;
            Some(pos)
        }
        (Side::Sell, None) => None,
        (Side::Sell, Some(mut pos)) => {
            let remaining = pos.quantity - quantity;
            if remaining <= QUANTITY_EPSILON {
                return None;
            }
            pos.quantity = remaining;
            pos.updated_at = now;
            Some(pos)
        }
    }
}
