//! Order execution engine.
//!
//! Validates an [`OrderRequest`] against a ledger, simulates the fill and
//! applies it: cash, position and order history change together or not at all.

mod slippage;

pub use slippage::{NoSlippage, RandomSlippage, SlippageModel, WorstCaseSlippage};

use crate::fees::FeeSchedule;
use crate::ledger::Ledger;
use crate::position::{apply_fill, QUANTITY_EPSILON};
use crate::types::{
    normalize_symbol, round2, OrderRecord, OrderRequest, OrderSize, OrderStatus, Side,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Machine-readable rejection code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RejectReason {
    PriceUnavailable,
    InsufficientFunds,
    InsufficientHoldings,
    InvalidInput,
}

/// Why an order was not executed. The ledger is unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("No price available for {0}")]
    PriceUnavailable(String),

    #[error("Insufficient funds. Need {required:.2}, have {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Cannot sell {requested} of {symbol}, only have {held}")]
    InsufficientHoldings {
        symbol: String,
        requested: f64,
        held: f64,
    },

    #[error("Invalid order: {0}")]
    InvalidInput(String),
}

impl Rejection {
    pub fn reason(&self) -> RejectReason {
        match self {
            Rejection::PriceUnavailable(_) => RejectReason::PriceUnavailable,
            Rejection::InsufficientFunds { .. } => RejectReason::InsufficientFunds,
            Rejection::InsufficientHoldings { .. } => RejectReason::InsufficientHoldings,
            Rejection::InvalidInput(_) => RejectReason::InvalidInput,
        }
    }
}

/// Wire form of a submission result: `{success, order}` or `{success: false, reason}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Result<OrderRecord, Rejection>> for SubmitOutcome {
    fn from(result: Result<OrderRecord, Rejection>) -> Self {
        match result {
            Ok(order) => Self {
                success: true,
                order: Some(order),
                reason: None,
                message: None,
            },
            Err(rejection) => Self {
                success: false,
                order: None,
                reason: Some(rejection.reason()),
                message: Some(rejection.to_string()),
            },
        }
    }
}

/// Simulates fills against a ledger.
#[derive(Debug)]
pub struct OrderEngine {
    slippage: Box<dyn SlippageModel>,
    fees: FeeSchedule,
}

impl Default for OrderEngine {
    fn default() -> Self {
        Self::new(RandomSlippage)
    }
}

impl OrderEngine {
    /// Create an engine with the default fee schedule.
    pub fn new(slippage: impl SlippageModel + 'static) -> Self {
        Self {
            slippage: Box::new(slippage),
            fees: FeeSchedule::default(),
        }
    }

    /// Replace the fee schedule.
    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Execute an order against the ledger.
    ///
    /// On success the wallet, position and order history have been updated.
    /// On rejection the ledger is untouched.
    pub fn execute(
        &self,
        ledger: &mut Ledger,
        request: &OrderRequest,
        now: DateTime<Utc>,
    ) -> Result<OrderRecord, Rejection> {
        let symbol = normalize_symbol(&request.symbol);
        validate(&symbol, request)?;

        let reference_price = ledger
            .price(&symbol)
            .ok_or_else(|| Rejection::PriceUnavailable(symbol.clone()))?;

        let held = ledger.position(&symbol).cloned();
        let closing = match (&held, request.side) {
            (Some(pos), Side::Sell) => Some(pos.quantity),
            _ => None,
        };
        let quantity = resolve_quantity(
            request.size,
            reference_price,
            ledger.config.allow_fractional,
            closing,
        )?;

        let price = round2(self.slippage.fill_price(
            request.side,
            reference_price,
            ledger.config.max_slippage,
        ));
        if !(price.is_finite() && price > 0.0) {
            return Err(Rejection::InvalidInput(format!(
                "Fill price {} is not positive",
                price
            )));
        }

        let product = match (&held, request.side) {
            (Some(pos), Side::Sell) => request.product.unwrap_or(pos.product),
            _ => request.product.unwrap_or(ledger.config.default_product),
        };

        let quote = self
            .fees
            .with_commission_override(
                ledger
                    .config
                    .commission_override
                    .or(self.fees.commission_override),
            )
            .calculate(request.side, quantity, price, product);

        let realized_pnl = match request.side {
            Side::Buy => {
                if ledger.wallet.cash < quote.net_amount {
                    return Err(Rejection::InsufficientFunds {
                        required: quote.net_amount,
                        available: ledger.wallet.cash,
                    });
                }
                ledger.wallet.cash -= quote.net_amount;
                None
            }
            Side::Sell => {
                let held_quantity = held.as_ref().map(|p| p.quantity).unwrap_or(0.0);
                if quantity > held_quantity + QUANTITY_EPSILON {
                    return Err(Rejection::InsufficientHoldings {
                        symbol,
                        requested: quantity,
                        held: held_quantity,
                    });
                }
                ledger.wallet.cash += quote.net_amount;
                let cost = held.as_ref().map(|p| p.average_price).unwrap_or(price) * quantity;
                Some(quote.net_amount - cost)
            }
        };

        let opening = held.is_none();
        match apply_fill(held, request.side, quantity, price, now) {
            Some(mut pos) => {
                if opening {
                    pos.product = product;
                }
                if request.side == Side::Buy {
                    if request.stop_loss.is_some() {
                        pos.stop_loss = request.stop_loss;
                    }
                    if request.take_profit.is_some() {
                        pos.take_profit = request.take_profit;
                    }
                }
                ledger.positions.insert(symbol.clone(), pos);
            }
            None => {
                ledger.positions.remove(&symbol);
            }
        }

        let order = OrderRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: now,
            symbol,
            side: request.side,
            product_type: product,
            quantity,
            reference_price,
            price,
            gross_amount: quote.turnover,
            charges: quote.charges,
            total_charges: quote.total_charges,
            net_amount: quote.net_amount,
            status: OrderStatus::Filled,
            currency: ledger.config.currency.clone(),
            tag: request.tag.clone(),
            realized_pnl,
        };
        ledger.orders.insert(0, order.clone());

        tracing::info!(
            symbol = %order.symbol,
            side = %order.side,
            quantity = order.quantity,
            price = order.price,
            net_amount = order.net_amount,
            "Order filled"
        );

        Ok(order)
    }
}

fn validate(symbol: &str, request: &OrderRequest) -> Result<(), Rejection> {
    if symbol.is_empty() {
        return Err(Rejection::InvalidInput("Symbol is empty".to_string()));
    }

    let size = match request.size {
        OrderSize::Quantity(q) | OrderSize::Amount(q) => q,
    };
    if !(size.is_finite() && size > 0.0) {
        return Err(Rejection::InvalidInput(format!(
            "Order size must be positive, got {}",
            size
        )));
    }

    if request.side == Side::Sell && (request.stop_loss.is_some() || request.take_profit.is_some()) {
        return Err(Rejection::InvalidInput(
            "Protective thresholds can only be attached to BUY orders".to_string(),
        ));
    }

    crate::protective::validate_thresholds(request.stop_loss, request.take_profit)
}

/// Units to trade for the requested size at the reference price.
///
/// Amounts are floored to whole units unless fractional trading is enabled.
/// An explicit fractional quantity is rejected in that case, except a SELL of
/// the entire holding (`closing`).
fn resolve_quantity(
    size: OrderSize,
    price: f64,
    allow_fractional: bool,
    closing: Option<f64>,
) -> Result<f64, Rejection> {
    let quantity = match size {
        OrderSize::Quantity(q) if allow_fractional => q,
        OrderSize::Quantity(q) => {
            let whole = q.round();
            if (q - whole).abs() <= QUANTITY_EPSILON {
                whole
            } else if closing.is_some_and(|held| (q - held).abs() <= QUANTITY_EPSILON) {
                q
            } else {
                return Err(Rejection::InvalidInput(format!(
                    "Fractional quantity {} is not allowed",
                    q
                )));
            }
        }
        OrderSize::Amount(amount) if allow_fractional => amount / price,
        // Tolerate representation error such as 2.9999999999999996.
        OrderSize::Amount(amount) => (amount / price + QUANTITY_EPSILON).floor(),
    };

    if !(quantity.is_finite() && quantity > 0.0) {
        return Err(Rejection::InvalidInput(format!(
            "Order resolves to no tradable quantity at price {:.2}",
            price
        )));
    }
    Ok(quantity)
}
