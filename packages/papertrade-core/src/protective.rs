//! Stop-loss / take-profit enforcement.
//!
//! Thresholds are absolute prices stored on the position. When a price tick
//! crosses one, the whole position is sold and both thresholds are cleared,
//! so each arming fires at most once.

use crate::engine::{OrderEngine, Rejection};
use crate::ledger::Ledger;
use crate::position::Position;
use crate::types::{OrderRecord, OrderRequest, OrderSize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which threshold was crossed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ExitTrigger {
    StopLoss,
    TakeProfit,
}

impl ExitTrigger {
    /// Tag recorded on the closing order.
    pub fn tag(&self) -> &'static str {
        match self {
            ExitTrigger::StopLoss => "stop-loss",
            ExitTrigger::TakeProfit => "take-profit",
        }
    }
}

/// Result of a triggered protective exit.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectiveExit {
    pub symbol: String,
    pub trigger: ExitTrigger,
    /// Tick price that crossed the threshold
    pub trigger_price: f64,
    pub result: Result<OrderRecord, Rejection>,
}

/// Check whether `price` crosses a threshold of `position`.
pub fn check(position: &Position, price: f64) -> Option<ExitTrigger> {
    if position.stop_loss.is_some_and(|sl| price <= sl) {
        return Some(ExitTrigger::StopLoss);
    }
    if position.take_profit.is_some_and(|tp| price >= tp) {
        return Some(ExitTrigger::TakeProfit);
    }
    None
}

/// Thresholds must be positive and a stop-loss must sit below a take-profit.
pub fn validate_thresholds(stop_loss: Option<f64>, take_profit: Option<f64>) -> Result<(), Rejection> {
    for (name, value) in [("stop-loss", stop_loss), ("take-profit", take_profit)] {
        if let Some(v) = value {
            if !(v.is_finite() && v > 0.0) {
                return Err(Rejection::InvalidInput(format!(
                    "{} must be a positive price, got {}",
                    name, v
                )));
            }
        }
    }

    if let (Some(sl), Some(tp)) = (stop_loss, take_profit) {
        if sl >= tp {
            return Err(Rejection::InvalidInput(format!(
                "stop-loss {} must be below take-profit {}",
                sl, tp
            )));
        }
    }
    Ok(())
}

/// Absolute thresholds `pct` percent below/above the average cost.
pub fn percent_thresholds(
    average_price: f64,
    stop_loss_pct: Option<f64>,
    take_profit_pct: Option<f64>,
) -> (Option<f64>, Option<f64>) {
    (
        stop_loss_pct.map(|pct| average_price * (1.0 - pct / 100.0)),
        take_profit_pct.map(|pct| average_price * (1.0 + pct / 100.0)),
    )
}

/// Close the position on `symbol` if the cached price crosses a threshold.
///
/// Returns `None` when there is no position, no cached price, or no crossing.
pub fn enforce(
    engine: &OrderEngine,
    ledger: &mut Ledger,
    symbol: &str,
    now: DateTime<Utc>,
) -> Option<ProtectiveExit> {
    let price = ledger.price(symbol)?;
    let position = ledger.position(symbol)?;
    let trigger = check(position, price)?;

    let request = OrderRequest::sell(symbol, OrderSize::Quantity(position.quantity))
        .with_tag(trigger.tag());
    let result = engine.execute(ledger, &request, now);

    // Fire once, even if the close was rejected.
    if let Some(pos) = ledger.positions.get_mut(symbol) {
        pos.stop_loss = None;
        pos.take_profit = None;
    }

    match &result {
        Ok(order) => tracing::info!(
            symbol,
            trigger = trigger.tag(),
            price,
            quantity = order.quantity,
            "Protective exit executed"
        ),
        Err(e) => tracing::warn!(symbol, trigger = trigger.tag(), error = %e, "Protective exit failed"),
    }

    Some(ProtectiveExit {
        symbol: symbol.to_string(),
        trigger,
        trigger_price: price,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NoSlippage;
    use crate::types::{EngineConfig, Side};

    fn protected_ledger(stop_loss: Option<f64>, take_profit: Option<f64>) -> Ledger {
        let mut ledger = Ledger::new(EngineConfig::default());
        let mut pos = Position::new(10.0, 100.0, Utc::now());
        pos.stop_loss = stop_loss;
        pos.take_profit = take_profit;
        ledger.positions.insert("SYM".to_string(), pos);
        ledger
    }

    #[test]
    fn test_check_thresholds() {
        let mut pos = Position::new(1.0, 100.0, Utc::now());
        assert_eq!(check(&pos, 50.0), None);

        pos.stop_loss = Some(95.0);
        pos.take_profit = Some(110.0);
        assert_eq!(check(&pos, 95.0), Some(ExitTrigger::StopLoss));
        assert_eq!(check(&pos, 94.0), Some(ExitTrigger::StopLoss));
        assert_eq!(check(&pos, 100.0), None);
        assert_eq!(check(&pos, 110.0), Some(ExitTrigger::TakeProfit));
    }

    #[test]
    fn test_stop_loss_closes_once_and_clears() {
        let engine = OrderEngine::new(NoSlippage);
        let mut ledger = protected_ledger(Some(95.0), None);
        ledger.record_price("SYM", 94.5, Utc::now());

        let exit = enforce(&engine, &mut ledger, "SYM", Utc::now()).unwrap();
        assert_eq!(exit.trigger, ExitTrigger::StopLoss);
        let order = exit.result.unwrap();
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.quantity, 10.0);
        assert_eq!(order.tag.as_deref(), Some("stop-loss"));
        assert!(ledger.position("SYM").is_none());

        // Nothing left to fire
        assert!(enforce(&engine, &mut ledger, "SYM", Utc::now()).is_none());
        assert_eq!(ledger.orders.len(), 1);
    }

    #[test]
    fn test_take_profit() {
        let engine = OrderEngine::new(NoSlippage);
        let mut ledger = protected_ledger(Some(90.0), Some(120.0));
        ledger.record_price("SYM", 125.0, Utc::now());

        let exit = enforce(&engine, &mut ledger, "SYM", Utc::now()).unwrap();
        assert_eq!(exit.trigger, ExitTrigger::TakeProfit);
        assert!(exit.result.is_ok());
    }

    #[test]
    fn test_no_action_without_thresholds_or_position() {
        let engine = OrderEngine::new(NoSlippage);

        let mut ledger = protected_ledger(None, None);
        ledger.record_price("SYM", 1.0, Utc::now());
        assert!(enforce(&engine, &mut ledger, "SYM", Utc::now()).is_none());

        ledger.record_price("GONE", 1.0, Utc::now());
        assert!(enforce(&engine, &mut ledger, "GONE", Utc::now()).is_none());
    }

    #[test]
    fn test_percent_thresholds() {
        let (sl, tp) = percent_thresholds(200.0, Some(2.0), Some(5.0));
        assert!((sl.unwrap() - 196.0).abs() < 1e-9);
        assert!((tp.unwrap() - 210.0).abs() < 1e-9);

        assert_eq!(percent_thresholds(200.0, None, None), (None, None));
    }

    #[test]
    fn test_validate_thresholds() {
        assert!(validate_thresholds(None, None).is_ok());
        assert!(validate_thresholds(Some(90.0), Some(110.0)).is_ok());
        assert!(validate_thresholds(Some(0.0), None).is_err());
        assert!(validate_thresholds(None, Some(f64::INFINITY)).is_err());
        assert!(validate_thresholds(Some(100.0), Some(100.0)).is_err());
    }
}
