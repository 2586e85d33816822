//! Simulated broker: the single entry point for ledger mutations.
//!
//! Every public operation runs as one [`LedgerStore::write_atomic`]
//! transaction, so a price tick, the protective check it triggers and the
//! resulting closing order commit together. Notifications go out after the
//! transaction commits.

use crate::engine::{OrderEngine, Rejection};
use crate::ledger::{Ledger, LedgerStore};
use crate::notify::{EventBus, TradeEvent};
use crate::position::{Position, PositionView};
use crate::protective::{self, ProtectiveExit};
use crate::types::{normalize_symbol, EngineConfig, EquitySnapshot, OrderRecord, OrderRequest};
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::broadcast;

/// Paper brokerage account.
#[derive(Debug)]
pub struct PaperBroker {
    store: LedgerStore,
    engine: OrderEngine,
    bus: EventBus,
}

impl PaperBroker {
    pub fn new(store: LedgerStore, engine: OrderEngine) -> Self {
        Self {
            store,
            engine,
            bus: EventBus::default(),
        }
    }

    /// In-memory account with random slippage.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(LedgerStore::in_memory(config), OrderEngine::default())
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Receive trade notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        self.bus.subscribe()
    }

    /// Price feed ingress: cache a price and enforce protective thresholds.
    pub fn set_price(&self, symbol: &str, price: f64) -> Result<Option<ProtectiveExit>> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(Error::InvalidOperation("Symbol is empty".to_string()));
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(Error::InvalidOperation(format!(
                "Price for {} must be positive, got {}",
                symbol, price
            )));
        }

        let exit = self.store.write_atomic(|ledger| {
            let now = Utc::now();
            ledger.record_price(&symbol, price, now);
            Ok::<_, Infallible>(protective::enforce(&self.engine, ledger, &symbol, now))
        });
        let exit = exit.unwrap_or_else(|never| match never {});

        tracing::debug!(symbol = %symbol, price, "Price updated");
        if let Some(exit) = &exit {
            self.publish_exit(exit);
        }
        Ok(exit)
    }

    /// Submit an order.
    pub fn submit(&self, request: OrderRequest) -> std::result::Result<OrderRecord, Rejection> {
        let result = self
            .store
            .write_atomic(|ledger| self.engine.execute(ledger, &request, Utc::now()));

        match &result {
            Ok(order) => self.bus.publish(TradeEvent::OrderFilled {
                order: order.clone(),
            }),
            Err(rejection) => {
                tracing::warn!(
                    symbol = %request.symbol,
                    side = %request.side,
                    error = %rejection,
                    "Order rejected"
                );
                self.bus.publish(TradeEvent::OrderRejected {
                    symbol: normalize_symbol(&request.symbol),
                    side: request.side,
                    reason: rejection.reason(),
                    message: rejection.to_string(),
                });
            }
        }
        result
    }

    /// Arm absolute stop-loss / take-profit thresholds on a held position.
    ///
    /// `None` leaves that threshold unarmed. The thresholds are checked
    /// against the cached price right away.
    pub fn set_protection(
        &self,
        symbol: &str,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> std::result::Result<Option<ProtectiveExit>, Rejection> {
        let symbol = normalize_symbol(symbol);
        protective::validate_thresholds(stop_loss, take_profit)?;

        let exit = self.store.write_atomic(|ledger| {
            let pos = ledger.positions.get_mut(&symbol).ok_or_else(|| {
                Rejection::InvalidInput(format!("No open position in {}", symbol))
            })?;
            pos.stop_loss = stop_loss;
            pos.take_profit = take_profit;
            Ok(protective::enforce(&self.engine, ledger, &symbol, Utc::now()))
        })?;

        tracing::info!(symbol = %symbol, ?stop_loss, ?take_profit, "Protection armed");
        if let Some(exit) = &exit {
            self.publish_exit(exit);
        }
        Ok(exit)
    }

    /// Re-derive percentage thresholds from the current average cost and enforce them.
    ///
    /// Returns `None` when the position is gone or no threshold was crossed.
    pub fn protect_by_percent(
        &self,
        symbol: &str,
        stop_loss_pct: Option<f64>,
        take_profit_pct: Option<f64>,
    ) -> Option<ProtectiveExit> {
        let symbol = normalize_symbol(symbol);

        let exit = self.store.write_atomic(|ledger| {
            let Some(pos) = ledger.positions.get_mut(&symbol) else {
                return Ok::<_, Infallible>(None);
            };
            let (stop_loss, take_profit) =
                protective::percent_thresholds(pos.average_price, stop_loss_pct, take_profit_pct);
            pos.stop_loss = stop_loss;
            pos.take_profit = take_profit;
            Ok(protective::enforce(&self.engine, ledger, &symbol, Utc::now()))
        });
        let exit = exit.unwrap_or_else(|never| match never {});

        if let Some(exit) = &exit {
            self.publish_exit(exit);
        }
        exit
    }

    fn publish_exit(&self, exit: &ProtectiveExit) {
        self.bus.publish(TradeEvent::ProtectiveExit {
            symbol: exit.symbol.clone(),
            trigger: exit.trigger,
            trigger_price: exit.trigger_price,
            order: exit.result.as_ref().ok().cloned(),
        });
        match &exit.result {
            Ok(order) => self.bus.publish(TradeEvent::OrderFilled {
                order: order.clone(),
            }),
            Err(rejection) => self.bus.publish(TradeEvent::OrderRejected {
                symbol: exit.symbol.clone(),
                side: crate::types::Side::Sell,
                reason: rejection.reason(),
                message: rejection.to_string(),
            }),
        }
    }

    /// Add a symbol to the watchlist.
    pub fn watch(&self, symbol: &str) -> bool {
        self.store
            .write_atomic(|ledger| Ok::<_, Infallible>(ledger.watch(symbol)))
            .unwrap_or_else(|never| match never {})
    }

    /// Remove a symbol from the watchlist.
    pub fn unwatch(&self, symbol: &str) -> bool {
        self.store
            .write_atomic(|ledger| Ok::<_, Infallible>(ledger.unwatch(symbol)))
            .unwrap_or_else(|never| match never {})
    }

    pub fn watchlist(&self) -> Vec<String> {
        self.store.with_ledger(|ledger| ledger.watchlist.clone())
    }

    pub fn cash(&self) -> f64 {
        self.store.with_ledger(|ledger| ledger.wallet.cash)
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        let symbol = normalize_symbol(symbol);
        self.store.with_ledger(|ledger| ledger.price(&symbol))
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        let symbol = normalize_symbol(symbol);
        self.store.with_ledger(|ledger| ledger.position(&symbol).cloned())
    }

    /// Order history, newest first.
    pub fn orders(&self) -> Vec<OrderRecord> {
        self.store.with_ledger(|ledger| ledger.orders.clone())
    }

    /// Snapshot of the whole ledger.
    pub fn snapshot(&self) -> Ledger {
        self.store.read()
    }

    /// Recompute and store the latest equity snapshot.
    pub fn record_equity(&self) -> EquitySnapshot {
        self.store
            .write_atomic(|_| Ok::<_, Infallible>(()))
            .unwrap_or_else(|never| match never {});
        self.store
            .with_ledger(|ledger| ledger.equity_history.last().copied())
            .unwrap_or_else(|| self.store.with_ledger(Ledger::equity))
    }

    /// Account summary valued at cached prices.
    pub fn status(&self) -> AccountStatus {
        self.store.with_ledger(AccountStatus::from_ledger)
    }

    pub fn export_snapshot(&self) -> Result<String> {
        self.store.export_snapshot()
    }

    pub fn import_snapshot(&self, json: &str) -> Result<()> {
        self.store.import_snapshot(json)
    }

    pub fn reset_session(&self) -> Result<()> {
        self.store.reset_session()
    }
}

/// Account summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    pub currency: String,
    pub starting_balance: f64,
    pub cash: f64,
    pub holdings_value: f64,
    pub equity: f64,
    pub total_return_percent: f64,
    pub positions: Vec<PositionView>,
    pub order_count: usize,
    pub watchlist: Vec<String>,
}

impl AccountStatus {
    pub fn from_ledger(ledger: &Ledger) -> Self {
        let equity = ledger.equity();
        let starting_balance = ledger.config.starting_balance;
        let total_return_percent = if starting_balance > 0.0 {
            ((equity.equity - starting_balance) / starting_balance) * 100.0
        } else {
            0.0
        };

        Self {
            currency: ledger.config.currency.clone(),
            starting_balance,
            cash: equity.cash,
            holdings_value: equity.holdings_value,
            equity: equity.equity,
            total_return_percent,
            positions: ledger
                .positions
                .iter()
                .map(|(symbol, pos)| pos.view(symbol, ledger.price(symbol)))
                .collect(),
            order_count: ledger.orders.len(),
            watchlist: ledger.watchlist.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NoSlippage, RejectReason};
    use crate::protective::ExitTrigger;
    use crate::types::{OrderSize, Side};
    use approx::assert_abs_diff_eq;

    fn broker() -> PaperBroker {
        PaperBroker::new(
            LedgerStore::in_memory(EngineConfig::default()),
            OrderEngine::new(NoSlippage),
        )
    }

    #[test]
    fn test_submit_publishes_fill() {
        let broker = broker();
        let mut rx = broker.subscribe();
        broker.set_price("SYM", 100.0).unwrap();

        let order = broker
            .submit(OrderRequest::buy("sym", OrderSize::Quantity(10.0)))
            .unwrap();

        assert_abs_diff_eq!(broker.cash(), 98_998.81, epsilon = 1e-6);
        match rx.try_recv().unwrap() {
            TradeEvent::OrderFilled { order: published } => assert_eq!(published, order),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_rejection_publishes_failure_and_keeps_ledger() {
        let broker = broker();
        let mut rx = broker.subscribe();
        let before = broker.snapshot();

        let err = broker
            .submit(OrderRequest::sell("SYM", OrderSize::Quantity(1.0)))
            .unwrap_err();
        assert_eq!(err.reason(), RejectReason::PriceUnavailable);

        let after = broker.snapshot();
        assert_eq!(after.wallet, before.wallet);
        assert_eq!(after.orders, before.orders);
        assert!(matches!(
            rx.try_recv().unwrap(),
            TradeEvent::OrderRejected {
                reason: RejectReason::PriceUnavailable,
                ..
            }
        ));
    }

    #[test]
    fn test_stop_loss_tick_closes_exactly_once() {
        let broker = broker();
        broker.set_price("SYM", 100.0).unwrap();
        broker
            .submit(OrderRequest::buy("SYM", OrderSize::Quantity(10.0)).with_stop_loss(95.0))
            .unwrap();
        let mut rx = broker.subscribe();

        assert!(broker.set_price("SYM", 97.0).unwrap().is_none());
        let exit = broker.set_price("SYM", 95.0).unwrap().unwrap();
        assert_eq!(exit.trigger, ExitTrigger::StopLoss);
        assert!(broker.set_price("SYM", 90.0).unwrap().is_none());

        let sells: Vec<_> = broker
            .orders()
            .into_iter()
            .filter(|o| o.side == Side::Sell)
            .collect();
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].tag.as_deref(), Some("stop-loss"));
        assert!(broker.position("SYM").is_none());

        assert!(matches!(
            rx.try_recv().unwrap(),
            TradeEvent::ProtectiveExit {
                trigger: ExitTrigger::StopLoss,
                ..
            }
        ));
        assert!(matches!(rx.try_recv().unwrap(), TradeEvent::OrderFilled { .. }));
    }

    #[test]
    fn test_set_protection_requires_position() {
        let broker = broker();
        let err = broker.set_protection("SYM", Some(90.0), None).unwrap_err();
        assert_eq!(err.reason(), RejectReason::InvalidInput);
    }

    #[test]
    fn test_set_protection_already_crossed_fires_immediately() {
        let broker = broker();
        broker.set_price("SYM", 100.0).unwrap();
        broker
            .submit(OrderRequest::buy("SYM", OrderSize::Quantity(1.0)))
            .unwrap();

        let exit = broker.set_protection("SYM", None, Some(99.0)).unwrap().unwrap();
        assert_eq!(exit.trigger, ExitTrigger::TakeProfit);
        assert!(broker.position("SYM").is_none());
    }

    #[test]
    fn test_protect_by_percent_tracks_average_cost() {
        let broker = broker();
        broker.set_price("SYM", 100.0).unwrap();
        broker
            .submit(OrderRequest::buy("SYM", OrderSize::Quantity(10.0)))
            .unwrap();

        assert!(broker.protect_by_percent("SYM", Some(5.0), Some(10.0)).is_none());
        let pos = broker.position("SYM").unwrap();
        assert_abs_diff_eq!(pos.stop_loss.unwrap(), 95.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pos.take_profit.unwrap(), 110.0, epsilon = 1e-9);

        // Averaging down moves the thresholds
        broker.set_price("SYM", 96.0).unwrap();
        broker
            .submit(OrderRequest::buy("SYM", OrderSize::Quantity(10.0)))
            .unwrap();
        assert!(broker.protect_by_percent("SYM", Some(5.0), Some(10.0)).is_none());
        let pos = broker.position("SYM").unwrap();
        assert_abs_diff_eq!(pos.average_price, 98.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pos.stop_loss.unwrap(), 93.1, epsilon = 1e-9);

        let exit = broker.set_price("SYM", 93.0).unwrap().unwrap();
        assert_eq!(exit.trigger, ExitTrigger::StopLoss);
        assert!(broker.protect_by_percent("SYM", Some(5.0), Some(10.0)).is_none());
    }

    #[test]
    fn test_invalid_price_is_rejected() {
        let broker = broker();
        assert!(broker.set_price("SYM", 0.0).is_err());
        assert!(broker.set_price("SYM", f64::NAN).is_err());
        assert!(broker.set_price("  ", 10.0).is_err());
        assert!(broker.price("SYM").is_none());
    }

    #[test]
    fn test_status_values_positions() {
        let broker = broker();
        broker.set_price("SYM", 100.0).unwrap();
        broker
            .submit(OrderRequest::buy("SYM", OrderSize::Quantity(10.0)))
            .unwrap();
        broker.set_price("SYM", 110.0).unwrap();
        broker.watch("SYM");

        let status = broker.status();
        assert_eq!(status.positions.len(), 1);
        assert_abs_diff_eq!(status.holdings_value, 1_100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(status.equity, 98_998.81 + 1_100.0, epsilon = 1e-6);
        assert_eq!(status.order_count, 1);
        assert_eq!(status.watchlist, vec!["SYM"]);
    }

    #[test]
    fn test_record_equity() {
        let broker = broker();
        let snap = broker.record_equity();
        assert_abs_diff_eq!(snap.equity, 100_000.0);
    }
}
