//! Account performance summary.

use crate::analytics;
use crate::ledger::Ledger;
use crate::types::Side;
use serde::{Deserialize, Serialize};

/// Performance summary computed from a ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub starting_balance: f64,
    /// Cash plus holdings at cached prices
    pub current_equity: f64,
    /// Current equity against the starting balance
    pub total_return_percent: f64,
    /// Chained return over the equity history
    pub time_weighted_return_percent: f64,
    /// Largest peak-to-trough decline in the equity history
    pub max_drawdown_percent: f64,
    /// Volatility of snapshot returns, annualized from the mean spacing
    /// between snapshots. `None` until there are enough spaced snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility_percent: Option<f64>,
    pub buy_count: usize,
    pub sell_count: usize,
    /// Sells with a positive realized P&L
    pub winning_sells: usize,
    /// Sells with a negative realized P&L
    pub losing_sells: usize,
    pub total_fees: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub position_count: usize,
    pub positions_in_profit: usize,
    pub positions_in_loss: usize,
}

impl PerformanceReport {
    pub fn from_ledger(ledger: &Ledger) -> Self {
        let starting_balance = ledger.config.starting_balance;
        let current_equity = ledger.equity().equity;
        let total_return_percent = if starting_balance > 0.0 {
            ((current_equity - starting_balance) / starting_balance) * 100.0
        } else {
            0.0
        };

        let curve: Vec<f64> = ledger.equity_history.iter().map(|s| s.equity).collect();
        let volatility_percent = match (ledger.equity_history.first(), ledger.equity_history.last()) {
            (Some(first), Some(last)) if curve.len() > 1 => {
                let span = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
                analytics::annualized_volatility_sampled(&curve, span / (curve.len() - 1) as f64)
            }
            _ => None,
        };

        let buy_count = ledger.orders.iter().filter(|o| o.side == Side::Buy).count();
        let sell_count = ledger.orders.len() - buy_count;
        let realized: Vec<f64> = ledger.orders.iter().filter_map(|o| o.realized_pnl).collect();

        let unrealized: Vec<f64> = ledger
            .positions
            .iter()
            .filter_map(|(symbol, pos)| pos.view(symbol, ledger.price(symbol)).unrealized_pnl)
            .collect();

        Self {
            starting_balance,
            current_equity,
            total_return_percent,
            time_weighted_return_percent: analytics::time_weighted_return(&curve),
            max_drawdown_percent: analytics::max_drawdown(&curve),
            volatility_percent,
            buy_count,
            sell_count,
            winning_sells: realized.iter().filter(|&&p| p > 0.0).count(),
            losing_sells: realized.iter().filter(|&&p| p < 0.0).count(),
            total_fees: ledger.orders.iter().map(|o| o.total_charges).sum(),
            realized_pnl: realized.iter().sum(),
            unrealized_pnl: unrealized.iter().sum(),
            position_count: ledger.positions.len(),
            positions_in_profit: unrealized.iter().filter(|&&p| p > 0.0).count(),
            positions_in_loss: unrealized.iter().filter(|&&p| p < 0.0).count(),
        }
    }
}
