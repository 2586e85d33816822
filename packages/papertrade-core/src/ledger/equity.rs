//! Equity snapshots: cash plus mark-to-market value of open positions.

use super::Ledger;
use crate::types::EquitySnapshot;
use chrono::{DateTime, Utc};

/// Maximum number of snapshots kept in the ledger.
pub const EQUITY_HISTORY_CAP: usize = 500;

/// A recompute closer than this to the latest snapshot replaces it.
pub const EQUITY_SAMPLE_INTERVAL_MS: i64 = 1_000;

/// Value the ledger at its cached prices.
///
/// Positions without a cached price are valued at their average cost.
pub fn snapshot(ledger: &Ledger, now: DateTime<Utc>) -> EquitySnapshot {
    let holdings_value: f64 = ledger
        .positions
        .iter()
        .map(|(symbol, pos)| pos.quantity * ledger.price(symbol).unwrap_or(pos.average_price))
        .sum();
    let cash = ledger.wallet.cash;

    EquitySnapshot {
        timestamp: now,
        cash,
        holdings_value,
        equity: cash + holdings_value,
    }
}

/// Recompute the latest snapshot and store it in the bounded history.
pub fn record(ledger: &mut Ledger, now: DateTime<Utc>) -> EquitySnapshot {
    let snap = snapshot(ledger, now);
    let history = &mut ledger.equity_history;

    match history.last_mut() {
        Some(last) if (now - last.timestamp).num_milliseconds() < EQUITY_SAMPLE_INTERVAL_MS => {
            *last = snap;
        }
        _ => history.push(snap),
    }

    if history.len() > EQUITY_HISTORY_CAP {
        let excess = history.len() - EQUITY_HISTORY_CAP;
        history.drain(..excess);
    }

    snap
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;
    use crate::types::{EngineConfig, PriceEntry};
    use chrono::TimeDelta;

    fn ledger_with_position() -> Ledger {
        let mut ledger = Ledger::new(EngineConfig::default());
        ledger.wallet.cash = 50_000.0;
        ledger
            .positions
            .insert("SYM".to_string(), Position::new(10.0, 100.0, Utc::now()));
        ledger
    }

    #[test]
    fn test_snapshot_uses_cached_price() {
        let mut ledger = ledger_with_position();
        ledger.prices.insert(
            "SYM".to_string(),
            PriceEntry {
                price: 120.0,
                timestamp: Utc::now(),
            },
        );

        let snap = snapshot(&ledger, Utc::now());
        assert_eq!(snap.cash, 50_000.0);
        assert_eq!(snap.holdings_value, 1_200.0);
        assert_eq!(snap.equity, 51_200.0);
    }

    #[test]
    fn test_snapshot_falls_back_to_average_cost() {
        let ledger = ledger_with_position();
        let snap = snapshot(&ledger, Utc::now());
        assert_eq!(snap.holdings_value, 1_000.0);
    }

    #[test]
    fn test_record_replaces_recent_snapshot() {
        let mut ledger = ledger_with_position();
        let now = Utc::now();

        record(&mut ledger, now);
        ledger.wallet.cash = 40_000.0;
        record(&mut ledger, now + TimeDelta::milliseconds(200));

        assert_eq!(ledger.equity_history.len(), 1);
        assert_eq!(ledger.equity_history[0].cash, 40_000.0);

        record(&mut ledger, now + TimeDelta::seconds(5));
        assert_eq!(ledger.equity_history.len(), 2);
    }

    #[test]
    fn test_history_is_capped() {
        let mut ledger = ledger_with_position();
        let start = Utc::now();

        for i in 0..(EQUITY_HISTORY_CAP + 25) {
            record(&mut ledger, start + TimeDelta::seconds(i as i64 * 2));
        }

        assert_eq!(ledger.equity_history.len(), EQUITY_HISTORY_CAP);
        assert_eq!(
            ledger.equity_history[0].timestamp,
            start + TimeDelta::seconds(50)
        );
    }
}
