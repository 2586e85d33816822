//! Built-in ranking strategies for automated sessions.

use super::filters::range_position;
use super::market::Quote;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

/// How screened candidates are ordered before the daily trade cap applies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StrategyStyle {
    /// Strongest day change first
    Momentum,
    /// Weakest day change first
    MeanReversion,
    /// Closest to the day high first
    Breakout,
    /// Universe order
    Balanced,
}

/// Session strategy definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    /// Strategy identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Description of how the strategy picks instruments
    pub description: String,
    pub style: StrategyStyle,
}

impl Strategy {
    /// Order candidates best first. The sort is stable, so ties keep universe order.
    pub fn rank(&self, candidates: &mut [Quote]) {
        let key: fn(&Quote) -> f64 = match self.style {
            StrategyStyle::Momentum => |q: &Quote| -q.change_percent,
            StrategyStyle::MeanReversion => |q: &Quote| q.change_percent,
            StrategyStyle::Breakout => |q: &Quote| -range_position(q),
            StrategyStyle::Balanced => return,
        };
        candidates.sort_by(|a, b| key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal));
    }
}

fn catalog_key(id: &str) -> String {
    id.chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase()
}

/// Built-in session strategies, keyed by normalized id.
pub static BUILTIN_STRATEGIES: LazyLock<HashMap<String, Strategy>> = LazyLock::new(|| {
    let strategies = [
        Strategy {
            id: "momentum".to_string(),
            name: "Momentum".to_string(),
            description: "Buy the strongest movers of the day".to_string(),
            style: StrategyStyle::Momentum,
        },
        Strategy {
            id: "meanReversion".to_string(),
            name: "Mean Reversion".to_string(),
            description: "Buy the weakest names of the day, expecting a bounce".to_string(),
            style: StrategyStyle::MeanReversion,
        },
        Strategy {
            id: "breakout".to_string(),
            name: "Breakout".to_string(),
            description: "Buy names trading closest to their day high".to_string(),
            style: StrategyStyle::Breakout,
        },
        Strategy {
            id: "balanced".to_string(),
            name: "Balanced".to_string(),
            description: "Buy screened names in universe order".to_string(),
            style: StrategyStyle::Balanced,
        },
    ];

    strategies
        .into_iter()
        .map(|s| (catalog_key(&s.id), s))
        .collect()
});

/// List all available strategies.
pub fn list_strategies() -> Vec<Strategy> {
    BUILTIN_STRATEGIES.values().cloned().collect()
}

/// Get a strategy by id. `meanReversion`, `mean_reversion` and
/// `mean-reversion` name the same strategy.
pub fn get_strategy(id: &str) -> Option<Strategy> {
    BUILTIN_STRATEGIES.get(&catalog_key(id)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> Vec<Quote> {
        vec![
            Quote::new("A", 100.0).with_change(1.0).with_range(90.0, 110.0),
            Quote::new("B", 100.0).with_change(3.0).with_range(99.0, 101.0),
            Quote::new("C", 109.0).with_change(-2.0).with_range(90.0, 110.0),
        ]
    }

    fn symbols(quotes: &[Quote]) -> Vec<&str> {
        quotes.iter().map(|q| q.symbol.as_str()).collect()
    }

    #[test]
    fn test_list_strategies() {
        let strategies = list_strategies();
        assert_eq!(strategies.len(), 4);
    }

    #[test]
    fn test_get_strategy_accepts_spellings() {
        for id in ["meanReversion", "mean_reversion", "MEAN-REVERSION"] {
            let strategy = get_strategy(id).unwrap();
            assert_eq!(strategy.style, StrategyStyle::MeanReversion);
        }
        assert!(get_strategy("nonexistent").is_none());
    }

    #[test]
    fn test_rankings() {
        let mut quotes = universe();
        get_strategy("momentum").unwrap().rank(&mut quotes);
        assert_eq!(symbols(&quotes), vec!["B", "A", "C"]);

        let mut quotes = universe();
        get_strategy("meanReversion").unwrap().rank(&mut quotes);
        assert_eq!(symbols(&quotes), vec!["C", "A", "B"]);

        let mut quotes = universe();
        get_strategy("breakout").unwrap().rank(&mut quotes);
        assert_eq!(symbols(&quotes), vec!["C", "A", "B"]);

        let mut quotes = universe();
        get_strategy("balanced").unwrap().rank(&mut quotes);
        assert_eq!(symbols(&quotes), vec!["A", "B", "C"]);
    }
}
