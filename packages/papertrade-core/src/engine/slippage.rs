//! Simulated execution slippage.

use crate::types::Side;
use rand::Rng;
use std::fmt::Debug;

/// Derives a fill price from the reference price.
pub trait SlippageModel: Send + Sync + Debug {
    /// Fill price for an order on `side` against `reference`.
    ///
    /// `max_fraction` is the configured upper bound of the deviation.
    fn fill_price(&self, side: Side, reference: f64, max_fraction: f64) -> f64;
}

/// Uniformly random adverse slippage in `[0, max_fraction]`.
///
/// Buys fill at or above the reference price, sells at or below it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSlippage;

impl SlippageModel for RandomSlippage {
    fn fill_price(&self, side: Side, reference: f64, max_fraction: f64) -> f64 {
        if !(max_fraction.is_finite() && max_fraction > 0.0) {
            return reference;
        }
        let fraction = rand::thread_rng().gen_range(0.0..=max_fraction);
        adverse(side, reference, fraction)
    }
}

/// Fills exactly at the reference price.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSlippage;

impl SlippageModel for NoSlippage {
    fn fill_price(&self, _side: Side, reference: f64, _max_fraction: f64) -> f64 {
        reference
    }
}

/// Always slips by the configured maximum.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorstCaseSlippage;

impl SlippageModel for WorstCaseSlippage {
    fn fill_price(&self, side: Side, reference: f64, max_fraction: f64) -> f64 {
        adverse(side, reference, max_fraction.max(0.0))
    }
}

fn adverse(side: Side, reference: f64, fraction: f64) -> f64 {
    match side {
        Side::Buy => reference * (1.0 + fraction),
        Side::Sell => reference * (1.0 - fraction),
    }
}
