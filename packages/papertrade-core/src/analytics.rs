//! Statistics over price and equity series.
//!
//! Used by the session filters (trend, volatility) and the performance report.

/// Trading days per year used to annualize daily volatility.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Seconds of trading per year: 252 sessions of 6h15m.
pub const TRADING_SECONDS_PER_YEAR: f64 = TRADING_DAYS_PER_YEAR * 6.25 * 3600.0;

/// Simple moving average of the last `period` values.
///
/// Returns `None` when `period` is zero or exceeds the series length.
///
/// # Example
///
/// ```rust
/// use papertrade_core::analytics::sma_last;
///
/// let closes = vec![10.0, 11.0, 12.0, 11.0, 10.0];
/// assert_eq!(sma_last(&closes, 3), Some(11.0));
/// assert_eq!(sma_last(&closes, 6), None);
/// ```
pub fn sma_last(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || period > data.len() {
        return None;
    }
    let window = &data[data.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Simple period-over-period returns (0.01 = 1%).
///
/// Pairs with a non-positive starting value are skipped.
pub fn returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Annualized volatility of a daily close series, in percent.
///
/// Returns `None` with fewer than 3 closes (fewer than 2 returns).
pub fn annualized_volatility(closes: &[f64]) -> Option<f64> {
    if closes.len() < 3 {
        return None;
    }
    let daily = returns(closes);
    if daily.len() < 2 {
        return None;
    }
    Some(std_dev(&daily) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
}

/// Annualized volatility of a series sampled every `interval_secs` of
/// trading time, in percent.
///
/// Returns `None` with fewer than 2 returns or a non-positive interval.
pub fn annualized_volatility_sampled(values: &[f64], interval_secs: f64) -> Option<f64> {
    if !(interval_secs.is_finite() && interval_secs > 0.0) {
        return None;
    }
    let period_returns = returns(values);
    if period_returns.len() < 2 {
        return None;
    }
    let periods_per_year = TRADING_SECONDS_PER_YEAR / interval_secs;
    Some(std_dev(&period_returns) * periods_per_year.sqrt() * 100.0)
}

/// Largest peak-to-trough decline of a value series, in percent.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0;

    for &value in values {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let drawdown = (peak - value) / peak;
            if drawdown > worst {
                worst = drawdown;
            }
        }
    }

    worst * 100.0
}

/// Time-weighted return over a series of portfolio values, in percent.
pub fn time_weighted_return(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let growth: f64 = values
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0])
        .product();

    (growth - 1.0) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma_last() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma_last(&closes, 5), Some(3.0));
        assert_eq!(sma_last(&closes, 2), Some(4.5));
        assert_eq!(sma_last(&closes, 0), None);
        assert_eq!(sma_last(&[], 1), None);
    }

    #[test]
    fn test_returns_skip_non_positive_base() {
        let r = returns(&[100.0, 110.0, 0.0, 5.0]);
        assert_eq!(r.len(), 2);
        assert_relative_eq!(r[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(r[1], -1.0);
    }

    #[test]
    fn test_annualized_volatility() {
        assert!(annualized_volatility(&[100.0, 101.0]).is_none());

        let flat = annualized_volatility(&[100.0, 100.0, 100.0, 100.0]).unwrap();
        assert_relative_eq!(flat, 0.0);

        // Alternating +1% / -1% days
        let closes = [100.0, 101.0, 99.99, 100.9899, 99.980001];
        let vol = annualized_volatility(&closes).unwrap();
        assert!(vol > 15.0 && vol < 17.0, "vol = {vol}");
    }

    #[test]
    fn test_annualized_volatility_sampled() {
        let closes = [100.0, 101.0, 99.99, 100.9899, 99.980001];
        // One sample per trading day matches the daily formula
        let daily = annualized_volatility_sampled(&closes, 6.25 * 3600.0).unwrap();
        assert_relative_eq!(daily, annualized_volatility(&closes).unwrap(), epsilon = 1e-9);

        // Same moves every 5 seconds are far more volatile per year
        let fast = annualized_volatility_sampled(&closes, 5.0).unwrap();
        assert_relative_eq!(fast, daily * (6.25_f64 * 3600.0 / 5.0).sqrt(), epsilon = 1e-6);

        assert!(annualized_volatility_sampled(&closes, 0.0).is_none());
        assert!(annualized_volatility_sampled(&[100.0, 101.0], 5.0).is_none());
    }

    #[test]
    fn test_max_drawdown() {
        let values = [100.0, 120.0, 90.0, 130.0, 117.0];
        // Peak 120 -> trough 90
        assert_relative_eq!(max_drawdown(&values), 25.0, epsilon = 1e-9);
        assert_eq!(max_drawdown(&[100.0, 110.0, 120.0]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn test_time_weighted_return() {
        let values = [10_000.0, 10_500.0, 10_200.0, 11_000.0];
        assert_relative_eq!(time_weighted_return(&values), 10.0, epsilon = 1e-9);
        assert_eq!(time_weighted_return(&[5.0]), 0.0);
    }
}
