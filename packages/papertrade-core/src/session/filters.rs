//! Candidate screening: price range, volume tier, volatility tier, trend.

use super::config::{FilterConfig, Tier, Trend};
use super::market::Quote;
use crate::analytics::{annualized_volatility, sma_last};
use std::fmt;

/// Volume at or above which an instrument is medium volume.
pub const MEDIUM_VOLUME: f64 = 100_000.0;
/// Volume at or above which an instrument is high volume.
pub const HIGH_VOLUME: f64 = 1_000_000.0;

/// Annualized volatility (%) at or above which an instrument is medium volatility.
pub const MEDIUM_VOLATILITY: f64 = 20.0;
/// Annualized volatility (%) at or above which an instrument is high volatility.
pub const HIGH_VOLATILITY: f64 = 40.0;

/// Intraday range (%) thresholds used when the close history is too short.
pub const MEDIUM_RANGE: f64 = 1.5;
pub const HIGH_RANGE: f64 = 3.0;

/// Longest SMA used for the trend.
pub const TREND_PERIOD: usize = 20;
/// Closes needed before the SMA is trusted over the day change.
pub const MIN_TREND_CLOSES: usize = 5;

/// Why a candidate was screened out.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterMiss {
    PriceRange { price: f64 },
    Volume { tier: Tier, required: Tier },
    Volatility { tier: Tier, required: Tier },
    Trend { trend: Trend, required: Trend },
}

impl fmt::Display for FilterMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMiss::PriceRange { price } => write!(f, "price {:.2} outside range", price),
            FilterMiss::Volume { tier, required } => {
                write!(f, "{} volume, need at least {}", tier, required)
            }
            FilterMiss::Volatility { tier, required } => {
                write!(f, "{} volatility, need {}", tier, required)
            }
            FilterMiss::Trend { trend, required } => write!(f, "{} trend, need {}", trend, required),
        }
    }
}

pub fn volume_tier(volume: f64) -> Tier {
    if volume >= HIGH_VOLUME {
        Tier::High
    } else if volume >= MEDIUM_VOLUME {
        Tier::Medium
    } else {
        Tier::Low
    }
}

/// Volatility bucket from the close history, or the intraday range when
/// fewer than 3 closes are known.
pub fn volatility_tier(quote: &Quote) -> Tier {
    if let Some(vol) = annualized_volatility(&quote.closes) {
        return bucket(vol, MEDIUM_VOLATILITY, HIGH_VOLATILITY);
    }

    let range_pct = if quote.price > 0.0 && quote.day_high > quote.day_low {
        (quote.day_high - quote.day_low) / quote.price * 100.0
    } else {
        0.0
    };
    bucket(range_pct, MEDIUM_RANGE, HIGH_RANGE)
}

fn bucket(value: f64, medium: f64, high: f64) -> Tier {
    if value >= high {
        Tier::High
    } else if value >= medium {
        Tier::Medium
    } else {
        Tier::Low
    }
}

/// Price against the SMA of recent closes, or the sign of the day change.
pub fn trend(quote: &Quote) -> Trend {
    let reference = (quote.closes.len() >= MIN_TREND_CLOSES)
        .then(|| sma_last(&quote.closes, quote.closes.len().min(TREND_PERIOD)))
        .flatten();

    let delta = match reference {
        Some(sma) => quote.price - sma,
        None => quote.change_percent,
    };

    if delta > 0.0 {
        Trend::Bullish
    } else if delta < 0.0 {
        Trend::Bearish
    } else {
        Trend::Neutral
    }
}

/// Where the price sits within the day's range, 0.0 at the low and 1.0 at the high.
pub fn range_position(quote: &Quote) -> f64 {
    let span = quote.day_high - quote.day_low;
    if span <= 0.0 {
        return 0.5;
    }
    ((quote.price - quote.day_low) / span).clamp(0.0, 1.0)
}

/// Apply the filters in order: price range, volume, volatility, trend.
pub fn screen(filters: &FilterConfig, quote: &Quote) -> Result<(), FilterMiss> {
    let price = quote.price;
    if filters.min_price.is_some_and(|min| price < min)
        || filters.max_price.is_some_and(|max| price > max)
    {
        return Err(FilterMiss::PriceRange { price });
    }

    if let Some(required) = filters.volume_tier {
        let tier = volume_tier(quote.volume);
        if tier < required {
            return Err(FilterMiss::Volume { tier, required });
        }
    }

    if let Some(required) = filters.volatility_tier {
        let tier = volatility_tier(quote);
        if tier != required {
            return Err(FilterMiss::Volatility { tier, required });
        }
    }

    if let Some(required) = filters.trend_bias {
        let trend = trend(quote);
        if trend != required {
            return Err(FilterMiss::Trend { trend, required });
        }
    }

    Ok(())
}
