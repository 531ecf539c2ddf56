//! True Range and Average True Range.
//!
//! TR[i] = max(H[i] - L[i], |H[i] - C[i-1]|, |L[i] - C[i-1]|), undefined at i = 0.
//! ATR(n)[i] = mean(TR[i-n+1..=i]), a simple rolling mean.
//! Warmup: ATR(n) is undefined for the first n bars.

use crate::domain::error::ForecastError;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_ATR_PERIOD: usize = 14;

pub fn calculate_true_range(bars: &[OhlcvBar]) -> IndicatorSeries {
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| IndicatorPoint {
            date: bar.date,
            value: (i > 0).then(|| bar.true_range(bars[i - 1].close)),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::TrueRange,
        values,
    }
}

pub fn calculate_atr(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let tr = calculate_true_range(bars);

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let value = (period > 0 && i >= period).then(|| {
                let sum: f64 = tr.values[i + 1 - period..=i]
                    .iter()
                    .filter_map(|p| p.value)
                    .sum();
                sum / period as f64
            });
            IndicatorPoint {
                date: bar.date,
                value,
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}

/// ATR as of the final bar.
///
/// Needs `period + 1` bars: one seed bar for the first True Range plus a
/// full window of True Range values.
pub fn current_atr(bars: &[OhlcvBar], period: usize) -> Result<f64, ForecastError> {
    let required = period + 1;
    if bars.len() < required || period == 0 {
        return Err(ForecastError::insufficient(required, bars.len()));
    }
    let window = &bars[bars.len() - required..];
    let sum: f64 = window
        .windows(2)
        .map(|pair| pair[1].true_range(pair[0].close))
        .sum();
    Ok(sum / period as f64)
}
