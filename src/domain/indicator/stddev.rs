//! Standard deviation of daily close-to-close returns.
//!
//! r[i] = C[i] / C[i-1] - 1
//! Volatility over the last n returns is their sample stddev (n - 1
//! denominator), using fewer returns when the history is shorter.

use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_REGIME_WINDOW: usize = 20;

pub fn daily_returns(bars: &[OhlcvBar]) -> Vec<f64> {
    bars.windows(2)
        .map(|pair| pair[1].close / pair[0].close - 1.0)
        .collect()
}

fn sample_stddev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// Return volatility as of the final bar over at most `period` returns.
///
/// Short histories use whatever returns exist; `None` below two returns.
pub fn recent_return_volatility(bars: &[OhlcvBar], period: usize) -> Option<f64> {
    let returns = daily_returns(bars);
    let start = returns.len().saturating_sub(period);
    sample_stddev(&returns[start..])
}
