//! Percentage excursions of future highs and lows from the prior close.
//!
//! For a horizon of h days, aligned to bar t:
//! HIGHEXC(h)[t] = (max(H[t..t+h]) - C[t-1]) / C[t-1]
//! LOWEXC(h)[t]  = (min(L[t..t+h]) - C[t-1]) / C[t-1]
//! Undefined at t = 0 and for the final h - 1 bars.

use crate::domain::ohlcv::OhlcvBar;

/// Realized extremes over `days` bars starting at `start`, if all exist.
pub fn realized_extremes(bars: &[OhlcvBar], start: usize, days: usize) -> Option<(f64, f64)> {
    if days == 0 || start + days > bars.len() {
        return None;
    }
    let window = &bars[start..start + days];
    let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    Some((high, low))
}

fn excursion_at(bars: &[OhlcvBar], t: usize, days: usize) -> Option<(f64, f64)> {
    if t == 0 {
        return None;
    }
    let base = bars[t - 1].close;
    realized_extremes(bars, t, days).map(|(high, low)| ((high - base) / base, (low - base) / base))
}

/// The most recent (at most `lookback`) complete excursion samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcursionSample {
    pub high: Vec<f64>,
    pub low: Vec<f64>,
}

impl ExcursionSample {
    pub fn len(&self) -> usize {
        self.high.len()
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty()
    }
}

pub fn trailing_excursions(bars: &[OhlcvBar], days: usize, lookback: usize) -> ExcursionSample {
    if days == 0 || bars.len() <= days {
        return ExcursionSample {
            high: vec![],
            low: vec![],
        };
    }
    let last_t = bars.len() - days;
    let first_t = last_t.saturating_sub(lookback.saturating_sub(1)).max(1);

    let (high, low) = (first_t..=last_t)
        .filter_map(|t| excursion_at(bars, t, days))
        .unzip();
    ExcursionSample { high, low }
}
