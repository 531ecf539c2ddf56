//! Day-trade reference prices for the current session.
//!
//! The daily range estimate is the mean high-low spread of recent completed
//! sessions. Buy levels sit below the session open and the last trade, the
//! sell level above the last trade, each a fixed share of that range.

use crate::domain::error::ForecastError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::tick::TickTable;

#[derive(Debug, Clone, PartialEq)]
pub struct IntradayConfig {
    pub range_window: usize,
    pub strong_buy_coefficient: f64,
    pub dip_buy_coefficient: f64,
    pub sell_coefficient: f64,
}

impl Default for IntradayConfig {
    fn default() -> Self {
        Self {
            range_window: 5,
            strong_buy_coefficient: 0.1,
            dip_buy_coefficient: 0.45,
            sell_coefficient: 0.75,
        }
    }
}

/// Opening and latest price of the session in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionQuote {
    pub open: f64,
    pub last: f64,
}

impl SessionQuote {
    /// From chronological intraday bars: first open, last close.
    pub fn from_bars(bars: &[OhlcvBar]) -> Option<Self> {
        Some(Self {
            open: bars.first()?.open,
            last: bars.last()?.close,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntradayAdvice {
    pub quote: SessionQuote,
    pub previous_close: f64,
    /// Last trade vs previous close, in percent.
    pub change_pct: f64,
    /// Session open vs previous close, in percent.
    pub gap_pct: f64,
    pub range_estimate: f64,
    /// Pullback to the open.
    pub strong_buy: f64,
    /// Oversold entry below the last trade.
    pub dip_buy: f64,
    pub sell_target: f64,
}

pub fn intraday_advice(
    quote: SessionQuote,
    daily: &[OhlcvBar],
    ticks: &TickTable,
    config: &IntradayConfig,
) -> Result<IntradayAdvice, ForecastError> {
    let previous = daily
        .last()
        .ok_or_else(|| ForecastError::insufficient(1, 0))?;
    let previous_close = previous.close;

    let start = daily.len().saturating_sub(config.range_window.max(1));
    let recent = &daily[start..];
    let range_estimate =
        recent.iter().map(|b| b.high - b.low).sum::<f64>() / recent.len() as f64;

    let snap = |price: f64| {
        if price > 0.0 {
            ticks.normalize(price)
        } else {
            price
        }
    };

    Ok(IntradayAdvice {
        quote,
        previous_close,
        change_pct: (quote.last / previous_close - 1.0) * 100.0,
        gap_pct: (quote.open / previous_close - 1.0) * 100.0,
        range_estimate,
        strong_buy: snap(quote.open - range_estimate * config.strong_buy_coefficient),
        dip_buy: snap(quote.last - range_estimate * config.dip_buy_coefficient),
        sell_target: snap(quote.last + range_estimate * config.sell_coefficient),
    })
}
