//! OHLCV bar representation, series validation and gap filling.

use crate::domain::error::ForecastError;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// True when open, high, low and close are all equal.
    pub fn is_flat(&self) -> bool {
        self.high == self.low && self.open == self.close && self.high == self.close
    }

    fn check(&self, index: usize) -> Result<(), ForecastError> {
        let invalid = |reason: &str| ForecastError::InvalidBar {
            index,
            reason: reason.to_string(),
        };
        for (name, v) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(invalid(&format!("{name} must be a positive finite price")));
            }
        }
        if self.high < self.low {
            return Err(invalid("high below low"));
        }
        if self.high < self.open.max(self.close) {
            return Err(invalid("high below open/close"));
        }
        if self.low > self.open.min(self.close) {
            return Err(invalid("low above open/close"));
        }
        if self.volume < 0 {
            return Err(invalid("negative volume"));
        }
        Ok(())
    }
}

/// A bar as delivered by a data source, with possibly missing fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

/// A validated, strictly chronological bar sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSeries {
    bars: Vec<OhlcvBar>,
}

impl BarSeries {
    pub fn new(bars: Vec<OhlcvBar>) -> Result<Self, ForecastError> {
        for (i, bar) in bars.iter().enumerate() {
            bar.check(i)?;
            if i > 0 && bar.date <= bars[i - 1].date {
                return Err(ForecastError::NonChronological { index: i });
            }
        }
        Ok(Self { bars })
    }

    pub fn as_slice(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&OhlcvBar> {
        self.bars.last()
    }
}

impl AsRef<[OhlcvBar]> for BarSeries {
    fn as_ref(&self) -> &[OhlcvBar] {
        &self.bars
    }
}

fn present(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

/// Gap policy for raw data.
///
/// A missing close carries the previous bar's close forward. Missing open,
/// high or low take the bar's (possibly carried) close, after which high and
/// low are widened to cover open and close. Missing volume is zero. A
/// leading bar without a close cannot be filled.
pub fn forward_fill(raw: Vec<RawBar>) -> Result<BarSeries, ForecastError> {
    let mut bars: Vec<OhlcvBar> = Vec::with_capacity(raw.len());
    let mut prev_close: Option<f64> = None;

    for (i, r) in raw.into_iter().enumerate() {
        let close = match present(r.close).or(prev_close) {
            Some(c) => c,
            None => return Err(ForecastError::UnfillableGap { index: i }),
        };

        let filled = present(r.open).is_none()
            || present(r.high).is_none()
            || present(r.low).is_none()
            || present(r.close).is_none();

        let open = present(r.open).unwrap_or(close);
        let mut high = present(r.high).unwrap_or(close);
        let mut low = present(r.low).unwrap_or(close);
        if filled {
            high = high.max(open).max(close);
            low = low.min(open).min(close);
        }

        bars.push(OhlcvBar {
            date: r.date,
            open,
            high,
            low,
            close,
            volume: r.volume.unwrap_or(0),
        });
        prev_close = Some(close);
    }

    BarSeries::new(bars)
}
