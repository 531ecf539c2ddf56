//! Technical indicator series used by the forecast engine.
//!
//! - `IndicatorPoint`: a single, possibly undefined, point aligned to a bar
//! - `IndicatorType`: indicator identity + parameters
//! - `IndicatorSeries`: a time series of indicator values

pub mod atr;
pub mod excursion;
pub mod stddev;

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    /// `None` until the indicator's trailing window is complete.
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    TrueRange,
    Atr(usize),
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Value at the final bar, if defined.
    pub fn last_value(&self) -> Option<f64> {
        self.values.last().and_then(|p| p.value)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::TrueRange => write!(f, "TR"),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_type_display() {
        assert_eq!(IndicatorType::Atr(14).to_string(), "ATR(14)");
        assert_eq!(IndicatorType::TrueRange.to_string(), "TR");
    }

    #[test]
    fn last_value_skips_nothing() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series = IndicatorSeries {
            indicator_type: IndicatorType::Atr(14),
            values: vec![
                IndicatorPoint { date, value: Some(1.0) },
                IndicatorPoint { date, value: None },
            ],
        };
        assert_eq!(series.last_value(), None);
    }
}
