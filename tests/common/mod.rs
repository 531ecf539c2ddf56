#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::HashMap;
use twforecast::domain::bias::InstitutionalFlow;
use twforecast::domain::error::ForecastError;
use twforecast::domain::ohlcv::BarSeries;
pub use twforecast::domain::ohlcv::OhlcvBar;
use twforecast::ports::data_port::MarketDataPort;

pub struct MockDataPort {
    pub daily: HashMap<String, Vec<OhlcvBar>>,
    pub session: HashMap<String, Vec<OhlcvBar>>,
    pub flows: HashMap<String, Vec<InstitutionalFlow>>,
    pub benchmark: Option<Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            daily: HashMap::new(),
            session: HashMap::new(),
            flows: HashMap::new(),
            benchmark: None,
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.daily.insert(code.to_string(), bars);
        self
    }

    pub fn with_session(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.session.insert(code.to_string(), bars);
        self
    }

    pub fn with_flows(mut self, code: &str, flows: Vec<InstitutionalFlow>) -> Self {
        self.flows.insert(code.to_string(), flows);
        self
    }

    pub fn with_benchmark(mut self, bars: Vec<OhlcvBar>) -> Self {
        self.benchmark = Some(bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }

    fn check(&self, code: &str) -> Result<(), ForecastError> {
        match self.errors.get(code) {
            Some(reason) => Err(ForecastError::DataSource {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl MarketDataPort for MockDataPort {
    fn fetch_daily_bars(&self, code: &str) -> Result<BarSeries, ForecastError> {
        self.check(code)?;
        match self.daily.get(code) {
            Some(bars) => BarSeries::new(bars.clone()),
            None => Err(ForecastError::NoData {
                code: code.to_string(),
            }),
        }
    }

    fn fetch_session_bars(&self, code: &str) -> Result<Option<Vec<OhlcvBar>>, ForecastError> {
        self.check(code)?;
        Ok(self.session.get(code).cloned())
    }

    fn fetch_institutional_flows(
        &self,
        code: &str,
    ) -> Result<Option<Vec<InstitutionalFlow>>, ForecastError> {
        self.check(code)?;
        Ok(self.flows.get(code).cloned())
    }

    fn fetch_benchmark_bars(&self) -> Result<Option<BarSeries>, ForecastError> {
        self.benchmark.clone().map(BarSeries::new).transpose()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Constant bars: every close is `close`, high and low one `half_range` away.
pub fn flat_bars(start_date: &str, count: usize, close: f64, half_range: f64) -> Vec<OhlcvBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| OhlcvBar {
            date: start + chrono::Duration::days(i as i64),
            open: close,
            high: close + half_range,
            low: close - half_range,
            close,
            volume: 10_000,
        })
        .collect()
}

/// Deterministic oscillating series with a slow drift and uneven ranges.
pub fn generate_bars(start_date: &str, count: usize, start_price: f64) -> Vec<OhlcvBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    let mut prev_close = start_price;
    (0..count)
        .map(|i| {
            let x = i as f64;
            let close = start_price * (1.0 + 0.03 * (x * 0.7).sin() + 0.001 * x);
            let spread = start_price * (0.005 + 0.004 * ((i % 4) as f64));
            let bar = OhlcvBar {
                date: start + chrono::Duration::days(i as i64),
                open: prev_close,
                high: close.max(prev_close) + spread,
                low: close.min(prev_close) - spread,
                close,
                volume: 10_000 + ((i * 37) % 11) as i64 * 1_000,
            };
            prev_close = close;
            bar
        })
        .collect()
}

pub fn generate_flows(start_date: &str, count: usize, net: i64) -> Vec<InstitutionalFlow> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| InstitutionalFlow {
            date: start + chrono::Duration::days(i as i64),
            buy: 5_000 + net.max(0),
            sell: 5_000 + (-net).max(0),
        })
        .collect()
}
