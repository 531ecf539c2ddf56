//! CSV file market data adapter.
//!
//! Layout under `base_path`:
//! - `<CODE>_daily.csv`: `date,open,high,low,close,volume` (empty cells are gaps)
//! - `<CODE>_minute.csv`: `time,open,high,low,close,volume` (`YYYY-MM-DD HH:MM`)
//! - `<CODE>_flows.csv`: `date,buy,sell`

use crate::domain::bias::InstitutionalFlow;
use crate::domain::error::ForecastError;
use crate::domain::ohlcv::{forward_fill, BarSeries, OhlcvBar, RawBar};
use crate::ports::data_port::MarketDataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct CsvAdapter {
    base_path: PathBuf,
    benchmark: Option<String>,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            benchmark: None,
        }
    }

    pub fn with_benchmark(mut self, code: impl Into<String>) -> Self {
        self.benchmark = Some(code.into());
        self
    }

    fn csv_path(&self, code: &str, kind: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", code, kind))
    }
}

fn source_error(reason: String) -> ForecastError {
    ForecastError::DataSource { reason }
}

fn read_records(path: &Path) -> Result<Vec<csv::StringRecord>, ForecastError> {
    let content = fs::read_to_string(path)
        .map_err(|e| source_error(format!("failed to read {}: {}", path.display(), e)))?;
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    rdr.records()
        .map(|r| r.map_err(|e| source_error(format!("CSV parse error in {}: {}", path.display(), e))))
        .collect()
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize, name: &str) -> Result<&'r str, ForecastError> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or_else(|| source_error(format!("missing {} column", name)))
}

fn optional_price(record: &csv::StringRecord, idx: usize, name: &str) -> Result<Option<f64>, ForecastError> {
    let raw = field(record, idx, name)?;
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|e| source_error(format!("invalid {} value {:?}: {}", name, raw, e)))
}

fn optional_volume(record: &csv::StringRecord, idx: usize) -> Result<Option<i64>, ForecastError> {
    let raw = field(record, idx, "volume")?;
    if raw.is_empty() {
        return Ok(None);
    }
    // Some sources write volume as a float.
    raw.parse::<i64>()
        .or_else(|_| raw.parse::<f64>().map(|v| v.round() as i64))
        .map(Some)
        .map_err(|e| source_error(format!("invalid volume value {:?}: {}", raw, e)))
}

fn parse_date(raw: &str) -> Result<NaiveDate, ForecastError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| source_error(format!("invalid date format {:?}: {}", raw, e)))
}

fn parse_raw_bar(record: &csv::StringRecord, date: NaiveDate) -> Result<RawBar, ForecastError> {
    Ok(RawBar {
        date,
        open: optional_price(record, 1, "open")?,
        high: optional_price(record, 2, "high")?,
        low: optional_price(record, 3, "low")?,
        close: optional_price(record, 4, "close")?,
        volume: optional_volume(record, 5)?,
    })
}

pub fn read_daily_bars(path: &Path) -> Result<BarSeries, ForecastError> {
    let mut raw = Vec::new();
    for record in read_records(path)? {
        let date = parse_date(field(&record, 0, "date")?)?;
        raw.push(parse_raw_bar(&record, date)?);
    }
    raw.sort_by_key(|b| b.date);
    forward_fill(raw)
}

fn read_session_bars(path: &Path) -> Result<Vec<OhlcvBar>, ForecastError> {
    let mut rows = Vec::new();
    for record in read_records(path)? {
        let raw_time = field(&record, 0, "time")?;
        let time = NaiveDateTime::parse_from_str(raw_time, "%Y-%m-%d %H:%M")
            .map_err(|e| source_error(format!("invalid time format {:?}: {}", raw_time, e)))?;
        rows.push((time, parse_raw_bar(&record, time.date())?));
    }
    rows.sort_by_key(|(time, _)| *time);

    let mut bars = Vec::with_capacity(rows.len());
    let mut prev_close: Option<f64> = None;
    for (_, r) in rows {
        let Some(close) = r.close.or(prev_close) else {
            continue;
        };
        bars.push(OhlcvBar {
            date: r.date,
            open: r.open.unwrap_or(close),
            high: r.high.unwrap_or(close),
            low: r.low.unwrap_or(close),
            close,
            volume: r.volume.unwrap_or(0),
        });
        prev_close = Some(close);
    }
    Ok(bars)
}

fn read_flows(path: &Path) -> Result<Vec<InstitutionalFlow>, ForecastError> {
    let mut flows = Vec::new();
    for record in read_records(path)? {
        let date = parse_date(field(&record, 0, "date")?)?;
        let int = |idx: usize, name: &str| -> Result<i64, ForecastError> {
            let raw = field(&record, idx, name)?;
            raw.parse()
                .map_err(|e| source_error(format!("invalid {} value {:?}: {}", name, raw, e)))
        };
        flows.push(InstitutionalFlow {
            date,
            buy: int(1, "buy")?,
            sell: int(2, "sell")?,
        });
    }
    flows.sort_by_key(|f| f.date);
    Ok(flows)
}

impl MarketDataPort for CsvAdapter {
    fn fetch_daily_bars(&self, code: &str) -> Result<BarSeries, ForecastError> {
        let path = self.csv_path(code, "daily");
        if !path.exists() {
            return Err(ForecastError::NoData {
                code: code.to_string(),
            });
        }
        let series = read_daily_bars(&path)?;
        debug!(code, bars = series.len(), path = %path.display(), "loaded daily bars");
        Ok(series)
    }

    fn fetch_session_bars(&self, code: &str) -> Result<Option<Vec<OhlcvBar>>, ForecastError> {
        let path = self.csv_path(code, "minute");
        if !path.exists() {
            return Ok(None);
        }
        read_session_bars(&path).map(Some)
    }

    fn fetch_institutional_flows(
        &self,
        code: &str,
    ) -> Result<Option<Vec<InstitutionalFlow>>, ForecastError> {
        let path = self.csv_path(code, "flows");
        if !path.exists() {
            debug!(code, "no institutional flow file");
            return Ok(None);
        }
        read_flows(&path).map(Some)
    }

    fn fetch_benchmark_bars(&self) -> Result<Option<BarSeries>, ForecastError> {
        match &self.benchmark {
            Some(code) => {
                let path = self.csv_path(code, "daily");
                if !path.exists() {
                    debug!(benchmark = %code, "benchmark file missing");
                    return Ok(None);
                }
                read_daily_bars(&path).map(Some)
            }
            None => Ok(None),
        }
    }
}
