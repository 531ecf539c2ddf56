//! Market data access port trait.
//!
//! Implementations own fetching and caching; the domain only sees validated
//! bar series and optional auxiliary series.

use crate::domain::bias::InstitutionalFlow;
use crate::domain::error::ForecastError;
use crate::domain::ohlcv::{BarSeries, OhlcvBar};

pub trait MarketDataPort {
    /// Chronological daily bars for `code`, gaps already filled.
    fn fetch_daily_bars(&self, code: &str) -> Result<BarSeries, ForecastError>;

    /// Chronological intraday bars for the current session, if any.
    fn fetch_session_bars(&self, code: &str) -> Result<Option<Vec<OhlcvBar>>, ForecastError>;

    /// Institutional net flows; `Ok(None)` when the source has none.
    fn fetch_institutional_flows(
        &self,
        code: &str,
    ) -> Result<Option<Vec<InstitutionalFlow>>, ForecastError>;

    /// Benchmark index daily bars; `Ok(None)` when not configured.
    fn fetch_benchmark_bars(&self) -> Result<Option<BarSeries>, ForecastError>;
}
