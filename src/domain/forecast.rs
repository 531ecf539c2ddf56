//! Directional price targets from the historical excursion distribution.
//!
//! A target is `close * (1 + offset)`. With [`ForecastMethod::EmpiricalQuantile`]
//! the offset is a quantile of past high/low excursions from the prior close;
//! with [`ForecastMethod::AtrScaled`] it is the current ATR times the quantile
//! level. The recent return volatility picks the quantile levels, the horizon
//! picks which pair applies, and the bias factor scales the offset according
//! to [`BiasApplication`]. Prices are snapped to the tick table last.

use crate::domain::bias::{BiasFactor, BiasFactorEngine, SignalSources};
use crate::domain::error::{DegenerateInput, ForecastError};
use crate::domain::indicator::atr::{current_atr, DEFAULT_ATR_PERIOD};
use crate::domain::indicator::excursion::trailing_excursions;
use crate::domain::indicator::stddev::{recent_return_volatility, DEFAULT_REGIME_WINDOW};
use crate::domain::ohlcv::{BarSeries, OhlcvBar};
use crate::domain::tick::TickTable;
use chrono::NaiveDate;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Horizon {
    OneDay,
    FiveDay,
}

impl Horizon {
    pub const ALL: [Horizon; 2] = [Horizon::OneDay, Horizon::FiveDay];

    pub fn days(self) -> usize {
        match self {
            Horizon::OneDay => 1,
            Horizon::FiveDay => 5,
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.days())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    High,
    Low,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::High, Direction::Low];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::High => write!(f, "high"),
            Direction::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastMethod {
    /// Quantile of historical percentage excursions.
    EmpiricalQuantile,
    /// ATR times the quantile level, scaled by the square root of the horizon.
    AtrScaled,
}

/// How the bias factor scales an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasApplication {
    /// Multiply the high offset, divide the low offset: an upward bias
    /// widens upside targets and narrows downside ones.
    Asymmetric,
    /// Multiply both offsets.
    Symmetric,
    /// Leave offsets unscaled.
    Ignore,
}

impl BiasApplication {
    fn apply(self, offset: f64, bias: f64, direction: Direction) -> f64 {
        match (self, direction) {
            (BiasApplication::Ignore, _) => offset,
            (BiasApplication::Symmetric, _) | (BiasApplication::Asymmetric, Direction::High) => {
                offset * bias
            }
            (BiasApplication::Asymmetric, Direction::Low) => {
                if bias > 0.0 {
                    offset / bias
                } else {
                    offset
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatilityRegime {
    Calm,
    Volatile,
}

impl fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityRegime::Calm => write!(f, "calm"),
            VolatilityRegime::Volatile => write!(f, "volatile"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantilePair {
    pub upper: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantilePolicy {
    /// Return stddev above which the regime is volatile.
    pub volatility_threshold: f64,
    pub calm_one_day: QuantilePair,
    pub calm_five_day: QuantilePair,
    pub volatile_one_day: QuantilePair,
    pub volatile_five_day: QuantilePair,
}

impl Default for QuantilePolicy {
    fn default() -> Self {
        Self {
            volatility_threshold: 0.02,
            calm_one_day: QuantilePair { upper: 0.75, lower: 0.25 },
            calm_five_day: QuantilePair { upper: 0.92, lower: 0.08 },
            volatile_one_day: QuantilePair { upper: 0.85, lower: 0.15 },
            volatile_five_day: QuantilePair { upper: 0.95, lower: 0.05 },
        }
    }
}

impl QuantilePolicy {
    pub fn regime(&self, volatility: Option<f64>) -> VolatilityRegime {
        match volatility {
            Some(v) if v > self.volatility_threshold => VolatilityRegime::Volatile,
            _ => VolatilityRegime::Calm,
        }
    }

    pub fn pair(&self, regime: VolatilityRegime, horizon: Horizon) -> QuantilePair {
        match (regime, horizon) {
            (VolatilityRegime::Calm, Horizon::OneDay) => self.calm_one_day,
            (VolatilityRegime::Calm, Horizon::FiveDay) => self.calm_five_day,
            (VolatilityRegime::Volatile, Horizon::OneDay) => self.volatile_one_day,
            (VolatilityRegime::Volatile, Horizon::FiveDay) => self.volatile_five_day,
        }
    }

    pub fn quantile(&self, regime: VolatilityRegime, horizon: Horizon, direction: Direction) -> f64 {
        let pair = self.pair(regime, horizon);
        match direction {
            Direction::High => pair.upper,
            Direction::Low => pair.lower,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastParams {
    pub method: ForecastMethod,
    pub atr_period: usize,
    /// Maximum number of trailing excursion samples.
    pub lookback: usize,
    /// Minimum number of excursion samples for a quantile.
    pub min_samples: usize,
    pub regime_window: usize,
    pub quantiles: QuantilePolicy,
    pub bias_application: BiasApplication,
    /// Share of the net 1-day band used for the estimated next open.
    pub open_coefficient: f64,
    pub ticks: TickTable,
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self {
            method: ForecastMethod::EmpiricalQuantile,
            atr_period: DEFAULT_ATR_PERIOD,
            lookback: 60,
            min_samples: 20,
            regime_window: DEFAULT_REGIME_WINDOW,
            quantiles: QuantilePolicy::default(),
            bias_application: BiasApplication::Asymmetric,
            open_coefficient: 0.5,
            ticks: TickTable::twse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastTarget {
    pub horizon: Horizon,
    pub direction: Direction,
    pub quantile: f64,
    /// Signed offset from the current close, as a fraction.
    pub raw_offset_pct: f64,
    pub raw_price: f64,
    /// Tick-normalized price.
    pub price: f64,
}

/// Linear-interpolation quantile of `values`; `None` when empty.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64))
}

#[derive(Debug, Clone, Default)]
pub struct QuantileForecastEngine {
    params: ForecastParams,
}

impl QuantileForecastEngine {
    pub fn new(params: ForecastParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ForecastParams {
        &self.params
    }

    pub fn return_volatility(&self, bars: &[OhlcvBar]) -> Option<f64> {
        recent_return_volatility(bars, self.params.regime_window)
    }

    pub fn regime(&self, bars: &[OhlcvBar]) -> VolatilityRegime {
        self.params.quantiles.regime(self.return_volatility(bars))
    }

    /// Bars needed before a target at `horizon` can be produced.
    pub fn min_bars(&self, horizon: Horizon) -> usize {
        let atr_bars = self.params.atr_period + 1;
        match self.params.method {
            ForecastMethod::AtrScaled => atr_bars,
            ForecastMethod::EmpiricalQuantile => {
                atr_bars.max(self.params.min_samples.max(1) + horizon.days())
            }
        }
    }

    /// Target as of the final bar in `bars`.
    ///
    /// `quantile_override` replaces the regime-selected quantile for this
    /// direction. A zero ATR yields a zero offset and a price equal to the
    /// current close.
    pub fn target(
        &self,
        bars: &[OhlcvBar],
        atr: f64,
        bias: f64,
        horizon: Horizon,
        direction: Direction,
        quantile_override: Option<f64>,
    ) -> Result<ForecastTarget, ForecastError> {
        let required = self.min_bars(horizon);
        let close = match bars.last() {
            Some(bar) if bars.len() >= required => bar.close,
            _ => return Err(ForecastError::insufficient(required, bars.len())),
        };

        let q = quantile_override.unwrap_or_else(|| {
            self.params
                .quantiles
                .quantile(self.regime(bars), horizon, direction)
        });

        let offset = if atr <= 0.0 {
            0.0
        } else {
            let base = match self.params.method {
                ForecastMethod::EmpiricalQuantile => {
                    let sample =
                        trailing_excursions(bars, horizon.days(), self.params.lookback);
                    if sample.len() < self.params.min_samples.max(1) {
                        return Err(ForecastError::insufficient(required, bars.len()));
                    }
                    let series = match direction {
                        Direction::High => &sample.high,
                        Direction::Low => &sample.low,
                    };
                    quantile(series, q)
                        .ok_or_else(|| ForecastError::insufficient(required, bars.len()))?
                }
                ForecastMethod::AtrScaled => {
                    let scale = atr * (horizon.days() as f64).sqrt() / close;
                    match direction {
                        Direction::High => scale * q,
                        Direction::Low => -scale * (1.0 - q),
                    }
                }
            };
            self.params.bias_application.apply(base, bias, direction)
        };

        let raw_price = close * (1.0 + offset);
        let price = if offset == 0.0 {
            close
        } else {
            self.params.ticks.normalize(raw_price)
        };

        Ok(ForecastTarget {
            horizon,
            direction,
            quantile: q,
            raw_offset_pct: offset,
            raw_price,
            price,
        })
    }

    /// Estimated next-session open: the close moved by a share of the net
    /// 1-day band.
    pub fn estimated_open(&self, close: f64, one_day_high: f64, one_day_low: f64) -> f64 {
        let offset = self.params.open_coefficient * (one_day_high + one_day_low);
        if offset == 0.0 {
            close
        } else {
            self.params.ticks.normalize(close * (1.0 + offset))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastReport {
    pub as_of: NaiveDate,
    pub close: f64,
    pub atr: f64,
    pub return_volatility: Option<f64>,
    pub regime: VolatilityRegime,
    pub bias: BiasFactor,
    /// 1d high, 1d low, 5d high, 5d low.
    pub targets: Vec<ForecastTarget>,
    pub estimated_open: f64,
    pub warnings: Vec<DegenerateInput>,
}

impl ForecastReport {
    pub fn target(&self, horizon: Horizon, direction: Direction) -> Option<&ForecastTarget> {
        self.targets
            .iter()
            .find(|t| t.horizon == horizon && t.direction == direction)
    }
}

/// ATR, bias and targets for one bar series.
#[derive(Debug, Clone, Default)]
pub struct ForecastPipeline {
    pub engine: QuantileForecastEngine,
    pub bias: BiasFactorEngine,
}

impl ForecastPipeline {
    pub fn new(engine: QuantileForecastEngine, bias: BiasFactorEngine) -> Self {
        Self { engine, bias }
    }

    pub fn run(
        &self,
        series: &BarSeries,
        sources: &SignalSources<'_>,
    ) -> Result<ForecastReport, ForecastError> {
        self.run_on(series.as_slice(), sources)
    }

    /// Same as [`run`](Self::run) over an already validated slice.
    pub fn run_on(
        &self,
        bars: &[OhlcvBar],
        sources: &SignalSources<'_>,
    ) -> Result<ForecastReport, ForecastError> {
        let params = self.engine.params();
        let atr = current_atr(bars, params.atr_period)?;
        let last = bars[bars.len() - 1].clone();
        let bias = self.bias.compute(bars, sources);

        let mut targets = Vec::with_capacity(4);
        for horizon in Horizon::ALL {
            for direction in Direction::ALL {
                targets.push(self.engine.target(bars, atr, bias.value, horizon, direction, None)?);
            }
        }

        let mut warnings = bias.warnings.clone();
        if atr == 0.0 {
            warn!(date = %last.date, "ATR is zero, targets collapse to the close");
            warnings.push(DegenerateInput::ZeroAtr);
        }
        let lookback_start = bars.len().saturating_sub(params.lookback);
        if bars[lookback_start..].iter().all(OhlcvBar::is_flat) {
            warnings.push(DegenerateInput::FlatBars);
        }

        let return_volatility = self.engine.return_volatility(bars);
        let regime = params.quantiles.regime(return_volatility);
        let one_day = |d| {
            targets
                .iter()
                .find(|t: &&ForecastTarget| t.horizon == Horizon::OneDay && t.direction == d)
                .map(|t| t.raw_offset_pct)
                .unwrap_or(0.0)
        };
        let estimated_open =
            self.engine
                .estimated_open(last.close, one_day(Direction::High), one_day(Direction::Low));

        debug!(
            date = %last.date,
            close = last.close,
            atr,
            bias = bias.value,
            %regime,
            "forecast computed"
        );

        Ok(ForecastReport {
            as_of: last.date,
            close: last.close,
            atr,
            return_volatility,
            regime,
            bias,
            targets,
            estimated_open,
            warnings,
        })
    }
}
