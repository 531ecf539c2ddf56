//! Walk-forward validation of forecast targets.
//!
//! Each test day `t` is forecast from bars `[0, t)` and signals dated on or
//! before bar `t - 1`, then scored against bars `t..t + h`. Days whose
//! training window is too short for ATR or the quantile sample are skipped,
//! not counted. Iterations share nothing, so with the `parallel` feature the
//! loop runs on rayon.

use crate::domain::bias::SignalSources;
use crate::domain::error::ForecastError;
use crate::domain::forecast::{Direction, ForecastPipeline, ForecastTarget, Horizon};
use crate::domain::indicator::atr::{calculate_atr, current_atr};
use crate::domain::indicator::excursion::realized_extremes;
use crate::domain::indicator::IndicatorSeries;
use crate::domain::ohlcv::OhlcvBar;
use std::fmt;
use std::ops::RangeInclusive;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub const DEFAULT_BACKTEST_WINDOW: usize = 20;

/// What counts as a hit for a price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitCriterion {
    /// The level held: the realized high stayed at or below a high target,
    /// or the realized low stayed at or above a low target.
    Held,
    /// The level was touched within the horizon.
    Reached,
}

impl HitCriterion {
    pub fn is_hit(self, direction: Direction, target: f64, high: f64, low: f64) -> bool {
        match (self, direction) {
            (HitCriterion::Held, Direction::High) => high <= target,
            (HitCriterion::Held, Direction::Low) => low >= target,
            (HitCriterion::Reached, Direction::High) => high >= target,
            (HitCriterion::Reached, Direction::Low) => low <= target,
        }
    }
}

/// A measured hit rate, or the explicit absence of one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitRate {
    /// Percentage in [0, 100].
    Measured(f64),
    NoSample,
}

impl HitRate {
    pub fn from_counts(hits: usize, samples: usize) -> Self {
        if samples == 0 {
            HitRate::NoSample
        } else {
            HitRate::Measured(hits as f64 / samples as f64 * 100.0)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            HitRate::Measured(pct) => Some(pct),
            HitRate::NoSample => None,
        }
    }
}

impl fmt::Display for HitRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HitRate::Measured(pct) => write!(f, "{:.1}%", pct),
            HitRate::NoSample => write!(f, "n/a (no sample)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub horizon: Horizon,
    pub direction: Direction,
    /// Fixed upper-tail quantile for every test day instead of the
    /// regime-selected one. Low targets use `1 - q`.
    pub quantile_factor: Option<f64>,
    /// Number of most recent scorable days.
    pub window: usize,
    pub hit_criterion: HitCriterion,
}

impl BacktestConfig {
    pub fn new(horizon: Horizon, direction: Direction) -> Self {
        Self {
            horizon,
            direction,
            quantile_factor: None,
            window: DEFAULT_BACKTEST_WINDOW,
            hit_criterion: HitCriterion::Held,
        }
    }

    /// The fixed quantile for this config's direction, mirrored for lows.
    pub fn directional_quantile(&self) -> Option<f64> {
        self.quantile_factor.map(|q| match self.direction {
            Direction::High => q,
            Direction::Low => 1.0 - q,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub horizon: Horizon,
    pub direction: Direction,
    pub hit_rate: HitRate,
    pub hits: usize,
    /// Days actually scored.
    pub sample_size: usize,
    pub window_requested: usize,
    /// Candidate days available after shrinking to the data.
    pub window_effective: usize,
    /// Candidate days without enough trailing history.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct WalkForwardBacktester {
    pipeline: ForecastPipeline,
}

impl WalkForwardBacktester {
    pub fn new(pipeline: ForecastPipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &ForecastPipeline {
        &self.pipeline
    }

    /// Test days with a fully known outcome, most recent `window` of them.
    pub fn test_days(len: usize, horizon: Horizon, window: usize) -> Option<RangeInclusive<usize>> {
        let h = horizon.days();
        if len <= h || window == 0 {
            return None;
        }
        let last = len - h;
        let first = (last + 1).saturating_sub(window).max(1);
        Some(first..=last)
    }

    pub fn run(
        &self,
        bars: &[OhlcvBar],
        sources: &SignalSources<'_>,
        config: &BacktestConfig,
    ) -> BacktestResult {
        let atr = calculate_atr(bars, self.pipeline.engine.params().atr_period);

        let outcomes: Vec<Option<bool>> = match Self::test_days(bars.len(), config.horizon, config.window) {
            None => vec![],
            #[cfg(feature = "parallel")]
            Some(days) => days
                .into_par_iter()
                .map(|t| self.score_day(bars, &atr, sources, config, t))
                .collect(),
            #[cfg(not(feature = "parallel"))]
            Some(days) => days
                .map(|t| self.score_day(bars, &atr, sources, config, t))
                .collect(),
        };

        let window_effective = outcomes.len();
        let sample_size = outcomes.iter().flatten().count();
        let hits = outcomes.iter().flatten().filter(|hit| **hit).count();
        let skipped = window_effective - sample_size;

        debug!(
            horizon = %config.horizon,
            direction = %config.direction,
            window_effective,
            sample_size,
            skipped,
            "walk-forward backtest complete"
        );

        BacktestResult {
            horizon: config.horizon,
            direction: config.direction,
            hit_rate: HitRate::from_counts(hits, sample_size),
            hits,
            sample_size,
            window_requested: config.window,
            window_effective,
            skipped,
        }
    }

    /// Backtests every (horizon, direction) pair with regime-selected quantiles.
    pub fn run_all(
        &self,
        bars: &[OhlcvBar],
        sources: &SignalSources<'_>,
        window: usize,
        hit_criterion: HitCriterion,
    ) -> Vec<BacktestResult> {
        Horizon::ALL
            .into_iter()
            .flat_map(|horizon| Direction::ALL.into_iter().map(move |d| (horizon, d)))
            .map(|(horizon, direction)| {
                let config = BacktestConfig {
                    window,
                    hit_criterion,
                    ..BacktestConfig::new(horizon, direction)
                };
                self.run(bars, sources, &config)
            })
            .collect()
    }

    /// The target forecast for test day `t` from bars `[0, t)` and signals
    /// dated on or before bar `t - 1`.
    pub fn day_target(
        &self,
        bars: &[OhlcvBar],
        sources: &SignalSources<'_>,
        config: &BacktestConfig,
        t: usize,
    ) -> Result<ForecastTarget, ForecastError> {
        let train = &bars[..t.min(bars.len())];
        let atr = current_atr(train, self.pipeline.engine.params().atr_period)?;
        self.forecast_from(train, atr, sources, config)
    }

    fn forecast_from(
        &self,
        train: &[OhlcvBar],
        atr: f64,
        sources: &SignalSources<'_>,
        config: &BacktestConfig,
    ) -> Result<ForecastTarget, ForecastError> {
        let as_of = match train.last() {
            Some(bar) => bar.date,
            None => return Err(ForecastError::insufficient(1, 0)),
        };
        let bias = self.pipeline.bias.compute(train, &sources.as_of(as_of));
        self.pipeline.engine.target(
            train,
            atr,
            bias.value,
            config.horizon,
            config.direction,
            config.directional_quantile(),
        )
    }

    fn score_day(
        &self,
        bars: &[OhlcvBar],
        atr: &IndicatorSeries,
        sources: &SignalSources<'_>,
        config: &BacktestConfig,
        t: usize,
    ) -> Option<bool> {
        let as_of = bars[t - 1].date;
        let Some(atr_value) = atr.values[t - 1].value else {
            debug!(%as_of, "skipping day: ATR undefined");
            return None;
        };
        let target = match self.forecast_from(&bars[..t], atr_value, sources, config) {
            Ok(target) => target,
            Err(e) => {
                debug!(%as_of, error = %e, "skipping day");
                return None;
            }
        };

        let (high, low) = realized_extremes(bars, t, config.horizon.days())?;
        Some(
            config
                .hit_criterion
                .is_hit(config.direction, target.price, high, low),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forecast::{ForecastMethod, ForecastParams, QuantileForecastEngine};
    use crate::domain::bias::BiasFactorEngine;
    use crate::domain::tick::TickTable;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn make_bar(i: usize, high: f64, low: f64, close: f64) -> OhlcvBar {
        OhlcvBar {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
            open: close,
            high,
            low,
            close,
            volume: 1000,
        }
    }

    fn constant_bars(n: usize) -> Vec<OhlcvBar> {
        (0..n).map(|i| make_bar(i, 101.0, 99.0, 100.0)).collect()
    }

    fn atr_backtester() -> WalkForwardBacktester {
        let engine = QuantileForecastEngine::new(ForecastParams {
            method: ForecastMethod::AtrScaled,
            ticks: TickTable::uniform(0.1),
            ..ForecastParams::default()
        });
        WalkForwardBacktester::new(ForecastPipeline::new(engine, BiasFactorEngine::default()))
    }

    #[test]
    fn test_days_exclude_unscorable_tail() {
        assert_eq!(WalkForwardBacktester::test_days(100, Horizon::OneDay, 20), Some(80..=99));
        assert_eq!(WalkForwardBacktester::test_days(100, Horizon::FiveDay, 20), Some(76..=95));
        assert_eq!(WalkForwardBacktester::test_days(20, Horizon::OneDay, 60), Some(1..=19));
        assert_eq!(WalkForwardBacktester::test_days(1, Horizon::OneDay, 60), None);
        assert_eq!(WalkForwardBacktester::test_days(50, Horizon::OneDay, 0), None);
    }

    #[test]
    fn hit_criteria_are_opposites_at_the_level() {
        let held = HitCriterion::Held;
        let reached = HitCriterion::Reached;
        assert!(held.is_hit(Direction::High, 101.5, 101.0, 99.0));
        assert!(!reached.is_hit(Direction::High, 101.5, 101.0, 99.0));
        assert!(reached.is_hit(Direction::Low, 98.5, 101.0, 98.0));
        assert!(!held.is_hit(Direction::Low, 98.5, 101.0, 98.0));
    }

    #[test]
    fn hit_rate_no_sample_is_distinct() {
        assert_eq!(HitRate::from_counts(0, 0), HitRate::NoSample);
        assert_eq!(HitRate::from_counts(0, 0).value(), None);
        assert_eq!(HitRate::from_counts(17, 20), HitRate::Measured(85.0));
        assert_eq!(HitRate::Measured(85.0).to_string(), "85.0%");
        assert_eq!(HitRate::NoSample.to_string(), "n/a (no sample)");
    }

    #[test]
    fn short_history_shrinks_window() {
        let bars = constant_bars(20);
        let config = BacktestConfig {
            window: 60,
            ..BacktestConfig::new(Horizon::OneDay, Direction::High)
        };
        let result = atr_backtester().run(&bars, &SignalSources::none(), &config);
        assert_eq!(result.window_requested, 60);
        assert_eq!(result.window_effective, 19);
        // training windows of 15..=19 bars have an ATR
        assert_eq!(result.sample_size, 5);
        assert_eq!(result.skipped, 14);
        assert!(matches!(result.hit_rate, HitRate::Measured(_)));
    }

    #[test]
    fn constant_market_holds_every_target() {
        // target 101.7 (0.85 * ATR 2) is never breached by highs of 101
        let bars = constant_bars(40);
        let config = BacktestConfig::new(Horizon::OneDay, Direction::High);
        let result = atr_backtester().run(&bars, &SignalSources::none(), &config);
        assert_eq!(result.sample_size, 20);
        assert_eq!(result.hits, 20);
        assert_eq!(result.hit_rate, HitRate::Measured(100.0));

        let reached = BacktestConfig {
            hit_criterion: HitCriterion::Reached,
            ..config
        };
        let result = atr_backtester().run(&bars, &SignalSources::none(), &reached);
        assert_eq!(result.hit_rate, HitRate::Measured(0.0));
    }

    #[test]
    fn quantile_factor_override_is_used() {
        // q = 0.4 puts the target at 100.8, below every realized high of 101
        let bars = constant_bars(40);
        let config = BacktestConfig {
            quantile_factor: Some(0.4),
            ..BacktestConfig::new(Horizon::OneDay, Direction::High)
        };
        let result = atr_backtester().run(&bars, &SignalSources::none(), &config);
        assert_eq!(result.hit_rate, HitRate::Measured(0.0));
    }

    #[test]
    fn quantile_factor_mirrors_for_low_targets() {
        // 0.85 becomes 0.15 on the low side: target 98.3, below every low of 99
        let bars = constant_bars(40);
        let config = BacktestConfig {
            quantile_factor: Some(0.85),
            ..BacktestConfig::new(Horizon::OneDay, Direction::Low)
        };
        assert_eq!(config.directional_quantile(), Some(1.0 - 0.85));
        let result = atr_backtester().run(&bars, &SignalSources::none(), &config);
        assert_eq!(result.sample_size, 20);
        assert_eq!(result.hit_rate, HitRate::Measured(100.0));
    }

    #[test]
    fn fixed_quantile_offsets_are_symmetric_for_symmetric_sample() {
        let bars: Vec<OhlcvBar> = (0..40)
            .map(|i| {
                let r = 1.0 + (i % 5) as f64 * 0.5;
                make_bar(i, 100.0 + r, 100.0 - r, 100.0)
            })
            .collect();
        let engine = QuantileForecastEngine::default();
        let offset = |direction| {
            let config = BacktestConfig {
                quantile_factor: Some(0.85),
                ..BacktestConfig::new(Horizon::OneDay, direction)
            };
            engine
                .target(&bars, 2.0, 1.0, Horizon::OneDay, direction, config.directional_quantile())
                .unwrap()
                .raw_offset_pct
        };
        let high = offset(Direction::High);
        let low = offset(Direction::Low);
        assert!(high > 0.0);
        assert_relative_eq!(high, -low, epsilon = 1e-12);
    }

    #[test]
    fn day_target_uses_only_bars_before_the_day() {
        let mut bars = constant_bars(40);
        let config = BacktestConfig::new(Horizon::OneDay, Direction::High);
        let before = atr_backtester().day_target(&bars, &SignalSources::none(), &config, 30).unwrap();
        bars[30].high = 150.0;
        let after = atr_backtester().day_target(&bars, &SignalSources::none(), &config, 30).unwrap();
        assert_eq!(before, after);
        assert_eq!(before.price, 101.7);
        assert!(matches!(
            atr_backtester().day_target(&bars, &SignalSources::none(), &config, 0),
            Err(ForecastError::InsufficientHistory { .. })
        ));
    }

    #[test]
    fn insufficient_history_reports_no_sample() {
        let bars = constant_bars(20);
        let config = BacktestConfig {
            window: 60,
            ..BacktestConfig::new(Horizon::FiveDay, Direction::Low)
        };
        let result = WalkForwardBacktester::default().run(&bars, &SignalSources::none(), &config);
        assert_eq!(result.sample_size, 0);
        assert_eq!(result.hit_rate, HitRate::NoSample);
        assert_eq!(result.window_effective, 15);
    }

    #[test]
    fn run_all_covers_four_pairs() {
        let bars = constant_bars(60);
        let results = atr_backtester().run_all(&bars, &SignalSources::none(), 20, HitCriterion::Held);
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.sample_size == 20));
        assert_eq!(results[3].horizon, Horizon::FiveDay);
        assert_eq!(results[3].direction, Direction::Low);
    }
}
