//! Bias factor from auxiliary directional signals.
//!
//! Three optional components feed one bounded multiplicative factor:
//! relative volume, institutional net flow and benchmark momentum. An absent
//! or unusable signal contributes zero and is reported as missing in the
//! breakdown, so a factor built from nothing is exactly 1.0 and says so.

use crate::domain::error::{DegenerateInput, MissingSignal};
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use tracing::{debug, warn};

pub const NEUTRAL_BIAS: f64 = 1.0;

/// Aggregate institutional buy and sell volume for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct InstitutionalFlow {
    pub date: NaiveDate,
    pub buy: i64,
    pub sell: i64,
}

impl InstitutionalFlow {
    /// Net buying, widened so extreme volumes cannot overflow.
    pub fn net(&self) -> i128 {
        i128::from(self.buy) - i128::from(self.sell)
    }
}

/// Auxiliary inputs available to one bias computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalSources<'a> {
    /// Derive relative volume from the bar series itself.
    pub volume: bool,
    /// Chronological institutional flows.
    pub institutional: Option<&'a [InstitutionalFlow]>,
    /// Chronological benchmark index bars.
    pub benchmark: Option<&'a [OhlcvBar]>,
}

impl<'a> SignalSources<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    /// The same sources restricted to observations dated on or before `cutoff`.
    pub fn as_of(&self, cutoff: NaiveDate) -> Self {
        Self {
            volume: self.volume,
            institutional: self
                .institutional
                .map(|flows| &flows[..flows.partition_point(|f| f.date <= cutoff)]),
            benchmark: self
                .benchmark
                .map(|bars| &bars[..bars.partition_point(|b| b.date <= cutoff)]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiasConfig {
    pub clamp_min: f64,
    pub clamp_max: f64,
    pub volume_window: usize,
    pub volume_weight: f64,
    pub volume_cap: f64,
    pub flow_window: usize,
    pub flow_step: f64,
    pub benchmark_window: usize,
    pub benchmark_scale: f64,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            clamp_min: 0.95,
            clamp_max: 1.10,
            volume_window: 5,
            volume_weight: 0.05,
            volume_cap: 0.05,
            flow_window: 5,
            flow_step: 0.02,
            benchmark_window: 5,
            benchmark_scale: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalStatus {
    Used,
    Missing(MissingSignal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiasComponent {
    /// Observed signal value (volume ratio, net flow, benchmark return).
    pub raw: Option<f64>,
    /// Additive contribution to the factor before clamping.
    pub contribution: f64,
    pub status: SignalStatus,
}

impl BiasComponent {
    fn used(raw: f64, contribution: f64) -> Self {
        Self {
            raw: Some(raw),
            contribution,
            status: SignalStatus::Used,
        }
    }

    fn missing(reason: MissingSignal) -> Self {
        Self {
            raw: None,
            contribution: 0.0,
            status: SignalStatus::Missing(reason),
        }
    }

    pub fn is_used(&self) -> bool {
        self.status == SignalStatus::Used
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiasBreakdown {
    pub volume: BiasComponent,
    pub institutional: BiasComponent,
    pub benchmark: BiasComponent,
}

impl BiasBreakdown {
    fn used_count(&self) -> usize {
        [&self.volume, &self.institutional, &self.benchmark]
            .iter()
            .filter(|c| c.is_used())
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// No signal contributed; the factor is the neutral value.
    Neutral,
    Partial,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiasFactor {
    pub value: f64,
    pub clamped: bool,
    pub confidence: Confidence,
    pub breakdown: BiasBreakdown,
    pub warnings: Vec<DegenerateInput>,
}

impl BiasFactor {
    pub fn neutral() -> Self {
        let missing = || BiasComponent::missing(MissingSignal::NotSupplied);
        Self {
            value: NEUTRAL_BIAS,
            clamped: false,
            confidence: Confidence::Neutral,
            breakdown: BiasBreakdown {
                volume: missing(),
                institutional: missing(),
                benchmark: missing(),
            },
            warnings: vec![],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BiasFactorEngine {
    config: BiasConfig,
}

impl BiasFactorEngine {
    pub fn new(config: BiasConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BiasConfig {
        &self.config
    }

    pub fn compute(&self, bars: &[OhlcvBar], sources: &SignalSources<'_>) -> BiasFactor {
        let mut warnings = Vec::new();

        let volume = if sources.volume {
            self.volume_component(bars, &mut warnings)
        } else {
            BiasComponent::missing(MissingSignal::NotSupplied)
        };
        let institutional = match sources.institutional {
            Some(flows) => self.flow_component(flows),
            None => BiasComponent::missing(MissingSignal::NotSupplied),
        };
        let benchmark = match sources.benchmark {
            Some(index) => self.benchmark_component(index),
            None => BiasComponent::missing(MissingSignal::NotSupplied),
        };

        let breakdown = BiasBreakdown {
            volume,
            institutional,
            benchmark,
        };
        for (name, c) in [
            ("volume", &breakdown.volume),
            ("institutional", &breakdown.institutional),
            ("benchmark", &breakdown.benchmark),
        ] {
            if let SignalStatus::Missing(reason) = &c.status {
                debug!(signal = name, %reason, "bias signal unavailable, using neutral contribution");
            }
        }

        let confidence = match breakdown.used_count() {
            0 => Confidence::Neutral,
            3 => Confidence::Full,
            _ => Confidence::Partial,
        };

        let unclamped = NEUTRAL_BIAS
            + breakdown.volume.contribution
            + breakdown.institutional.contribution
            + breakdown.benchmark.contribution;
        let value = unclamped.clamp(self.config.clamp_min, self.config.clamp_max);

        BiasFactor {
            value,
            clamped: value != unclamped,
            confidence,
            breakdown,
            warnings,
        }
    }

    fn volume_component(
        &self,
        bars: &[OhlcvBar],
        warnings: &mut Vec<DegenerateInput>,
    ) -> BiasComponent {
        let window = self.config.volume_window.max(1);
        let required = window + 1;
        if bars.len() < required {
            return BiasComponent::missing(MissingSignal::TooFewObservations {
                required,
                available: bars.len(),
            });
        }

        let latest = bars[bars.len() - 1].volume as f64;
        let prior = &bars[bars.len() - required..bars.len() - 1];
        let average = prior.iter().map(|b| b.volume as f64).sum::<f64>() / window as f64;
        if average <= 0.0 || latest <= 0.0 {
            warn!(latest, average, "zero volume, volume bias disabled");
            warnings.push(DegenerateInput::ZeroVolume);
            return BiasComponent::missing(MissingSignal::ZeroVolume);
        }

        let ratio = latest / average;
        let cap = self.config.volume_cap.abs();
        let contribution = ((ratio - 1.0) * self.config.volume_weight).clamp(-cap, cap);
        BiasComponent::used(ratio, contribution)
    }

    fn flow_component(&self, flows: &[InstitutionalFlow]) -> BiasComponent {
        if flows.is_empty() {
            return BiasComponent::missing(MissingSignal::TooFewObservations {
                required: 1,
                available: 0,
            });
        }
        let start = flows.len().saturating_sub(self.config.flow_window.max(1));
        let net: i128 = flows[start..].iter().map(InstitutionalFlow::net).sum();
        let contribution = match net.signum() {
            1 => self.config.flow_step,
            -1 => -self.config.flow_step,
            _ => 0.0,
        };
        BiasComponent::used(net as f64, contribution)
    }

    fn benchmark_component(&self, index: &[OhlcvBar]) -> BiasComponent {
        let window = self.config.benchmark_window.max(1);
        let required = window + 1;
        if index.len() < required {
            return BiasComponent::missing(MissingSignal::TooFewObservations {
                required,
                available: index.len(),
            });
        }
        let base = index[index.len() - required].close;
        if base <= 0.0 {
            return BiasComponent::missing(MissingSignal::NonPositiveBenchmark);
        }
        let ret = index[index.len() - 1].close / base - 1.0;
        BiasComponent::used(ret, ret * self.config.benchmark_scale)
    }
}
