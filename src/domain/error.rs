//! Domain error types.
//!
//! Hard failures live in [`ForecastError`]. Conditions the engine recovers
//! from locally (a missing auxiliary signal, a degenerate input) are plain
//! values carried in the results so callers can report them.

use std::fmt;

/// Top-level error type for twforecast.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("insufficient history: have {available} bars, need {required}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: String },

    #[error("bars are not in chronological order at index {index}")]
    NonChronological { index: usize },

    #[error("cannot fill gap at index {index}: no earlier close to carry forward")]
    UnfillableGap { index: usize },

    #[error("invalid symbol {code:?}: {reason}")]
    InvalidSymbol { code: String, reason: String },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("no data for {code}")]
    NoData { code: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },
}

impl ForecastError {
    pub fn insufficient(required: usize, available: usize) -> Self {
        ForecastError::InsufficientHistory {
            required,
            available,
        }
    }
}

impl From<&ForecastError> for std::process::ExitCode {
    fn from(err: &ForecastError) -> Self {
        let code: u8 = match err {
            ForecastError::ConfigParse { .. }
            | ForecastError::ConfigMissing { .. }
            | ForecastError::ConfigInvalid { .. } => 2,
            ForecastError::DataSource { .. } => 3,
            ForecastError::InvalidSymbol { .. } => 4,
            ForecastError::NoData { .. }
            | ForecastError::InsufficientHistory { .. }
            | ForecastError::InvalidBar { .. }
            | ForecastError::NonChronological { .. }
            | ForecastError::UnfillableGap { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

/// Why an auxiliary signal contributed its neutral value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MissingSignal {
    #[error("signal not supplied")]
    NotSupplied,

    #[error("need {required} observations, have {available}")]
    TooFewObservations { required: usize, available: usize },

    #[error("reference volume is zero")]
    ZeroVolume,

    #[error("benchmark close is not positive")]
    NonPositiveBenchmark,
}

/// Non-fatal input conditions that force a zero-offset forecast or a
/// neutral contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DegenerateInput {
    /// Average or latest volume is zero.
    ZeroVolume,
    /// ATR is zero; all offsets collapse to the current close.
    ZeroAtr,
    /// Every bar in the window has identical OHLC values.
    FlatBars,
}

impl fmt::Display for DegenerateInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegenerateInput::ZeroVolume => write!(f, "zero volume"),
            DegenerateInput::ZeroAtr => write!(f, "zero ATR"),
            DegenerateInput::FlatBars => write!(f, "flat bars"),
        }
    }
}
