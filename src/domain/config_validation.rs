//! Configuration validation.
//!
//! Checks every tunable before a forecast or backtest runs, and parses the
//! named options (`method`, `bias_application`, `hit_criterion`, `tick`).

use crate::domain::backtest::HitCriterion;
use crate::domain::error::ForecastError;
use crate::domain::forecast::{
    BiasApplication, ForecastMethod, Horizon, QuantilePair, QuantilePolicy, VolatilityRegime,
};
use crate::domain::tick::TickTable;
use crate::ports::config_port::ConfigPort;

pub const FLOW_WINDOW_RANGE: std::ops::RangeInclusive<i64> = 5..=9;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ForecastError {
    ForecastError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_all(config: &dyn ConfigPort) -> Result<(), ForecastError> {
    validate_data_config(config)?;
    validate_forecast_config(config)?;
    validate_bias_config(config)?;
    validate_backtest_config(config)?;
    validate_intraday_config(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), ForecastError> {
    match config.get_string("data", "dir") {
        Some(_) => Ok(()),
        None => Err(ForecastError::ConfigMissing {
            section: "data".to_string(),
            key: "dir".to_string(),
        }),
    }
}

pub fn validate_forecast_config(config: &dyn ConfigPort) -> Result<(), ForecastError> {
    parse_method(config.get_string("forecast", "method").as_deref())?;
    parse_bias_application(config.get_string("forecast", "bias_application").as_deref())?;
    parse_tick_table(config.get_string("forecast", "tick").as_deref())?;

    for key in ["atr_period", "regime_window", "min_samples"] {
        positive_int(config, "forecast", key, 1)?;
    }
    let min_samples = config.get_int("forecast", "min_samples", 20);
    let lookback = config.get_int("forecast", "lookback", 60);
    if lookback < min_samples {
        return Err(invalid(
            "forecast",
            "lookback",
            format!("lookback ({}) must be at least min_samples ({})", lookback, min_samples),
        ));
    }

    let threshold = config.get_double("forecast", "regime_threshold", 0.02);
    if threshold <= 0.0 {
        return Err(invalid("forecast", "regime_threshold", "regime_threshold must be positive"));
    }

    let defaults = QuantilePolicy::default();
    for regime in [VolatilityRegime::Calm, VolatilityRegime::Volatile] {
        for horizon in Horizon::ALL {
            validate_quantile_pair(config, regime, horizon, defaults.pair(regime, horizon))?;
        }
    }

    let open = config.get_double("forecast", "open_coefficient", 0.5);
    if !(0.0..=1.0).contains(&open) {
        return Err(invalid(
            "forecast",
            "open_coefficient",
            "open_coefficient must be between 0 and 1",
        ));
    }
    Ok(())
}

/// `[forecast]` keys for one regime and horizon, e.g. `calm_1d_upper`.
pub fn quantile_keys(regime: VolatilityRegime, horizon: Horizon) -> (String, String) {
    (
        format!("{}_{}_upper", regime, horizon),
        format!("{}_{}_lower", regime, horizon),
    )
}

fn validate_quantile_pair(
    config: &dyn ConfigPort,
    regime: VolatilityRegime,
    horizon: Horizon,
    default: QuantilePair,
) -> Result<(), ForecastError> {
    let (upper_key, lower_key) = quantile_keys(regime, horizon);
    let upper = config.get_double("forecast", &upper_key, default.upper);
    let lower = config.get_double("forecast", &lower_key, default.lower);
    for (key, q) in [(&upper_key, upper), (&lower_key, lower)] {
        if q <= 0.0 || q >= 1.0 {
            return Err(invalid("forecast", key, "quantile must be strictly between 0 and 1"));
        }
    }
    if lower > upper {
        return Err(invalid(
            "forecast",
            &lower_key,
            format!("{} must not exceed {}", lower_key, upper_key),
        ));
    }
    Ok(())
}

pub fn validate_bias_config(config: &dyn ConfigPort) -> Result<(), ForecastError> {
    let clamp_min = config.get_double("bias", "clamp_min", 0.95);
    let clamp_max = config.get_double("bias", "clamp_max", 1.10);
    if clamp_min <= 0.0 || clamp_min > 1.0 {
        return Err(invalid("bias", "clamp_min", "clamp_min must be in (0, 1]"));
    }
    if clamp_max < 1.0 {
        return Err(invalid("bias", "clamp_max", "clamp_max must be at least 1"));
    }

    let flow_window = config.get_int("bias", "flow_window", 5);
    if !FLOW_WINDOW_RANGE.contains(&flow_window) {
        return Err(invalid(
            "bias",
            "flow_window",
            format!(
                "flow_window must be between {} and {}",
                FLOW_WINDOW_RANGE.start(),
                FLOW_WINDOW_RANGE.end()
            ),
        ));
    }
    positive_int(config, "bias", "volume_window", 5)?;
    positive_int(config, "bias", "benchmark_window", 5)?;

    for key in ["volume_weight", "volume_cap", "flow_step", "benchmark_scale"] {
        if config.get_double("bias", key, 0.0) < 0.0 {
            return Err(invalid("bias", key, format!("{} must be non-negative", key)));
        }
    }
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), ForecastError> {
    positive_int(config, "backtest", "window", 20)?;
    parse_hit_criterion(config.get_string("backtest", "hit_criterion").as_deref())?;
    if config.get_string("backtest", "quantile_factor").is_some() {
        let q = config.get_double("backtest", "quantile_factor", -1.0);
        if q <= 0.0 || q >= 1.0 {
            return Err(invalid(
                "backtest",
                "quantile_factor",
                "quantile_factor must be strictly between 0 and 1",
            ));
        }
    }
    Ok(())
}

pub fn validate_intraday_config(config: &dyn ConfigPort) -> Result<(), ForecastError> {
    positive_int(config, "intraday", "range_window", 5)?;
    for key in ["strong_buy", "dip_buy", "sell"] {
        if config.get_double("intraday", key, 0.0) < 0.0 {
            return Err(invalid("intraday", key, format!("{} must be non-negative", key)));
        }
    }
    Ok(())
}

fn positive_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<(), ForecastError> {
    if config.get_int(section, key, default) < 1 {
        return Err(invalid(section, key, format!("{} must be at least 1", key)));
    }
    Ok(())
}

pub fn parse_method(value: Option<&str>) -> Result<ForecastMethod, ForecastError> {
    match value.map(str::to_lowercase).as_deref() {
        None | Some("quantile") => Ok(ForecastMethod::EmpiricalQuantile),
        Some("atr") => Ok(ForecastMethod::AtrScaled),
        Some(other) => Err(invalid(
            "forecast",
            "method",
            format!("unknown method {:?}, expected quantile or atr", other),
        )),
    }
}

pub fn parse_bias_application(value: Option<&str>) -> Result<BiasApplication, ForecastError> {
    match value.map(str::to_lowercase).as_deref() {
        None | Some("asymmetric") => Ok(BiasApplication::Asymmetric),
        Some("symmetric") => Ok(BiasApplication::Symmetric),
        Some("ignore") => Ok(BiasApplication::Ignore),
        Some(other) => Err(invalid(
            "forecast",
            "bias_application",
            format!(
                "unknown bias_application {:?}, expected asymmetric, symmetric or ignore",
                other
            ),
        )),
    }
}

pub fn parse_hit_criterion(value: Option<&str>) -> Result<HitCriterion, ForecastError> {
    match value.map(str::to_lowercase).as_deref() {
        None | Some("held") => Ok(HitCriterion::Held),
        Some("reached") => Ok(HitCriterion::Reached),
        Some(other) => Err(invalid(
            "backtest",
            "hit_criterion",
            format!("unknown hit_criterion {:?}, expected held or reached", other),
        )),
    }
}

/// `twse` (or unset) for the exchange table, otherwise a uniform tick size.
pub fn parse_tick_table(value: Option<&str>) -> Result<TickTable, ForecastError> {
    match value.map(str::to_lowercase).as_deref() {
        None | Some("twse") => Ok(TickTable::twse()),
        Some(raw) => match raw.parse::<f64>() {
            Ok(tick) if tick >= 0.01 => Ok(TickTable::uniform(tick)),
            _ => Err(invalid(
                "forecast",
                "tick",
                format!("tick must be twse or a size of at least 0.01, got {:?}", raw),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn invalid_key(err: ForecastError) -> String {
        match err {
            ForecastError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn full_config_passes() {
        let config = make_config(
            r#"
[data]
dir = ./data
benchmark = TAIEX

[forecast]
method = atr
bias_application = symmetric
tick = 0.1
lookback = 60
min_samples = 20
calm_1d_upper = 0.8
calm_1d_lower = 0.2

[bias]
clamp_min = 0.9
clamp_max = 1.2
flow_window = 9

[backtest]
window = 60
hit_criterion = reached
quantile_factor = 0.85

[intraday]
range_window = 5
"#,
        );
        assert!(validate_all(&config).is_ok());
    }

    #[test]
    fn defaults_pass_with_data_dir() {
        let config = make_config("[data]\ndir = ./data\n");
        assert!(validate_all(&config).is_ok());
    }

    #[test]
    fn missing_data_dir() {
        let err = validate_all(&make_config("[forecast]\n")).unwrap_err();
        assert!(matches!(err, ForecastError::ConfigMissing { ref key, .. } if key == "dir"));
    }

    #[test]
    fn lookback_below_min_samples() {
        let config = make_config("[forecast]\nlookback = 10\nmin_samples = 20\n");
        let err = validate_forecast_config(&config).unwrap_err();
        assert_eq!(invalid_key(err), "lookback");
    }

    #[test]
    fn quantile_out_of_unit_interval() {
        let config = make_config("[forecast]\nvolatile_5d_upper = 1.0\n");
        let err = validate_forecast_config(&config).unwrap_err();
        assert_eq!(invalid_key(err), "volatile_5d_upper");
    }

    #[test]
    fn crossed_quantile_pair() {
        let config = make_config("[forecast]\ncalm_1d_upper = 0.3\ncalm_1d_lower = 0.6\n");
        let err = validate_forecast_config(&config).unwrap_err();
        assert_eq!(invalid_key(err), "calm_1d_lower");
    }

    #[test]
    fn single_quantile_override_checks_against_default_partner() {
        // default calm 1d upper is 0.75
        let config = make_config("[forecast]\ncalm_1d_lower = 0.6\n");
        assert!(validate_forecast_config(&config).is_ok());
        let config = make_config("[forecast]\ncalm_1d_lower = 0.8\n");
        assert_eq!(invalid_key(validate_forecast_config(&config).unwrap_err()), "calm_1d_lower");
    }

    #[test]
    fn quantile_key_names() {
        let (upper, lower) = quantile_keys(VolatilityRegime::Volatile, Horizon::FiveDay);
        assert_eq!(upper, "volatile_5d_upper");
        assert_eq!(lower, "volatile_5d_lower");
    }

    #[test]
    fn unknown_method() {
        let config = make_config("[forecast]\nmethod = neural\n");
        let err = validate_forecast_config(&config).unwrap_err();
        assert_eq!(invalid_key(err), "method");
    }

    #[test]
    fn clamp_must_straddle_one() {
        let err = validate_bias_config(&make_config("[bias]\nclamp_min = 1.05\n")).unwrap_err();
        assert_eq!(invalid_key(err), "clamp_min");
        let err = validate_bias_config(&make_config("[bias]\nclamp_max = 0.99\n")).unwrap_err();
        assert_eq!(invalid_key(err), "clamp_max");
    }

    #[test]
    fn flow_window_range() {
        for bad in ["4", "10"] {
            let config = make_config(&format!("[bias]\nflow_window = {}\n", bad));
            assert_eq!(invalid_key(validate_bias_config(&config).unwrap_err()), "flow_window");
        }
        assert!(validate_bias_config(&make_config("[bias]\nflow_window = 7\n")).is_ok());
    }

    #[test]
    fn backtest_window_and_criterion() {
        let err = validate_backtest_config(&make_config("[backtest]\nwindow = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "window");
        let err = validate_backtest_config(&make_config("[backtest]\nhit_criterion = maybe\n"))
            .unwrap_err();
        assert_eq!(invalid_key(err), "hit_criterion");
        let err = validate_backtest_config(&make_config("[backtest]\nquantile_factor = 2\n"))
            .unwrap_err();
        assert_eq!(invalid_key(err), "quantile_factor");
    }

    #[test]
    fn negative_intraday_coefficient() {
        let err = validate_intraday_config(&make_config("[intraday]\nsell = -0.5\n")).unwrap_err();
        assert_eq!(invalid_key(err), "sell");
    }

    #[test]
    fn option_parsers() {
        assert_eq!(parse_method(None).unwrap(), ForecastMethod::EmpiricalQuantile);
        assert_eq!(parse_method(Some("ATR")).unwrap(), ForecastMethod::AtrScaled);
        assert_eq!(parse_bias_application(Some("ignore")).unwrap(), BiasApplication::Ignore);
        assert_eq!(parse_hit_criterion(Some("Reached")).unwrap(), HitCriterion::Reached);
        assert_eq!(parse_tick_table(None).unwrap(), TickTable::twse());
        assert_eq!(parse_tick_table(Some("0.1")).unwrap(), TickTable::uniform(0.1));
        assert!(parse_tick_table(Some("0")).is_err());
        assert!(parse_tick_table(Some("fine")).is_err());
    }
}
