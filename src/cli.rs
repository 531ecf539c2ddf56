//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{
    BacktestConfig, BacktestResult, HitCriterion, WalkForwardBacktester, DEFAULT_BACKTEST_WINDOW,
};
use crate::domain::bias::{
    BiasComponent, BiasConfig, BiasFactorEngine, InstitutionalFlow, SignalSources, SignalStatus,
};
use crate::domain::config_validation::{
    parse_bias_application, parse_hit_criterion, parse_method, parse_tick_table, quantile_keys,
    validate_all,
};
use crate::domain::error::ForecastError;
use crate::domain::forecast::{
    Direction, ForecastParams, ForecastPipeline, ForecastReport, Horizon, QuantileForecastEngine,
    QuantilePair, QuantilePolicy, VolatilityRegime,
};
use crate::domain::indicator::IndicatorType;
use crate::domain::intraday::{intraday_advice, IntradayAdvice, IntradayConfig, SessionQuote};
use crate::domain::ohlcv::BarSeries;
use crate::domain::session::{current_session, MarketSession};
use crate::domain::symbol::ListingSymbol;
use crate::domain::tick::TickTable;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;

#[derive(Parser, Debug)]
#[command(name = "twforecast", about = "Price-target forecasts and walk-forward backtests for Taiwan equities")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Forecast 1-day and 5-day high/low targets
    Forecast {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
    },
    /// Walk-forward hit rates of the forecast targets
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
        /// Overrides [backtest] window
        #[arg(long)]
        window: Option<usize>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Day-trade reference prices for the session in progress
    Intraday {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
    },
    /// Show the Taipei market session status
    Session,
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Forecast { config, code } => run_forecast(&config, &code),
        Command::Backtest {
            config,
            code,
            window,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, window)
            } else {
                run_backtest(&config, &code, window)
            }
        }
        Command::Intraday { config, code } => run_intraday(&config, &code),
        Command::Session => {
            run_session();
            Ok(())
        }
        Command::Validate { config } => run_validate(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ForecastError> {
    info!(path = %path.display(), "loading config");
    let adapter = FileConfigAdapter::from_file(path)?;
    validate_all(&adapter)?;
    Ok(adapter)
}

/// Backtest options beyond the forecast parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub window: usize,
    pub hit_criterion: HitCriterion,
    pub quantile_factor: Option<f64>,
}

pub fn build_forecast_params(config: &dyn ConfigPort) -> Result<ForecastParams, ForecastError> {
    let defaults = ForecastParams::default();
    let policy = QuantilePolicy::default();

    let pair = |regime: VolatilityRegime, horizon: Horizon| {
        let fallback = policy.pair(regime, horizon);
        let (upper_key, lower_key) = quantile_keys(regime, horizon);
        QuantilePair {
            upper: config.get_double("forecast", &upper_key, fallback.upper),
            lower: config.get_double("forecast", &lower_key, fallback.lower),
        }
    };
    let quantiles = QuantilePolicy {
        volatility_threshold: config.get_double(
            "forecast",
            "regime_threshold",
            policy.volatility_threshold,
        ),
        calm_one_day: pair(VolatilityRegime::Calm, Horizon::OneDay),
        calm_five_day: pair(VolatilityRegime::Calm, Horizon::FiveDay),
        volatile_one_day: pair(VolatilityRegime::Volatile, Horizon::OneDay),
        volatile_five_day: pair(VolatilityRegime::Volatile, Horizon::FiveDay),
    };

    Ok(ForecastParams {
        method: parse_method(config.get_string("forecast", "method").as_deref())?,
        atr_period: config.get_usize("forecast", "atr_period", defaults.atr_period),
        lookback: config.get_usize("forecast", "lookback", defaults.lookback),
        min_samples: config.get_usize("forecast", "min_samples", defaults.min_samples),
        regime_window: config.get_usize("forecast", "regime_window", defaults.regime_window),
        quantiles,
        bias_application: parse_bias_application(
            config.get_string("forecast", "bias_application").as_deref(),
        )?,
        open_coefficient: config.get_double(
            "forecast",
            "open_coefficient",
            defaults.open_coefficient,
        ),
        ticks: parse_tick_table(config.get_string("forecast", "tick").as_deref())?,
    })
}

pub fn build_bias_config(config: &dyn ConfigPort) -> BiasConfig {
    let d = BiasConfig::default();
    BiasConfig {
        clamp_min: config.get_double("bias", "clamp_min", d.clamp_min),
        clamp_max: config.get_double("bias", "clamp_max", d.clamp_max),
        volume_window: config.get_usize("bias", "volume_window", d.volume_window),
        volume_weight: config.get_double("bias", "volume_weight", d.volume_weight),
        volume_cap: config.get_double("bias", "volume_cap", d.volume_cap),
        flow_window: config.get_usize("bias", "flow_window", d.flow_window),
        flow_step: config.get_double("bias", "flow_step", d.flow_step),
        benchmark_window: config.get_usize("bias", "benchmark_window", d.benchmark_window),
        benchmark_scale: config.get_double("bias", "benchmark_scale", d.benchmark_scale),
    }
}

pub fn build_backtest_settings(config: &dyn ConfigPort) -> Result<BacktestSettings, ForecastError> {
    let quantile_factor = config
        .get_string("backtest", "quantile_factor")
        .and_then(|raw| raw.parse::<f64>().ok());
    Ok(BacktestSettings {
        window: config.get_usize("backtest", "window", DEFAULT_BACKTEST_WINDOW),
        hit_criterion: parse_hit_criterion(config.get_string("backtest", "hit_criterion").as_deref())?,
        quantile_factor,
    })
}

pub fn build_intraday_config(config: &dyn ConfigPort) -> IntradayConfig {
    let d = IntradayConfig::default();
    IntradayConfig {
        range_window: config.get_usize("intraday", "range_window", d.range_window),
        strong_buy_coefficient: config.get_double("intraday", "strong_buy", d.strong_buy_coefficient),
        dip_buy_coefficient: config.get_double("intraday", "dip_buy", d.dip_buy_coefficient),
        sell_coefficient: config.get_double("intraday", "sell", d.sell_coefficient),
    }
}

pub fn build_pipeline(config: &dyn ConfigPort) -> Result<ForecastPipeline, ForecastError> {
    Ok(ForecastPipeline::new(
        QuantileForecastEngine::new(build_forecast_params(config)?),
        BiasFactorEngine::new(build_bias_config(config)),
    ))
}

/// `[data] dir`, resolved against the config file's directory when relative.
pub fn resolve_data_dir(config_path: &Path, config: &dyn ConfigPort) -> Result<PathBuf, ForecastError> {
    let dir = config
        .get_string("data", "dir")
        .ok_or_else(|| ForecastError::ConfigMissing {
            section: "data".to_string(),
            key: "dir".to_string(),
        })?;
    let dir = PathBuf::from(dir);
    if dir.is_relative() {
        if let Some(parent) = config_path.parent() {
            return Ok(parent.join(dir));
        }
    }
    Ok(dir)
}

pub fn build_data_port(config_path: &Path, config: &dyn ConfigPort) -> Result<CsvAdapter, ForecastError> {
    let adapter = CsvAdapter::new(resolve_data_dir(config_path, config)?);
    Ok(match config.get_string("data", "benchmark") {
        Some(code) => adapter.with_benchmark(code),
        None => adapter,
    })
}

/// Everything fetched for one symbol before the core runs.
pub struct MarketInputs {
    pub bars: BarSeries,
    pub flows: Option<Vec<InstitutionalFlow>>,
    pub benchmark: Option<BarSeries>,
}

impl MarketInputs {
    pub fn sources(&self, use_volume: bool) -> SignalSources<'_> {
        SignalSources {
            volume: use_volume,
            institutional: self.flows.as_deref(),
            benchmark: self.benchmark.as_ref().map(BarSeries::as_slice),
        }
    }
}

pub fn load_inputs(data_port: &dyn MarketDataPort, code: &str) -> Result<MarketInputs, ForecastError> {
    let bars = data_port.fetch_daily_bars(code)?;
    if bars.is_empty() {
        return Err(ForecastError::NoData {
            code: code.to_string(),
        });
    }
    let flows = data_port.fetch_institutional_flows(code)?;
    let benchmark = data_port.fetch_benchmark_bars()?;
    info!(
        code,
        bars = bars.len(),
        flows = flows.as_ref().map_or(0, Vec::len),
        benchmark = benchmark.is_some(),
        "market data loaded"
    );
    Ok(MarketInputs {
        bars,
        flows,
        benchmark,
    })
}

pub fn run_forecast_pipeline(
    data_port: &dyn MarketDataPort,
    pipeline: &ForecastPipeline,
    code: &str,
    use_volume: bool,
) -> Result<ForecastReport, ForecastError> {
    let inputs = load_inputs(data_port, code)?;
    pipeline.run(&inputs.bars, &inputs.sources(use_volume))
}

pub fn run_backtest_pipeline(
    data_port: &dyn MarketDataPort,
    backtester: &WalkForwardBacktester,
    settings: &BacktestSettings,
    code: &str,
    use_volume: bool,
) -> Result<Vec<BacktestResult>, ForecastError> {
    let inputs = load_inputs(data_port, code)?;
    let bars = inputs.bars.as_slice();
    let sources = inputs.sources(use_volume);
    let results = match settings.quantile_factor {
        None => backtester.run_all(bars, &sources, settings.window, settings.hit_criterion),
        Some(q) => Horizon::ALL
            .into_iter()
            .flat_map(|h| Direction::ALL.into_iter().map(move |d| (h, d)))
            .map(|(horizon, direction)| {
                let config = BacktestConfig {
                    quantile_factor: Some(q),
                    window: settings.window,
                    hit_criterion: settings.hit_criterion,
                    ..BacktestConfig::new(horizon, direction)
                };
                backtester.run(bars, &sources, &config)
            })
            .collect(),
    };
    Ok(results)
}

pub fn run_intraday_pipeline(
    data_port: &dyn MarketDataPort,
    ticks: &TickTable,
    config: &IntradayConfig,
    code: &str,
) -> Result<IntradayAdvice, ForecastError> {
    let daily = data_port.fetch_daily_bars(code)?;
    let session_bars = data_port.fetch_session_bars(code)?.unwrap_or_default();
    let quote = SessionQuote::from_bars(&session_bars).ok_or_else(|| ForecastError::NoData {
        code: format!("{} (intraday)", code),
    })?;
    // The session's own daily bar, if already written, is not a previous close.
    let today = session_bars.last().map(|b| b.date);
    let history = daily.as_slice();
    let history = match (history.last(), today) {
        (Some(last), Some(today)) if last.date >= today => &history[..history.len() - 1],
        _ => history,
    };
    intraday_advice(quote, history, ticks, config)
}

fn run_forecast(config_path: &Path, code: &str) -> Result<(), ForecastError> {
    let symbol = ListingSymbol::parse(code)?;
    let adapter = load_config(config_path)?;
    let pipeline = build_pipeline(&adapter)?;
    let data_port = build_data_port(config_path, &adapter)?;

    let session = current_session();
    info!(symbol = %symbol, session = %session, "running forecast");
    if !session.serves_previous_session() {
        info!("latest daily bar may belong to today's session");
    }

    let report = run_forecast_pipeline(
        &data_port,
        &pipeline,
        &symbol.code,
        adapter.get_bool("bias", "volume", true),
    )?;
    print!("{}", format_forecast(&symbol, &pipeline, &report));
    Ok(())
}

fn run_backtest(config_path: &Path, code: &str, window: Option<usize>) -> Result<(), ForecastError> {
    let symbol = ListingSymbol::parse(code)?;
    let adapter = load_config(config_path)?;
    let mut settings = build_backtest_settings(&adapter)?;
    if let Some(w) = window {
        settings.window = w;
    }
    let backtester = WalkForwardBacktester::new(build_pipeline(&adapter)?);
    let data_port = build_data_port(config_path, &adapter)?;

    info!(symbol = %symbol, window = settings.window, "running walk-forward backtest");
    let results = run_backtest_pipeline(
        &data_port,
        &backtester,
        &settings,
        &symbol.code,
        adapter.get_bool("bias", "volume", true),
    )?;
    print!("{}", format_backtest(&symbol, &settings, &results));
    Ok(())
}

fn run_dry_run(config_path: &Path, window: Option<usize>) -> Result<(), ForecastError> {
    let adapter = load_config(config_path)?;
    let params = build_forecast_params(&adapter)?;
    let bias = build_bias_config(&adapter);
    let mut settings = build_backtest_settings(&adapter)?;
    if let Some(w) = window {
        settings.window = w;
    }

    println!("Config validated successfully");
    println!("\nForecast:");
    println!("  method:           {:?}", params.method);
    println!("  indicator:        {}", IndicatorType::Atr(params.atr_period));
    println!("  lookback:         {} (min samples {})", params.lookback, params.min_samples);
    println!(
        "  regime:           stddev over {} returns, volatile above {:.4}",
        params.regime_window, params.quantiles.volatility_threshold
    );
    println!("  bias application: {:?}", params.bias_application);
    println!("\nBias:");
    println!("  clamp:            [{:.2}, {:.2}]", bias.clamp_min, bias.clamp_max);
    println!("  flow window:      {}", bias.flow_window);
    println!("\nBacktest:");
    println!("  window:           {}", settings.window);
    println!("  hit criterion:    {:?}", settings.hit_criterion);
    match settings.quantile_factor {
        Some(q) => println!("  quantile:         fixed {:.2} high / {:.2} low", q, 1.0 - q),
        None => println!("  quantile:         regime-selected"),
    }
    println!("\nData:");
    println!("  dir:              {}", resolve_data_dir(config_path, &adapter)?.display());
    println!(
        "  benchmark:        {}",
        adapter.get_string("data", "benchmark").unwrap_or_else(|| "none".to_string())
    );
    println!("\nDry run complete: configuration is valid");
    Ok(())
}

fn run_intraday(config_path: &Path, code: &str) -> Result<(), ForecastError> {
    let symbol = ListingSymbol::parse(code)?;
    let adapter = load_config(config_path)?;
    let ticks = build_forecast_params(&adapter)?.ticks;
    let config = build_intraday_config(&adapter);
    let data_port = build_data_port(config_path, &adapter)?;

    let session = current_session();
    if session != MarketSession::Open {
        info!(session = %session, "market not open, using latest recorded session bars");
    }
    let advice = run_intraday_pipeline(&data_port, &ticks, &config, &symbol.code)?;
    print!("{}", format_intraday(&symbol, &advice));
    Ok(())
}

fn run_session() {
    let session = current_session();
    println!("Taipei market: {}", session);
    if session.serves_previous_session() {
        println!("Latest daily bar is from the previous session");
    }
}

fn run_validate(config_path: &Path) -> Result<(), ForecastError> {
    let adapter = load_config(config_path)?;
    build_forecast_params(&adapter)?;
    build_backtest_settings(&adapter)?;
    println!("{}: configuration is valid", config_path.display());
    Ok(())
}

fn describe_component(component: &BiasComponent) -> String {
    match &component.status {
        SignalStatus::Used => format!("{:+.4}", component.contribution),
        SignalStatus::Missing(reason) => format!("missing ({})", reason),
    }
}

pub fn format_forecast(symbol: &ListingSymbol, pipeline: &ForecastPipeline, report: &ForecastReport) -> String {
    let params = pipeline.engine.params();
    let mut out = String::new();
    out.push_str(&format!(
        "{}  as of {}  close {:.2}\n",
        symbol, report.as_of, report.close
    ));
    let volatility = report
        .return_volatility
        .map_or_else(|| "n/a".to_string(), |v| format!("{:.2}%", v * 100.0));
    out.push_str(&format!(
        "{} {:.2}  regime {} (return stddev {})\n",
        IndicatorType::Atr(params.atr_period),
        report.atr,
        report.regime,
        volatility
    ));
    let b = &report.bias.breakdown;
    out.push_str(&format!(
        "bias {:.4} ({:?}{})  volume {}  institutional {}  benchmark {}\n",
        report.bias.value,
        report.bias.confidence,
        if report.bias.clamped { ", clamped" } else { "" },
        describe_component(&b.volume),
        describe_component(&b.institutional),
        describe_component(&b.benchmark),
    ));
    out.push_str("\nhorizon  side  quantile  offset    raw        target\n");
    for t in &report.targets {
        out.push_str(&format!(
            "{:<7}  {:<4}  {:<8.2}  {:>+7.2}%  {:<9.2}  {:.2}\n",
            t.horizon.to_string(),
            t.direction.to_string(),
            t.quantile,
            t.raw_offset_pct * 100.0,
            t.raw_price,
            t.price
        ));
    }
    out.push_str(&format!("\nestimated open {:.2}\n", report.estimated_open));
    for w in &report.warnings {
        out.push_str(&format!("warning: {}\n", w));
    }
    out
}

pub fn format_backtest(symbol: &ListingSymbol, settings: &BacktestSettings, results: &[BacktestResult]) -> String {
    let mut out = format!(
        "{}  walk-forward backtest, window {}, criterion {:?}\n\n",
        symbol, settings.window, settings.hit_criterion
    );
    out.push_str("horizon  side  hit rate          hits/sample  window  skipped\n");
    for r in results {
        out.push_str(&format!(
            "{:<7}  {:<4}  {:<16}  {:>4}/{:<6}  {:>3}/{:<3} {:>4}\n",
            r.horizon.to_string(),
            r.direction.to_string(),
            r.hit_rate.to_string(),
            r.hits,
            r.sample_size,
            r.window_effective,
            r.window_requested,
            r.skipped
        ));
    }
    out
}

pub fn format_intraday(symbol: &ListingSymbol, advice: &IntradayAdvice) -> String {
    format!(
        "{}  open {:.2}  last {:.2}  prev close {:.2}\n\
         change {:+.2}%  gap {:+.2}%  range estimate {:.2}\n\
         strong buy {:.2}\ndip buy    {:.2}\nsell       {:.2}\n",
        symbol,
        advice.quote.open,
        advice.quote.last,
        advice.previous_close,
        advice.change_pct,
        advice.gap_pct,
        advice.range_estimate,
        advice.strong_buy,
        advice.dip_buy,
        advice.sell_target
    )
}
