//! Core domain types and the forecasting pipeline.

pub mod ohlcv;
pub mod indicator;
pub mod bias;
pub mod tick;
pub mod forecast;
pub mod backtest;
pub mod intraday;
pub mod session;
pub mod symbol;
pub mod config_validation;
pub mod error;
