//! Core domain types and logic.

pub mod backtest;
pub mod config;
pub mod config_validation;
pub mod decision;
pub mod error;
pub mod indicator;
pub mod live;
pub mod metrics;
pub mod ohlcv;
pub mod position;
pub mod scoring;
pub mod search;
pub mod timeframe;
