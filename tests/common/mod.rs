#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
pub use tiertrader::domain::ohlcv::Bar;
use tiertrader::domain::config::{Profile, ProfileStore, instrument_key};
use tiertrader::domain::error::TraderError;
use tiertrader::domain::live::{OrderAck, OrderRequest};
use tiertrader::domain::timeframe::Timeframe;
use tiertrader::ports::execution_port::ExecutionPort;
use tiertrader::ports::market_data_port::MarketDataPort;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;

pub struct MockMarketData {
    pub data: HashMap<(String, Timeframe), Vec<Bar>>,
    pub errors: HashMap<String, String>,
    pub fetches: Mutex<Vec<(String, Timeframe)>>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn with_bars(mut self, instrument: &str, timeframe: Timeframe, bars: Vec<Bar>) -> Self {
        self.data.insert((instrument_key(instrument), timeframe), bars);
        self
    }

    /// The same series on every timeframe.
    pub fn with_all_timeframes(mut self, instrument: &str, bars: Vec<Bar>) -> Self {
        for tf in Timeframe::ALL {
            self.data.insert((instrument_key(instrument), tf), bars.clone());
        }
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors.insert(instrument_key(instrument), reason.to_string());
        self
    }

    pub fn fetched(&self) -> Vec<(String, Timeframe)> {
        self.fetches.lock().unwrap().clone()
    }
}

impl MarketDataPort for MockMarketData {
    fn fetch_bars(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, TraderError> {
        let key = instrument_key(instrument);
        self.fetches.lock().unwrap().push((key.clone(), timeframe));
        if let Some(reason) = self.errors.get(&key) {
            return Err(TraderError::external(&key, reason.clone()));
        }
        let mut bars = self.data.get(&(key, timeframe)).cloned().unwrap_or_default();
        if limit > 0 && bars.len() > limit {
            bars.drain(..bars.len() - limit);
        }
        Ok(bars)
    }

    fn has_series(&self, instrument: &str, timeframe: Timeframe) -> bool {
        let key = instrument_key(instrument);
        self.errors.contains_key(&key) || self.data.contains_key(&(key, timeframe))
    }
}

pub struct MockExecution {
    pub balance: f64,
    pub reject: bool,
    pub orders: Mutex<Vec<OrderRequest>>,
}

impl MockExecution {
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            reject: false,
            orders: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }
}

impl ExecutionPort for MockExecution {
    fn balance(&self) -> Result<f64, TraderError> {
        Ok(self.balance)
    }

    fn submit(&self, order: &OrderRequest) -> Result<OrderAck, TraderError> {
        if self.reject {
            return Err(TraderError::external(&order.instrument, "order rejected"));
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push(order.clone());
        Ok(OrderAck {
            order_id: format!("MOCK-{}", orders.len()),
        })
    }
}

pub fn ts(hour: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::hours(hour)
}

/// Hourly bars on a straight line with constant volume.
pub fn trend_bars(count: usize, start_price: f64, step: f64) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let close = start_price + step * i as f64;
            Bar {
                timestamp: ts(i as i64),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 100.0,
            }
        })
        .collect()
}

/// Replace volumes with a steady rise.
pub fn rising_volume(mut bars: Vec<Bar>) -> Vec<Bar> {
    for (i, b) in bars.iter_mut().enumerate() {
        b.volume = 100.0 + 10.0 * i as f64;
    }
    bars
}

/// Hourly bars oscillating around a slow drift.
pub fn wave_bars(count: usize, start_price: f64) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let close = start_price + 8.0 * (i as f64 / 6.0).sin() + 0.03 * i as f64;
            Bar {
                timestamp: ts(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 100.0 + ((i * 37) % 11) as f64 * 15.0,
            }
        })
        .collect()
}

/// A profile whose rsi thresholds never fire, so straight-line trends score
/// ±2 (ema and vwap).
pub fn trend_profile() -> Profile {
    let mut p = Profile::default();
    p.scoring.thresholds.rsi_overbought = 100.0;
    p.scoring.thresholds.rsi_oversold = 0.0;
    p
}

pub fn trend_store() -> ProfileStore {
    ProfileStore::new(trend_profile())
}

/// CSV text in the layout `CsvMarketData` reads.
pub fn bars_csv(bars: &[Bar]) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    for b in bars {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            b.timestamp.format("%Y-%m-%d %H:%M:%S"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        )
        .unwrap();
    }
    out
}
