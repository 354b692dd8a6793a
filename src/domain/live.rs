//! Live evaluation cycle: evaluate each instrument across timeframes and
//! submit an order when the decision changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info};

use super::config::{LiveSettings, ProfileStore, instrument_key};
use super::decision::{Combinator, Decision, Evaluation, FrameSource};
use super::error::TraderError;
use super::indicator::{IndicatorParams, IndicatorSnapshot, latest_snapshot};
use super::ohlcv::normalize_series;
use super::position::Side;
use super::scoring::ScoringConfig;
use super::timeframe::Timeframe;
use crate::ports::execution_port::ExecutionPort;
use crate::ports::market_data_port::MarketDataPort;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub instrument: String,
    pub side: Side,
    pub size: f64,
    pub stop_price: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderAck {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub instrument: String,
    pub evaluation: Evaluation,
    pub order: Option<(OrderRequest, OrderAck)>,
}

/// Latest snapshot of each timeframe of one instrument, fetched on demand.
pub struct MarketFrames<'a> {
    data: &'a dyn MarketDataPort,
    profiles: &'a ProfileStore,
    instrument: &'a str,
    bar_limit: usize,
}

impl<'a> MarketFrames<'a> {
    pub fn new(
        data: &'a dyn MarketDataPort,
        profiles: &'a ProfileStore,
        instrument: &'a str,
        bar_limit: usize,
    ) -> Self {
        Self {
            data,
            profiles,
            instrument,
            bar_limit,
        }
    }
}

impl FrameSource for MarketFrames<'_> {
    fn snapshot(
        &self,
        timeframe: Timeframe,
        params: &IndicatorParams,
    ) -> Result<IndicatorSnapshot, TraderError> {
        let bars = self
            .data
            .fetch_bars(self.instrument, timeframe, self.bar_limit)?;
        let bars = normalize_series(bars, self.bar_limit);
        debug!(instrument = self.instrument, %timeframe, bars = bars.len(), "frame fetched");
        latest_snapshot(&bars, params).ok_or_else(|| TraderError::NoData {
            instrument: self.instrument.to_string(),
            timeframe: timeframe.to_string(),
        })
    }

    fn scoring_config(&self, timeframe: Timeframe) -> ScoringConfig {
        self.profiles.get(self.instrument, timeframe).scoring.clone()
    }
}

type Memo = Arc<Mutex<Option<Decision>>>;

pub struct LiveTrader {
    data: Arc<dyn MarketDataPort>,
    execution: Arc<dyn ExecutionPort>,
    profiles: ProfileStore,
    combinator: Box<dyn Combinator>,
    settings: LiveSettings,
    price_timeframe: Timeframe,
    memos: Mutex<HashMap<String, Memo>>,
}

impl LiveTrader {
    pub fn new(
        data: Arc<dyn MarketDataPort>,
        execution: Arc<dyn ExecutionPort>,
        profiles: ProfileStore,
        combinator: Box<dyn Combinator>,
        settings: LiveSettings,
    ) -> Self {
        Self {
            data,
            execution,
            profiles,
            combinator,
            settings,
            price_timeframe: Timeframe::M5,
            memos: Mutex::new(HashMap::new()),
        }
    }

    /// Timeframe whose latest close prices an order. Defaults to 5m.
    pub fn with_price_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.price_timeframe = timeframe;
        self
    }

    /// Last decision an order was issued for.
    pub fn last_decision(&self, instrument: &str) -> Option<Decision> {
        *lock(&self.memo(&instrument_key(instrument)))
    }

    /// Evaluate without trading.
    pub fn evaluate(&self, instrument: &str) -> Result<Evaluation, TraderError> {
        let key = instrument_key(instrument);
        let frames = MarketFrames::new(
            self.data.as_ref(),
            &self.profiles,
            &key,
            self.settings.bar_limit,
        );
        self.combinator.evaluate(&frames)
    }

    /// Evaluate one instrument and, if the decision is directional and differs
    /// from the last one issued, size and submit an order. The instrument's
    /// memo stays locked from the comparison until the submission returns.
    pub fn run_cycle(&self, instrument: &str) -> Result<CycleReport, TraderError> {
        let key = instrument_key(instrument);
        let evaluation = self.evaluate(&key)?;
        let decision = evaluation.decision;
        info!(
            instrument = %key,
            combinator = self.combinator.name(),
            %decision,
            confidence = evaluation.confidence.value(),
            "evaluated"
        );

        let mut report = CycleReport {
            instrument: key.clone(),
            evaluation,
            order: None,
        };
        let side = match decision {
            Decision::Buy => Side::Long,
            Decision::Sell => Side::Short,
            _ => return Ok(report),
        };

        let memo = self.memo(&key);
        let mut last = lock(&memo);
        if *last == Some(decision) {
            debug!(instrument = %key, %decision, "already issued, skipping");
            return Ok(report);
        }

        let order = self.size_order(&key, side)?;
        let ack = self.execution.submit(&order)?;
        info!(
            instrument = %key,
            side = side.as_str(),
            size = order.size,
            stop = order.stop_price,
            order_id = %ack.order_id,
            "order accepted"
        );
        *last = Some(decision);
        report.order = Some((order, ack));
        Ok(report)
    }

    /// Run a cycle for every instrument concurrently. A failing instrument
    /// reports `Decision::Error` and does not affect the others.
    pub fn run_all(&self, instruments: &[String]) -> Vec<CycleReport> {
        instruments
            .par_iter()
            .map(|instrument| {
                self.run_cycle(instrument).unwrap_or_else(|e| {
                    error!(instrument = %instrument, error = %e, "cycle failed");
                    CycleReport {
                        instrument: instrument_key(instrument),
                        evaluation: Evaluation::error(e.to_string()),
                        order: None,
                    }
                })
            })
            .collect()
    }

    fn size_order(&self, instrument: &str, side: Side) -> Result<OrderRequest, TraderError> {
        let bars = self
            .data
            .fetch_bars(instrument, self.price_timeframe, 1)?;
        let price = bars.last().map(|b| b.close).ok_or_else(|| TraderError::NoData {
            instrument: instrument.to_string(),
            timeframe: self.price_timeframe.to_string(),
        })?;
        if !(price.is_finite() && price > 0.0) {
            return Err(TraderError::external(
                instrument,
                format!("invalid price {}", price),
            ));
        }

        let balance = self.execution.balance()?;
        if !(balance.is_finite() && balance > 0.0) {
            return Err(TraderError::external(
                instrument,
                format!("balance {} leaves nothing to trade", balance),
            ));
        }

        let stop_pct = self
            .profiles
            .get(instrument, self.price_timeframe)
            .risk
            .stop_loss_pct;
        Ok(OrderRequest {
            instrument: instrument.to_string(),
            side,
            size: balance * self.settings.risk_per_trade / price,
            stop_price: price * (1.0 - side.sign() * stop_pct),
        })
    }

    fn memo(&self, key: &str) -> Memo {
        lock(&self.memos)
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}

/// A panicked holder leaves the memo value intact, so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
