//! Historical replay of one (instrument, timeframe) series, and batches of
//! independent replays.
//!
//! A replay computes one indicator snapshot per bar, scores every bar from
//! `warmup_bars` on with the pair's profile, turns the score into a decision
//! with a [`ThresholdSignal`] and feeds (time, close, decision) through a
//! private [`PositionMachine`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use super::config::{BacktestSettings, Profile, ProfileStore, RunConfig};
use super::decision::{Decision, ThresholdSignal};
use super::error::TraderError;
use super::indicator::compute_snapshots;
use super::metrics::RunResult;
use super::ohlcv::Bar;
use super::position::{
    LifecycleConfig, MalformedPolicy, Observation, PositionMachine, TradeRecord,
};
use super::scoring::{Scorer, ScoringConfig};
use super::timeframe::Timeframe;
use crate::ports::market_data_port::MarketDataPort;

/// One (instrument, timeframe) series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pair {
    pub instrument: String,
    pub timeframe: Timeframe,
}

impl Pair {
    pub fn new(instrument: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe,
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.instrument, self.timeframe)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_balance: f64,
    pub warmup_bars: usize,
    pub lifecycle: LifecycleConfig,
    pub signal: ThresholdSignal,
}

impl BacktestConfig {
    pub fn for_profile(run: &RunConfig, profile: &Profile) -> Self {
        Self {
            initial_balance: run.backtest.initial_balance,
            warmup_bars: run.backtest.warmup_bars,
            lifecycle: run.backtest.lifecycle(&profile.risk),
            signal: ThresholdSignal {
                threshold: run.decision.entry_threshold,
            },
        }
    }
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_balance: 1000.0,
            warmup_bars: 50,
            lifecycle: LifecycleConfig::default(),
            signal: ThresholdSignal::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestOutcome {
    pub trades: Vec<TradeRecord>,
    pub result: RunResult,
    pub bars: usize,
}

/// Drop or reject bars with a non-finite or non-positive price and bars whose
/// timestamp does not advance. Returns the kept bars and the number dropped.
pub fn screen_bars(
    bars: Vec<Bar>,
    policy: MalformedPolicy,
) -> Result<(Vec<Bar>, usize), TraderError> {
    let mut kept: Vec<Bar> = Vec::with_capacity(bars.len());
    let mut dropped = 0usize;

    for (index, bar) in bars.into_iter().enumerate() {
        let reason = if ![bar.open, bar.high, bar.low, bar.close]
            .iter()
            .all(|p| p.is_finite() && *p > 0.0)
        {
            Some(format!("invalid price at {}", bar.timestamp))
        } else if !bar.volume.is_finite() || bar.volume < 0.0 {
            Some(format!("invalid volume {} at {}", bar.volume, bar.timestamp))
        } else {
            match kept.last() {
                Some(prev) if bar.timestamp <= prev.timestamp => Some(format!(
                    "timestamp {} not after {}",
                    bar.timestamp, prev.timestamp
                )),
                _ => None,
            }
        };

        match (reason, policy) {
            (None, _) => kept.push(bar),
            (Some(reason), MalformedPolicy::Skip) => {
                warn!(index, %reason, "skipping malformed bar");
                dropped += 1;
            }
            (Some(reason), MalformedPolicy::Fail) => {
                return Err(TraderError::MalformedBar { index, reason });
            }
        }
    }

    Ok((kept, dropped))
}

/// One observation per bar from `warmup` on.
pub fn decision_series(
    bars: &[Bar],
    scoring: &ScoringConfig,
    scorer: &Scorer,
    signal: ThresholdSignal,
    warmup: usize,
) -> Vec<Observation> {
    compute_snapshots(bars, &scoring.indicators)
        .into_iter()
        .skip(warmup)
        .map(|snap| Observation {
            time: snap.timestamp,
            price: snap.close,
            decision: signal.decide(scorer.score(&snap, scoring)),
        })
        .collect()
}

/// Replay a screened series. Fails if the series is no longer than the warmup.
pub fn run_backtest(
    pair: &Pair,
    bars: &[Bar],
    scoring: &ScoringConfig,
    scorer: &Scorer,
    config: &BacktestConfig,
) -> Result<BacktestOutcome, TraderError> {
    if bars.len() <= config.warmup_bars {
        return Err(TraderError::InsufficientData {
            instrument: pair.instrument.clone(),
            timeframe: pair.timeframe.to_string(),
            bars: bars.len(),
            minimum: config.warmup_bars + 1,
        });
    }

    let observations = decision_series(bars, scoring, scorer, config.signal, config.warmup_bars);
    let mut machine = PositionMachine::new(config.lifecycle);
    let mut signals = 0usize;
    for obs in observations {
        if obs.decision != Decision::Avoid {
            signals += 1;
        }
        machine.step(obs)?;
    }
    let trades = machine.finish();
    let result = RunResult::from_trades(&trades, config.initial_balance);

    debug!(
        pair = %pair,
        bars = bars.len(),
        signals,
        trades = trades.len(),
        "backtest finished"
    );

    Ok(BacktestOutcome {
        trades,
        result,
        bars: bars.len(),
    })
}

/// Fetch and screen the history of one pair.
pub fn load_series(
    data: &dyn MarketDataPort,
    pair: &Pair,
    settings: &BacktestSettings,
) -> Result<Vec<Bar>, TraderError> {
    let raw = data.fetch_bars(&pair.instrument, pair.timeframe, settings.max_bars)?;
    if raw.is_empty() {
        return Err(TraderError::NoData {
            instrument: pair.instrument.clone(),
            timeframe: pair.timeframe.to_string(),
        });
    }
    let (bars, dropped) = screen_bars(raw, settings.on_malformed)?;
    if dropped > 0 {
        warn!(pair = %pair, dropped, "malformed bars skipped");
    }
    Ok(bars)
}

/// Load and replay one pair with its stored profile.
pub fn run_pair(
    data: &dyn MarketDataPort,
    pair: &Pair,
    profiles: &ProfileStore,
    run: &RunConfig,
) -> Result<BacktestOutcome, TraderError> {
    let profile = profiles.get(&pair.instrument, pair.timeframe);
    let bars = load_series(data, pair, &run.backtest)?;
    let scorer = run.decision.scorer.build();
    run_backtest(
        pair,
        &bars,
        &profile.scoring,
        &scorer,
        &BacktestConfig::for_profile(run, profile),
    )
}

/// Every configured (instrument, timeframe) pair with history available.
pub fn discover_pairs(
    data: &dyn MarketDataPort,
    instruments: &[String],
    timeframes: &[Timeframe],
) -> Vec<Pair> {
    instruments
        .iter()
        .flat_map(|i| timeframes.iter().map(move |tf| Pair::new(i.clone(), *tf)))
        .filter(|p| {
            let found = data.has_series(&p.instrument, p.timeframe);
            if !found {
                debug!(pair = %p, "no history, skipping");
            }
            found
        })
        .collect()
}

#[derive(Debug)]
pub struct BatchEntry {
    pub pair: Pair,
    pub outcome: Result<BacktestOutcome, TraderError>,
}

/// Replay every pair independently. A failing pair is logged and reported in
/// its entry; the others are unaffected. Pairs run concurrently when
/// `[backtest] parallel` is set. Pairs not started before `cancel` is raised
/// are left out of the result.
pub fn run_batch(
    data: &dyn MarketDataPort,
    pairs: &[Pair],
    profiles: &ProfileStore,
    run: &RunConfig,
    cancel: Option<&AtomicBool>,
) -> Vec<BatchEntry> {
    let run_one = |pair: &Pair| -> Option<BatchEntry> {
        if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
            return None;
        }
        let outcome = run_pair(data, pair, profiles, run);
        match &outcome {
            Ok(o) => info!(
                pair = %pair,
                trades = o.result.trade_count,
                win_rate = o.result.win_rate,
                ending_balance = o.result.ending_balance,
                "pair done"
            ),
            Err(e) => error!(pair = %pair, error = %e, "pair failed"),
        }
        Some(BatchEntry {
            pair: pair.clone(),
            outcome,
        })
    };

    if run.backtest.parallel {
        pairs.par_iter().filter_map(run_one).collect()
    } else {
        pairs.iter().filter_map(run_one).collect()
    }
}
