//! Multi-timeframe decision combinators.
//!
//! Three strategies share the [`Decision`] output:
//! - [`TieredCombinator`]: an ordered chain of [`TierGate`]s (macro bias, trend
//!   confirmation, execution trigger). Each gate either passes a bias on or
//!   finishes the evaluation; timeframes of later gates are never fetched once
//!   an earlier gate has finished.
//! - [`ConfidenceMatrix`]: a flat count of binary checks across timeframes,
//!   reported as `hits/total`.
//! - [`ThresholdSignal`]: a single-timeframe score threshold, used when
//!   replaying one series.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use super::error::TraderError;
use super::indicator::{IndicatorParams, IndicatorSnapshot};
use super::scoring::{Scorer, ScoringConfig};
use super::timeframe::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Buy,
    Sell,
    Avoid,
    Error,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Buy => "buy",
            Decision::Sell => "sell",
            Decision::Avoid => "avoid",
            Decision::Error => "error",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Confidence {
    /// Mean of the execution-tier scores.
    Mean(f64),
    /// Agreeing checks out of the total.
    Fraction { hits: u32, total: u32 },
}

impl Confidence {
    /// The magnitude as a plain number; a fraction becomes hits / total.
    pub fn value(self) -> f64 {
        match self {
            Confidence::Mean(v) => v,
            Confidence::Fraction { hits, total } if total > 0 => hits as f64 / total as f64,
            Confidence::Fraction { .. } => 0.0,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Mean(v) => write!(f, "{:.4}", v),
            Confidence::Fraction { hits, total } => write!(f, "{}/{}", hits, total),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    pub confidence: Confidence,
    pub reasons: Vec<String>,
}

impl Evaluation {
    pub fn avoid() -> Self {
        Self {
            decision: Decision::Avoid,
            confidence: Confidence::Mean(0.0),
            reasons: Vec::new(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Error,
            confidence: Confidence::Mean(0.0),
            reasons: vec![reason.into()],
        }
    }

    fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }
}

/// Per-instrument access to the latest indicator snapshot of each timeframe.
pub trait FrameSource {
    fn snapshot(
        &self,
        timeframe: Timeframe,
        params: &IndicatorParams,
    ) -> Result<IndicatorSnapshot, TraderError>;

    fn scoring_config(&self, timeframe: Timeframe) -> ScoringConfig;
}

pub trait Combinator: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, source: &dyn FrameSource) -> Result<Evaluation, TraderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bias::Bullish => "bullish",
            Bias::Bearish => "bearish",
            Bias::Neutral => "neutral",
        })
    }
}

pub enum TierOutcome {
    /// Hand the bias to the next gate.
    Pass(Bias),
    /// Stop the chain with this evaluation.
    Finish(Evaluation),
}

/// One stage of the tiered combinator.
pub trait TierGate: Send + Sync {
    fn name(&self) -> &'static str;

    fn timeframes(&self) -> &[Timeframe];

    fn judge(&self, bias: Bias, scores: &[f64]) -> TierOutcome;
}

/// Bullish if every score is positive, bearish if every score is negative,
/// otherwise neutral and the chain stops with avoid.
pub struct MacroGate {
    pub timeframes: Vec<Timeframe>,
}

impl TierGate for MacroGate {
    fn name(&self) -> &'static str {
        "macro"
    }

    fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    fn judge(&self, _bias: Bias, scores: &[f64]) -> TierOutcome {
        let bias = if scores.is_empty() {
            Bias::Neutral
        } else if scores.iter().all(|s| *s > 0.0) {
            Bias::Bullish
        } else if scores.iter().all(|s| *s < 0.0) {
            Bias::Bearish
        } else {
            Bias::Neutral
        };
        match bias {
            Bias::Neutral => {
                TierOutcome::Finish(Evaluation::avoid().with_reason("macro bias neutral"))
            }
            b => TierOutcome::Pass(b),
        }
    }
}

/// Every score must agree with the bias beyond `threshold`.
pub struct TrendGate {
    pub timeframes: Vec<Timeframe>,
    pub threshold: f64,
}

impl TierGate for TrendGate {
    fn name(&self) -> &'static str {
        "trend"
    }

    fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    fn judge(&self, bias: Bias, scores: &[f64]) -> TierOutcome {
        if agrees(bias, scores, self.threshold) {
            TierOutcome::Pass(bias)
        } else {
            TierOutcome::Finish(
                Evaluation::avoid().with_reason(format!("trend does not confirm {} bias", bias)),
            )
        }
    }
}

/// Every score must clear `threshold` in the bias direction to trigger an
/// entry. Always finishes, carrying the mean score as confidence.
pub struct ExecutionGate {
    pub timeframes: Vec<Timeframe>,
    pub threshold: f64,
}

impl TierGate for ExecutionGate {
    fn name(&self) -> &'static str {
        "execution"
    }

    fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    fn judge(&self, bias: Bias, scores: &[f64]) -> TierOutcome {
        let mean = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        let decision = match bias {
            Bias::Bullish if agrees(bias, scores, self.threshold) => Decision::Buy,
            Bias::Bearish if agrees(bias, scores, self.threshold) => Decision::Sell,
            _ => Decision::Avoid,
        };
        let reason = match decision {
            Decision::Avoid => format!("execution scores do not clear {}", self.threshold),
            d => format!("{} bias confirmed, {}", bias, d),
        };
        TierOutcome::Finish(Evaluation {
            decision,
            confidence: Confidence::Mean(mean),
            reasons: vec![reason],
        })
    }
}

fn agrees(bias: Bias, scores: &[f64], threshold: f64) -> bool {
    !scores.is_empty()
        && match bias {
            Bias::Bullish => scores.iter().all(|s| *s > threshold),
            Bias::Bearish => scores.iter().all(|s| *s < -threshold),
            Bias::Neutral => false,
        }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierSettings {
    pub macro_timeframes: Vec<Timeframe>,
    pub trend_timeframes: Vec<Timeframe>,
    pub execution_timeframes: Vec<Timeframe>,
    pub trend_threshold: f64,
    pub execution_threshold: f64,
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            macro_timeframes: vec![Timeframe::H4, Timeframe::D1],
            trend_timeframes: vec![Timeframe::H1, Timeframe::M15],
            execution_timeframes: vec![Timeframe::M15, Timeframe::M5],
            trend_threshold: 0.0,
            execution_threshold: 1.0,
        }
    }
}

/// Ordered chain of tier gates.
pub struct TieredCombinator {
    gates: Vec<Box<dyn TierGate>>,
    scorer: Scorer,
}

impl TieredCombinator {
    pub fn new(settings: &TierSettings, scorer: Scorer) -> Self {
        Self::from_gates(
            vec![
                Box::new(MacroGate {
                    timeframes: settings.macro_timeframes.clone(),
                }),
                Box::new(TrendGate {
                    timeframes: settings.trend_timeframes.clone(),
                    threshold: settings.trend_threshold,
                }),
                Box::new(ExecutionGate {
                    timeframes: settings.execution_timeframes.clone(),
                    threshold: settings.execution_threshold,
                }),
            ],
            scorer,
        )
    }

    pub fn from_gates(gates: Vec<Box<dyn TierGate>>, scorer: Scorer) -> Self {
        Self { gates, scorer }
    }

    fn score_frame(
        &self,
        source: &dyn FrameSource,
        timeframe: Timeframe,
    ) -> Result<f64, TraderError> {
        let config = source.scoring_config(timeframe);
        let snapshot = source.snapshot(timeframe, &config.indicators)?;
        Ok(self.scorer.score(&snapshot, &config))
    }
}

impl Default for TieredCombinator {
    fn default() -> Self {
        Self::new(&TierSettings::default(), Scorer::standard())
    }
}

impl Combinator for TieredCombinator {
    fn name(&self) -> &'static str {
        "tiered"
    }

    fn evaluate(&self, source: &dyn FrameSource) -> Result<Evaluation, TraderError> {
        let mut bias = Bias::Neutral;
        for gate in &self.gates {
            let scores = gate
                .timeframes()
                .iter()
                .map(|tf| self.score_frame(source, *tf))
                .collect::<Result<Vec<f64>, _>>()?;
            debug!(tier = gate.name(), ?scores, %bias, "tier scored");
            match gate.judge(bias, &scores) {
                TierOutcome::Pass(next) => bias = next,
                TierOutcome::Finish(evaluation) => return Ok(evaluation),
            }
        }
        Ok(Evaluation::avoid())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// EMA fast above EMA slow.
    EmaTrend,
    /// RSI above 50.
    RsiAboveMid,
    /// MACD histogram above zero.
    MacdPositive,
    /// Volume above its rolling mean.
    VolumeAboveAverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixCheck {
    pub timeframe: Timeframe,
    pub kind: CheckKind,
}

impl MatrixCheck {
    /// `Some(true)` counts long, `Some(false)` counts short, `None` neither.
    fn outcome(&self, snap: &IndicatorSnapshot) -> Option<bool> {
        match self.kind {
            CheckKind::EmaTrend => Some(snap.ema_fast? > snap.ema_slow?),
            CheckKind::RsiAboveMid => Some(snap.rsi? > 50.0),
            CheckKind::MacdPositive => Some(snap.macd_hist? > 0.0),
            CheckKind::VolumeAboveAverage => Some(snap.volume > snap.volume_sma?),
        }
    }

    fn describe(&self, long: bool) -> String {
        let tf = self.timeframe;
        match (self.kind, long) {
            (CheckKind::EmaTrend, true) => format!("{} EMA fast > EMA slow (uptrend)", tf),
            (CheckKind::EmaTrend, false) => format!("{} EMA fast <= EMA slow (downtrend)", tf),
            (CheckKind::RsiAboveMid, true) => format!("{} RSI > 50", tf),
            (CheckKind::RsiAboveMid, false) => format!("{} RSI <= 50", tf),
            (CheckKind::MacdPositive, true) => format!("{} MACD histogram > 0", tf),
            (CheckKind::MacdPositive, false) => format!("{} MACD histogram <= 0", tf),
            (CheckKind::VolumeAboveAverage, true) => format!("{} volume > average", tf),
            (CheckKind::VolumeAboveAverage, false) => format!("{} volume <= average", tf),
        }
    }
}

/// Flat majority vote over binary checks.
#[derive(Debug, Clone)]
pub struct ConfidenceMatrix {
    pub checks: Vec<MatrixCheck>,
    pub params: IndicatorParams,
    pub threshold: u32,
}

impl ConfidenceMatrix {
    pub fn new(threshold: u32) -> Self {
        use CheckKind::*;
        let check = |timeframe, kind| MatrixCheck { timeframe, kind };
        let mut checks = vec![
            check(Timeframe::H4, EmaTrend),
            check(Timeframe::H1, EmaTrend),
        ];
        for tf in [Timeframe::M15, Timeframe::M5] {
            checks.extend([
                check(tf, RsiAboveMid),
                check(tf, MacdPositive),
                check(tf, VolumeAboveAverage),
                check(tf, EmaTrend),
            ]);
        }
        Self {
            checks,
            params: IndicatorParams {
                ema_fast: 20,
                ema_slow: 50,
                ..IndicatorParams::default()
            },
            threshold,
        }
    }
}

impl Default for ConfidenceMatrix {
    fn default() -> Self {
        Self::new(7)
    }
}

impl Combinator for ConfidenceMatrix {
    fn name(&self) -> &'static str {
        "matrix"
    }

    fn evaluate(&self, source: &dyn FrameSource) -> Result<Evaluation, TraderError> {
        let mut snapshots: BTreeMap<Timeframe, IndicatorSnapshot> = BTreeMap::new();
        let mut long_reasons = Vec::new();
        let mut short_reasons = Vec::new();

        for check in &self.checks {
            if !snapshots.contains_key(&check.timeframe) {
                let snap = source.snapshot(check.timeframe, &self.params)?;
                snapshots.insert(check.timeframe, snap);
            }
            match snapshots.get(&check.timeframe).and_then(|s| check.outcome(s)) {
                Some(true) => long_reasons.push(check.describe(true)),
                Some(false) => short_reasons.push(check.describe(false)),
                None => {}
            }
        }

        let total = self.checks.len() as u32;
        let long = long_reasons.len() as u32;
        let short = short_reasons.len() as u32;

        let (decision, hits, reasons) = if long >= self.threshold {
            (Decision::Buy, long, long_reasons)
        } else if short >= self.threshold {
            (Decision::Sell, short, short_reasons)
        } else if long >= short {
            (Decision::Avoid, long, long_reasons)
        } else {
            (Decision::Avoid, short, short_reasons)
        };

        Ok(Evaluation {
            decision,
            confidence: Confidence::Fraction { hits, total },
            reasons,
        })
    }
}

/// Single-timeframe entry rule: buy above `threshold`, sell below `-threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSignal {
    pub threshold: f64,
}

impl ThresholdSignal {
    pub fn decide(&self, score: f64) -> Decision {
        if score > self.threshold {
            Decision::Buy
        } else if score < -self.threshold {
            Decision::Sell
        } else {
            Decision::Avoid
        }
    }
}

impl Default for ThresholdSignal {
    fn default() -> Self {
        Self { threshold: 1.0 }
    }
}
