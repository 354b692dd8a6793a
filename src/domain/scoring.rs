//! Weighted scoring of one timeframe's indicator snapshot.
//!
//! A [`Scorer`] walks an ordered list of named [`ScoringRule`]s. Each rule
//! votes up, down or abstains; the score is the sum of vote × weight, with the
//! weight looked up by the rule's name in [`Weights`]. An undefined indicator
//! always abstains.

use std::collections::BTreeMap;

use super::indicator::{IndicatorParams, IndicatorSnapshot};

/// Weight used for any rule name without an explicit entry.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Rule names known to the standard and extended scorers.
pub const RULE_NAMES: [&str; 6] = ["ema", "rsi", "vwap", "volume", "adx", "mean_reversion"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub volume_zscore: f64,
    pub adx: f64,
    pub mean_reversion: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            volume_zscore: 1.5,
            adx: 25.0,
            mean_reversion: 1.0,
        }
    }
}

/// Per-rule weights keyed by rule name.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights(BTreeMap<String, f64>);

impl Default for Weights {
    fn default() -> Self {
        Self(
            RULE_NAMES
                .iter()
                .map(|name| (name.to_string(), DEFAULT_WEIGHT))
                .collect(),
        )
    }
}

impl Weights {
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(DEFAULT_WEIGHT)
    }

    pub fn set(&mut self, name: &str, weight: f64) {
        self.0.insert(name.to_string(), weight);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Everything one timeframe needs to be scored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringConfig {
    pub indicators: IndicatorParams,
    pub thresholds: Thresholds,
    pub weights: Weights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Up,
    Down,
    Abstain,
}

impl Vote {
    pub fn sign(self) -> f64 {
        match self {
            Vote::Up => 1.0,
            Vote::Down => -1.0,
            Vote::Abstain => 0.0,
        }
    }
}

pub trait ScoringRule: Send + Sync {
    /// Weight key of this rule.
    fn name(&self) -> &'static str;

    fn vote(&self, snapshot: &IndicatorSnapshot, config: &ScoringConfig) -> Vote;
}

/// Fast EMA above slow EMA votes up, otherwise down.
pub struct EmaCross;

impl ScoringRule for EmaCross {
    fn name(&self) -> &'static str {
        "ema"
    }

    fn vote(&self, snapshot: &IndicatorSnapshot, _config: &ScoringConfig) -> Vote {
        match (snapshot.ema_fast, snapshot.ema_slow) {
            (Some(fast), Some(slow)) if fast > slow => Vote::Up,
            (Some(_), Some(_)) => Vote::Down,
            _ => Vote::Abstain,
        }
    }
}

/// Oversold votes up, overbought votes down.
pub struct RsiExtreme;

impl ScoringRule for RsiExtreme {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn vote(&self, snapshot: &IndicatorSnapshot, config: &ScoringConfig) -> Vote {
        match snapshot.rsi {
            Some(rsi) if rsi < config.thresholds.rsi_oversold => Vote::Up,
            Some(rsi) if rsi > config.thresholds.rsi_overbought => Vote::Down,
            _ => Vote::Abstain,
        }
    }
}

/// Close above VWAP votes up, otherwise down.
pub struct VwapSide;

impl ScoringRule for VwapSide {
    fn name(&self) -> &'static str {
        "vwap"
    }

    fn vote(&self, snapshot: &IndicatorSnapshot, _config: &ScoringConfig) -> Vote {
        match snapshot.vwap {
            Some(vwap) if snapshot.close > vwap => Vote::Up,
            Some(_) => Vote::Down,
            None => Vote::Abstain,
        }
    }
}

/// A volume spike votes up. Never votes down.
pub struct VolumeSpike;

impl ScoringRule for VolumeSpike {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn vote(&self, snapshot: &IndicatorSnapshot, config: &ScoringConfig) -> Vote {
        match snapshot.volume_zscore {
            Some(z) if z > config.thresholds.volume_zscore => Vote::Up,
            _ => Vote::Abstain,
        }
    }
}

/// A strong trend (ADX above threshold) votes in the EMA-cross direction.
pub struct TrendStrength;

impl ScoringRule for TrendStrength {
    fn name(&self) -> &'static str {
        "adx"
    }

    fn vote(&self, snapshot: &IndicatorSnapshot, config: &ScoringConfig) -> Vote {
        match snapshot.adx {
            Some(adx) if adx > config.thresholds.adx => EmaCross.vote(snapshot, config),
            _ => Vote::Abstain,
        }
    }
}

/// Price stretched below its mean votes up, stretched above votes down.
pub struct MeanReversion;

impl ScoringRule for MeanReversion {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn vote(&self, snapshot: &IndicatorSnapshot, config: &ScoringConfig) -> Vote {
        let threshold = config.thresholds.mean_reversion;
        match snapshot.mean_rev_z {
            Some(z) if z < -threshold => Vote::Up,
            Some(z) if z > threshold => Vote::Down,
            _ => Vote::Abstain,
        }
    }
}

/// Ordered rule set.
pub struct Scorer {
    rules: Vec<Box<dyn ScoringRule>>,
}

impl Scorer {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// ema, rsi, vwap, volume.
    pub fn standard() -> Self {
        Self::empty()
            .with_rule(EmaCross)
            .with_rule(RsiExtreme)
            .with_rule(VwapSide)
            .with_rule(VolumeSpike)
    }

    /// The standard rules followed by adx and mean_reversion.
    pub fn extended() -> Self {
        Self::standard()
            .with_rule(TrendStrength)
            .with_rule(MeanReversion)
    }

    pub fn with_rule<R: ScoringRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Each rule's signed, weighted contribution in evaluation order.
    pub fn contributions(
        &self,
        snapshot: &IndicatorSnapshot,
        config: &ScoringConfig,
    ) -> Vec<(&'static str, f64)> {
        self.rules
            .iter()
            .map(|rule| {
                let weight = config.weights.get(rule.name());
                (rule.name(), rule.vote(snapshot, config).sign() * weight)
            })
            .collect()
    }

    pub fn score(&self, snapshot: &IndicatorSnapshot, config: &ScoringConfig) -> f64 {
        self.contributions(snapshot, config)
            .into_iter()
            .map(|(_, c)| c)
            .sum()
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scorer")
            .field("rules", &self.rule_names())
            .finish()
    }
}

/// Named rule sets selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerKind {
    Standard,
    Extended,
}

impl ScorerKind {
    pub fn build(self) -> Scorer {
        match self {
            ScorerKind::Standard => Scorer::standard(),
            ScorerKind::Extended => Scorer::extended(),
        }
    }
}

impl std::str::FromStr for ScorerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(ScorerKind::Standard),
            "extended" => Ok(ScorerKind::Extended),
            other => Err(format!("unknown scorer {:?}, expected standard or extended", other)),
        }
    }
}

/// Score with the standard rule set.
pub fn score(snapshot: &IndicatorSnapshot, config: &ScoringConfig) -> f64 {
    Scorer::standard().score(snapshot, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn snapshot(close: f64) -> IndicatorSnapshot {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        IndicatorSnapshot::bare(ts, close, 100.0)
    }

    fn bullish() -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_fast: Some(105.0),
            ema_slow: Some(100.0),
            rsi: Some(25.0),
            vwap: Some(99.0),
            volume_zscore: Some(2.0),
            ..snapshot(106.0)
        }
    }

    #[test]
    fn undefined_snapshot_scores_zero() {
        let cfg = ScoringConfig::default();
        assert_relative_eq!(score(&snapshot(100.0), &cfg), 0.0);
        assert_relative_eq!(Scorer::extended().score(&snapshot(100.0), &cfg), 0.0);
    }

    #[test]
    fn all_bullish_rules_sum_weights() {
        let cfg = ScoringConfig::default();
        assert_relative_eq!(score(&bullish(), &cfg), 4.0);
    }

    #[test]
    fn weights_scale_contributions() {
        let mut cfg = ScoringConfig::default();
        cfg.weights.set("ema", 2.5);
        cfg.weights.set("volume", 0.5);
        // 2.5 + 1 + 1 + 0.5
        assert_relative_eq!(score(&bullish(), &cfg), 5.0);
    }

    #[test]
    fn bearish_snapshot() {
        let snap = IndicatorSnapshot {
            ema_fast: Some(95.0),
            ema_slow: Some(100.0),
            rsi: Some(80.0),
            vwap: Some(101.0),
            volume_zscore: Some(0.2),
            ..snapshot(94.0)
        };
        assert_relative_eq!(score(&snap, &ScoringConfig::default()), -3.0);
    }

    #[test]
    fn volume_rule_never_votes_down() {
        let snap = IndicatorSnapshot {
            volume_zscore: Some(-5.0),
            ..snapshot(100.0)
        };
        assert_eq!(VolumeSpike.vote(&snap, &ScoringConfig::default()), Vote::Abstain);
    }

    #[test]
    fn rsi_between_thresholds_abstains() {
        let snap = IndicatorSnapshot {
            rsi: Some(50.0),
            ..snapshot(100.0)
        };
        assert_eq!(RsiExtreme.vote(&snap, &ScoringConfig::default()), Vote::Abstain);
    }

    #[test]
    fn trend_strength_follows_ema_direction() {
        let cfg = ScoringConfig::default();
        let strong = IndicatorSnapshot {
            adx: Some(40.0),
            ..bullish()
        };
        let weak = IndicatorSnapshot {
            adx: Some(10.0),
            ..bullish()
        };
        assert_eq!(TrendStrength.vote(&strong, &cfg), Vote::Up);
        assert_eq!(TrendStrength.vote(&weak, &cfg), Vote::Abstain);
    }

    #[test]
    fn mean_reversion_fades_stretch() {
        let cfg = ScoringConfig::default();
        let below = IndicatorSnapshot {
            mean_rev_z: Some(-1.5),
            ..snapshot(100.0)
        };
        let above = IndicatorSnapshot {
            mean_rev_z: Some(1.5),
            ..snapshot(100.0)
        };
        assert_eq!(MeanReversion.vote(&below, &cfg), Vote::Up);
        assert_eq!(MeanReversion.vote(&above, &cfg), Vote::Down);
    }

    #[test]
    fn extended_adds_named_rules() {
        assert_eq!(
            Scorer::extended().rule_names(),
            vec!["ema", "rsi", "vwap", "volume", "adx", "mean_reversion"]
        );
    }

    #[test]
    fn custom_rule_plugs_in() {
        struct AlwaysUp;
        impl ScoringRule for AlwaysUp {
            fn name(&self) -> &'static str {
                "always_up"
            }
            fn vote(&self, _: &IndicatorSnapshot, _: &ScoringConfig) -> Vote {
                Vote::Up
            }
        }
        let mut cfg = ScoringConfig::default();
        cfg.weights.set("always_up", 3.0);
        let scorer = Scorer::empty().with_rule(AlwaysUp);
        assert_relative_eq!(scorer.score(&snapshot(1.0), &cfg), 3.0);
    }

    #[test]
    fn scorer_kind_parses() {
        assert_eq!("Extended".parse::<ScorerKind>(), Ok(ScorerKind::Extended));
        assert_eq!(ScorerKind::Standard.build().rule_names().len(), 4);
        assert!("fancy".parse::<ScorerKind>().is_err());
    }

    #[test]
    fn unknown_weight_defaults_to_one() {
        assert_relative_eq!(Weights::default().get("nope"), DEFAULT_WEIGHT);
    }

    proptest! {
        #[test]
        fn scoring_is_pure(
            fast in 1.0f64..200.0,
            slow in 1.0f64..200.0,
            rsi in 0.0f64..100.0,
            vwap in 1.0f64..200.0,
            z in -4.0f64..4.0,
            close in 1.0f64..200.0,
            w in 0.0f64..3.0,
        ) {
            let snap = IndicatorSnapshot {
                ema_fast: Some(fast),
                ema_slow: Some(slow),
                rsi: Some(rsi),
                vwap: Some(vwap),
                volume_zscore: Some(z),
                ..snapshot(close)
            };
            let mut cfg = ScoringConfig::default();
            cfg.weights.set("rsi", w);
            let scorer = Scorer::extended();
            let first = scorer.score(&snap, &cfg);
            let second = scorer.score(&snap, &cfg);
            prop_assert_eq!(first.to_bits(), second.to_bits());
            prop_assert_eq!(score(&snap, &cfg).to_bits(), score(&snap, &cfg).to_bits());
        }
    }
}
