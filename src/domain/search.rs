//! Random-search parameter optimization per (instrument, timeframe) pair.
//!
//! Each trial samples a profile uniformly from a [`ParamSpace`], replays the
//! pair's history with it, and keeps the profile with the highest ending
//! balance. Ties keep the earlier trial.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info};

use super::backtest::{BacktestConfig, Pair, load_series, run_backtest};
use super::config::{Profile, ProfileStore, RiskParams, RunConfig};
use super::error::TraderError;
use super::metrics::RunResult;
use super::ohlcv::Bar;
use super::scoring::RULE_NAMES;
use crate::ports::market_data_port::MarketDataPort;

/// Sampling ranges. Parameters not listed, and rules without a weight range,
/// keep the base profile's value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpace {
    pub ema_fast: RangeInclusive<usize>,
    pub ema_slow: RangeInclusive<usize>,
    pub rsi_length: RangeInclusive<usize>,
    pub adx_length: RangeInclusive<usize>,
    pub mean_rev_length: RangeInclusive<usize>,
    pub volume_zscore: RangeInclusive<f64>,
    pub rsi_overbought: RangeInclusive<f64>,
    pub rsi_oversold: RangeInclusive<f64>,
    pub adx_threshold: RangeInclusive<f64>,
    pub mean_rev_threshold: RangeInclusive<f64>,
    pub weights: BTreeMap<&'static str, RangeInclusive<f64>>,
    pub stop_loss_pct: RangeInclusive<f64>,
    pub take_profit_pct: RangeInclusive<f64>,
    pub trailing_pct: RangeInclusive<f64>,
}

impl Default for ParamSpace {
    fn default() -> Self {
        Self {
            ema_fast: 8..=20,
            ema_slow: 21..=100,
            rsi_length: 6..=20,
            adx_length: 6..=20,
            mean_rev_length: 2..=30,
            volume_zscore: 1.0..=3.0,
            rsi_overbought: 65.0..=80.0,
            rsi_oversold: 10.0..=30.0,
            adx_threshold: 15.0..=30.0,
            mean_rev_threshold: 0.5..=2.0,
            weights: BTreeMap::from([
                ("ema", 0.8..=1.5),
                ("rsi", 0.8..=1.5),
                ("vwap", 0.8..=1.5),
                ("volume", 0.6..=1.5),
                ("adx", 0.7..=1.3),
                ("mean_reversion", 0.6..=1.5),
            ]),
            stop_loss_pct: 0.008..=0.025,
            take_profit_pct: 0.012..=0.035,
            trailing_pct: 0.004..=0.012,
        }
    }
}

impl ParamSpace {
    pub fn sample<R: Rng>(&self, rng: &mut R, base: &Profile) -> Profile {
        let mut p = base.clone();

        let ind = &mut p.scoring.indicators;
        ind.ema_fast = rng.gen_range(self.ema_fast.clone());
        ind.ema_slow = rng.gen_range(self.ema_slow.clone());
        ind.rsi_length = rng.gen_range(self.rsi_length.clone());
        ind.adx_length = rng.gen_range(self.adx_length.clone());
        ind.mean_rev_length = rng.gen_range(self.mean_rev_length.clone());

        let th = &mut p.scoring.thresholds;
        th.volume_zscore = rng.gen_range(self.volume_zscore.clone());
        th.rsi_overbought = rng.gen_range(self.rsi_overbought.clone());
        th.rsi_oversold = rng.gen_range(self.rsi_oversold.clone());
        th.adx = rng.gen_range(self.adx_threshold.clone());
        th.mean_reversion = rng.gen_range(self.mean_rev_threshold.clone());

        for name in RULE_NAMES {
            if let Some(range) = self.weights.get(name) {
                p.scoring.weights.set(name, rng.gen_range(range.clone()));
            }
        }

        p.risk = RiskParams {
            stop_loss_pct: rng.gen_range(self.stop_loss_pct.clone()),
            take_profit_pct: rng.gen_range(self.take_profit_pct.clone()),
            trailing_pct: rng.gen_range(self.trailing_pct.clone()),
        };
        p
    }
}

/// One sampled trial, flattened for CSV export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
    pub instrument: String,
    pub timeframe: String,
    pub trial: usize,
    pub ending_balance: f64,
    pub total_pnl: f64,
    pub trades: usize,
    pub win_rate: f64,
    pub max_drawdown: f64,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_length: usize,
    pub adx_length: usize,
    pub mean_rev_length: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub volume_zscore: f64,
    pub adx_threshold: f64,
    pub mean_rev_threshold: f64,
    pub weight_ema: f64,
    pub weight_rsi: f64,
    pub weight_vwap: f64,
    pub weight_volume: f64,
    pub weight_adx: f64,
    pub weight_mean_reversion: f64,
    pub stoploss: f64,
    pub takeprofit: f64,
    pub trailing: f64,
}

impl TrialRecord {
    fn new(pair: &Pair, trial: usize, profile: &Profile, result: &RunResult) -> Self {
        let i = &profile.scoring.indicators;
        let t = &profile.scoring.thresholds;
        let w = &profile.scoring.weights;
        Self {
            instrument: pair.instrument.clone(),
            timeframe: pair.timeframe.to_string(),
            trial,
            ending_balance: result.ending_balance,
            total_pnl: result.total_pnl,
            trades: result.trade_count,
            win_rate: result.win_rate,
            max_drawdown: result.max_drawdown,
            ema_fast: i.ema_fast,
            ema_slow: i.ema_slow,
            rsi_length: i.rsi_length,
            adx_length: i.adx_length,
            mean_rev_length: i.mean_rev_length,
            rsi_overbought: t.rsi_overbought,
            rsi_oversold: t.rsi_oversold,
            volume_zscore: t.volume_zscore,
            adx_threshold: t.adx,
            mean_rev_threshold: t.mean_reversion,
            weight_ema: w.get("ema"),
            weight_rsi: w.get("rsi"),
            weight_vwap: w.get("vwap"),
            weight_volume: w.get("volume"),
            weight_adx: w.get("adx"),
            weight_mean_reversion: w.get("mean_reversion"),
            stoploss: profile.risk.stop_loss_pct,
            takeprofit: profile.risk.take_profit_pct,
            trailing: profile.risk.trailing_pct,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PairSearch {
    pub pair: Pair,
    pub best: Option<(Profile, RunResult)>,
    best_index: Option<usize>,
    pub trials: Vec<TrialRecord>,
}

impl PairSearch {
    pub fn best_trial(&self) -> Option<TrialRecord> {
        self.best_index.and_then(|i| self.trials.get(i).cloned())
    }

    /// Store the best profile, if any, under this pair.
    pub fn apply(&self, store: &mut ProfileStore) {
        if let Some((profile, _)) = &self.best {
            store.set(&self.pair.instrument, self.pair.timeframe, profile.clone());
        }
    }
}

/// Search one pair over already screened bars. Stops early, keeping what it
/// has, when `cancel` is raised between trials.
pub fn optimize_pair(
    pair: &Pair,
    bars: &[Bar],
    base: &Profile,
    space: &ParamSpace,
    run: &RunConfig,
    rng: &mut impl Rng,
    cancel: Option<&AtomicBool>,
) -> Result<PairSearch, TraderError> {
    let scorer = run.decision.scorer.build();
    let mut search = PairSearch {
        pair: pair.clone(),
        best: None,
        best_index: None,
        trials: Vec::with_capacity(run.search.trials),
    };

    for trial in 0..run.search.trials {
        if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
            info!(pair = %pair, completed = trial, "search cancelled");
            break;
        }

        let profile = space.sample(rng, base);
        let config = BacktestConfig::for_profile(run, &profile);
        let outcome = run_backtest(pair, bars, &profile.scoring, &scorer, &config)?;
        let balance = outcome.result.ending_balance;

        search
            .trials
            .push(TrialRecord::new(pair, trial, &profile, &outcome.result));

        let improved = match &search.best {
            Some((_, best)) => balance > best.ending_balance,
            None => true,
        };
        if improved {
            debug!(pair = %pair, trial, balance, "new best");
            search.best = Some((profile, outcome.result));
            search.best_index = Some(trial);
        }
    }

    Ok(search)
}

#[derive(Debug)]
pub struct SearchEntry {
    pub pair: Pair,
    pub outcome: Result<PairSearch, TraderError>,
}

/// Search every pair independently, in parallel when configured. The pair at
/// position `i` is seeded with `seed + i` when a seed is set.
pub fn optimize_all(
    data: &dyn MarketDataPort,
    pairs: &[Pair],
    store: &ProfileStore,
    space: &ParamSpace,
    run: &RunConfig,
    cancel: Option<&AtomicBool>,
) -> Vec<SearchEntry> {
    let search_one = |(index, pair): (usize, &Pair)| -> Option<SearchEntry> {
        if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
            return None;
        }
        let mut rng = match run.search.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::from_entropy(),
        };
        let outcome = load_series(data, pair, &run.backtest).and_then(|bars| {
            optimize_pair(
                pair,
                &bars,
                store.get(&pair.instrument, pair.timeframe),
                space,
                run,
                &mut rng,
                cancel,
            )
        });
        match &outcome {
            Ok(s) => info!(
                pair = %pair,
                trials = s.trials.len(),
                best_balance = s.best.as_ref().map(|(_, r)| r.ending_balance),
                "search done"
            ),
            Err(e) => error!(pair = %pair, error = %e, "search failed"),
        }
        Some(SearchEntry {
            pair: pair.clone(),
            outcome,
        })
    };

    if run.search.parallel {
        pairs.par_iter().enumerate().filter_map(search_one).collect()
    } else {
        pairs.iter().enumerate().filter_map(search_one).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timeframe::Timeframe;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn wave_bars(n: usize) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n)
            .map(|i| {
                let c = 100.0 + 10.0 * (i as f64 / 7.0).sin() + i as f64 * 0.05;
                Bar {
                    timestamp: start + chrono::Duration::hours(i as i64),
                    open: c,
                    high: c + 1.0,
                    low: c - 1.0,
                    close: c,
                    volume: 100.0 + (i % 5) as f64 * 20.0,
                }
            })
            .collect()
    }

    fn small_run(trials: usize) -> RunConfig {
        let mut run = RunConfig::default();
        run.search.trials = trials;
        run.backtest.warmup_bars = 20;
        run
    }

    #[test]
    fn samples_stay_in_range() {
        let space = ParamSpace::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let p = space.sample(&mut rng, &Profile::default());
            let i = &p.scoring.indicators;
            assert!(space.ema_fast.contains(&i.ema_fast));
            assert!(space.ema_slow.contains(&i.ema_slow));
            assert!(i.ema_fast < i.ema_slow);
            assert!(p.scoring.thresholds.rsi_oversold < p.scoring.thresholds.rsi_overbought);
            assert!(space.trailing_pct.contains(&p.risk.trailing_pct));
            for name in RULE_NAMES {
                assert!(space.weights[name].contains(&p.scoring.weights.get(name)));
            }
            // untouched by the search
            assert_eq!(i.macd_slow, 26);
        }
    }

    #[test]
    fn weights_use_their_own_bands() {
        let space = ParamSpace::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut adx_max = f64::MIN;
        let mut ema_min = f64::MAX;
        for _ in 0..500 {
            let w = space.sample(&mut rng, &Profile::default()).scoring.weights;
            assert!((0.8..=1.5).contains(&w.get("ema")));
            assert!((0.8..=1.5).contains(&w.get("rsi")));
            assert!((0.8..=1.5).contains(&w.get("vwap")));
            assert!((0.6..=1.5).contains(&w.get("volume")));
            assert!((0.7..=1.3).contains(&w.get("adx")));
            assert!((0.6..=1.5).contains(&w.get("mean_reversion")));
            adx_max = adx_max.max(w.get("adx"));
            ema_min = ema_min.min(w.get("ema"));
        }
        assert!(adx_max > 1.2);
        assert!(ema_min < 0.9);
    }

    #[test]
    fn missing_weight_band_keeps_base_weight() {
        let mut space = ParamSpace::default();
        space.weights.remove("adx");
        let mut base = Profile::default();
        base.scoring.weights.set("adx", 2.5);
        let p = space.sample(&mut StdRng::seed_from_u64(2), &base);
        assert_relative_eq!(p.scoring.weights.get("adx"), 2.5);
    }

    #[test]
    fn trial_record_carries_weights() {
        let pair = Pair::new("ETHUSDT", Timeframe::M15);
        let search = optimize_pair(
            &pair,
            &wave_bars(150),
            &Profile::default(),
            &ParamSpace::default(),
            &small_run(2),
            &mut StdRng::seed_from_u64(4),
            None,
        )
        .unwrap();
        let (best, _) = search.best.as_ref().unwrap();
        let record = search.best_trial().unwrap();
        let w = &best.scoring.weights;
        assert_relative_eq!(record.weight_ema, w.get("ema"));
        assert_relative_eq!(record.weight_rsi, w.get("rsi"));
        assert_relative_eq!(record.weight_vwap, w.get("vwap"));
        assert_relative_eq!(record.weight_volume, w.get("volume"));
        assert_relative_eq!(record.weight_adx, w.get("adx"));
        assert_relative_eq!(record.weight_mean_reversion, w.get("mean_reversion"));
    }

    #[test]
    fn same_seed_same_search() {
        let pair = Pair::new("ETHUSDT", Timeframe::M15);
        let bars = wave_bars(150);
        let run = small_run(5);
        let space = ParamSpace::default();
        let search = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            optimize_pair(&pair, &bars, &Profile::default(), &space, &run, &mut rng, None).unwrap()
        };
        let a = search(1);
        let b = search(1);
        assert_eq!(a.trials, b.trials);
        assert_eq!(a.best_trial(), b.best_trial());
    }

    #[test]
    fn cancel_stops_before_first_trial() {
        let cancel = AtomicBool::new(true);
        let search = optimize_pair(
            &Pair::new("ETHUSDT", Timeframe::M15),
            &wave_bars(150),
            &Profile::default(),
            &ParamSpace::default(),
            &small_run(10),
            &mut StdRng::seed_from_u64(3),
            Some(&cancel),
        )
        .unwrap();
        assert!(search.trials.is_empty());
        assert!(search.best.is_none());
        assert!(search.best_trial().is_none());
    }

    #[test]
    fn short_history_is_an_error() {
        let err = optimize_pair(
            &Pair::new("ETHUSDT", Timeframe::M15),
            &wave_bars(10),
            &Profile::default(),
            &ParamSpace::default(),
            &small_run(3),
            &mut StdRng::seed_from_u64(3),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TraderError::InsufficientData { .. }));
    }

    #[test]
    fn apply_stores_best_profile() {
        let pair = Pair::new("ETHUSDT", Timeframe::M15);
        let search = optimize_pair(
            &pair,
            &wave_bars(150),
            &Profile::default(),
            &ParamSpace::default(),
            &small_run(4),
            &mut StdRng::seed_from_u64(11),
            None,
        )
        .unwrap();
        let mut store = ProfileStore::default();
        search.apply(&mut store);
        let (best, _) = search.best.as_ref().unwrap();
        assert_eq!(store.get("ethusdt", Timeframe::M15), best);
        assert_eq!(store.get("ETHUSDT", Timeframe::H1), store.defaults());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn best_dominates_every_trial(seed in any::<u64>(), trials in 1usize..6) {
            let search = optimize_pair(
                &Pair::new("BTCUSDT", Timeframe::H1),
                &wave_bars(120),
                &Profile::default(),
                &ParamSpace::default(),
                &small_run(trials),
                &mut StdRng::seed_from_u64(seed),
                None,
            ).unwrap();
            prop_assert_eq!(search.trials.len(), trials);
            let best = search.best_trial().unwrap();
            for t in &search.trials {
                prop_assert!(best.ending_balance >= t.ending_balance);
                if t.ending_balance == best.ending_balance {
                    prop_assert!(best.trial <= t.trial);
                }
            }
        }
    }
}
