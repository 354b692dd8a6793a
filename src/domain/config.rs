//! Typed run configuration and the per-instrument profile store.
//!
//! Both are read once through a [`ConfigPort`]. Missing keys take their
//! documented default at load time; present but unparsable values are errors.
//! Range checks live in `config_validation`.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use super::config_validation::{validate_profile, validate_run_config};
use super::decision::TierSettings;
use super::error::TraderError;
use super::position::{LifecycleConfig, MalformedPolicy};
use super::scoring::{ScorerKind, ScoringConfig};
use super::timeframe::{Timeframe, parse_timeframes};
use crate::ports::config_port::ConfigPort;

pub const DEFAULTS_SECTION: &str = "defaults";

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub initial_balance: f64,
    pub trade_size: f64,
    pub commission_pct: f64,
    pub allow_shorting: bool,
    pub warmup_bars: usize,
    pub max_bars: usize,
    /// Run batch pairs concurrently.
    pub parallel: bool,
    pub on_malformed: MalformedPolicy,
    pub data_dir: PathBuf,
    pub instruments: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub profiles: Option<PathBuf>,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_balance: 1000.0,
            trade_size: 1.0,
            commission_pct: 0.0005,
            allow_shorting: true,
            warmup_bars: 50,
            max_bars: 5000,
            parallel: true,
            on_malformed: MalformedPolicy::Skip,
            data_dir: PathBuf::from("data"),
            instruments: Vec::new(),
            timeframes: Timeframe::ALL.to_vec(),
            profiles: None,
        }
    }
}

impl BacktestSettings {
    pub fn require_instruments(&self) -> Result<&[String], TraderError> {
        if self.instruments.is_empty() {
            return Err(TraderError::ConfigMissing {
                section: "backtest".to_string(),
                key: "instruments".to_string(),
            });
        }
        Ok(&self.instruments)
    }

    /// Lifecycle parameters for one pair, combining run-wide costs with the
    /// pair's risk profile.
    pub fn lifecycle(&self, risk: &RiskParams) -> LifecycleConfig {
        LifecycleConfig {
            trade_size: self.trade_size,
            commission_pct: self.commission_pct,
            stop_loss_pct: risk.stop_loss_pct,
            take_profit_pct: risk.take_profit_pct,
            trailing_pct: risk.trailing_pct,
            allow_shorting: self.allow_shorting,
            on_malformed: self.on_malformed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionSettings {
    pub tiers: TierSettings,
    pub entry_threshold: f64,
    pub matrix_threshold: u32,
    pub scorer: ScorerKind,
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            tiers: TierSettings::default(),
            entry_threshold: 1.0,
            matrix_threshold: 7,
            scorer: ScorerKind::Standard,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub trials: usize,
    pub seed: Option<u64>,
    pub parallel: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            trials: 100,
            seed: None,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSettings {
    pub risk_per_trade: f64,
    pub bar_limit: usize,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.01,
            bar_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunConfig {
    pub backtest: BacktestSettings,
    pub decision: DecisionSettings,
    pub search: SearchSettings,
    pub live: LiveSettings,
}

impl RunConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let d = RunConfig::default();

        let backtest = BacktestSettings {
            initial_balance: parse_or(
                config,
                "backtest",
                "initial_balance",
                d.backtest.initial_balance,
            )?,
            trade_size: parse_or(config, "backtest", "trade_size", d.backtest.trade_size)?,
            commission_pct: parse_or(
                config,
                "backtest",
                "commission_pct",
                d.backtest.commission_pct,
            )?,
            allow_shorting: bool_or(
                config,
                "backtest",
                "allow_shorting",
                d.backtest.allow_shorting,
            )?,
            warmup_bars: parse_or(config, "backtest", "warmup_bars", d.backtest.warmup_bars)?,
            max_bars: parse_or(config, "backtest", "max_bars", d.backtest.max_bars)?,
            parallel: bool_or(config, "backtest", "parallel", d.backtest.parallel)?,
            on_malformed: match config.get_string("backtest", "on_malformed").as_deref() {
                None | Some("skip") => MalformedPolicy::Skip,
                Some("fail") => MalformedPolicy::Fail,
                Some(other) => {
                    return Err(TraderError::config_invalid(
                        "backtest",
                        "on_malformed",
                        format!("expected skip or fail, got {}", other),
                    ));
                }
            },
            data_dir: config
                .get_string("backtest", "data_dir")
                .map(PathBuf::from)
                .unwrap_or(d.backtest.data_dir),
            instruments: config
                .get_string("backtest", "instruments")
                .map(|v| parse_instruments(&v))
                .unwrap_or_default(),
            timeframes: timeframes_or(config, "backtest", "timeframes", d.backtest.timeframes)?,
            profiles: config.get_string("backtest", "profiles").map(PathBuf::from),
        };

        let tiers = TierSettings {
            macro_timeframes: timeframes_or(
                config,
                "decision",
                "macro_timeframes",
                d.decision.tiers.macro_timeframes,
            )?,
            trend_timeframes: timeframes_or(
                config,
                "decision",
                "trend_timeframes",
                d.decision.tiers.trend_timeframes,
            )?,
            execution_timeframes: timeframes_or(
                config,
                "decision",
                "execution_timeframes",
                d.decision.tiers.execution_timeframes,
            )?,
            trend_threshold: parse_or(
                config,
                "decision",
                "trend_threshold",
                d.decision.tiers.trend_threshold,
            )?,
            execution_threshold: parse_or(
                config,
                "decision",
                "execution_threshold",
                d.decision.tiers.execution_threshold,
            )?,
        };
        let decision = DecisionSettings {
            tiers,
            entry_threshold: parse_or(
                config,
                "decision",
                "entry_threshold",
                d.decision.entry_threshold,
            )?,
            matrix_threshold: parse_or(
                config,
                "decision",
                "matrix_threshold",
                d.decision.matrix_threshold,
            )?,
            scorer: parse_or(config, "decision", "scorer", d.decision.scorer)?,
        };

        let search = SearchSettings {
            trials: parse_or(config, "search", "trials", d.search.trials)?,
            seed: match config.get_string("search", "seed") {
                Some(raw) => Some(parse_value("search", "seed", &raw)?),
                None => None,
            },
            parallel: bool_or(config, "search", "parallel", d.search.parallel)?,
        };

        let live = LiveSettings {
            risk_per_trade: parse_or(config, "live", "risk_per_trade", d.live.risk_per_trade)?,
            bar_limit: parse_or(config, "live", "bar_limit", d.live.bar_limit)?,
        };

        let run = RunConfig {
            backtest,
            decision,
            search,
            live,
        };
        validate_run_config(&run)?;
        Ok(run)
    }
}

/// Stop, target and trailing percentages of a pair. 0 disables an exit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParams {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub trailing_pct: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.01,
            take_profit_pct: 0.02,
            trailing_pct: 0.005,
        }
    }
}

/// Scoring and risk configuration of one (instrument, timeframe) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub scoring: ScoringConfig,
    pub risk: RiskParams,
}

impl Profile {
    /// Read `section`, taking every missing key from `base`.
    pub fn from_section(
        config: &dyn ConfigPort,
        section: &str,
        base: &Profile,
    ) -> Result<Self, TraderError> {
        let get_usize = |key: &str, default: usize| parse_or(config, section, key, default);
        let get_f64 = |key: &str, default: f64| parse_or(config, section, key, default);

        let bi = &base.scoring.indicators;
        let bt = &base.scoring.thresholds;
        let mut profile = base.clone();
        {
            let ind = &mut profile.scoring.indicators;
            ind.ema_fast = get_usize("ema_fast", bi.ema_fast)?;
            ind.ema_slow = get_usize("ema_slow", bi.ema_slow)?;
            ind.rsi_length = get_usize("rsi_length", bi.rsi_length)?;
            ind.volume_window = get_usize("volume_window", bi.volume_window)?;
            ind.macd_fast = get_usize("macd_fast", bi.macd_fast)?;
            ind.macd_slow = get_usize("macd_slow", bi.macd_slow)?;
            ind.macd_signal = get_usize("macd_signal", bi.macd_signal)?;
            ind.bollinger_window = get_usize("bollinger_window", bi.bollinger_window)?;
            ind.adx_length = get_usize("adx_length", bi.adx_length)?;
            ind.mean_rev_length = get_usize("mean_rev_length", bi.mean_rev_length)?;
        }
        {
            let th = &mut profile.scoring.thresholds;
            th.rsi_overbought = get_f64("rsi_overbought", bt.rsi_overbought)?;
            th.rsi_oversold = get_f64("rsi_oversold", bt.rsi_oversold)?;
            th.volume_zscore = get_f64("volume_zscore", bt.volume_zscore)?;
            th.adx = get_f64("adx_threshold", bt.adx)?;
            th.mean_reversion = get_f64("mean_rev_threshold", bt.mean_reversion)?;
        }
        for key in config.keys(section) {
            if let Some(rule) = key.strip_prefix("weight_") {
                let raw = config.get_string(section, &key).unwrap_or_default();
                let weight: f64 = parse_value(section, &key, &raw)?;
                profile.scoring.weights.set(rule, weight);
            }
        }
        profile.risk = RiskParams {
            stop_loss_pct: get_f64("stoploss", base.risk.stop_loss_pct)?,
            take_profit_pct: get_f64("takeprofit", base.risk.take_profit_pct)?,
            trailing_pct: get_f64("trailing", base.risk.trailing_pct)?,
        };

        validate_profile(&profile, section)?;
        Ok(profile)
    }

    /// Key/value pairs in the layout `from_section` reads.
    pub fn to_entries(&self) -> Vec<(String, String)> {
        let i = &self.scoring.indicators;
        let t = &self.scoring.thresholds;
        let mut entries: Vec<(String, String)> = vec![
            ("ema_fast".into(), i.ema_fast.to_string()),
            ("ema_slow".into(), i.ema_slow.to_string()),
            ("rsi_length".into(), i.rsi_length.to_string()),
            ("volume_window".into(), i.volume_window.to_string()),
            ("macd_fast".into(), i.macd_fast.to_string()),
            ("macd_slow".into(), i.macd_slow.to_string()),
            ("macd_signal".into(), i.macd_signal.to_string()),
            ("bollinger_window".into(), i.bollinger_window.to_string()),
            ("adx_length".into(), i.adx_length.to_string()),
            ("mean_rev_length".into(), i.mean_rev_length.to_string()),
            ("rsi_overbought".into(), t.rsi_overbought.to_string()),
            ("rsi_oversold".into(), t.rsi_oversold.to_string()),
            ("volume_zscore".into(), t.volume_zscore.to_string()),
            ("adx_threshold".into(), t.adx.to_string()),
            ("mean_rev_threshold".into(), t.mean_reversion.to_string()),
        ];
        entries.extend(
            self.scoring
                .weights
                .iter()
                .map(|(name, w)| (format!("weight_{}", name), w.to_string())),
        );
        entries.extend([
            ("stoploss".into(), self.risk.stop_loss_pct.to_string()),
            ("takeprofit".into(), self.risk.take_profit_pct.to_string()),
            ("trailing".into(), self.risk.trailing_pct.to_string()),
        ]);
        entries
    }
}

/// instrument → timeframe → profile, with a fallback profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileStore {
    defaults: Profile,
    entries: BTreeMap<(String, Timeframe), Profile>,
}

impl ProfileStore {
    pub fn new(defaults: Profile) -> Self {
        Self {
            defaults,
            entries: BTreeMap::new(),
        }
    }

    /// Sections are `[defaults]` and `[<INSTRUMENT>@<timeframe>]`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let defaults = Profile::from_section(config, DEFAULTS_SECTION, &Profile::default())?;
        let mut store = ProfileStore::new(defaults);

        for section in config.sections() {
            // configparser files keys above the first header under "default"
            if section.eq_ignore_ascii_case(DEFAULTS_SECTION)
                || section.eq_ignore_ascii_case("default")
            {
                continue;
            }
            let Some((instrument, tf)) = section.rsplit_once('@') else {
                return Err(TraderError::config_invalid(
                    &section,
                    "",
                    "section must be [defaults] or [INSTRUMENT@timeframe]",
                ));
            };
            let timeframe: Timeframe = tf
                .parse()
                .map_err(|e: String| TraderError::config_invalid(&section, "", e))?;
            let profile = Profile::from_section(config, &section, &store.defaults)?;
            store.set(instrument, timeframe, profile);
        }

        Ok(store)
    }

    pub fn defaults(&self) -> &Profile {
        &self.defaults
    }

    pub fn get(&self, instrument: &str, timeframe: Timeframe) -> &Profile {
        self.entries
            .get(&(instrument_key(instrument), timeframe))
            .unwrap_or(&self.defaults)
    }

    pub fn set(&mut self, instrument: &str, timeframe: Timeframe, profile: Profile) {
        self.entries
            .insert((instrument_key(instrument), timeframe), profile);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every section with its entries, `[defaults]` first.
    pub fn to_sections(&self) -> Vec<(String, Vec<(String, String)>)> {
        let mut out = vec![(DEFAULTS_SECTION.to_string(), self.defaults.to_entries())];
        out.extend(
            self.entries
                .iter()
                .map(|((instrument, tf), p)| (format!("{}@{}", instrument, tf), p.to_entries())),
        );
        out
    }
}

/// Instruments are matched case-insensitively and without separators, so
/// `btc/usdt`, `BTC-USDT` and `BTCUSDT` name the same pair.
pub fn instrument_key(instrument: &str) -> String {
    instrument
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn parse_instruments(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(instrument_key)
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_value<T>(section: &str, key: &str, raw: &str) -> Result<T, TraderError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| TraderError::config_invalid(section, key, format!("{:?}: {}", raw, e)))
}

fn parse_or<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, TraderError>
where
    T: FromStr,
    T::Err: Display,
{
    match config.get_string(section, key) {
        Some(raw) => parse_value(section, key, &raw),
        None => Ok(default),
    }
}

fn bool_or(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, TraderError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(TraderError::config_invalid(
                section,
                key,
                format!("expected a boolean, got {:?}", raw),
            )),
        },
    }
}

fn timeframes_or(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: Vec<Timeframe>,
) -> Result<Vec<Timeframe>, TraderError> {
    match config.get_string(section, key) {
        Some(raw) => {
            parse_timeframes(&raw).map_err(|e| TraderError::config_invalid(section, key, e))
        }
        None => Ok(default),
    }
}
