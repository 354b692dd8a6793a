//! Configuration validation.
//!
//! Runs once when a run config or profile is loaded; nothing downstream
//! re-checks these ranges.

use super::config::{Profile, RunConfig};
use super::error::TraderError;

pub fn validate_run_config(config: &RunConfig) -> Result<(), TraderError> {
    validate_balance(config)?;
    validate_costs(config)?;
    validate_tiers(config)?;
    validate_search(config)?;
    validate_live(config)?;
    Ok(())
}

pub fn validate_profile(profile: &Profile, section: &str) -> Result<(), TraderError> {
    validate_lookbacks(profile, section)?;
    validate_rsi_band(profile, section)?;
    validate_risk(profile, section)?;
    Ok(())
}

fn validate_balance(config: &RunConfig) -> Result<(), TraderError> {
    let b = &config.backtest;
    if !(b.initial_balance > 0.0) {
        return Err(TraderError::config_invalid(
            "backtest",
            "initial_balance",
            "initial_balance must be positive",
        ));
    }
    if !(b.trade_size > 0.0) {
        return Err(TraderError::config_invalid(
            "backtest",
            "trade_size",
            "trade_size must be positive",
        ));
    }
    Ok(())
}

fn validate_costs(config: &RunConfig) -> Result<(), TraderError> {
    check_fraction("backtest", "commission_pct", config.backtest.commission_pct)
}

fn validate_tiers(config: &RunConfig) -> Result<(), TraderError> {
    let d = &config.decision;
    for (key, list) in [
        ("macro_timeframes", &d.tiers.macro_timeframes),
        ("trend_timeframes", &d.tiers.trend_timeframes),
        ("execution_timeframes", &d.tiers.execution_timeframes),
    ] {
        if list.is_empty() {
            return Err(TraderError::config_invalid(
                "decision",
                key,
                "at least one timeframe is required",
            ));
        }
    }
    if d.tiers.trend_threshold < 0.0 || d.tiers.execution_threshold < 0.0 {
        return Err(TraderError::config_invalid(
            "decision",
            "execution_threshold",
            "tier thresholds must be non-negative",
        ));
    }
    if d.matrix_threshold == 0 || d.matrix_threshold > 10 {
        return Err(TraderError::config_invalid(
            "decision",
            "matrix_threshold",
            "matrix_threshold must be between 1 and 10",
        ));
    }
    Ok(())
}

fn validate_search(config: &RunConfig) -> Result<(), TraderError> {
    if config.search.trials == 0 {
        return Err(TraderError::config_invalid(
            "search",
            "trials",
            "trials must be at least 1",
        ));
    }
    Ok(())
}

fn validate_live(config: &RunConfig) -> Result<(), TraderError> {
    let risk = config.live.risk_per_trade;
    if !(risk > 0.0 && risk < 1.0) {
        return Err(TraderError::config_invalid(
            "live",
            "risk_per_trade",
            "risk_per_trade must be in (0, 1)",
        ));
    }
    if config.live.bar_limit == 0 {
        return Err(TraderError::config_invalid(
            "live",
            "bar_limit",
            "bar_limit must be at least 1",
        ));
    }
    Ok(())
}

fn validate_lookbacks(profile: &Profile, section: &str) -> Result<(), TraderError> {
    let i = &profile.scoring.indicators;
    for (key, value) in [
        ("ema_fast", i.ema_fast),
        ("ema_slow", i.ema_slow),
        ("rsi_length", i.rsi_length),
        ("volume_window", i.volume_window),
        ("macd_fast", i.macd_fast),
        ("macd_slow", i.macd_slow),
        ("macd_signal", i.macd_signal),
        ("bollinger_window", i.bollinger_window),
        ("adx_length", i.adx_length),
        ("mean_rev_length", i.mean_rev_length),
    ] {
        if value < 1 {
            return Err(TraderError::config_invalid(
                section,
                key,
                format!("{} must be at least 1", key),
            ));
        }
    }
    Ok(())
}

fn validate_rsi_band(profile: &Profile, section: &str) -> Result<(), TraderError> {
    let t = &profile.scoring.thresholds;
    let in_range = |v: f64| (0.0..=100.0).contains(&v);
    if !in_range(t.rsi_oversold) || !in_range(t.rsi_overbought) {
        return Err(TraderError::config_invalid(
            section,
            "rsi_oversold",
            "rsi thresholds must be within [0, 100]",
        ));
    }
    if t.rsi_oversold >= t.rsi_overbought {
        return Err(TraderError::config_invalid(
            section,
            "rsi_oversold",
            "rsi_oversold must be below rsi_overbought",
        ));
    }
    Ok(())
}

fn validate_risk(profile: &Profile, section: &str) -> Result<(), TraderError> {
    check_fraction(section, "stoploss", profile.risk.stop_loss_pct)?;
    check_fraction(section, "takeprofit", profile.risk.take_profit_pct)?;
    check_fraction(section, "trailing", profile.risk.trailing_pct)?;
    Ok(())
}

/// Percentages are fractions in [0, 1).
fn check_fraction(section: &str, key: &str, value: f64) -> Result<(), TraderError> {
    if !(0.0..1.0).contains(&value) {
        return Err(TraderError::config_invalid(
            section,
            key,
            format!("{} must be in [0, 1)", key),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(result: Result<(), TraderError>, expected_key: &str) {
        match result {
            Err(TraderError::ConfigInvalid { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected ConfigInvalid for {}, got {:?}", expected_key, other),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_run_config(&RunConfig::default()).is_ok());
        assert!(validate_profile(&Profile::default(), "defaults").is_ok());
    }

    #[test]
    fn non_positive_balance() {
        let mut c = RunConfig::default();
        c.backtest.initial_balance = 0.0;
        assert_invalid(validate_run_config(&c), "initial_balance");
    }

    #[test]
    fn nan_trade_size() {
        let mut c = RunConfig::default();
        c.backtest.trade_size = f64::NAN;
        assert_invalid(validate_run_config(&c), "trade_size");
    }

    #[test]
    fn commission_out_of_range() {
        let mut c = RunConfig::default();
        c.backtest.commission_pct = 1.5;
        assert_invalid(validate_run_config(&c), "commission_pct");
    }

    #[test]
    fn empty_tier() {
        let mut c = RunConfig::default();
        c.decision.tiers.trend_timeframes.clear();
        assert_invalid(validate_run_config(&c), "trend_timeframes");
    }

    #[test]
    fn matrix_threshold_bounds() {
        let mut c = RunConfig::default();
        c.decision.matrix_threshold = 11;
        assert_invalid(validate_run_config(&c), "matrix_threshold");
    }

    #[test]
    fn zero_trials() {
        let mut c = RunConfig::default();
        c.search.trials = 0;
        assert_invalid(validate_run_config(&c), "trials");
    }

    #[test]
    fn live_risk_bounds() {
        let mut c = RunConfig::default();
        c.live.risk_per_trade = 1.0;
        assert_invalid(validate_run_config(&c), "risk_per_trade");
    }

    #[test]
    fn zero_lookback() {
        let mut p = Profile::default();
        p.scoring.indicators.rsi_length = 0;
        assert_invalid(validate_profile(&p, "BTCUSDT@1h"), "rsi_length");
    }

    #[test]
    fn inverted_rsi_band() {
        let mut p = Profile::default();
        p.scoring.thresholds.rsi_oversold = 80.0;
        assert_invalid(validate_profile(&p, "defaults"), "rsi_oversold");
    }

    #[test]
    fn negative_stop() {
        let mut p = Profile::default();
        p.risk.stop_loss_pct = -0.01;
        assert_invalid(validate_profile(&p, "defaults"), "stoploss");
    }
}
