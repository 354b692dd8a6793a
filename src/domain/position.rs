//! Position lifecycle state machine.
//!
//! One [`PositionMachine`] owns the single position of one simulation run. It
//! consumes one (time, price, decision) observation per bar in timestamp order
//! and appends a [`TradeRecord`] on every exit.
//!
//! Exit checks while open, first match wins:
//! stop-loss, take-profit, trailing stop, opposite signal.
//! The bar that opens a position performs no exit checks, and a bar that closes
//! a position never opens a new one.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::warn;

use super::decision::Decision;
use super::error::TraderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    OppositeSignal,
    FinalExit,
}

impl ExitReason {
    pub const ALL: [ExitReason; 5] = [
        ExitReason::StopLoss,
        ExitReason::TakeProfit,
        ExitReason::TrailingStop,
        ExitReason::OppositeSignal,
        ExitReason::FinalExit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::OppositeSignal => "opposite_signal",
            ExitReason::FinalExit => "final_exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionState {
    Flat,
    Open {
        side: Side,
        entry_price: f64,
        entry_time: NaiveDateTime,
        trailing_stop: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub side: Side,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Log and ignore the bar.
    Skip,
    /// Abort the run.
    Fail,
}

/// Risk and cost parameters. A percentage of 0 disables that exit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleConfig {
    pub trade_size: f64,
    pub commission_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub trailing_pct: f64,
    pub allow_shorting: bool,
    pub on_malformed: MalformedPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            trade_size: 1.0,
            commission_pct: 0.0005,
            stop_loss_pct: 0.01,
            take_profit_pct: 0.0,
            trailing_pct: 0.005,
            allow_shorting: true,
            on_malformed: MalformedPolicy::Skip,
        }
    }
}

/// pnl = (exit - entry) × side × size - commission_pct × (entry + exit) × size
pub fn trade_pnl(side: Side, entry: f64, exit: f64, config: &LifecycleConfig) -> f64 {
    (exit - entry) * side.sign() * config.trade_size
        - config.commission_pct * (entry + exit) * config.trade_size
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub time: NaiveDateTime,
    pub price: f64,
    pub decision: Decision,
}

#[derive(Debug)]
pub struct PositionMachine {
    config: LifecycleConfig,
    state: PositionState,
    last_decision: Option<Decision>,
    last_bar: Option<(NaiveDateTime, f64)>,
    index: usize,
    trades: Vec<TradeRecord>,
}

impl PositionMachine {
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            config,
            state: PositionState::Flat,
            last_decision: None,
            last_bar: None,
            index: 0,
            trades: Vec::new(),
        }
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// Process one bar. Returns the exit reason if the bar closed a position.
    pub fn step(&mut self, obs: Observation) -> Result<Option<ExitReason>, TraderError> {
        let index = self.index;
        self.index += 1;

        if let Some(reason) = self.malformed(&obs) {
            return match self.config.on_malformed {
                MalformedPolicy::Skip => {
                    warn!(index, %reason, "skipping malformed bar");
                    Ok(None)
                }
                MalformedPolicy::Fail => Err(TraderError::MalformedBar { index, reason }),
            };
        }
        self.last_bar = Some((obs.time, obs.price));

        let exited = match self.state {
            PositionState::Flat => {
                self.try_enter(&obs);
                None
            }
            PositionState::Open { .. } => self.check_exit(&obs),
        };

        if let Some(reason) = exited {
            self.close(obs.time, obs.price, reason);
        }
        self.last_decision = Some(obs.decision);
        Ok(exited)
    }

    /// Force-close any open position at the last accepted bar and return the
    /// trade log.
    pub fn finish(mut self) -> Vec<TradeRecord> {
        if let (PositionState::Open { .. }, Some((time, price))) = (self.state, self.last_bar) {
            self.close(time, price, ExitReason::FinalExit);
        }
        self.trades
    }

    fn malformed(&self, obs: &Observation) -> Option<String> {
        if !obs.price.is_finite() || obs.price <= 0.0 {
            return Some(format!("invalid price {}", obs.price));
        }
        match self.last_bar {
            Some((last, _)) if obs.time <= last => {
                Some(format!("timestamp {} not after {}", obs.time, last))
            }
            _ => None,
        }
    }

    fn try_enter(&mut self, obs: &Observation) {
        if self.last_decision == Some(obs.decision) {
            return;
        }
        let side = match obs.decision {
            Decision::Buy => Side::Long,
            Decision::Sell if self.config.allow_shorting => Side::Short,
            _ => return,
        };
        let trailing_stop = (self.config.trailing_pct > 0.0)
            .then(|| obs.price * (1.0 - side.sign() * self.config.trailing_pct));
        self.state = PositionState::Open {
            side,
            entry_price: obs.price,
            entry_time: obs.time,
            trailing_stop,
        };
    }

    fn check_exit(&mut self, obs: &Observation) -> Option<ExitReason> {
        let PositionState::Open {
            side,
            entry_price,
            entry_time,
            trailing_stop,
        } = self.state
        else {
            return None;
        };
        let price = obs.price;
        let sign = side.sign();
        let cfg = &self.config;

        if cfg.stop_loss_pct > 0.0 {
            let stop = entry_price * (1.0 - sign * cfg.stop_loss_pct);
            if (price - stop) * sign <= 0.0 {
                return Some(ExitReason::StopLoss);
            }
        }

        if cfg.take_profit_pct > 0.0 {
            let target = entry_price * (1.0 + sign * cfg.take_profit_pct);
            if (price - target) * sign >= 0.0 {
                return Some(ExitReason::TakeProfit);
            }
        }

        if let Some(current) = trailing_stop {
            let candidate = price * (1.0 - sign * cfg.trailing_pct);
            let ratcheted = match side {
                Side::Long => current.max(candidate),
                Side::Short => current.min(candidate),
            };
            self.state = PositionState::Open {
                side,
                entry_price,
                entry_time,
                trailing_stop: Some(ratcheted),
            };
            if (price - ratcheted) * sign <= 0.0 {
                return Some(ExitReason::TrailingStop);
            }
        }

        let opposite = match side {
            Side::Long => Decision::Sell,
            Side::Short => Decision::Buy,
        };
        (obs.decision == opposite).then_some(ExitReason::OppositeSignal)
    }

    fn close(&mut self, time: NaiveDateTime, price: f64, reason: ExitReason) {
        let PositionState::Open {
            side,
            entry_price,
            entry_time,
            ..
        } = self.state
        else {
            debug_assert!(false, "exit while flat");
            return;
        };
        self.trades.push(TradeRecord {
            side,
            entry_time,
            entry_price,
            exit_time: time,
            exit_price: price,
            exit_reason: reason,
            pnl: trade_pnl(side, entry_price, price, &self.config),
        });
        self.state = PositionState::Flat;
    }
}

/// Run a whole observation sequence and return the closed trade log.
pub fn simulate<I>(
    observations: I,
    config: LifecycleConfig,
) -> Result<Vec<TradeRecord>, TraderError>
where
    I: IntoIterator<Item = Observation>,
{
    let mut machine = PositionMachine::new(config);
    for obs in observations {
        machine.step(obs)?;
    }
    Ok(machine.finish())
}
