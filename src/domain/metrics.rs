//! Aggregate performance of one run, derived from its trade log.

use std::collections::BTreeMap;

use serde::Serialize;

use super::position::{ExitReason, TradeRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub initial_balance: f64,
    pub ending_balance: f64,
    pub total_pnl: f64,
    pub trade_count: usize,
    pub wins: usize,
    pub losses: usize,
    pub breakeven: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    #[serde(skip)]
    pub exits: BTreeMap<&'static str, usize>,
}

impl RunResult {
    pub fn from_trades(trades: &[TradeRecord], initial_balance: f64) -> Self {
        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut exits: BTreeMap<&'static str, usize> =
            ExitReason::ALL.iter().map(|r| (r.as_str(), 0)).collect();

        for trade in trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                wins += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                losses += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                breakeven += 1;
            }
            *exits.entry(trade.exit_reason.as_str()).or_insert(0) += 1;
        }

        let trade_count = trades.len();
        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();

        let win_rate = if trade_count > 0 {
            wins as f64 / trade_count as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if wins > 0 {
            total_wins / wins as f64
        } else {
            0.0
        };

        let avg_loss = if losses > 0 {
            total_losses / losses as f64
        } else {
            0.0
        };

        RunResult {
            initial_balance,
            ending_balance: initial_balance + total_pnl,
            total_pnl,
            trade_count,
            wins,
            losses,
            breakeven,
            win_rate,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            profit_factor,
            max_drawdown: compute_drawdown(trades, initial_balance),
            exits,
        }
    }

    pub fn exit_count(&self, reason: ExitReason) -> usize {
        self.exits.get(reason.as_str()).copied().unwrap_or(0)
    }
}

/// Largest peak-to-trough fall of the balance after each trade, as a fraction
/// of the peak.
fn compute_drawdown(trades: &[TradeRecord], initial_balance: f64) -> f64 {
    let mut balance = initial_balance;
    let mut peak = initial_balance;
    let mut max_dd = 0.0_f64;

    for trade in trades {
        balance += trade.pnl;
        if balance > peak {
            peak = balance;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - balance) / peak);
        }
    }

    max_dd
}
