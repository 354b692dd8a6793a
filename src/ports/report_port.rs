//! Persistence sink port trait.

use crate::domain::backtest::BacktestOutcome;
use crate::domain::error::TraderError;
use crate::domain::search::{PairSearch, TrialRecord};
use crate::domain::timeframe::Timeframe;

/// Port for writing run results.
pub trait ReportPort {
    /// One record per trade plus the run summary.
    fn write_run(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        outcome: &BacktestOutcome,
    ) -> Result<(), TraderError>;

    /// Summary of many runs, one row per (instrument, timeframe).
    fn write_summary(
        &self,
        runs: &[(String, Timeframe, &BacktestOutcome)],
    ) -> Result<(), TraderError>;

    /// Every sampled trial of a search.
    fn write_trials(&self, trials: &[TrialRecord]) -> Result<(), TraderError>;

    /// Best configuration found per pair. Defaults to writing the trials of
    /// each pair's best.
    fn write_best(&self, searches: &[PairSearch]) -> Result<(), TraderError> {
        let best: Vec<TrialRecord> = searches.iter().filter_map(|s| s.best_trial()).collect();
        self.write_trials(&best)
    }
}
