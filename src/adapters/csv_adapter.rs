//! CSV market data and report adapters.
//!
//! History lives in `<data_dir>/<INSTRUMENT>_<timeframe>.csv` with a header
//! row `timestamp,open,high,low,close,volume`, oldest bar first. Timestamps
//! may be `YYYY-MM-DD HH:MM:SS`, ISO `YYYY-MM-DDTHH:MM:SS`, a bare date, or
//! epoch milliseconds.

use crate::domain::backtest::BacktestOutcome;
use crate::domain::config::instrument_key;
use crate::domain::error::TraderError;
use crate::domain::ohlcv::Bar;
use crate::domain::search::{PairSearch, TrialRecord};
use crate::domain::timeframe::Timeframe;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::report_port::ReportPort;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

pub struct CsvMarketData {
    base_path: PathBuf,
}

impl CsvMarketData {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn csv_path(&self, instrument: &str, timeframe: Timeframe) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", instrument_key(instrument), timeframe))
    }
}

impl MarketDataPort for CsvMarketData {
    fn fetch_bars(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, TraderError> {
        let path = self.csv_path(instrument, timeframe);
        let content = fs::read_to_string(&path).map_err(|e| {
            TraderError::external(
                instrument,
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record = result?;
            let bar = parse_record(&record).map_err(|reason| {
                TraderError::external(
                    instrument,
                    format!("{} row {}: {}", path.display(), row + 1, reason),
                )
            })?;
            bars.push(bar);
        }

        if limit > 0 && bars.len() > limit {
            let excess = bars.len() - limit;
            bars.drain(..excess);
        }
        Ok(bars)
    }

    fn has_series(&self, instrument: &str, timeframe: Timeframe) -> bool {
        self.csv_path(instrument, timeframe).is_file()
    }
}

fn parse_record(record: &csv::StringRecord) -> Result<Bar, String> {
    let field = |i: usize, name: &str| {
        record
            .get(i)
            .map(str::trim)
            .ok_or_else(|| format!("missing {} column", name))
    };
    let number = |i: usize, name: &str| {
        field(i, name).and_then(|raw| {
            raw.parse::<f64>()
                .map_err(|e| format!("invalid {} {:?}: {}", name, raw, e))
        })
    };

    let raw_ts = field(0, "timestamp")?;
    let timestamp =
        parse_timestamp(raw_ts).ok_or_else(|| format!("invalid timestamp {:?}", raw_ts))?;

    Ok(Bar {
        timestamp,
        open: number(1, "open")?,
        high: number(2, "high")?,
        low: number(3, "low")?,
        close: number(4, "close")?,
        volume: number(5, "volume")?,
    })
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Some(ts) = TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(ts);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.naive_utc())
}

/// One summary row per (instrument, timeframe) run.
#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    instrument: &'a str,
    timeframe: &'a str,
    bars: usize,
    trades: usize,
    wins: usize,
    losses: usize,
    win_rate: f64,
    total_pnl: f64,
    ending_balance: f64,
    profit_factor: f64,
    max_drawdown: f64,
    stop_loss_exits: usize,
    take_profit_exits: usize,
    trailing_stop_exits: usize,
    opposite_signal_exits: usize,
    final_exits: usize,
}

impl<'a> SummaryRow<'a> {
    fn new(instrument: &'a str, timeframe: &'a str, outcome: &BacktestOutcome) -> Self {
        use crate::domain::position::ExitReason::*;
        let r = &outcome.result;
        Self {
            instrument,
            timeframe,
            bars: outcome.bars,
            trades: r.trade_count,
            wins: r.wins,
            losses: r.losses,
            win_rate: r.win_rate,
            total_pnl: r.total_pnl,
            ending_balance: r.ending_balance,
            profit_factor: r.profit_factor,
            max_drawdown: r.max_drawdown,
            stop_loss_exits: r.exit_count(StopLoss),
            take_profit_exits: r.exit_count(TakeProfit),
            trailing_stop_exits: r.exit_count(TrailingStop),
            opposite_signal_exits: r.exit_count(OppositeSignal),
            final_exits: r.exit_count(FinalExit),
        }
    }
}

/// Writes report files into one output directory.
pub struct CsvReportAdapter {
    out_dir: PathBuf,
    trials_file: String,
}

impl CsvReportAdapter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self {
            out_dir,
            trials_file: "trials.csv".to_string(),
        }
    }

    /// Write trials to `path` instead of `<out_dir>/trials.csv`. The best
    /// trials go next to it with a `best_` prefix.
    pub fn with_trials_path(path: &Path) -> Self {
        let out_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let trials_file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "trials.csv".to_string());
        Self {
            out_dir,
            trials_file,
        }
    }

    pub fn trades_path(&self, instrument: &str, timeframe: Timeframe) -> PathBuf {
        self.out_dir.join(format!(
            "{}_{}_trades.csv",
            instrument_key(instrument),
            timeframe
        ))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.out_dir.join("summary.csv")
    }

    pub fn trials_path(&self) -> PathBuf {
        self.out_dir.join(&self.trials_file)
    }

    pub fn best_path(&self) -> PathBuf {
        self.out_dir.join(format!("best_{}", self.trials_file))
    }

    fn write_rows<T: Serialize>(&self, path: &Path, rows: &[T]) -> Result<(), TraderError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(path)?;
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_run(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        outcome: &BacktestOutcome,
    ) -> Result<(), TraderError> {
        self.write_rows(&self.trades_path(instrument, timeframe), &outcome.trades)
    }

    fn write_summary(
        &self,
        runs: &[(String, Timeframe, &BacktestOutcome)],
    ) -> Result<(), TraderError> {
        let labels: Vec<String> = runs.iter().map(|(_, tf, _)| tf.to_string()).collect();
        let rows: Vec<SummaryRow> = runs
            .iter()
            .zip(&labels)
            .map(|((instrument, _, outcome), tf)| SummaryRow::new(instrument, tf, outcome))
            .collect();
        self.write_rows(&self.summary_path(), &rows)
    }

    fn write_trials(&self, trials: &[TrialRecord]) -> Result<(), TraderError> {
        self.write_rows(&self.trials_path(), trials)
    }

    fn write_best(&self, searches: &[PairSearch]) -> Result<(), TraderError> {
        let best: Vec<TrialRecord> = searches.iter().filter_map(|s| s.best_trial()).collect();
        self.write_rows(&self.best_path(), &best)
    }
}
