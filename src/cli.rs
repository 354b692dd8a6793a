//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::{CsvMarketData, CsvReportAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_broker::PaperBroker;
use crate::adapters::profile_store::IniProfileStore;
use crate::domain::backtest::{self as backtest_engine, BacktestOutcome, Pair};
use crate::domain::config::{ProfileStore, RunConfig, instrument_key};
use crate::domain::config_validation::validate_run_config;
use crate::domain::decision::{Combinator, ConfidenceMatrix, TieredCombinator};
use crate::domain::error::TraderError;
use crate::domain::live::LiveTrader;
use crate::domain::search::{self, ParamSpace, PairSearch};
use crate::domain::timeframe::Timeframe;
use crate::ports::profile_store_port::ProfileStorePort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "tiertrader", about = "Multi-timeframe signal scoring and trade simulation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest one instrument on one timeframe
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        instrument: String,
        #[arg(short, long)]
        timeframe: Timeframe,
        /// Directory for the trade log and summary CSVs
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Backtest every configured pair with history available
    Batch {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Random-search profiles for every configured pair
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        trials: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// CSV of every trial; best trials go beside it
        #[arg(long)]
        results: Option<PathBuf>,
        /// Do not write the best profiles back to the profile store
        #[arg(long)]
        dry_run: bool,
    },
    /// Evaluate the tiered decision for each instrument and paper-trade it
    Signal {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Evaluate the confidence matrix for each instrument
    Matrix {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate the run configuration and profile store
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            instrument,
            timeframe,
            output,
        } => run_backtest(&config, &instrument, timeframe, output.as_deref()),
        Command::Batch { config, output } => run_batch(&config, output.as_deref()),
        Command::Optimize {
            config,
            trials,
            seed,
            results,
            dry_run,
        } => run_optimize(&config, trials, seed, results.as_deref(), dry_run),
        Command::Signal { config } => run_signal(&config),
        Command::Matrix { config } => run_matrix(&config),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: &TraderError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

/// Everything a subcommand needs, loaded and validated once.
struct Session {
    run: RunConfig,
    profiles: ProfileStore,
    store: Option<IniProfileStore>,
    data: CsvMarketData,
}

fn load_session(config_path: &Path) -> Result<Session, ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    let run = RunConfig::from_config(&adapter).map_err(|e| fail(&e))?;

    let store = run.backtest.profiles.clone().map(IniProfileStore::new);
    let profiles = match &store {
        Some(s) => s.load().map_err(|e| fail(&e))?,
        None => ProfileStore::default(),
    };

    let data = CsvMarketData::new(run.backtest.data_dir.clone());
    Ok(Session {
        run,
        profiles,
        store,
        data,
    })
}

fn print_outcome(pair: &Pair, outcome: &BacktestOutcome) {
    let r = &outcome.result;
    println!(
        concat!(
            "{:<16} bars={:<6} trades={:<4} win_rate={:>6.2}% ",
            "pnl={:>10.4} balance={:>10.2} max_dd={:>6.2}%"
        ),
        pair.to_string(),
        outcome.bars,
        r.trade_count,
        r.win_rate * 100.0,
        r.total_pnl,
        r.ending_balance,
        r.max_drawdown * 100.0,
    );
}

fn run_backtest(
    config_path: &Path,
    instrument: &str,
    timeframe: Timeframe,
    output: Option<&Path>,
) -> ExitCode {
    let session = match load_session(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let pair = Pair::new(instrument_key(instrument), timeframe);
    eprintln!("Backtesting {}...", pair);
    let outcome = match backtest_engine::run_pair(
        &session.data,
        &pair,
        &session.profiles,
        &session.run,
    ) {
        Ok(o) => o,
        Err(e) => return fail(&e),
    };
    print_outcome(&pair, &outcome);

    if let Some(dir) = output {
        let report = CsvReportAdapter::new(dir.to_path_buf());
        let written = report
            .write_run(&pair.instrument, pair.timeframe, &outcome)
            .and_then(|_| {
                report.write_summary(&[(pair.instrument.clone(), pair.timeframe, &outcome)])
            });
        if let Err(e) = written {
            return fail(&e);
        }
        eprintln!("Report written to {}", dir.display());
    }
    ExitCode::SUCCESS
}

fn run_batch(config_path: &Path, output: Option<&Path>) -> ExitCode {
    let session = match load_session(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let instruments = match session.run.backtest.require_instruments() {
        Ok(i) => i,
        Err(e) => return fail(&e),
    };

    let pairs = backtest_engine::discover_pairs(
        &session.data,
        instruments,
        &session.run.backtest.timeframes,
    );
    eprintln!("Running {} pairs...", pairs.len());
    let entries = backtest_engine::run_batch(
        &session.data,
        &pairs,
        &session.profiles,
        &session.run,
        None,
    );

    let mut completed: Vec<(String, Timeframe, &BacktestOutcome)> = Vec::new();
    let mut first_error: Option<&TraderError> = None;
    for entry in &entries {
        match &entry.outcome {
            Ok(outcome) => {
                print_outcome(&entry.pair, outcome);
                completed.push((entry.pair.instrument.clone(), entry.pair.timeframe, outcome));
            }
            Err(e) => {
                println!("{:<16} failed: {}", entry.pair.to_string(), e);
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(dir) = output {
        let report = CsvReportAdapter::new(dir.to_path_buf());
        for (instrument, timeframe, outcome) in &completed {
            if let Err(e) = report.write_run(instrument, *timeframe, outcome) {
                return fail(&e);
            }
        }
        if let Err(e) = report.write_summary(&completed) {
            return fail(&e);
        }
        eprintln!("Report written to {}", dir.display());
    }

    match first_error {
        Some(e) if completed.is_empty() => fail(e),
        _ => ExitCode::SUCCESS,
    }
}

fn run_optimize(
    config_path: &Path,
    trials: Option<usize>,
    seed: Option<u64>,
    results: Option<&Path>,
    dry_run: bool,
) -> ExitCode {
    let mut session = match load_session(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    if let Some(t) = trials {
        session.run.search.trials = t;
    }
    if seed.is_some() {
        session.run.search.seed = seed;
    }
    if let Err(e) = validate_run_config(&session.run) {
        return fail(&e);
    }
    let instruments = match session.run.backtest.require_instruments() {
        Ok(i) => i,
        Err(e) => return fail(&e),
    };

    let pairs = backtest_engine::discover_pairs(
        &session.data,
        instruments,
        &session.run.backtest.timeframes,
    );
    eprintln!(
        "Searching {} pairs, {} trials each...",
        pairs.len(),
        session.run.search.trials
    );
    let entries = search::optimize_all(
        &session.data,
        &pairs,
        &session.profiles,
        &ParamSpace::default(),
        &session.run,
        None,
    );

    let mut searches: Vec<PairSearch> = Vec::new();
    for entry in entries {
        match entry.outcome {
            Ok(found) => {
                match &found.best {
                    Some((_, r)) => println!(
                        "{:<16} best balance={:>10.2} trades={:<4} win_rate={:>6.2}%",
                        entry.pair.to_string(),
                        r.ending_balance,
                        r.trade_count,
                        r.win_rate * 100.0
                    ),
                    None => println!("{:<16} no trials completed", entry.pair.to_string()),
                }
                found.apply(&mut session.profiles);
                searches.push(found);
            }
            Err(e) => println!("{:<16} failed: {}", entry.pair.to_string(), e),
        }
    }

    if let Some(path) = results {
        let report = CsvReportAdapter::with_trials_path(path);
        let trials: Vec<_> = searches.iter().flat_map(|s| s.trials.iter().cloned()).collect();
        if let Err(e) = report.write_trials(&trials).and_then(|_| report.write_best(&searches)) {
            return fail(&e);
        }
        eprintln!("Trials written to {}", path.display());
    }

    match (&session.store, dry_run) {
        (Some(store), false) => {
            if let Err(e) = store.save(&session.profiles) {
                return fail(&e);
            }
        }
        (None, false) => {
            eprintln!("No [backtest] profiles path configured; best profiles not saved")
        }
        (_, true) => {}
    }
    ExitCode::SUCCESS
}

fn live_trader(session: Session, combinator: Box<dyn Combinator>) -> LiveTrader {
    let price_timeframe = session
        .run
        .decision
        .tiers
        .execution_timeframes
        .iter()
        .min()
        .copied()
        .unwrap_or(Timeframe::M5);
    LiveTrader::new(
        Arc::new(session.data),
        Arc::new(PaperBroker::new(session.run.backtest.initial_balance)),
        session.profiles,
        combinator,
        session.run.live,
    )
    .with_price_timeframe(price_timeframe)
}

fn run_signal(config_path: &Path) -> ExitCode {
    let session = match load_session(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let instruments = match session.run.backtest.require_instruments() {
        Ok(i) => i.to_vec(),
        Err(e) => return fail(&e),
    };

    let combinator = TieredCombinator::new(
        &session.run.decision.tiers,
        session.run.decision.scorer.build(),
    );
    let trader = live_trader(session, Box::new(combinator));

    for report in trader.run_all(&instruments) {
        let e = &report.evaluation;
        println!(
            "{:<10} {:<6} confidence={} {}",
            report.instrument,
            e.decision,
            e.confidence,
            e.reasons.join("; ")
        );
        if let Some((order, ack)) = &report.order {
            println!(
                "           order {} {} size={:.6} stop={:.4}",
                ack.order_id,
                order.side.as_str(),
                order.size,
                order.stop_price
            );
        }
    }
    ExitCode::SUCCESS
}

fn run_matrix(config_path: &Path) -> ExitCode {
    let session = match load_session(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let instruments = match session.run.backtest.require_instruments() {
        Ok(i) => i.to_vec(),
        Err(e) => return fail(&e),
    };

    let matrix = ConfidenceMatrix::new(session.run.decision.matrix_threshold);
    let trader = live_trader(session, Box::new(matrix));

    for instrument in &instruments {
        match trader.evaluate(instrument) {
            Ok(e) => {
                println!("{:<10} {:<6} confidence={}", instrument, e.decision, e.confidence);
                for reason in &e.reasons {
                    println!("           - {}", reason);
                }
            }
            Err(e) => println!("{:<10} error  {}", instrument, e),
        }
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    let session = match load_session(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    println!("Config OK");
    println!("  instruments: {}", session.run.backtest.instruments.join(", "));
    println!(
        "  timeframes: {}",
        session
            .run
            .backtest
            .timeframes
            .iter()
            .map(|tf| tf.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  scorer: {:?}", session.run.decision.scorer);
    println!("  profiles: {} pair overrides", session.profiles.len());
    ExitCode::SUCCESS
}
