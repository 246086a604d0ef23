//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::bar::format_timestamp;
use crate::domain::bar_series::BarSeries;
use crate::domain::config_validation::{
    non_empty, read_date_range, read_parsed, read_pip_size, read_positive_list,
    read_session_offset, read_threads, read_window, require, validate_all,
};
use crate::domain::engine::{BacktestReport, CancellationToken, Engine, EngineConfig};
use crate::domain::error::FxError;
use crate::domain::grid::{default_pip_size, Grid};
use crate::domain::news::NewsIndex;
use crate::domain::news_filter::{NewsFilterConfig, NewsMode};
use crate::domain::rule::{extract_indicators, Rule};
use crate::domain::rule_parser;
use crate::domain::strategy::{RuleStrategy, StrategyRule};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "fxgrid",
    about = "Forex entry-signal backtester over a stop-loss / risk-reward grid"
)]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest and print the metrics table
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the metrics table as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write every simulated trade as CSV
        #[arg(long)]
        trades: Option<PathBuf>,
        /// Write the per-cell equity curves as CSV
        #[arg(long)]
        equity: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file and its rules
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the stored data range for a pair
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        pair: Option<String>,
    },
    /// List pairs with data on the configured timeframe
    ListPairs {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            dry_run: true,
            ..
        } => dry_run(&config),
        Command::Backtest {
            config,
            output,
            trades,
            equity,
            dry_run: false,
        } => {
            let outputs = OutputPaths {
                metrics: output.as_deref(),
                trades: trades.as_deref(),
                equity: equity.as_deref(),
            };
            let cancel = CancellationToken::new();
            cancel_on_interrupt(&cancel)
                .and_then(|()| run_backtest(&config, outputs, &cancel))
                .map(|_| ())
        }
        Command::Validate { config } => validate(&config),
        Command::Info { config, pair } => info(&config, pair.as_deref()),
        Command::ListPairs { config } => list_pairs(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Files a backtest writes besides the console table.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutputPaths<'a> {
    pub metrics: Option<&'a Path>,
    pub trades: Option<&'a Path>,
    pub equity: Option<&'a Path>,
}

/// Cancel `token` on the first Ctrl-C. The watcher thread lives until the
/// process exits.
pub fn cancel_on_interrupt(token: &CancellationToken) -> Result<(), FxError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let token = token.clone();
    std::thread::Builder::new()
        .name("fxgrid-interrupt".into())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, cancelling backtest");
                    token.cancel();
                }
            })
        })?;
    Ok(())
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, FxError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

pub fn run_backtest(
    config_path: &Path,
    outputs: OutputPaths<'_>,
    cancel: &CancellationToken,
) -> Result<BacktestReport, FxError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;

    let strategy = build_strategy(&config)?;
    eprintln!("Loading strategy: {}", strategy.name());
    let engine = Engine::new(build_engine_config(&config)?, strategy)?;
    let data_port = open_data_port(&config)?;

    run_backtest_pipeline(data_port.as_ref(), &config, &engine, outputs, cancel)
}

/// Build the engine configuration, falling back to defaults for absent keys.
pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, FxError> {
    let pair = require(config, "backtest", "pair")?.to_uppercase();
    let defaults = EngineConfig::default();
    let news_defaults = NewsFilterConfig::default();

    let news_filter = NewsFilterConfig {
        mode: read_parsed(config, "news", "mode")?.unwrap_or(news_defaults.mode),
        window_before: read_window(config, "window_before_hours")?
            .unwrap_or(news_defaults.window_before),
        window_after: read_window(config, "window_after_hours")?
            .unwrap_or(news_defaults.window_after),
        impact_threshold: read_parsed(config, "news", "impact_threshold")?
            .unwrap_or(news_defaults.impact_threshold),
        pair_relevant_only: config.get_bool(
            "news",
            "pair_relevant_only",
            news_defaults.pair_relevant_only,
        ),
    };

    Ok(EngineConfig {
        stop_loss_values: read_positive_list(config, "grid", "stop_loss_values")?
            .unwrap_or(defaults.stop_loss_values),
        risk_reward_values: read_positive_list(config, "grid", "risk_reward_values")?
            .unwrap_or(defaults.risk_reward_values),
        pip_size: read_pip_size(config)?.unwrap_or_else(|| default_pip_size(&pair)),
        entry_fill_policy: read_parsed(config, "execution", "entry_fill")?.unwrap_or_default(),
        tie_break_policy: read_parsed(config, "execution", "tie_break")?.unwrap_or_default(),
        news_filter,
        session_offset_hours: read_session_offset(config)?
            .unwrap_or(defaults.session_offset_hours),
        threads: read_threads(config)?,
    })
}

fn parse_rule(config: &dyn ConfigPort, key: &str) -> Result<Option<Rule>, FxError> {
    let Some(raw) = non_empty(config, "strategy", key) else {
        return Ok(None);
    };
    match rule_parser::parse(&raw) {
        Ok(rule) => Ok(Some(rule)),
        Err(e) => {
            eprintln!("error: failed to parse {}:\n{}", key, e.display_with_context(&raw));
            Err(e.into())
        }
    }
}

/// Rules from `[strategy]`, or scheduled entries when `entries_file` is set.
pub fn build_strategy(config: &dyn ConfigPort) -> Result<Arc<dyn StrategyRule>, FxError> {
    if let Some(path) = non_empty(config, "strategy", "entries_file") {
        let entries = CsvAdapter::read_entries(Path::new(&path))?;
        eprintln!("Loaded {} scheduled entries from {}", entries.len(), path);
        return Ok(Arc::new(entries));
    }

    let name = non_empty(config, "strategy", "name").unwrap_or_else(|| "Unnamed".to_string());
    let entry_long = parse_rule(config, "entry_long")?;
    let entry_short = parse_rule(config, "entry_short")?;
    Ok(Arc::new(RuleStrategy::new(&name, entry_long, entry_short)?))
}

pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, FxError> {
    match non_empty(config, "data", "source").as_deref() {
        Some("sqlite") => open_sqlite(config),
        _ => {
            let dir = non_empty(config, "data", "csv_dir").unwrap_or_else(|| "./data".to_string());
            Ok(Box::new(CsvAdapter::new(PathBuf::from(dir))))
        }
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, FxError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let adapter = SqliteAdapter::from_config(config)?;
    adapter.initialize_schema()?;
    Ok(Box::new(adapter))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, FxError> {
    Err(FxError::ConfigInvalid {
        section: "data".into(),
        key: "source".into(),
        reason: "sqlite feature is required for source = sqlite".into(),
    })
}

/// Load data, run the engine, print the table and write any requested files.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    config: &dyn ConfigPort,
    engine: &Engine,
    outputs: OutputPaths<'_>,
    cancel: &CancellationToken,
) -> Result<BacktestReport, FxError> {
    let pair = require(config, "backtest", "pair")?.to_uppercase();
    let timeframe = require(config, "backtest", "timeframe")?;
    let (start, end) = read_date_range(config)?;

    let series = BarSeries::load(data_port, &pair, &timeframe, start, end)?;
    let news = if engine.config().news_filter.mode == NewsMode::Off {
        NewsIndex::empty()
    } else {
        let window = engine
            .config()
            .news_filter
            .window_before
            .max(engine.config().news_filter.window_after);
        NewsIndex::new(data_port.fetch_news(start - window, end + window)?)
    };

    eprintln!(
        "Running backtest: {} {} {} bars, {} to {}, {} grid cells",
        pair,
        timeframe,
        series.len(),
        format_timestamp(&start),
        format_timestamp(&end),
        engine.grid().len(),
    );

    let (report, arena) = match outputs.trades {
        Some(_) => {
            let (report, arena) = engine.run_with_trades(&series, &news, cancel)?;
            (report, Some(arena))
        }
        None => (engine.run(&series, &news, cancel)?, None),
    };
    print_report(&report);

    let reporter = CsvReportAdapter::new();
    if let Some(path) = outputs.metrics {
        reporter.write(&report, &path.to_string_lossy())?;
        eprintln!("\nMetrics written to: {}", path.display());
    }
    if let Some(path) = outputs.equity {
        reporter.write_equity(&report, &path.to_string_lossy())?;
        eprintln!("Equity curves written to: {}", path.display());
    }
    if let (Some(path), Some(arena)) = (outputs.trades, &arena) {
        reporter.write_trades(arena, engine.grid(), &path.to_string_lossy())?;
        eprintln!("Trades written to: {}", path.display());
    }

    Ok(report)
}

pub fn print_report(report: &BacktestReport) {
    println!(
        "{} {} | strategy: {} | bars: {} | signals: {} (dropped {}, tagged {})",
        report.pair,
        report.timeframe,
        report.strategy,
        report.bars,
        report.signals_generated,
        report.signals_dropped,
        report.signals_tagged,
    );
    println!();
    println!(
        "{:<16} {:>7} {:>6} {:>6} {:>6} {:>8} {:>8} {:>9} {:>9} {:>8} {:>7}",
        "set",
        "trades",
        "wins",
        "losses",
        "unres",
        "win%",
        "exp_R",
        "avg_bars",
        "avg_hours",
        "balance",
        "max_dd%"
    );
    for row in &report.metrics.rows {
        println!(
            "{:<16} {:>7} {:>6} {:>6} {:>6} {:>7.1}% {:>8.3} {:>9.1} {:>9.1} {:>8.1} {:>7.2}",
            row.parameter_set.label(),
            row.trade_count,
            row.win_count,
            row.loss_count,
            row.unresolved_count,
            row.win_rate * 100.0,
            row.expectancy_r,
            row.avg_bars_to_resolution,
            row.avg_duration_hours,
            row.equity.final_balance,
            row.equity.max_drawdown_pct,
        );
    }

    if let Some(best) = report.metrics.best_by_win_rate() {
        println!(
            "\nBest win rate: {} ({:.1}%)",
            best.parameter_set.label(),
            best.win_rate * 100.0
        );
    }
    if let Some(calm) = report.metrics.shallowest_drawdown() {
        println!(
            "Shallowest drawdown: {} ({:.2}%)",
            calm.parameter_set.label(),
            calm.equity.max_drawdown_pct
        );
    }

    let sections = [
        ("Session".to_string(), &report.metrics.by_session),
        ("Direction".to_string(), &report.metrics.by_direction),
    ];
    let annotated = report
        .metrics
        .by_annotation
        .iter()
        .map(|(key, rows)| (key.to_uppercase(), rows));
    for (title, rows) in sections.into_iter().chain(annotated) {
        println!("\n=== By {} ===", title);
        for row in rows {
            println!(
                "  {:<10} {:>7} trades, {:>5.1}% win rate, {} unresolved",
                row.label,
                row.trade_count,
                row.win_rate * 100.0,
                row.unresolved_count,
            );
        }
    }
}

/// Validate everything and print what a backtest would do, without loading data.
pub fn dry_run(config_path: &Path) -> Result<(), FxError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;
    eprintln!("Config validated successfully");

    let engine_config = build_engine_config(&config)?;
    let grid = Grid::new(
        &engine_config.stop_loss_values,
        &engine_config.risk_reward_values,
        engine_config.pip_size,
    )?;
    let strategy = build_strategy(&config)?;
    let (start, end) = read_date_range(&config)?;

    eprintln!("\nStrategy: {}", strategy.name());
    print_rules(&config)?;

    eprintln!("\nRun:");
    eprintln!(
        "  {} {} from {} to {}",
        require(&config, "backtest", "pair")?.to_uppercase(),
        require(&config, "backtest", "timeframe")?,
        format_timestamp(&start),
        format_timestamp(&end),
    );
    eprintln!("  pip size: {}", grid.pip_size());
    eprintln!("  entry fill: {}", engine_config.entry_fill_policy);
    eprintln!("  tie break: {}", engine_config.tie_break_policy);
    eprintln!("  news filter: {}", engine_config.news_filter.mode);

    eprintln!("\nGrid ({} cells):", grid.len());
    for set in grid.sets() {
        eprintln!("  {}", set.label());
    }

    eprintln!("\nDry run complete: configuration is valid");
    Ok(())
}

fn print_rules(config: &dyn ConfigPort) -> Result<(), FxError> {
    let mut indicators = Vec::new();
    for key in ["entry_long", "entry_short"] {
        if let Some(rule) = parse_rule(config, key)? {
            eprintln!("  {}: {}", key, rule);
            indicators.extend(extract_indicators(&rule).into_iter().map(|i| i.to_string()));
        }
    }
    if !indicators.is_empty() {
        indicators.sort();
        indicators.dedup();
        eprintln!("\nIndicators: {}", indicators.join(", "));
    }
    Ok(())
}

pub fn validate(config_path: &Path) -> Result<(), FxError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;

    match non_empty(&config, "strategy", "entries_file") {
        Some(path) => {
            let entries = CsvAdapter::read_entries(Path::new(&path))?;
            eprintln!("\nScheduled entries: {} from {}", entries.len(), path);
        }
        None => {
            eprintln!("\nRules:");
            print_rules(&config)?;
        }
    }

    eprintln!("\nConfiguration is valid.");
    Ok(())
}

pub fn info(config_path: &Path, pair: Option<&str>) -> Result<(), FxError> {
    let config = load_config(config_path)?;
    let pair = match pair {
        Some(p) => p.to_uppercase(),
        None => require(&config, "backtest", "pair")?.to_uppercase(),
    };
    let timeframe = require(&config, "backtest", "timeframe")?;
    let data_port = open_data_port(&config)?;

    match data_port.get_data_range(&pair, &timeframe)? {
        Some((first, last, count)) => println!(
            "{} {}: {} bars, {} to {}",
            pair,
            timeframe,
            count,
            format_timestamp(&first),
            format_timestamp(&last)
        ),
        None => eprintln!("{} {}: no data found", pair, timeframe),
    }
    Ok(())
}

pub fn list_pairs(config_path: &Path) -> Result<(), FxError> {
    let config = load_config(config_path)?;
    let timeframe = require(&config, "backtest", "timeframe")?;
    let data_port = open_data_port(&config)?;

    let pairs = data_port.list_pairs(&timeframe)?;
    if pairs.is_empty() {
        eprintln!("No pairs found for timeframe {}", timeframe);
    } else {
        for pair in &pairs {
            println!("{}", pair);
        }
        eprintln!("{} pairs found", pairs.len());
    }
    Ok(())
}
