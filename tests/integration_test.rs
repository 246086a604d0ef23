//! Integration tests for the backtest pipeline.
//!
//! Tests cover:
//! - Hand-computed scenarios through a mock data port
//! - News exclusion and tagging
//! - Tie-break policies on a bar that touches both levels
//! - Grid fan-out and the trade arena
//! - Truncating the series after resolution leaves outcomes unchanged
//! - Full pipeline via SqliteAdapter with a seeded in-memory database

mod common;

use approx::assert_relative_eq;
use common::*;
use fxgrid::domain::bar_series::BarSeries;
use fxgrid::domain::engine::{BacktestReport, CancellationToken, Engine, EngineConfig, TradeArena};
use fxgrid::domain::error::FxError;
use fxgrid::domain::grid::Grid;
use fxgrid::domain::news::{Impact, NewsIndex};
use fxgrid::domain::news_filter::NewsMode;
use fxgrid::domain::rule_parser;
use fxgrid::domain::signal::EntryFillPolicy;
use fxgrid::domain::simulator::{Outcome, TieBreakPolicy, UnresolvedReason};
use fxgrid::domain::strategy::{Direction, RuleStrategy, StrategyRule};
use fxgrid::ports::data_port::DataPort;
use fxgrid::ports::report_port::ReportPort;
use std::cell::RefCell;
use std::sync::Arc;

fn run(
    config: EngineConfig,
    strategy: impl StrategyRule + 'static,
    series: &BarSeries,
    news: &NewsIndex,
) -> (BacktestReport, TradeArena) {
    let engine = Engine::new(config, Arc::new(strategy)).unwrap();
    engine
        .run_with_trades(series, news, &CancellationToken::new())
        .unwrap()
}

mod scenarios {
    use super::*;

    #[test]
    fn three_bar_long_wins_on_third_bar() {
        let port = MockDataPort::new().with_bars("EURUSD", "H1", three_bars());
        let series = BarSeries::load(
            &port,
            "EURUSD",
            "H1",
            ts("2024-01-01"),
            ts("2024-01-02"),
        )
        .unwrap();
        assert_eq!(series.len(), 3);

        let config = single_cell_config(50.0, 2.0);
        assert_eq!(config.tie_break_policy, TieBreakPolicy::StopFirst);
        let (report, arena) = run(
            config,
            scheduled(&[("2024-01-01 10:00:00", Direction::Long)]),
            &series,
            &NewsIndex::empty(),
        );

        let row = &report.metrics.rows[0];
        assert_eq!(row.trade_count, 1);
        assert_eq!(row.win_count, 1);
        assert_relative_eq!(row.win_rate, 1.0);
        assert_relative_eq!(row.expectancy_r, 2.0);

        let trade = arena.get(0, 0).unwrap();
        assert_eq!(trade.outcome, Outcome::Win);
        assert_eq!(trade.exit_timestamp, ts("2024-01-01 12:00:00"));
        assert_eq!(trade.bars_to_resolution, 2);
        assert_relative_eq!(trade.entry_price, 1.1000);
        assert_relative_eq!(trade.stop_price, 1.0950, epsilon = 1e-9);
        assert_relative_eq!(trade.target_price, 1.1100, epsilon = 1e-9);
    }

    #[test]
    fn high_impact_news_excludes_signal() {
        let news = NewsIndex::new(vec![news_event(
            "2024-01-01 10:00:00",
            Impact::High,
            "USD",
        )]);
        let mut config = single_cell_config(50.0, 2.0);
        config.news_filter.mode = NewsMode::Exclude;

        let (report, arena) = run(
            config,
            scheduled(&[("2024-01-01 10:00:00", Direction::Long)]),
            &three_bar_series(),
            &news,
        );

        assert_eq!(report.signals_generated, 1);
        assert_eq!(report.signals_dropped, 1);
        assert_eq!(report.metrics.total_trades(), 0);
        assert!(arena.is_empty());
        assert_eq!(arena.news_tags(0).len(), 1);
    }

    #[test]
    fn low_impact_news_below_threshold_passes() {
        let news = NewsIndex::new(vec![news_event(
            "2024-01-01 10:00:00",
            Impact::Low,
            "USD",
        )]);
        let mut config = single_cell_config(50.0, 2.0);
        config.news_filter.mode = NewsMode::Exclude;

        let (report, _) = run(
            config,
            scheduled(&[("2024-01-01 10:00:00", Direction::Long)]),
            &three_bar_series(),
            &news,
        );
        assert_eq!(report.signals_dropped, 0);
        assert_eq!(report.metrics.total_trades(), 1);
    }

    #[test]
    fn tag_mode_keeps_signal_and_records_events() {
        let news = NewsIndex::new(vec![news_event(
            "2024-01-01 13:00:00",
            Impact::High,
            "EUR",
        )]);
        let mut config = single_cell_config(50.0, 2.0);
        config.news_filter.mode = NewsMode::Tag;

        let (report, arena) = run(
            config,
            scheduled(&[("2024-01-01 10:00:00", Direction::Long)]),
            &three_bar_series(),
            &news,
        );

        assert_eq!(report.signals_tagged, 1);
        assert_eq!(report.metrics.total_trades(), 1);
        assert_eq!(arena.news_tags(0).len(), 1);
        assert_eq!(arena.news_tags(0)[0].currency, "EUR");
    }

    #[test]
    fn empty_range_is_data_gap() {
        let port = MockDataPort::new().with_bars("EURUSD", "H1", three_bars());
        let result = BarSeries::load(
            &port,
            "EURUSD",
            "H1",
            ts("2023-01-01"),
            ts("2023-06-30"),
        );
        match result {
            Err(FxError::DataGap { pair, timeframe, .. }) => {
                assert_eq!(pair, "EURUSD");
                assert_eq!(timeframe, "H1");
            }
            other => panic!("expected DataGap, got {other:?}"),
        }
    }

    #[test]
    fn data_source_error_propagates() {
        let port = MockDataPort::new().with_error("EURUSD", "connection refused");
        let result = BarSeries::load(&port, "EURUSD", "H1", ts("2024-01-01"), ts("2024-01-02"));
        assert!(matches!(result, Err(FxError::Database { .. })));
    }

    #[test]
    fn signal_on_last_bar_is_unresolved() {
        let (report, arena) = run(
            single_cell_config(50.0, 2.0),
            scheduled(&[("2024-01-01 12:00:00", Direction::Short)]),
            &three_bar_series(),
            &NewsIndex::empty(),
        );

        assert_eq!(report.unresolved_trades, 1);
        assert_eq!(report.metrics.rows[0].win_count, 0);
        assert_relative_eq!(report.metrics.rows[0].win_rate, 0.0);
        assert_eq!(
            arena.get(0, 0).unwrap().outcome,
            Outcome::Unresolved(UnresolvedReason::EndOfData)
        );
    }

    #[test]
    fn short_signal_loses_when_price_rallies() {
        let (report, arena) = run(
            single_cell_config(50.0, 2.0),
            scheduled(&[("2024-01-01 10:00:00", Direction::Short)]),
            &three_bar_series(),
            &NewsIndex::empty(),
        );

        assert_eq!(report.metrics.rows[0].loss_count, 1);
        let trade = arena.get(0, 0).unwrap();
        assert_eq!(trade.outcome, Outcome::Loss);
        assert_eq!(trade.exit_timestamp, ts("2024-01-01 12:00:00"));
    }
}

mod tie_break {
    use super::*;

    fn straddle_series() -> BarSeries {
        BarSeries::new(
            "EURUSD",
            "H1",
            vec![
                bar("2024-01-01 10:00:00", 1.0995, 1.1005, 1.0990, 1.1000),
                bar("2024-01-01 11:00:00", 1.1000, 1.1060, 1.0940, 1.1000),
            ],
        )
    }

    fn outcome(policy: TieBreakPolicy) -> Outcome {
        let mut config = single_cell_config(50.0, 1.0);
        config.tie_break_policy = policy;
        let (_, arena) = run(
            config,
            scheduled(&[("2024-01-01 10:00:00", Direction::Long)]),
            &straddle_series(),
            &NewsIndex::empty(),
        );
        arena.get(0, 0).unwrap().outcome
    }

    #[test]
    fn stop_first_resolves_as_loss() {
        assert_eq!(outcome(TieBreakPolicy::StopFirst), Outcome::Loss);
    }

    #[test]
    fn target_first_resolves_as_win() {
        assert_eq!(outcome(TieBreakPolicy::TargetFirst), Outcome::Win);
    }

    #[test]
    fn policy_is_deterministic_across_runs() {
        for policy in [TieBreakPolicy::StopFirst, TieBreakPolicy::TargetFirst] {
            let first = outcome(policy);
            for _ in 0..5 {
                assert_eq!(outcome(policy), first);
            }
        }
    }
}

mod next_bar_open {
    use super::*;

    // The fill bar straddles both levels, then price drifts and rallies.
    fn gap_series() -> BarSeries {
        BarSeries::new(
            "EURUSD",
            "H1",
            vec![
                bar("2024-01-01 10:00:00", 1.0995, 1.1005, 1.0990, 1.1000),
                bar("2024-01-01 11:00:00", 1.1010, 1.1200, 1.0800, 1.1010),
                bar("2024-01-01 12:00:00", 1.1010, 1.1050, 1.0990, 1.1020),
                bar("2024-01-01 13:00:00", 1.1020, 1.1120, 1.1000, 1.1100),
            ],
        )
    }

    fn long_at_ten(policy: EntryFillPolicy) -> (BacktestReport, TradeArena) {
        let mut config = single_cell_config(50.0, 2.0);
        config.entry_fill_policy = policy;
        run(
            config,
            scheduled(&[("2024-01-01 10:00:00", Direction::Long)]),
            &gap_series(),
            &NewsIndex::empty(),
        )
    }

    #[test]
    fn fill_bar_range_is_not_scanned() {
        let (report, arena) = long_at_ten(EntryFillPolicy::NextBarOpen);

        let trade = arena.get(0, 0).unwrap();
        assert_eq!(trade.entry_timestamp, ts("2024-01-01 11:00:00"));
        assert_relative_eq!(trade.entry_price, 1.1010);
        assert_relative_eq!(trade.stop_price, 1.0960, epsilon = 1e-9);
        assert_relative_eq!(trade.target_price, 1.1110, epsilon = 1e-9);
        assert_eq!(trade.outcome, Outcome::Win);
        assert_eq!(trade.exit_timestamp, ts("2024-01-01 13:00:00"));
        assert_eq!(trade.bars_to_resolution, 2);

        let row = &report.metrics.rows[0];
        assert_eq!(row.win_count, 1);
        assert_relative_eq!(row.equity.final_balance, 104.0);
    }

    #[test]
    fn close_fill_resolves_on_the_straddle() {
        let (report, arena) = long_at_ten(EntryFillPolicy::CloseOfSignalBar);

        let trade = arena.get(0, 0).unwrap();
        assert_eq!(trade.entry_timestamp, ts("2024-01-01 10:00:00"));
        assert_eq!(trade.outcome, Outcome::Loss);
        assert_eq!(trade.exit_timestamp, ts("2024-01-01 11:00:00"));
        assert_eq!(trade.bars_to_resolution, 1);
        assert_eq!(report.metrics.rows[0].loss_count, 1);
    }
}

mod grid_fanout {
    use super::*;

    fn always_long() -> RuleStrategy {
        let rule = rule_parser::parse("ABOVE(close, 0)").unwrap();
        RuleStrategy::new("always", Some(rule), None).unwrap()
    }

    #[test]
    fn trade_count_is_signals_times_cells() {
        let series = BarSeries::new(
            "EURUSD",
            "H1",
            generate_bars("2024-01-01 00:00:00", 50, 1.1000, 0.0004),
        );
        let (report, arena) = run(
            EngineConfig::default(),
            always_long(),
            &series,
            &NewsIndex::empty(),
        );

        let grid = Grid::new(&[20.0, 25.0, 30.0], &[2.0, 3.0, 4.0, 5.0], 0.0001).unwrap();
        assert_eq!(report.signals_generated, 50);
        assert_eq!(report.metrics.rows.len(), grid.len());
        assert_eq!(report.metrics.total_trades(), 50 * grid.len());
        assert_eq!(arena.len(), 50 * grid.len());

        let trade = arena.get(7, 5).unwrap();
        assert_eq!(trade.signal_id, 7);
        assert_eq!(trade.parameter_set_id, 5);
        assert!(arena.get(50, 0).is_none());
    }

    #[test]
    fn rule_history_requirement_skips_early_bars() {
        let series = BarSeries::new(
            "EURUSD",
            "H1",
            generate_bars("2024-01-01 00:00:00", 30, 1.1000, 0.0004),
        );
        let rule = rule_parser::parse("ABOVE(close, SMA(10))").unwrap();
        let strategy = RuleStrategy::new("trend", Some(rule), None).unwrap();
        let (report, arena) = run(
            single_cell_config(20.0, 2.0),
            strategy,
            &series,
            &NewsIndex::empty(),
        );

        assert_eq!(report.signals_generated, 21);
        assert_eq!(arena.signal(0).unwrap().bar_index, 9);
    }

    #[test]
    fn private_pool_matches_global_pool() {
        let series = BarSeries::new(
            "EURUSD",
            "H1",
            generate_bars("2024-01-01 00:00:00", 40, 1.1000, -0.0003),
        );
        let mut threaded = EngineConfig::default();
        threaded.threads = Some(3);

        let (global, _) = run(
            EngineConfig::default(),
            always_long(),
            &series,
            &NewsIndex::empty(),
        );
        let (private, _) = run(threaded, always_long(), &series, &NewsIndex::empty());
        assert_eq!(global, private);
    }
}

mod no_lookahead {
    use super::*;

    fn zigzag() -> BarSeries {
        let mut bars = generate_bars("2024-01-02 00:00:00", 60, 1.1000, 0.0);
        for (i, bar) in bars.iter_mut().enumerate() {
            let swing = ((i as f64) * 0.7).sin() * 0.0040;
            bar.open = 1.1000 + swing;
            bar.close = 1.1000 + ((i as f64 + 1.0) * 0.7).sin() * 0.0040;
            bar.high = bar.open.max(bar.close) + 0.0008;
            bar.low = bar.open.min(bar.close) - 0.0008;
        }
        BarSeries::new("EURUSD", "H1", bars)
    }

    #[test]
    fn truncating_after_resolution_keeps_outcomes() {
        let series = zigzag();
        let strategy = scheduled(&[
            ("2024-01-02 02:00:00", Direction::Long),
            ("2024-01-02 09:00:00", Direction::Short),
            ("2024-01-02 20:00:00", Direction::Long),
        ]);
        let strategy = Arc::new(strategy);
        let engine = Engine::new(
            EngineConfig {
                stop_loss_values: vec![20.0, 30.0],
                risk_reward_values: vec![1.0, 2.0],
                ..EngineConfig::default()
            },
            strategy,
        )
        .unwrap();
        let cancel = CancellationToken::new();
        let full = engine
            .simulate_trades(&series, &NewsIndex::empty(), &cancel)
            .unwrap();
        assert_eq!(full.len(), 12);

        for trade in full.trades().iter().filter(|t| t.outcome.is_resolved()) {
            let signal = full.signal(trade.signal_id).unwrap();
            let cut = signal.entry_index + trade.bars_to_resolution + 1;
            let truncated = series.truncated(cut);
            let partial = engine
                .simulate_trades(&truncated, &NewsIndex::empty(), &cancel)
                .unwrap();
            let again = partial
                .get(trade.signal_id, trade.parameter_set_id)
                .unwrap();
            assert_eq!(again.outcome, trade.outcome);
            assert_eq!(again.exit_timestamp, trade.exit_timestamp);
        }
    }
}

/// Captures what the pipeline hands to a report port.
struct RecordingReportPort {
    rows: RefCell<Vec<String>>,
}

impl RecordingReportPort {
    fn new() -> Self {
        Self {
            rows: RefCell::new(Vec::new()),
        }
    }
}

impl ReportPort for RecordingReportPort {
    fn write(&self, report: &BacktestReport, _output_path: &str) -> Result<(), FxError> {
        self.rows.borrow_mut().extend(
            report
                .metrics
                .rows
                .iter()
                .map(|r| format!("{}:{}", r.parameter_set.label(), r.win_count)),
        );
        Ok(())
    }

    fn write_trades(
        &self,
        trades: &TradeArena,
        grid: &Grid,
        _output_path: &str,
    ) -> Result<(), FxError> {
        self.rows.borrow_mut().extend(trades.trades().iter().map(|t| {
            let label = grid.get(t.parameter_set_id).map(|s| s.label()).unwrap_or_default();
            format!("{}:{}:{}", t.signal_id, label, t.outcome)
        }));
        Ok(())
    }

    fn write_equity(&self, report: &BacktestReport, _output_path: &str) -> Result<(), FxError> {
        self.rows.borrow_mut().extend(report.metrics.rows.iter().map(|r| {
            format!("{}:{:.2}", r.parameter_set.label(), r.equity.final_balance)
        }));
        Ok(())
    }
}

mod report_generation {
    use super::*;

    #[test]
    fn report_port_receives_rows_in_grid_order() {
        let engine = Engine::new(
            EngineConfig {
                stop_loss_values: vec![50.0],
                risk_reward_values: vec![1.0, 3.0],
                ..EngineConfig::default()
            },
            Arc::new(scheduled(&[("2024-01-01 10:00:00", Direction::Long)])),
        )
        .unwrap();
        let series = three_bar_series();
        let cancel = CancellationToken::new();
        let report = engine.run(&series, &NewsIndex::empty(), &cancel).unwrap();
        let arena = engine
            .simulate_trades(&series, &NewsIndex::empty(), &cancel)
            .unwrap();

        let port = RecordingReportPort::new();
        port.write(&report, "unused").unwrap();
        port.write_trades(&arena, engine.grid(), "unused").unwrap();
        port.write_equity(&report, "unused").unwrap();

        assert_eq!(
            *port.rows.borrow(),
            vec![
                "SL50/RR1:1".to_string(),
                "SL50/RR3:0".to_string(),
                "0:SL50/RR1:win".to_string(),
                "0:SL50/RR3:unresolved_end_of_data".to_string(),
                "SL50/RR1:102.00".to_string(),
                "SL50/RR3:100.00".to_string(),
            ]
        );
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_adapter_tests {
    use super::*;
    use fxgrid::adapters::file_config_adapter::FileConfigAdapter;
    use fxgrid::adapters::sqlite_adapter::SqliteAdapter;
    use fxgrid::cli;

    fn seeded() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter.insert_bars("EURUSD", "H1", &three_bars()).unwrap();
        adapter
            .insert_news(&[news_event("2024-01-01 10:30:00", Impact::High, "USD")])
            .unwrap();
        adapter
    }

    const INI: &str = r#"
[backtest]
pair = EURUSD
timeframe = H1
start = 2024-01-01
end = 2024-01-01

[grid]
stop_loss_values = 50
risk_reward_values = 2
"#;

    #[test]
    fn full_pipeline_via_sqlite_adapter() {
        let adapter = seeded();
        let config = FileConfigAdapter::from_string(INI).unwrap();
        let engine = Engine::new(
            cli::build_engine_config(&config).unwrap(),
            Arc::new(scheduled(&[("2024-01-01 10:00:00", Direction::Long)])),
        )
        .unwrap();

        let report = cli::run_backtest_pipeline(
            &adapter,
            &config,
            &engine,
            cli::OutputPaths::default(),
            &CancellationToken::new(),
        ).unwrap();
        assert_eq!(report.bars, 3);
        assert_eq!(report.metrics.rows[0].win_count, 1);
    }

    #[test]
    fn sqlite_news_feeds_exclusion() {
        let adapter = seeded();
        let ini = format!("{}\n[news]\nmode = exclude\n", INI);
        let config = FileConfigAdapter::from_string(&ini).unwrap();
        let engine = Engine::new(
            cli::build_engine_config(&config).unwrap(),
            Arc::new(scheduled(&[("2024-01-01 10:00:00", Direction::Long)])),
        )
        .unwrap();

        let report = cli::run_backtest_pipeline(
            &adapter,
            &config,
            &engine,
            cli::OutputPaths::default(),
            &CancellationToken::new(),
        ).unwrap();
        assert_eq!(report.signals_dropped, 1);
        assert_eq!(report.metrics.total_trades(), 0);
    }

    #[test]
    fn sqlite_and_mock_ports_agree() {
        let sqlite = seeded();
        let mock = MockDataPort::new().with_bars("EURUSD", "H1", three_bars());
        let start = ts("2024-01-01");
        let end = ts("2024-01-01 23:59:59");
        assert_eq!(
            sqlite.fetch_bars("EURUSD", "H1", start, end).unwrap(),
            mock.fetch_bars("EURUSD", "H1", start, end).unwrap()
        );
        assert_eq!(
            sqlite.get_data_range("EURUSD", "H1").unwrap(),
            mock.get_data_range("EURUSD", "H1").unwrap()
        );
    }
}
