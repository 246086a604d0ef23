//! Backtest orchestration.
//!
//! Signals are generated in a single sequential pass and stored in an arena
//! (`signal_id` is the arena index). Signals that survive the news filter are
//! then fanned out across the parameter grid on the rayon pool. Each worker
//! folds its trades into a private [`Aggregator`]; the per-worker aggregators
//! are merged by `try_reduce`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use rayon::prelude::*;

use crate::domain::aggregator::{Aggregator, MetricsTable};
use crate::domain::bar_series::BarSeries;
use crate::domain::error::FxError;
use crate::domain::grid::{Grid, DEFAULT_RISK_REWARD_VALUES, DEFAULT_STOP_LOSS_VALUES};
use crate::domain::news::NewsIndex;
use crate::domain::news_filter::{NewsDecision, NewsFilter, NewsFilterConfig, NewsTag};
use crate::domain::session::DEFAULT_SESSION_OFFSET_HOURS;
use crate::domain::signal::{EntryFillPolicy, Signal, SignalGenerator};
use crate::domain::simulator::{Outcome, SimulatedTrade, Simulator, TieBreakPolicy, UnresolvedReason};
use crate::domain::strategy::StrategyRule;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub stop_loss_values: Vec<f64>,
    pub risk_reward_values: Vec<f64>,
    pub pip_size: f64,
    pub entry_fill_policy: EntryFillPolicy,
    pub tie_break_policy: TieBreakPolicy,
    pub news_filter: NewsFilterConfig,
    pub session_offset_hours: i64,
    /// Worker threads for a private pool; `None` uses the global rayon pool.
    pub threads: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stop_loss_values: DEFAULT_STOP_LOSS_VALUES.to_vec(),
            risk_reward_values: DEFAULT_RISK_REWARD_VALUES.to_vec(),
            pip_size: 0.0001,
            entry_fill_policy: EntryFillPolicy::default(),
            tie_break_policy: TieBreakPolicy::default(),
            news_filter: NewsFilterConfig::default(),
            session_offset_hours: DEFAULT_SESSION_OFFSET_HOURS,
            threads: None,
        }
    }
}

/// Cooperative cancellation flag shared between a run and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), FxError> {
        if self.is_cancelled() {
            Err(FxError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    pub pair: String,
    pub timeframe: String,
    pub strategy: String,
    pub bars: usize,
    pub metrics: MetricsTable,
    pub signals_generated: usize,
    pub signals_dropped: usize,
    pub signals_tagged: usize,
    pub unresolved_trades: usize,
}

/// Every simulated trade of a run, addressable by `(signal_id, parameter_set_id)`.
#[derive(Debug, Clone)]
pub struct TradeArena {
    signals: Vec<Signal>,
    news_tags: Vec<Vec<NewsTag>>,
    trades: Vec<SimulatedTrade>,
}

impl TradeArena {
    pub fn get(&self, signal_id: usize, parameter_set_id: usize) -> Option<&SimulatedTrade> {
        self.trades
            .binary_search_by_key(&(signal_id, parameter_set_id), |t| {
                (t.signal_id, t.parameter_set_id)
            })
            .ok()
            .map(|i| &self.trades[i])
    }

    /// Trades ordered by `(signal_id, parameter_set_id)`.
    pub fn trades(&self) -> &[SimulatedTrade] {
        &self.trades
    }

    pub fn signal(&self, signal_id: usize) -> Option<&Signal> {
        self.signals.get(signal_id)
    }

    /// News events tagged onto a signal (empty unless the filter runs in tag mode).
    pub fn news_tags(&self, signal_id: usize) -> &[NewsTag] {
        self.news_tags.get(signal_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

/// Signals of one run after news filtering.
struct SignalSet {
    signals: Vec<Signal>,
    news_tags: Vec<Vec<NewsTag>>,
    surviving: Vec<usize>,
    dropped: usize,
    tagged: usize,
}

pub struct Engine {
    config: EngineConfig,
    grid: Grid,
    strategy: Arc<dyn StrategyRule>,
    pool: Option<rayon::ThreadPool>,
}

impl Engine {
    /// Validate `config` and build the parameter grid.
    pub fn new(config: EngineConfig, strategy: Arc<dyn StrategyRule>) -> Result<Self, FxError> {
        let grid = Grid::new(
            &config.stop_loss_values,
            &config.risk_reward_values,
            config.pip_size,
        )?;
        check_window("news.window_before", config.news_filter.window_before)?;
        check_window("news.window_after", config.news_filter.window_after)?;
        if !(-12..=14).contains(&config.session_offset_hours) {
            return Err(FxError::invalid_parameter(
                "session_offset_hours",
                format!("must be within -12..=14, got {}", config.session_offset_hours),
            ));
        }

        let pool = match config.threads {
            Some(0) => {
                return Err(FxError::invalid_parameter("threads", "must be at least 1"));
            }
            Some(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("fxgrid-worker-{i}"))
                    .build()
                    .map_err(|e| FxError::invalid_parameter("threads", e.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            config,
            grid,
            strategy,
            pool,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn run(
        &self,
        series: &BarSeries,
        news: &NewsIndex,
        cancel: &CancellationToken,
    ) -> Result<BacktestReport, FxError> {
        let set = self.collect_signals(series, news, cancel)?;
        let simulator = self.simulator(series);

        let aggregate = || {
            set.surviving
                .par_iter()
                .try_fold(
                    || Aggregator::new(&self.grid),
                    |mut agg, &signal_id| {
                        cancel.check()?;
                        let signal = &set.signals[signal_id];
                        for params in self.grid.sets() {
                            agg.record_annotated(
                                &simulator.simulate(signal, params),
                                &signal.annotations,
                            );
                        }
                        Ok::<_, FxError>(agg)
                    },
                )
                .try_reduce(|| Aggregator::new(&self.grid), |a, b| Ok(a.merge(b)))
        };
        let aggregator = self.install(aggregate)?;
        cancel.check()?;

        Ok(self.report(series, &set, aggregator.finish()))
    }

    /// Like [`Engine::simulate_trades`] but also aggregates the same trades
    /// into a report, so the grid is simulated once.
    pub fn run_with_trades(
        &self,
        series: &BarSeries,
        news: &NewsIndex,
        cancel: &CancellationToken,
    ) -> Result<(BacktestReport, TradeArena), FxError> {
        let set = self.collect_signals(series, news, cancel)?;
        let trades = self.simulate_surviving(series, &set, cancel)?;

        let aggregate = || {
            trades
                .par_iter()
                .fold(
                    || Aggregator::new(&self.grid),
                    |mut agg, trade| {
                        agg.record_annotated(trade, &set.signals[trade.signal_id].annotations);
                        agg
                    },
                )
                .reduce(|| Aggregator::new(&self.grid), |a, b| a.merge(b))
        };
        let metrics = self.install(aggregate).finish();
        let report = self.report(series, &set, metrics);

        Ok((
            report,
            TradeArena {
                signals: set.signals,
                news_tags: set.news_tags,
                trades,
            },
        ))
    }

    /// Like [`Engine::run`] but keeps every individual trade.
    pub fn simulate_trades(
        &self,
        series: &BarSeries,
        news: &NewsIndex,
        cancel: &CancellationToken,
    ) -> Result<TradeArena, FxError> {
        let set = self.collect_signals(series, news, cancel)?;
        let trades = self.simulate_surviving(series, &set, cancel)?;

        let unresolved = trades
            .iter()
            .filter(|t| !t.outcome.is_resolved())
            .count();
        let malformed = trades
            .iter()
            .filter(|t| t.outcome == Outcome::Unresolved(UnresolvedReason::MalformedBar))
            .count();
        warn_unresolved(unresolved, malformed, trades.len());

        Ok(TradeArena {
            signals: set.signals,
            news_tags: set.news_tags,
            trades,
        })
    }

    /// Every (surviving signal, parameter set) trade, ordered by
    /// `(signal_id, parameter_set_id)`.
    fn simulate_surviving(
        &self,
        series: &BarSeries,
        set: &SignalSet,
        cancel: &CancellationToken,
    ) -> Result<Vec<SimulatedTrade>, FxError> {
        let simulator = self.simulator(series);

        let simulate = || {
            set.surviving
                .par_iter()
                .map(|&signal_id| -> Result<Vec<SimulatedTrade>, FxError> {
                    cancel.check()?;
                    let signal = &set.signals[signal_id];
                    Ok(self
                        .grid
                        .sets()
                        .iter()
                        .map(|params| simulator.simulate(signal, params))
                        .collect())
                })
                .collect::<Result<Vec<_>, FxError>>()
        };
        let per_signal = self.install(simulate)?;
        cancel.check()?;

        Ok(per_signal.into_iter().flatten().collect())
    }

    fn report(&self, series: &BarSeries, set: &SignalSet, metrics: MetricsTable) -> BacktestReport {
        let unresolved_trades = metrics.total_unresolved();
        let malformed: usize = metrics.rows.iter().map(|r| r.malformed_count).sum();
        warn_unresolved(unresolved_trades, malformed, metrics.total_trades());
        tracing::info!(
            pair = series.pair(),
            signals = set.signals.len(),
            dropped = set.dropped,
            trades = metrics.total_trades(),
            "backtest complete"
        );

        BacktestReport {
            pair: series.pair().to_string(),
            timeframe: series.timeframe().to_string(),
            strategy: self.strategy.name().to_string(),
            bars: series.len(),
            metrics,
            signals_generated: set.signals.len(),
            signals_dropped: set.dropped,
            signals_tagged: set.tagged,
            unresolved_trades,
        }
    }

    fn simulator<'a>(&'a self, series: &'a BarSeries) -> Simulator<'a> {
        Simulator::new(
            series.bars(),
            &self.grid,
            self.config.tie_break_policy,
            self.config.session_offset_hours,
        )
    }

    fn install<T, F>(&self, op: F) -> T
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn collect_signals(
        &self,
        series: &BarSeries,
        news: &NewsIndex,
        cancel: &CancellationToken,
    ) -> Result<SignalSet, FxError> {
        let filter = NewsFilter::new(&self.config.news_filter, news, series.pair());
        let generator =
            SignalGenerator::new(series, self.strategy.as_ref(), self.config.entry_fill_policy);

        let mut set = SignalSet {
            signals: Vec::new(),
            news_tags: Vec::new(),
            surviving: Vec::new(),
            dropped: 0,
            tagged: 0,
        };
        for signal in generator {
            cancel.check()?;
            let tags = match filter.evaluate(&signal) {
                NewsDecision::Pass => {
                    set.surviving.push(signal.id);
                    Vec::new()
                }
                NewsDecision::Tag(tags) => {
                    set.surviving.push(signal.id);
                    set.tagged += 1;
                    tags
                }
                NewsDecision::Drop(tags) => {
                    tracing::debug!(
                        signal_id = signal.id,
                        timestamp = %signal.timestamp,
                        events = tags.len(),
                        "signal dropped near news"
                    );
                    set.dropped += 1;
                    tags
                }
            };
            set.news_tags.push(tags);
            set.signals.push(signal);
        }
        tracing::debug!(
            generated = set.signals.len(),
            surviving = set.surviving.len(),
            "signals collected"
        );
        Ok(set)
    }
}

fn warn_unresolved(unresolved: usize, malformed: usize, total: usize) {
    if unresolved > 0 {
        tracing::warn!(
            unresolved,
            malformed,
            total,
            "some trades did not reach stop or target"
        );
    }
}

fn check_window(name: &str, window: Duration) -> Result<(), FxError> {
    if window < Duration::zero() {
        return Err(FxError::invalid_parameter(
            name,
            format!("must not be negative, got {} minutes", window.num_minutes()),
        ));
    }
    Ok(())
}
