//! Outcome aggregation into per-configuration metrics.
//!
//! Accumulators hold integer counts and sums, plus a list of resolved trades
//! per grid cell for the equity model. Recording and merging are associative
//! and commutative: the trade lists are sorted by entry time before the
//! equity curve is replayed, so any partition of the trades into workers,
//! merged in any order, produces the same table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::domain::grid::{Grid, ParameterSet};
use crate::domain::session::Session;
use crate::domain::simulator::{Outcome, SimulatedTrade, UnresolvedReason};
use crate::domain::strategy::{Direction, EntryAnnotations};

/// Account size the equity model starts from.
pub const STARTING_BALANCE: f64 = 100.0;
/// Units risked per trade: a loss costs this, a win pays it times the risk-reward.
pub const RISK_PER_TRADE: f64 = 2.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub unresolved: usize,
    pub malformed: usize,
    /// Sum of `bars_to_resolution` over resolved trades.
    pub resolved_bars: u64,
    /// Sum of entry-to-exit seconds over resolved trades.
    pub resolved_seconds: i64,
}

impl OutcomeCounts {
    pub fn record(&mut self, trade: &SimulatedTrade) {
        self.trades += 1;
        match trade.outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Unresolved(reason) => {
                self.unresolved += 1;
                if reason == UnresolvedReason::MalformedBar {
                    self.malformed += 1;
                }
            }
        }
        if trade.outcome.is_resolved() {
            self.resolved_bars += trade.bars_to_resolution as u64;
            self.resolved_seconds += (trade.exit_timestamp - trade.entry_timestamp).num_seconds();
        }
    }

    pub fn merge(&mut self, other: &OutcomeCounts) {
        self.trades += other.trades;
        self.wins += other.wins;
        self.losses += other.losses;
        self.unresolved += other.unresolved;
        self.malformed += other.malformed;
        self.resolved_bars += other.resolved_bars;
        self.resolved_seconds += other.resolved_seconds;
    }

    pub fn resolved(&self) -> usize {
        self.wins + self.losses
    }

    /// wins / (wins + losses), or 0.0 with nothing resolved.
    pub fn win_rate(&self) -> f64 {
        ratio(self.wins as f64, self.resolved())
    }
}

fn ratio(numerator: f64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResolvedTrade {
    entry: DateTime<Utc>,
    signal_id: usize,
    exit: DateTime<Utc>,
    win: bool,
}

impl ResolvedTrade {
    fn from_trade(trade: &SimulatedTrade) -> Option<Self> {
        let win = match trade.outcome {
            Outcome::Win => true,
            Outcome::Loss => false,
            Outcome::Unresolved(_) => return None,
        };
        Some(Self {
            entry: trade.entry_timestamp,
            signal_id: trade.signal_id,
            exit: trade.exit_timestamp,
            win,
        })
    }
}

/// Balance after one resolved trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub signal_id: usize,
    /// Exit time of the trade.
    pub timestamp: DateTime<Utc>,
    pub win: bool,
    pub balance: f64,
    /// Percent below the running peak.
    pub drawdown_pct: f64,
}

/// Fixed-risk equity replay of one grid cell, trades taken in entry order.
#[derive(Debug, Clone, PartialEq)]
pub struct EquitySummary {
    pub final_balance: f64,
    pub peak_balance: f64,
    pub max_drawdown_pct: f64,
    /// Entry time of the first trade in the deepest drawdown.
    pub max_drawdown_start: Option<DateTime<Utc>>,
    /// Exit time of the trade at the bottom of the deepest drawdown.
    pub max_drawdown_end: Option<DateTime<Utc>>,
    pub curve: Vec<EquityPoint>,
}

impl Default for EquitySummary {
    fn default() -> Self {
        Self {
            final_balance: STARTING_BALANCE,
            peak_balance: STARTING_BALANCE,
            max_drawdown_pct: 0.0,
            max_drawdown_start: None,
            max_drawdown_end: None,
            curve: Vec::new(),
        }
    }
}

impl EquitySummary {
    fn replay(mut trades: Vec<ResolvedTrade>, risk_reward: f64) -> Self {
        trades.sort_by_key(|t| (t.entry, t.signal_id));

        let mut summary = Self {
            curve: Vec::with_capacity(trades.len()),
            ..Self::default()
        };
        let mut balance = STARTING_BALANCE;
        let mut peak = STARTING_BALANCE;
        let mut run_start = None;

        for trade in &trades {
            balance += if trade.win {
                RISK_PER_TRADE * risk_reward
            } else {
                -RISK_PER_TRADE
            };
            if balance >= peak {
                peak = balance;
                run_start = None;
            }
            let drawdown_pct = (peak - balance) / peak * 100.0;
            if drawdown_pct > 0.0 {
                let start = *run_start.get_or_insert(trade.entry);
                if drawdown_pct > summary.max_drawdown_pct {
                    summary.max_drawdown_pct = drawdown_pct;
                    summary.max_drawdown_start = Some(start);
                    summary.max_drawdown_end = Some(trade.exit);
                }
            }
            summary.curve.push(EquityPoint {
                signal_id: trade.signal_id,
                timestamp: trade.exit,
                win: trade.win,
                balance,
                drawdown_pct,
            });
        }

        summary.final_balance = balance;
        summary.peak_balance = peak;
        summary
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    pub parameter_set: ParameterSet,
    pub trade_count: usize,
    pub win_count: usize,
    pub loss_count: usize,
    pub unresolved_count: usize,
    pub malformed_count: usize,
    pub win_rate: f64,
    /// Mean R multiple of resolved trades (win = +rr, loss = -1).
    pub expectancy_r: f64,
    pub avg_bars_to_resolution: f64,
    pub avg_duration_hours: f64,
    pub equity: EquitySummary,
}

impl MetricsRow {
    fn from_counts(parameter_set: ParameterSet, c: &OutcomeCounts, equity: EquitySummary) -> Self {
        let resolved = c.resolved();
        let r_total = c.wins as f64 * parameter_set.risk_reward - c.losses as f64;
        Self {
            parameter_set,
            trade_count: c.trades,
            win_count: c.wins,
            loss_count: c.losses,
            unresolved_count: c.unresolved,
            malformed_count: c.malformed,
            win_rate: c.win_rate(),
            expectancy_r: ratio(r_total, resolved),
            avg_bars_to_resolution: ratio(c.resolved_bars as f64, resolved),
            avg_duration_hours: ratio(c.resolved_seconds as f64 / 3600.0, resolved),
            equity,
        }
    }
}

/// Outcome counts for one slice of all trades (a session, a direction or an
/// entry annotation value).
#[derive(Debug, Clone, PartialEq)]
pub struct BreakdownRow {
    pub label: String,
    pub trade_count: usize,
    pub win_count: usize,
    pub loss_count: usize,
    pub unresolved_count: usize,
    pub win_rate: f64,
}

impl BreakdownRow {
    fn from_counts(label: String, c: &OutcomeCounts) -> Self {
        Self {
            label,
            trade_count: c.trades,
            win_count: c.wins,
            loss_count: c.losses,
            unresolved_count: c.unresolved,
            win_rate: c.win_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricsTable {
    /// One row per grid cell, ordered by parameter set id.
    pub rows: Vec<MetricsRow>,
    pub by_session: Vec<BreakdownRow>,
    pub by_direction: Vec<BreakdownRow>,
    /// Breakdowns keyed by annotation name (`h4`, `entry_point`, ...), only for
    /// annotations that appeared on at least one entry.
    pub by_annotation: BTreeMap<String, Vec<BreakdownRow>>,
}

impl MetricsTable {
    pub fn total_trades(&self) -> usize {
        self.rows.iter().map(|r| r.trade_count).sum()
    }

    pub fn total_unresolved(&self) -> usize {
        self.rows.iter().map(|r| r.unresolved_count).sum()
    }

    /// Row with the smallest maximum drawdown among rows with resolved trades.
    pub fn shallowest_drawdown(&self) -> Option<&MetricsRow> {
        self.rows
            .iter()
            .filter(|r| r.win_count + r.loss_count > 0)
            .fold(None, |best: Option<&MetricsRow>, row| match best {
                Some(b) if b.equity.max_drawdown_pct <= row.equity.max_drawdown_pct => Some(b),
                _ => Some(row),
            })
    }

    /// Row with the highest win rate; ties go to the lower parameter set id.
    pub fn best_by_win_rate(&self) -> Option<&MetricsRow> {
        self.rows
            .iter()
            .filter(|r| r.win_count + r.loss_count > 0)
            .fold(None, |best: Option<&MetricsRow>, row| match best {
                Some(b) if b.win_rate >= row.win_rate => Some(b),
                _ => Some(row),
            })
    }
}

#[derive(Debug, Clone)]
pub struct Aggregator<'a> {
    grid: &'a Grid,
    per_set: Vec<OutcomeCounts>,
    resolved: Vec<Vec<ResolvedTrade>>,
    sessions: [OutcomeCounts; 3],
    directions: [OutcomeCounts; 2],
    annotations: BTreeMap<(&'static str, String), OutcomeCounts>,
}

impl<'a> Aggregator<'a> {
    pub fn new(grid: &'a Grid) -> Self {
        Self {
            grid,
            per_set: vec![OutcomeCounts::default(); grid.len()],
            resolved: vec![Vec::new(); grid.len()],
            sessions: Default::default(),
            directions: Default::default(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, trade: &SimulatedTrade) {
        let id = trade.parameter_set_id;
        if let Some(counts) = self.per_set.get_mut(id) {
            counts.record(trade);
            if let (Some(list), Some(resolved)) =
                (self.resolved.get_mut(id), ResolvedTrade::from_trade(trade))
            {
                list.push(resolved);
            }
        }
        self.sessions[trade.session.index()].record(trade);
        self.directions[direction_index(trade.direction)].record(trade);
    }

    /// [`Aggregator::record`] plus the entry's annotation breakdowns.
    pub fn record_annotated(&mut self, trade: &SimulatedTrade, annotations: &EntryAnnotations) {
        self.record(trade);
        for (key, value) in annotations.labels() {
            self.annotations
                .entry((key, value.to_string()))
                .or_default()
                .record(trade);
        }
    }

    pub fn merge(mut self, other: Aggregator<'_>) -> Self {
        for (mine, theirs) in self.per_set.iter_mut().zip(&other.per_set) {
            mine.merge(theirs);
        }
        for (mine, theirs) in self.resolved.iter_mut().zip(other.resolved) {
            mine.extend(theirs);
        }
        for (mine, theirs) in self.sessions.iter_mut().zip(&other.sessions) {
            mine.merge(theirs);
        }
        for (mine, theirs) in self.directions.iter_mut().zip(&other.directions) {
            mine.merge(theirs);
        }
        for (key, theirs) in other.annotations {
            self.annotations.entry(key).or_default().merge(&theirs);
        }
        self
    }

    pub fn counts(&self, parameter_set_id: usize) -> Option<&OutcomeCounts> {
        self.per_set.get(parameter_set_id)
    }

    pub fn finish(self) -> MetricsTable {
        let rows = self
            .grid
            .sets()
            .iter()
            .zip(&self.per_set)
            .zip(self.resolved)
            .map(|((set, counts), resolved)| {
                let equity = EquitySummary::replay(resolved, set.risk_reward);
                MetricsRow::from_counts(*set, counts, equity)
            })
            .collect();
        let by_session = Session::ALL
            .iter()
            .map(|s| BreakdownRow::from_counts(s.to_string(), &self.sessions[s.index()]))
            .collect();
        let by_direction = [Direction::Long, Direction::Short]
            .iter()
            .map(|d| BreakdownRow::from_counts(d.to_string(), &self.directions[direction_index(*d)]))
            .collect();

        let mut by_annotation: BTreeMap<String, Vec<BreakdownRow>> = BTreeMap::new();
        for ((key, label), counts) in self.annotations {
            by_annotation
                .entry(key.to_string())
                .or_default()
                .push(BreakdownRow::from_counts(label, &counts));
        }

        MetricsTable {
            rows,
            by_session,
            by_direction,
            by_annotation,
        }
    }
}

fn direction_index(direction: Direction) -> usize {
    match direction {
        Direction::Long => 0,
        Direction::Short => 1,
    }
}
