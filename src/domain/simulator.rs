//! Trade resolution for one (signal, parameter set) pair.
//!
//! A trade only ever reads bars strictly after its entry bar when deciding
//! the outcome. The entry bar itself is inspected for well-formedness only.
//!
//! Prices are compared with a tolerance of a millionth of a pip. A target
//! counts as hit when price reaches it; a stop counts as hit only when price
//! trades through it, so a low sitting exactly on the stop level does not
//! stop a long out.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::domain::bar::Bar;
use crate::domain::grid::{Grid, ParameterSet};
use crate::domain::session::Session;
use crate::domain::signal::Signal;
use crate::domain::strategy::Direction;

/// Float noise allowed when comparing bar prices to stop and target, in pips.
const PRICE_TOLERANCE_PIPS: f64 = 1e-6;

/// Outcome when one bar touches both stop and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreakPolicy {
    #[default]
    StopFirst,
    TargetFirst,
}

impl FromStr for TieBreakPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stop_first" | "stop" => Ok(TieBreakPolicy::StopFirst),
            "target_first" | "target" => Ok(TieBreakPolicy::TargetFirst),
            other => Err(format!(
                "unknown tie break '{}' (expected stop_first or target_first)",
                other
            )),
        }
    }
}

impl fmt::Display for TieBreakPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreakPolicy::StopFirst => write!(f, "stop_first"),
            TieBreakPolicy::TargetFirst => write!(f, "target_first"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnresolvedReason {
    EndOfData,
    MalformedBar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Win,
    Loss,
    Unresolved(UnresolvedReason),
}

impl Outcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Outcome::Win | Outcome::Loss)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => write!(f, "win"),
            Outcome::Loss => write!(f, "loss"),
            Outcome::Unresolved(UnresolvedReason::EndOfData) => write!(f, "unresolved_end_of_data"),
            Outcome::Unresolved(UnresolvedReason::MalformedBar) => {
                write!(f, "unresolved_malformed_bar")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedTrade {
    pub signal_id: usize,
    pub parameter_set_id: usize,
    pub direction: Direction,
    pub entry_timestamp: DateTime<Utc>,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub outcome: Outcome,
    pub exit_timestamp: DateTime<Utc>,
    /// Bars scanned after the entry bar, resolution bar included.
    pub bars_to_resolution: usize,
    pub session: Session,
}

impl SimulatedTrade {
    pub fn duration_hours(&self) -> f64 {
        (self.exit_timestamp - self.entry_timestamp).num_seconds() as f64 / 3600.0
    }
}

pub struct Simulator<'a> {
    bars: &'a [Bar],
    grid: &'a Grid,
    tie_break: TieBreakPolicy,
    session_offset_hours: i64,
}

impl<'a> Simulator<'a> {
    pub fn new(
        bars: &'a [Bar],
        grid: &'a Grid,
        tie_break: TieBreakPolicy,
        session_offset_hours: i64,
    ) -> Self {
        Self {
            bars,
            grid,
            tie_break,
            session_offset_hours,
        }
    }

    pub fn simulate(&self, signal: &Signal, set: &ParameterSet) -> SimulatedTrade {
        let entry_bar = &self.bars[signal.entry_index];
        let entry_price = signal.reference_price;
        let distance = self.grid.stop_distance(set);
        let sign = signal.direction.sign();
        let stop_price = entry_price - sign * distance;
        let target_price = entry_price + sign * distance * set.risk_reward;
        let tolerance = self.grid.pip_size() * PRICE_TOLERANCE_PIPS;

        let mut trade = SimulatedTrade {
            signal_id: signal.id,
            parameter_set_id: set.id,
            direction: signal.direction,
            entry_timestamp: entry_bar.timestamp,
            entry_price,
            stop_price,
            target_price,
            outcome: Outcome::Unresolved(UnresolvedReason::MalformedBar),
            exit_timestamp: entry_bar.timestamp,
            bars_to_resolution: 0,
            session: Session::classify(entry_bar.timestamp, self.session_offset_hours),
        };

        if !entry_bar.is_well_formed() || !entry_price.is_finite() {
            return trade;
        }

        for (offset, bar) in self.bars[signal.entry_index + 1..].iter().enumerate() {
            trade.exit_timestamp = bar.timestamp;
            trade.bars_to_resolution = offset + 1;

            if !bar.is_well_formed() {
                trade.outcome = Outcome::Unresolved(UnresolvedReason::MalformedBar);
                return trade;
            }
            let (target_hit, stop_hit) = match signal.direction {
                Direction::Long => (
                    bar.high >= target_price - tolerance,
                    bar.low < stop_price - tolerance,
                ),
                Direction::Short => (
                    bar.low <= target_price + tolerance,
                    bar.high > stop_price + tolerance,
                ),
            };
            let outcome = match (target_hit, stop_hit) {
                (true, true) => match self.tie_break {
                    TieBreakPolicy::StopFirst => Outcome::Loss,
                    TieBreakPolicy::TargetFirst => Outcome::Win,
                },
                (true, false) => Outcome::Win,
                (false, true) => Outcome::Loss,
                (false, false) => continue,
            };
            trade.outcome = outcome;
            return trade;
        }

        trade.outcome = Outcome::Unresolved(UnresolvedReason::EndOfData);
        trade
    }
}
