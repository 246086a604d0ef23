//! Signal generation over a bar series.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::domain::bar_series::BarSeries;
use crate::domain::strategy::{Direction, EntryAnnotations, StrategyRule};

/// Which price a signal enters at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryFillPolicy {
    /// Enter at the close of the signal bar.
    #[default]
    CloseOfSignalBar,
    /// Enter at the open of the bar after the signal bar.
    NextBarOpen,
}

impl FromStr for EntryFillPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "close" | "signal_close" => Ok(EntryFillPolicy::CloseOfSignalBar),
            "next_open" | "open" => Ok(EntryFillPolicy::NextBarOpen),
            other => Err(format!(
                "unknown entry fill '{}' (expected close or next_open)",
                other
            )),
        }
    }
}

impl fmt::Display for EntryFillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryFillPolicy::CloseOfSignalBar => write!(f, "close"),
            EntryFillPolicy::NextBarOpen => write!(f, "next_open"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub id: usize,
    /// Index of the bar the strategy fired on.
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// Index of the bar the entry fills on; trades resolve strictly after it.
    pub entry_index: usize,
    pub reference_price: f64,
    pub annotations: EntryAnnotations,
}

/// Lazy single pass over a series, yielding one signal per firing bar.
///
/// Ids are assigned in emission order starting at 0.
pub struct SignalGenerator<'a> {
    series: &'a BarSeries,
    strategy: &'a dyn StrategyRule,
    policy: EntryFillPolicy,
    cursor: usize,
    next_id: usize,
}

impl<'a> SignalGenerator<'a> {
    pub fn new(
        series: &'a BarSeries,
        strategy: &'a dyn StrategyRule,
        policy: EntryFillPolicy,
    ) -> Self {
        let min_history = strategy.min_history().max(1);
        Self {
            series,
            strategy,
            policy,
            cursor: min_history - 1,
            next_id: 0,
        }
    }
}

impl Iterator for SignalGenerator<'_> {
    type Item = Signal;

    fn next(&mut self) -> Option<Signal> {
        let bars = self.series.bars();
        while self.cursor < bars.len() {
            let index = self.cursor;
            self.cursor += 1;

            let Some(direction) = self.strategy.evaluate(&bars[..=index]) else {
                continue;
            };
            let (entry_index, reference_price) = match self.policy {
                EntryFillPolicy::CloseOfSignalBar => (index, bars[index].close),
                EntryFillPolicy::NextBarOpen => match bars.get(index + 1) {
                    Some(next) => (index + 1, next.open),
                    None => {
                        tracing::debug!(index, "signal on final bar has no next open");
                        continue;
                    }
                },
            };

            let signal = Signal {
                id: self.next_id,
                bar_index: index,
                timestamp: bars[index].timestamp,
                direction,
                entry_index,
                reference_price,
                annotations: self.strategy.annotations(&bars[index]),
            };
            self.next_id += 1;
            return Some(signal);
        }
        None
    }
}
