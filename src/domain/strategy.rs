//! Entry strategies.
//!
//! A strategy looks at a bar history whose last element is the candidate
//! signal bar and decides whether to enter, and in which direction.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::domain::bar::Bar;
use crate::domain::error::FxError;
use crate::domain::rule::Rule;
use crate::domain::rule_eval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" | "buy" => Ok(Direction::Long),
            "short" | "sell" => Ok(Direction::Short),
            other => Err(format!("unknown position '{}'", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Free-text context logged alongside a manual entry: the higher-timeframe
/// trend reads and the entry pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EntryAnnotations {
    pub h4: Option<String>,
    pub h1: Option<String>,
    pub m15: Option<String>,
    pub entry_point: Option<String>,
}

impl EntryAnnotations {
    pub const KEYS: [&'static str; 4] = ["h4", "h1", "m15", "entry_point"];

    /// Present annotations as `(key, value)`, in [`Self::KEYS`] order.
    pub fn labels(&self) -> impl Iterator<Item = (&'static str, &str)> {
        Self::KEYS
            .into_iter()
            .zip([&self.h4, &self.h1, &self.m15, &self.entry_point])
            .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
    }

    /// Value for one of [`Self::KEYS`].
    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.labels().next().is_none()
    }
}

pub trait StrategyRule: Send + Sync {
    /// Decide on an entry at `history.last()`. Must not depend on anything
    /// outside `history`.
    fn evaluate(&self, history: &[Bar]) -> Option<Direction>;

    /// Context attached to an entry fired on `bar`.
    fn annotations(&self, _bar: &Bar) -> EntryAnnotations {
        EntryAnnotations::default()
    }

    /// Trailing bars, signal bar included, required before `evaluate` is
    /// meaningful.
    fn min_history(&self) -> usize {
        1
    }

    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Strategy built from entry rules in the rule DSL.
#[derive(Debug, Clone)]
pub struct RuleStrategy {
    pub name: String,
    pub entry_long: Option<Rule>,
    pub entry_short: Option<Rule>,
}

impl RuleStrategy {
    pub fn new(
        name: &str,
        entry_long: Option<Rule>,
        entry_short: Option<Rule>,
    ) -> Result<Self, FxError> {
        if entry_long.is_none() && entry_short.is_none() {
            return Err(FxError::RuleInvalid {
                reason: format!("strategy '{}' has neither entry_long nor entry_short", name),
            });
        }
        Ok(Self {
            name: name.to_string(),
            entry_long,
            entry_short,
        })
    }
}

impl StrategyRule for RuleStrategy {
    fn evaluate(&self, history: &[Bar]) -> Option<Direction> {
        let index = history.len().checked_sub(1)?;
        let fires = |rule: &Option<Rule>| {
            rule.as_ref()
                .is_some_and(|r| rule_eval::evaluate(r, history, index))
        };
        match (fires(&self.entry_long), fires(&self.entry_short)) {
            (true, false) => Some(Direction::Long),
            (false, true) => Some(Direction::Short),
            // conflicting entries cancel out
            _ => None,
        }
    }

    fn min_history(&self) -> usize {
        [&self.entry_long, &self.entry_short]
            .into_iter()
            .flatten()
            .map(Rule::min_history)
            .max()
            .unwrap_or(1)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Replays a fixed list of manually logged entries. An entry fires on the
/// bar stamped exactly at its timestamp.
#[derive(Debug, Clone, Default)]
pub struct ScheduledEntries {
    entries: BTreeMap<DateTime<Utc>, (Direction, EntryAnnotations)>,
}

impl ScheduledEntries {
    /// Later duplicates of a timestamp are ignored.
    pub fn new(entries: impl IntoIterator<Item = (DateTime<Utc>, Direction)>) -> Self {
        Self::annotated(
            entries
                .into_iter()
                .map(|(ts, direction)| (ts, direction, EntryAnnotations::default())),
        )
    }

    pub fn annotated(
        entries: impl IntoIterator<Item = (DateTime<Utc>, Direction, EntryAnnotations)>,
    ) -> Self {
        let mut map = BTreeMap::new();
        for (ts, direction, annotations) in entries {
            map.entry(ts).or_insert((direction, annotations));
        }
        Self { entries: map }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StrategyRule for ScheduledEntries {
    fn evaluate(&self, history: &[Bar]) -> Option<Direction> {
        let bar = history.last()?;
        self.entries.get(&bar.timestamp).map(|(direction, _)| *direction)
    }

    fn annotations(&self, bar: &Bar) -> EntryAnnotations {
        self.entries
            .get(&bar.timestamp)
            .map(|(_, annotations)| annotations.clone())
            .unwrap_or_default()
    }

    fn name(&self) -> &str {
        "scheduled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::closes;
    use crate::domain::rule_parser::parse;

    fn rule_strategy(long: Option<&str>, short: Option<&str>) -> RuleStrategy {
        RuleStrategy::new(
            "test",
            long.map(|s| parse(s).unwrap()),
            short.map(|s| parse(s).unwrap()),
        )
        .unwrap()
    }

    #[test]
    fn direction_parse() {
        assert_eq!("Buy".parse::<Direction>().unwrap(), Direction::Long);
        assert_eq!("sell".parse::<Direction>().unwrap(), Direction::Short);
        assert_eq!("LONG".parse::<Direction>().unwrap(), Direction::Long);
        assert!("hold".parse::<Direction>().is_err());
    }

    #[test]
    fn rule_strategy_requires_a_rule() {
        let err = RuleStrategy::new("empty", None, None).unwrap_err();
        assert!(matches!(err, FxError::RuleInvalid { .. }));
    }

    #[test]
    fn long_only() {
        let s = rule_strategy(Some("ABOVE(close, 1.1)"), None);
        assert_eq!(s.evaluate(&closes(&[1.2])), Some(Direction::Long));
        assert_eq!(s.evaluate(&closes(&[1.0])), None);
    }

    #[test]
    fn short_only() {
        let s = rule_strategy(None, Some("BELOW(close, 1.1)"));
        assert_eq!(s.evaluate(&closes(&[1.0])), Some(Direction::Short));
    }

    #[test]
    fn conflicting_entries_emit_nothing() {
        let s = rule_strategy(Some("ABOVE(close, 1.0)"), Some("BELOW(close, 2.0)"));
        assert_eq!(s.evaluate(&closes(&[1.5])), None);
    }

    #[test]
    fn evaluates_last_bar_of_history() {
        let s = rule_strategy(Some("CROSS_ABOVE(close, SMA(2))"), None);
        let bars = closes(&[1.0, 1.0, 2.0]);
        assert_eq!(s.evaluate(&bars), Some(Direction::Long));
        assert_eq!(s.evaluate(&bars[..2]), None);
    }

    #[test]
    fn min_history_takes_larger_rule() {
        let s = rule_strategy(Some("ABOVE(close, SMA(20))"), Some("CROSS_BELOW(close, LOWEST(10))"));
        assert_eq!(s.min_history(), 20.max(12));
    }

    #[test]
    fn empty_history_is_none() {
        let s = rule_strategy(Some("ABOVE(close, 0)"), None);
        assert_eq!(s.evaluate(&[]), None);
    }

    #[test]
    fn scheduled_entries_fire_on_exact_bar() {
        let bars = closes(&[1.0, 1.1, 1.2]);
        let entries = ScheduledEntries::new(vec![
            (bars[1].timestamp, Direction::Short),
            (bars[1].timestamp, Direction::Long),
        ]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.evaluate(&bars[..1]), None);
        assert_eq!(entries.evaluate(&bars[..2]), Some(Direction::Short));
        assert_eq!(entries.min_history(), 1);
    }

    #[test]
    fn scheduled_entries_carry_annotations() {
        let bars = closes(&[1.0, 1.1]);
        let annotations = EntryAnnotations {
            h4: Some("Bullish".into()),
            entry_point: Some("Retest".into()),
            ..EntryAnnotations::default()
        };
        let entries = ScheduledEntries::annotated([(
            bars[1].timestamp,
            Direction::Long,
            annotations.clone(),
        )]);
        assert_eq!(entries.annotations(&bars[1]), annotations);
        assert!(entries.annotations(&bars[0]).is_empty());

        let labels: Vec<_> = annotations.labels().collect();
        assert_eq!(labels, vec![("h4", "Bullish"), ("entry_point", "Retest")]);
        assert_eq!(annotations.get("entry_point"), Some("Retest"));
        assert_eq!(annotations.get("m15"), None);
    }

    #[test]
    fn rule_strategy_has_no_annotations() {
        let s = rule_strategy(Some("ABOVE(close, 0)"), None);
        assert!(s.annotations(&closes(&[1.0])[0]).is_empty());
    }
}
