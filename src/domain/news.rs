//! Economic news events and a sorted index over them.
//!
//! Window queries locate both ends with `partition_point`, so each lookup is
//! O(log n + k) for k matching events.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl FromStr for Impact {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "l" => Ok(Impact::Low),
            "medium" | "med" | "m" => Ok(Impact::Medium),
            "high" | "h" => Ok(Impact::High),
            other => Err(format!("unknown impact level '{}'", other)),
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impact::Low => write!(f, "Low"),
            Impact::Medium => write!(f, "Medium"),
            Impact::High => write!(f, "High"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsEvent {
    pub timestamp: DateTime<Utc>,
    pub impact: Impact,
    /// Currency the release concerns, e.g. `USD`.
    pub currency: String,
    pub title: String,
}

impl NewsEvent {
    /// A currency tag is relevant to a pair when the pair code contains it.
    pub fn affects_pair(&self, pair: &str) -> bool {
        let currency = self.currency.trim().to_uppercase();
        !currency.is_empty() && pair.to_uppercase().contains(&currency)
    }
}

/// Filter for [`NewsIndex::query`]. Bounds are inclusive.
#[derive(Debug, Clone)]
pub struct NewsQuery<'a> {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub min_impact: Option<Impact>,
    pub pair: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct NewsIndex {
    events: Vec<NewsEvent>,
}

impl NewsIndex {
    pub fn new(mut events: Vec<NewsEvent>) -> Self {
        events.sort_by_key(|e| e.timestamp);
        Self { events }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[NewsEvent] {
        &self.events
    }

    /// Events inside the window, ordered by timestamp.
    pub fn query(&self, query: &NewsQuery<'_>) -> Vec<&NewsEvent> {
        if query.end < query.start {
            return Vec::new();
        }
        let lo = self.events.partition_point(|e| e.timestamp < query.start);
        let hi = self.events.partition_point(|e| e.timestamp <= query.end);
        self.events[lo..hi]
            .iter()
            .filter(|e| query.min_impact.is_none_or(|min| e.impact >= min))
            .filter(|e| query.pair.is_none_or(|p| e.affects_pair(p)))
            .collect()
    }
}
