//! News proximity filter for signals.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::domain::news::{Impact, NewsIndex, NewsQuery};
use crate::domain::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NewsMode {
    #[default]
    Off,
    /// Drop signals near qualifying news.
    Exclude,
    /// Keep signals but attach the nearby events.
    Tag,
}

impl FromStr for NewsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(NewsMode::Off),
            "exclude" => Ok(NewsMode::Exclude),
            "tag" => Ok(NewsMode::Tag),
            other => Err(format!(
                "unknown news mode '{}' (expected off, exclude or tag)",
                other
            )),
        }
    }
}

impl fmt::Display for NewsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewsMode::Off => write!(f, "off"),
            NewsMode::Exclude => write!(f, "exclude"),
            NewsMode::Tag => write!(f, "tag"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsFilterConfig {
    pub mode: NewsMode,
    pub window_before: Duration,
    pub window_after: Duration,
    pub impact_threshold: Impact,
    /// Only consider events whose currency appears in the traded pair.
    pub pair_relevant_only: bool,
}

impl Default for NewsFilterConfig {
    fn default() -> Self {
        Self {
            mode: NewsMode::Off,
            window_before: Duration::hours(6),
            window_after: Duration::hours(6),
            impact_threshold: Impact::High,
            pair_relevant_only: true,
        }
    }
}

/// A qualifying event near a signal.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsTag {
    pub timestamp: DateTime<Utc>,
    pub impact: Impact,
    pub currency: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewsDecision {
    Pass,
    Tag(Vec<NewsTag>),
    Drop(Vec<NewsTag>),
}

pub struct NewsFilter<'a> {
    config: &'a NewsFilterConfig,
    index: &'a NewsIndex,
    pair: &'a str,
}

impl<'a> NewsFilter<'a> {
    pub fn new(config: &'a NewsFilterConfig, index: &'a NewsIndex, pair: &'a str) -> Self {
        Self {
            config,
            index,
            pair,
        }
    }

    pub fn evaluate(&self, signal: &Signal) -> NewsDecision {
        if self.config.mode == NewsMode::Off {
            return NewsDecision::Pass;
        }
        let query = NewsQuery {
            start: signal.timestamp - self.config.window_before,
            end: signal.timestamp + self.config.window_after,
            min_impact: Some(self.config.impact_threshold),
            pair: self.config.pair_relevant_only.then_some(self.pair),
        };
        let tags: Vec<NewsTag> = self
            .index
            .query(&query)
            .into_iter()
            .map(|e| NewsTag {
                timestamp: e.timestamp,
                impact: e.impact,
                currency: e.currency.clone(),
                title: e.title.clone(),
            })
            .collect();

        if tags.is_empty() {
            return NewsDecision::Pass;
        }
        match self.config.mode {
            NewsMode::Exclude => NewsDecision::Drop(tags),
            NewsMode::Tag => NewsDecision::Tag(tags),
            NewsMode::Off => NewsDecision::Pass,
        }
    }
}
