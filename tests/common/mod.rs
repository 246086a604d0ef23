#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use fxgrid::domain::bar::{parse_timestamp, Bar};
use fxgrid::domain::bar_series::BarSeries;
use fxgrid::domain::engine::EngineConfig;
use fxgrid::domain::error::FxError;
use fxgrid::domain::news::{Impact, NewsEvent};
use fxgrid::domain::strategy::{Direction, ScheduledEntries};
use fxgrid::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub bars: HashMap<(String, String), Vec<Bar>>,
    pub news: Vec<NewsEvent>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
            news: Vec::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, pair: &str, timeframe: &str, bars: Vec<Bar>) -> Self {
        self.bars
            .insert((pair.to_string(), timeframe.to_string()), bars);
        self
    }

    pub fn with_news(mut self, events: Vec<NewsEvent>) -> Self {
        self.news.extend(events);
        self
    }

    pub fn with_error(mut self, pair: &str, reason: &str) -> Self {
        self.errors.insert(pair.to_string(), reason.to_string());
        self
    }

    fn check(&self, pair: &str) -> Result<(), FxError> {
        match self.errors.get(pair) {
            Some(reason) => Err(FxError::Database {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        pair: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FxError> {
        self.check(pair)?;
        Ok(self
            .bars
            .get(&(pair.to_string(), timeframe.to_string()))
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= start && b.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fetch_news(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NewsEvent>, FxError> {
        Ok(self
            .news
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect())
    }

    fn list_pairs(&self, timeframe: &str) -> Result<Vec<String>, FxError> {
        let mut pairs: Vec<String> = self
            .bars
            .keys()
            .filter(|(_, tf)| tf == timeframe)
            .map(|(pair, _)| pair.clone())
            .collect();
        pairs.sort();
        Ok(pairs)
    }

    fn get_data_range(
        &self,
        pair: &str,
        timeframe: &str,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>, usize)>, FxError> {
        self.check(pair)?;
        match self.bars.get(&(pair.to_string(), timeframe.to_string())) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.timestamp).min().unwrap();
                let max = bars.iter().map(|b| b.timestamp).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn ts(s: &str) -> DateTime<Utc> {
    parse_timestamp(s).unwrap()
}

pub fn bar(timestamp: &str, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        timestamp: ts(timestamp),
        open,
        high,
        low,
        close,
        volume: 100,
    }
}

/// Long at 1.1000 with a 50 pip stop and RR 2: the second bar touches
/// neither level and the third reaches the 1.1100 target while its low sits
/// exactly on the 1.0950 stop.
pub fn three_bars() -> Vec<Bar> {
    vec![
        bar("2024-01-01 10:00:00", 1.0990, 1.1005, 1.0985, 1.1000),
        bar("2024-01-01 11:00:00", 1.1000, 1.1050, 1.0980, 1.1030),
        bar("2024-01-01 12:00:00", 1.1030, 1.1100, 1.0950, 1.1080),
    ]
}

pub fn three_bar_series() -> BarSeries {
    BarSeries::new("EURUSD", "H1", three_bars())
}

/// Hourly bars drifting by `step` per bar with a 10 pip range around the close.
pub fn generate_bars(start: &str, count: usize, start_price: f64, step: f64) -> Vec<Bar> {
    let start = ts(start);
    (0..count)
        .map(|i| {
            let close = start_price + step * i as f64;
            let open = close - step;
            Bar {
                timestamp: start + Duration::hours(i as i64),
                open,
                high: open.max(close) + 0.0010,
                low: open.min(close) - 0.0010,
                close,
                volume: 1000,
            }
        })
        .collect()
}

pub fn news_event(timestamp: &str, impact: Impact, currency: &str) -> NewsEvent {
    NewsEvent {
        timestamp: ts(timestamp),
        impact,
        currency: currency.to_string(),
        title: format!("{} {} event", currency, impact),
    }
}

pub fn scheduled(entries: &[(&str, Direction)]) -> ScheduledEntries {
    ScheduledEntries::new(entries.iter().map(|(t, d)| (ts(t), *d)))
}

pub fn single_cell_config(stop_loss: f64, risk_reward: f64) -> EngineConfig {
    EngineConfig {
        stop_loss_values: vec![stop_loss],
        risk_reward_values: vec![risk_reward],
        pip_size: 0.0001,
        ..EngineConfig::default()
    }
}
