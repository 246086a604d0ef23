//! Validated, time-ordered bar series for one pair.
//!
//! The series is gap tolerant: missing bars are simply absent. Ordering and
//! uniqueness of timestamps are enforced on construction; malformed OHLC bars
//! are kept so the simulator can contain them per trade.

use chrono::{DateTime, Utc};

use crate::domain::bar::{format_timestamp, Bar};
use crate::domain::error::FxError;
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone)]
pub struct BarSeries {
    pair: String,
    timeframe: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Build a series, sorting by timestamp and dropping duplicate timestamps
    /// (the first occurrence wins).
    pub fn new(pair: &str, timeframe: &str, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        let before = bars.len();
        bars.dedup_by_key(|b| b.timestamp);
        let dropped = before - bars.len();
        if dropped > 0 {
            tracing::warn!(pair, timeframe, dropped, "dropped bars with duplicate timestamps");
        }
        Self {
            pair: pair.to_string(),
            timeframe: timeframe.to_string(),
            bars,
        }
    }

    /// Fetch `[start, end]` through the data port.
    ///
    /// Fails with [`FxError::DataGap`] when the range holds no bars.
    pub fn load(
        port: &dyn DataPort,
        pair: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, FxError> {
        let bars = port.fetch_bars(pair, timeframe, start, end)?;
        if bars.is_empty() {
            return Err(FxError::DataGap {
                pair: pair.to_string(),
                timeframe: timeframe.to_string(),
                start: format_timestamp(&start),
                end: format_timestamp(&end),
            });
        }
        let series = Self::new(pair, timeframe, bars);
        tracing::info!(
            pair,
            timeframe,
            bars = series.len(),
            "loaded bar series"
        );
        Ok(series)
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Index of the last bar with `timestamp <= ts`.
    pub fn index_at_or_before(&self, ts: DateTime<Utc>) -> Option<usize> {
        let after = self.bars.partition_point(|b| b.timestamp <= ts);
        after.checked_sub(1)
    }

    /// Index of the bar stamped exactly `ts`.
    pub fn index_of(&self, ts: DateTime<Utc>) -> Option<usize> {
        self.bars.binary_search_by_key(&ts, |b| b.timestamp).ok()
    }

    /// A copy holding only the first `len` bars.
    pub fn truncated(&self, len: usize) -> Self {
        Self {
            pair: self.pair.clone(),
            timeframe: self.timeframe.clone(),
            bars: self.bars[..len.min(self.bars.len())].to_vec(),
        }
    }
}
