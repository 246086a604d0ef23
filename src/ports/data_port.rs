//! Data access port trait.
//!
//! Ingestion and storage live behind this trait; the engine only ever sees
//! already-parsed bars and news events.

use crate::domain::bar::Bar;
use crate::domain::error::FxError;
use crate::domain::news::NewsEvent;
use chrono::{DateTime, Utc};

pub trait DataPort {
    /// Bars for `pair` on `timeframe` with `start <= timestamp <= end`.
    fn fetch_bars(
        &self,
        pair: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FxError>;

    /// News events with `start <= timestamp <= end`.
    fn fetch_news(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NewsEvent>, FxError>;

    fn list_pairs(&self, timeframe: &str) -> Result<Vec<String>, FxError>;

    fn get_data_range(
        &self,
        pair: &str,
        timeframe: &str,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>, usize)>, FxError>;
}
