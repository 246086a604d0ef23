//! CSV file data adapter.
//!
//! Layout under the base directory:
//! - `<PAIR>_<TIMEFRAME>.csv` with header `time,open,high,low,close,volume`
//! - `news.csv` with header `time,impact,currency,news`, where `time` is a
//!   datetime string or Unix seconds

use crate::domain::bar::{parse_timestamp, Bar};
use crate::domain::error::FxError;
use crate::domain::news::{Impact, NewsEvent};
use crate::domain::strategy::{Direction, EntryAnnotations, ScheduledEntries};
use crate::ports::data_port::DataPort;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

pub const NEWS_FILE: &str = "news.csv";

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, pair: &str, timeframe: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", pair, timeframe))
    }

    fn read_all_bars(&self, pair: &str, timeframe: &str) -> Result<Vec<Bar>, FxError> {
        let path = self.csv_path(pair, timeframe);
        let content = read_file(&path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| FxError::Database {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            let row = Row::new(&record, &path, line + 2);

            let timestamp = row.timestamp(0)?;
            bars.push(Bar {
                timestamp,
                open: row.number(1, "open")?,
                high: row.number(2, "high")?,
                low: row.number(3, "low")?,
                close: row.number(4, "close")?,
                volume: row.volume(5)?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }

    /// Manually logged entries from a `time,position` CSV. Optional `H4`,
    /// `H1`, `M15` and `EntryPoint` columns, found by header name, become the
    /// entry's annotations.
    pub fn read_entries(path: &Path) -> Result<ScheduledEntries, FxError> {
        let content = read_file(path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| FxError::Database {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?
            .clone();
        let column = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.contains(&h.trim().to_lowercase().as_str()))
        };
        let h4 = column(&["h4"]);
        let h1 = column(&["h1"]);
        let m15 = column(&["m15"]);
        let entry_point = column(&["entrypoint", "entry_point"]);

        let mut entries = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| FxError::Database {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            let row = Row::new(&record, path, line + 2);
            let timestamp = row.timestamp(0)?;
            let direction: Direction = row
                .field(1, "position")?
                .parse()
                .map_err(|e: String| row.error(&e))?;
            let annotations = EntryAnnotations {
                h4: row.text(h4),
                h1: row.text(h1),
                m15: row.text(m15),
                entry_point: row.text(entry_point),
            };
            entries.push((timestamp, direction, annotations));
        }

        tracing::info!(path = %path.display(), entries = entries.len(), "loaded scheduled entries");
        Ok(ScheduledEntries::annotated(entries))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        pair: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FxError> {
        let mut bars = self.read_all_bars(pair, timeframe)?;
        bars.retain(|b| b.timestamp >= start && b.timestamp <= end);
        Ok(bars)
    }

    fn fetch_news(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NewsEvent>, FxError> {
        let path = self.base_path.join(NEWS_FILE);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no news file");
            return Ok(Vec::new());
        }
        let content = read_file(&path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut events = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| FxError::Database {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            let row = Row::new(&record, &path, line + 2);
            let timestamp = row.timestamp(0)?;
            if timestamp < start || timestamp > end {
                continue;
            }
            let impact: Impact = row
                .field(1, "impact")?
                .parse()
                .map_err(|e: String| row.error(&e))?;
            events.push(NewsEvent {
                timestamp,
                impact,
                currency: row.field(2, "currency")?.trim().to_uppercase(),
                title: row.field(3, "news")?.trim().to_string(),
            });
        }

        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    fn list_pairs(&self, timeframe: &str) -> Result<Vec<String>, FxError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| FxError::Database {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let suffix = format!("_{}.csv", timeframe);
        let mut pairs = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| FxError::Database {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(pair) = name_str.strip_suffix(&suffix) {
                pairs.push(pair.to_string());
            }
        }

        pairs.sort();
        Ok(pairs)
    }

    fn get_data_range(
        &self,
        pair: &str,
        timeframe: &str,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>, usize)>, FxError> {
        if !self.csv_path(pair, timeframe).exists() {
            return Ok(None);
        }
        let bars = self.read_all_bars(pair, timeframe)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp, bars.len())),
            _ => None,
        })
    }
}

fn read_file(path: &Path) -> Result<String, FxError> {
    fs::read_to_string(path).map_err(|e| FxError::Database {
        reason: format!("failed to read {}: {}", path.display(), e),
    })
}

/// One CSV record with enough context for error messages.
struct Row<'a> {
    record: &'a csv::StringRecord,
    path: &'a Path,
    line: usize,
}

impl<'a> Row<'a> {
    fn new(record: &'a csv::StringRecord, path: &'a Path, line: usize) -> Self {
        Self { record, path, line }
    }

    fn error(&self, reason: &str) -> FxError {
        FxError::Database {
            reason: format!("{} line {}: {}", self.path.display(), self.line, reason),
        }
    }

    fn field(&self, index: usize, name: &str) -> Result<&'a str, FxError> {
        self.record
            .get(index)
            .ok_or_else(|| self.error(&format!("missing {} column", name)))
    }

    /// Trimmed text of an optional column; blank cells are `None`.
    fn text(&self, index: Option<usize>) -> Option<String> {
        index
            .and_then(|i| self.record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn number(&self, index: usize, name: &str) -> Result<f64, FxError> {
        let raw = self.field(index, name)?;
        raw.trim()
            .parse()
            .map_err(|e| self.error(&format!("invalid {} value '{}': {}", name, raw, e)))
    }

    /// Volume may be missing or fractional in broker exports.
    fn volume(&self, index: usize) -> Result<i64, FxError> {
        match self.record.get(index).map(str::trim) {
            None | Some("") => Ok(0),
            Some(raw) => raw
                .parse::<i64>()
                .or_else(|_| raw.parse::<f64>().map(|v| v.round() as i64))
                .map_err(|e| self.error(&format!("invalid volume value '{}': {}", raw, e))),
        }
    }

    /// A datetime string or Unix seconds.
    fn timestamp(&self, index: usize) -> Result<DateTime<Utc>, FxError> {
        let raw = self.field(index, "time")?.trim();
        if let Some(ts) = parse_timestamp(raw) {
            return Ok(ts);
        }
        raw.parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| self.error(&format!("invalid time '{}'", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::StrategyRule;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "time,open,high,low,close,volume\n\
            2024-01-15 10:00:00,1.1000,1.1010,1.0990,1.1005,500\n\
            2024-01-15 09:00:00,1.0990,1.1002,1.0985,1.1000,400\n\
            2024-01-15 11:00:00,1.1005,1.1020,1.1000,1.1015,550.0\n";

        fs::write(path.join("EURUSD_H1.csv"), csv_content).unwrap();
        fs::write(path.join("GBPUSD_H1.csv"), "time,open,high,low,close,volume\n").unwrap();
        fs::write(path.join("EURUSD_M15.csv"), "time,open,high,low,close,volume\n").unwrap();
        fs::write(
            path.join(NEWS_FILE),
            "time,impact,currency,news\n\
             2024-01-15 13:30:00,High,usd,Non-Farm Payrolls\n\
             1705311000,Medium,EUR,German CPI\n",
        )
        .unwrap();

        (dir, path)
    }

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn fetch_bars_returns_sorted_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter
            .fetch_bars("EURUSD", "H1", ts("2024-01-15"), ts("2024-01-16"))
            .unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].timestamp, ts("2024-01-15 09:00:00"));
        assert_eq!(bars[1].open, 1.1000);
        assert_eq!(bars[1].high, 1.1010);
        assert_eq!(bars[1].volume, 500);
        assert_eq!(bars[2].volume, 550);
    }

    #[test]
    fn fetch_bars_filters_inclusive_range() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter
            .fetch_bars(
                "EURUSD",
                "H1",
                ts("2024-01-15 10:00:00"),
                ts("2024-01-15 11:00:00"),
            )
            .unwrap();
        assert_eq!(bars.len(), 2);
    }

    #[test]
    fn fetch_bars_missing_file_is_error() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let result = adapter.fetch_bars("USDJPY", "H1", ts("2024-01-01"), ts("2024-02-01"));
        assert!(matches!(result, Err(FxError::Database { .. })));
    }

    #[test]
    fn fetch_bars_bad_number_names_line() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("EURUSD_H1.csv"),
            "time,open,high,low,close,volume\n2024-01-15 10:00:00,abc,1,1,1,0\n",
        )
        .unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let err = adapter
            .fetch_bars("EURUSD", "H1", ts("2024-01-01"), ts("2024-02-01"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 2"));
        assert!(msg.contains("open"));
    }

    #[test]
    fn list_pairs_by_timeframe() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        assert_eq!(adapter.list_pairs("H1").unwrap(), vec!["EURUSD", "GBPUSD"]);
        assert_eq!(adapter.list_pairs("M15").unwrap(), vec!["EURUSD"]);
    }

    #[test]
    fn get_data_range() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let (first, last, count) = adapter.get_data_range("EURUSD", "H1").unwrap().unwrap();
        assert_eq!(first, ts("2024-01-15 09:00:00"));
        assert_eq!(last, ts("2024-01-15 11:00:00"));
        assert_eq!(count, 3);
        assert!(adapter.get_data_range("GBPUSD", "H1").unwrap().is_none());
        assert!(adapter.get_data_range("AUDUSD", "H1").unwrap().is_none());
    }

    #[test]
    fn fetch_news_accepts_unix_seconds() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let events = adapter
            .fetch_news(ts("2024-01-15"), ts("2024-01-16"))
            .unwrap();
        assert_eq!(events.len(), 2);
        // 1705311000 = 2024-01-15 09:30:00 UTC
        assert_eq!(events[0].timestamp, ts("2024-01-15 09:30:00"));
        assert_eq!(events[0].impact, Impact::Medium);
        assert_eq!(events[1].currency, "USD");
        assert_eq!(events[1].title, "Non-Farm Payrolls");
    }

    #[test]
    fn fetch_news_without_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        assert!(adapter
            .fetch_news(ts("2024-01-01"), ts("2024-02-01"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn read_entries_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entries.csv");
        fs::write(
            &path,
            "time,position\n2024-01-15 10:00:00,Buy\n2024-01-15 11:00:00,Sell\n",
        )
        .unwrap();
        let entries = CsvAdapter::read_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn read_entries_rejects_unknown_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entries.csv");
        fs::write(&path, "time,position\n2024-01-15 10:00:00,Hold\n").unwrap();
        assert!(CsvAdapter::read_entries(&path).is_err());
    }

    #[test]
    fn read_entries_with_annotations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entries.csv");
        fs::write(
            &path,
            "time,position,H4,H1,M15,EntryPoint\n\
             2024-01-15 10:00:00,Buy,Bullish,Bullish,BOS,Retest\n\
             2024-01-15 11:00:00,Sell,Bearish,, ,\n",
        )
        .unwrap();
        let entries = CsvAdapter::read_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);

        let bar = |t: &str| Bar {
            timestamp: ts(t),
            open: 1.1,
            high: 1.1,
            low: 1.1,
            close: 1.1,
            volume: 0,
        };
        let first = entries.annotations(&bar("2024-01-15 10:00:00"));
        assert_eq!(first.h4.as_deref(), Some("Bullish"));
        assert_eq!(first.m15.as_deref(), Some("BOS"));
        assert_eq!(first.entry_point.as_deref(), Some("Retest"));

        let second = entries.annotations(&bar("2024-01-15 11:00:00"));
        assert_eq!(second.h4.as_deref(), Some("Bearish"));
        assert_eq!(second.h1, None);
        assert_eq!(second.m15, None);
        assert_eq!(second.entry_point, None);
    }
}
