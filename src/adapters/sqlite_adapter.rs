//! SQLite data adapter.
//!
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS` text so lexical order is
//! chronological order.

use crate::domain::bar::{format_timestamp, parse_timestamp, Bar};
use crate::domain::error::FxError;
use crate::domain::news::{Impact, NewsEvent};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn query_error(e: rusqlite::Error) -> FxError {
    FxError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn text_conversion(value: &str, reason: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        value.len(),
        rusqlite::types::Type::Text,
        reason.into(),
    )
}

fn timestamp_column(value: String) -> rusqlite::Result<DateTime<Utc>> {
    parse_timestamp(&value)
        .ok_or_else(|| text_conversion(&value, format!("invalid timestamp '{}'", value)))
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FxError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| FxError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| FxError::Database {
                reason: e.to_string(),
            })?;

        tracing::debug!(path = %db_path, pool_size, "opened sqlite pool");
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, FxError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| FxError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, FxError> {
        self.pool.get().map_err(|e: r2d2::Error| FxError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), FxError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS candles (
                    pair TEXT NOT NULL,
                    timeframe TEXT NOT NULL,
                    time TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume INTEGER NOT NULL DEFAULT 0,
                    spread INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (pair, timeframe, time)
                );
                CREATE TABLE IF NOT EXISTS news (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    time TEXT NOT NULL,
                    impact TEXT NOT NULL,
                    currency TEXT NOT NULL,
                    news TEXT NOT NULL,
                    actual TEXT,
                    forecast TEXT,
                    previous TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_news_time ON news(time);",
            )
            .map_err(query_error)
    }

    pub fn insert_bars(&self, pair: &str, timeframe: &str, bars: &[Bar]) -> Result<(), FxError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO candles (pair, timeframe, time, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    pair,
                    timeframe,
                    format_timestamp(&bar.timestamp),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)
    }

    pub fn insert_news(&self, events: &[NewsEvent]) -> Result<(), FxError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for event in events {
            tx.execute(
                "INSERT INTO news (time, impact, currency, news) VALUES (?1, ?2, ?3, ?4)",
                params![
                    format_timestamp(&event.timestamp),
                    event.impact.to_string(),
                    event.currency,
                    event.title
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_bars(
        &self,
        pair: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FxError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT time, open, high, low, close, volume
                 FROM candles
                 WHERE pair = ?1 AND timeframe = ?2 AND time >= ?3 AND time <= ?4
                 ORDER BY time ASC",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(
                params![pair, timeframe, format_timestamp(&start), format_timestamp(&end)],
                |row| {
                    Ok(Bar {
                        timestamp: timestamp_column(row.get(0)?)?,
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                    })
                },
            )
            .map_err(query_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }

    fn fetch_news(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NewsEvent>, FxError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT time, impact, currency, news
                 FROM news
                 WHERE time >= ?1 AND time <= ?2
                 ORDER BY time ASC, id ASC",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![format_timestamp(&start), format_timestamp(&end)], |row| {
                let impact_str: String = row.get(1)?;
                let impact: Impact = impact_str
                    .parse()
                    .map_err(|e: String| text_conversion(&impact_str, e))?;
                let currency: String = row.get(2)?;
                Ok(NewsEvent {
                    timestamp: timestamp_column(row.get(0)?)?,
                    impact,
                    currency: currency.trim().to_uppercase(),
                    title: row.get(3)?,
                })
            })
            .map_err(query_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }

    fn list_pairs(&self, timeframe: &str) -> Result<Vec<String>, FxError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT pair FROM candles WHERE timeframe = ?1 ORDER BY pair")
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![timeframe], |row| row.get(0))
            .map_err(query_error)?;

        rows.collect::<Result<Vec<String>, _>>().map_err(query_error)
    }

    fn get_data_range(
        &self,
        pair: &str,
        timeframe: &str,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>, usize)>, FxError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(time), MAX(time), COUNT(*) FROM candles WHERE pair = ?1 AND timeframe = ?2",
                params![pair, timeframe],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_error)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => {
                let parse = |s: &str| {
                    parse_timestamp(s).ok_or_else(|| FxError::Database {
                        reason: format!("invalid timestamp '{}' in candles", s),
                    })
                };
                Ok(Some((parse(&min_str)?, parse(&max_str)?, count as usize)))
            }
            _ => Ok(None),
        }
    }
}
