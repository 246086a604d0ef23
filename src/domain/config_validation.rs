//! Configuration validation and typed lookups.
//!
//! Validates all config fields before a backtest runs. Every failure names the
//! offending `[section] key`.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::domain::bar::parse_timestamp;
use crate::domain::error::FxError;
use crate::domain::news::Impact;
use crate::domain::news_filter::NewsMode;
use crate::domain::rule_parser;
use crate::domain::signal::EntryFillPolicy;
use crate::domain::simulator::TieBreakPolicy;
use crate::ports::config_port::ConfigPort;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), FxError> {
    require(config, "backtest", "pair")?;
    require(config, "backtest", "timeframe")?;
    read_date_range(config)?;
    read_threads(config)?;
    read_session_offset(config)?;
    validate_data_source(config)?;
    Ok(())
}

pub fn validate_grid_config(config: &dyn ConfigPort) -> Result<(), FxError> {
    read_positive_list(config, "grid", "stop_loss_values")?;
    read_positive_list(config, "grid", "risk_reward_values")?;
    read_pip_size(config)?;
    Ok(())
}

pub fn validate_execution_config(config: &dyn ConfigPort) -> Result<(), FxError> {
    read_parsed::<EntryFillPolicy>(config, "execution", "entry_fill")?;
    read_parsed::<TieBreakPolicy>(config, "execution", "tie_break")?;
    Ok(())
}

pub fn validate_news_config(config: &dyn ConfigPort) -> Result<(), FxError> {
    read_parsed::<NewsMode>(config, "news", "mode")?;
    read_parsed::<Impact>(config, "news", "impact_threshold")?;
    read_window(config, "window_before_hours")?;
    read_window(config, "window_after_hours")?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), FxError> {
    if non_empty(config, "strategy", "entries_file").is_some() {
        return Ok(());
    }
    let long = non_empty(config, "strategy", "entry_long");
    let short = non_empty(config, "strategy", "entry_short");
    if long.is_none() && short.is_none() {
        return Err(FxError::ConfigMissing {
            section: "strategy".to_string(),
            key: "entry_long".to_string(),
        });
    }
    for rule in [long, short].into_iter().flatten() {
        rule_parser::parse(&rule)?;
    }
    Ok(())
}

/// Run every section validator.
pub fn validate_all(config: &dyn ConfigPort) -> Result<(), FxError> {
    validate_backtest_config(config)?;
    validate_grid_config(config)?;
    validate_execution_config(config)?;
    validate_news_config(config)?;
    validate_strategy_config(config)?;
    Ok(())
}

/// A trimmed, non-empty value.
pub fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, FxError> {
    non_empty(config, section, key).ok_or_else(|| FxError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> FxError {
    FxError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Parse an optional value through its `FromStr` impl.
pub fn read_parsed<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, FxError>
where
    T: FromStr<Err = String>,
{
    non_empty(config, section, key)
        .map(|v| v.parse::<T>().map_err(|e| invalid(section, key, e)))
        .transpose()
}

fn read_number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, FxError> {
    non_empty(config, section, key)
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| invalid(section, key, format!("'{}' is not a number", v)))
        })
        .transpose()
}

/// `[backtest] start` and `end`. A date-only `end` covers that whole day.
pub fn read_date_range(config: &dyn ConfigPort) -> Result<(DateTime<Utc>, DateTime<Utc>), FxError> {
    let start_raw = require(config, "backtest", "start")?;
    let end_raw = require(config, "backtest", "end")?;
    let start = parse_timestamp(&start_raw).ok_or_else(|| {
        invalid("backtest", "start", "expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS")
    })?;
    let mut end = parse_timestamp(&end_raw).ok_or_else(|| {
        invalid("backtest", "end", "expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS")
    })?;
    if end_raw.len() == 10 {
        end += Duration::days(1) - Duration::seconds(1);
    }
    if start >= end {
        return Err(invalid("backtest", "start", "start must be before end"));
    }
    Ok((start, end))
}

pub fn read_threads(config: &dyn ConfigPort) -> Result<Option<usize>, FxError> {
    match non_empty(config, "backtest", "threads") {
        None => Ok(None),
        Some(v) => match v.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(Some(n)),
            _ => Err(invalid("backtest", "threads", "threads must be a positive integer")),
        },
    }
}

pub fn read_session_offset(config: &dyn ConfigPort) -> Result<Option<i64>, FxError> {
    match non_empty(config, "backtest", "session_offset_hours") {
        None => Ok(None),
        Some(v) => match v.parse::<i64>() {
            Ok(h) if (-12..=14).contains(&h) => Ok(Some(h)),
            _ => Err(invalid(
                "backtest",
                "session_offset_hours",
                "session_offset_hours must be an integer between -12 and 14",
            )),
        },
    }
}

fn validate_data_source(config: &dyn ConfigPort) -> Result<(), FxError> {
    match non_empty(config, "data", "source").as_deref() {
        None | Some("csv") => Ok(()),
        Some("sqlite") => {
            require(config, "sqlite", "path")?;
            Ok(())
        }
        Some(other) => Err(invalid(
            "data",
            "source",
            format!("unknown source '{}' (expected csv or sqlite)", other),
        )),
    }
}

/// Comma-separated positive numbers; `None` when the key is absent.
pub fn read_positive_list(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<Vec<f64>>, FxError> {
    let Some(items) = config.get_list(section, key) else {
        return Ok(None);
    };
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        let value = item
            .parse::<f64>()
            .map_err(|_| invalid(section, key, format!("'{}' is not a number", item)))?;
        if !value.is_finite() || value <= 0.0 {
            return Err(invalid(section, key, format!("{} must be positive", value)));
        }
        values.push(value);
    }
    Ok(Some(values))
}

pub fn read_pip_size(config: &dyn ConfigPort) -> Result<Option<f64>, FxError> {
    match read_number(config, "grid", "pip_size")? {
        Some(p) if !(p.is_finite() && p > 0.0) => {
            Err(invalid("grid", "pip_size", "pip_size must be positive"))
        }
        other => Ok(other),
    }
}

/// A news window given in hours (fractions allowed).
pub fn read_window(config: &dyn ConfigPort, key: &str) -> Result<Option<Duration>, FxError> {
    match read_number(config, "news", key)? {
        None => Ok(None),
        Some(h) if h.is_finite() && h >= 0.0 => Ok(Some(Duration::seconds((h * 3600.0).round() as i64))),
        Some(_) => Err(invalid("news", key, "window must be a non-negative number of hours")),
    }
}
