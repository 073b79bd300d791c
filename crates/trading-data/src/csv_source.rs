//! Bar history loaded from CSV, for paper replay.

use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::path::Path;
use trading_core::error::PersistenceError;
use trading_core::types::Bar;

/// CSV record format.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(alias = "Date", alias = "date", alias = "timestamp", alias = "Timestamp", alias = "candle_date_time_utc")]
    date: String,
    #[serde(alias = "Open", alias = "opening_price")]
    open: f64,
    #[serde(alias = "High", alias = "high_price")]
    high: f64,
    #[serde(alias = "Low", alias = "low_price")]
    low: f64,
    #[serde(alias = "Close", alias = "trade_price")]
    close: f64,
    #[serde(alias = "Volume", alias = "candle_acc_trade_volume", default)]
    volume: f64,
}

/// Load closed bars from a CSV file, sorted by time with duplicates removed.
pub fn load_bars(path: impl AsRef<Path>) -> Result<Vec<Bar>, PersistenceError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PersistenceError::NotFound(path.display().to_string()));
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| PersistenceError::Storage(e.to_string()))?;

    let mut bars = Vec::new();
    for result in reader.deserialize() {
        let record: CsvRecord = result.map_err(|e| PersistenceError::Storage(e.to_string()))?;
        let timestamp = parse_timestamp(&record.date)?;
        bars.push(Bar::new(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        ));
    }

    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    Ok(bars)
}

/// Parse the timestamp formats exchanges export, into epoch milliseconds.
fn parse_timestamp(date_str: &str) -> Result<i64, PersistenceError> {
    let formats = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d"];

    for format in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(date_str, format) {
            return Ok(dt.and_utc().timestamp_millis());
        }
        if let Some(dt) = NaiveDate::parse_from_str(date_str, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }

    if let Ok(ts) = date_str.parse::<i64>() {
        // Seconds unless it has millisecond magnitude
        return Ok(if ts > 10_000_000_000 { ts } else { ts * 1000 });
    }

    Err(PersistenceError::Storage(format!("Could not parse date: {}", date_str)))
}
