//! Local CSV candles with header `time,open,high,low,close,volume`.
//!
//! `time` is epoch milliseconds or an RFC 3339 timestamp. The symbol and
//! timeframe arguments are ignored: the file is the dataset.

use std::io::Read;
use std::path::PathBuf;

use chrono::DateTime;
use serde::Deserialize;

use tricross_core::domain::Candle;

use super::{newest, CandleSource, SourceError};

#[derive(Debug, Deserialize)]
struct CsvRow {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

fn parse_time(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.timestamp_millis()))
}

/// Read candles from any reader holding the CSV layout above.
pub fn read_candles<R: Read>(reader: R) -> Result<Vec<Candle>, SourceError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut candles = Vec::new();
    for (line, record) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = record.map_err(|e| SourceError::Other(format!("csv row {}: {e}", line + 1)))?;
        let time = parse_time(&row.time).ok_or_else(|| {
            SourceError::Other(format!("csv row {}: unreadable time '{}'", line + 1, row.time))
        })?;
        candles.push(Candle {
            time,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    Ok(candles)
}

pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CandleSource for CsvFileSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch_candles(
        &self,
        _symbol: &str,
        _timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        let file = std::fs::File::open(&self.path).map_err(|e| SourceError::File {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        let candles = read_candles(file)?;
        Ok(newest(candles, limit))
    }
}
