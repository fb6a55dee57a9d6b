//! Candle sources: exchange REST APIs, local CSV files and a synthetic walk.
//!
//! Every source returns candles with `time` in epoch milliseconds. Ordering
//! and duplicates are not guaranteed here; the loader canonicalises.

pub mod binance;
pub mod bybit;
pub mod csv_file;
pub mod synthetic;

pub use binance::BinanceSource;
pub use bybit::BybitSource;
pub use csv_file::CsvFileSource;
pub use synthetic::SyntheticSource;

use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

use tricross_core::domain::Candle;

use crate::config::{Exchange, MarketSection};

/// Errors from fetching or parsing candles.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by exchange (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("exchange error {code}: {message}")]
    Exchange { code: i64, message: String },

    #[error("unsupported timeframe '{0}'")]
    UnsupportedTimeframe(String),

    #[error("cannot read {path}: {reason}")]
    File { path: PathBuf, reason: String },

    #[error("source not configured: {0}")]
    NotConfigured(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Anything that can produce candles for one symbol and timeframe.
pub trait CandleSource: Send + Sync {
    fn name(&self) -> &str;

    /// The `limit` most recent candles.
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, SourceError>;
}

/// Build the source selected by a `[market]` section.
pub fn source_for(market: &MarketSection) -> Result<Box<dyn CandleSource>, SourceError> {
    Ok(match market.exchange {
        Exchange::Binance => Box::new(BinanceSource::new(market.market)?),
        Exchange::Bybit => Box::new(BybitSource::new(market.market)?),
        Exchange::Csv => {
            let path = market.csv_path.clone().ok_or_else(|| {
                SourceError::NotConfigured("exchange 'csv' needs market.csv_path".into())
            })?;
            Box::new(CsvFileSource::new(path))
        }
        Exchange::Synthetic => Box::new(SyntheticSource::default()),
    })
}

/// `eth`, `ETH/USDT` and `eth-usdt` all become `ETHUSDT`.
pub fn normalize_symbol(symbol: &str) -> String {
    let upper: String = symbol
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if upper.ends_with("USDT") {
        upper
    } else {
        format!("{upper}USDT")
    }
}

/// Length of one candle for a timeframe such as `1m`, `4h` or `1d`.
pub fn timeframe_millis(timeframe: &str) -> Option<i64> {
    let tf = timeframe.trim();
    let split = tf.find(|c: char| !c.is_ascii_digit())?;
    let (count, unit) = tf.split_at(split);
    let count: i64 = count.parse().ok().filter(|&n| n > 0)?;
    let unit_ms = match unit {
        "m" => 60_000,
        "h" => 3_600_000,
        "d" | "D" => 86_400_000,
        "w" | "W" => 7 * 86_400_000,
        _ => return None,
    };
    Some(count * unit_ms)
}

// ─── HTTP plumbing shared by the exchange sources ───────────────────

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRIES: u32 = 2;
const BASE_DELAY: Duration = Duration::from_millis(500);

pub(crate) fn http_client() -> Result<reqwest::blocking::Client, SourceError> {
    reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("tricross/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SourceError::Other(format!("failed to build HTTP client: {e}")))
}

/// GET a JSON document, retrying timeouts, 429s and 5xx with exponential backoff.
pub(crate) fn get_json<T: DeserializeOwned>(
    client: &reqwest::blocking::Client,
    url: &str,
    symbol: &str,
) -> Result<T, SourceError> {
    let mut last_error = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            std::thread::sleep(BASE_DELAY * 2u32.pow(attempt - 1));
        }
        tracing::trace!(url, attempt, "GET");

        match client.get(url).send() {
            Ok(resp) => {
                let status = resp.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    let retry_after = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(60);
                    last_error = Some(SourceError::RateLimited {
                        retry_after_secs: retry_after,
                    });
                    continue;
                }

                if status == reqwest::StatusCode::BAD_REQUEST
                    || status == reqwest::StatusCode::NOT_FOUND
                {
                    return Err(SourceError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    });
                }

                if status.is_server_error() {
                    last_error = Some(SourceError::Other(format!("HTTP {status} for {symbol}")));
                    continue;
                }

                if !status.is_success() {
                    return Err(SourceError::Other(format!("HTTP {status} for {symbol}")));
                }

                return resp.json::<T>().map_err(|e| {
                    SourceError::ResponseFormatChanged(format!(
                        "failed to parse response for {symbol}: {e}"
                    ))
                });
            }
            Err(e) => {
                if e.is_connect() || e.is_timeout() {
                    last_error = Some(SourceError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                return Err(SourceError::NetworkUnreachable(e.to_string()));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SourceError::Other("max retries exceeded".into())))
}

/// A price field that may arrive as a JSON string or number.
pub(crate) fn json_f64(value: &serde_json::Value, field: &str) -> Result<f64, SourceError> {
    let parsed = match value {
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.ok_or_else(|| SourceError::ResponseFormatChanged(format!("bad {field}: {value}")))
}

pub(crate) fn json_i64(value: &serde_json::Value, field: &str) -> Result<i64, SourceError> {
    let parsed = match value {
        serde_json::Value::String(s) => s.parse::<i64>().ok(),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    };
    parsed.ok_or_else(|| SourceError::ResponseFormatChanged(format!("bad {field}: {value}")))
}

/// Parse a `[time, open, high, low, close, volume, ...]` row.
pub(crate) fn parse_ohlcv_row(row: &[serde_json::Value]) -> Result<Candle, SourceError> {
    if row.len() < 6 {
        return Err(SourceError::ResponseFormatChanged(format!(
            "kline row has {} fields, expected at least 6",
            row.len()
        )));
    }
    Ok(Candle {
        time: json_i64(&row[0], "open time")?,
        open: json_f64(&row[1], "open")?,
        high: json_f64(&row[2], "high")?,
        low: json_f64(&row[3], "low")?,
        close: json_f64(&row[4], "close")?,
        volume: json_f64(&row[5], "volume")?,
    })
}

/// Keep the newest `limit` candles, oldest first, one per timestamp.
pub(crate) fn newest(mut candles: Vec<Candle>, limit: usize) -> Vec<Candle> {
    candles.sort_by_key(|c| c.time);
    candles.dedup_by_key(|c| c.time);
    if candles.len() > limit {
        candles.drain(..candles.len() - limit);
    }
    candles
}
