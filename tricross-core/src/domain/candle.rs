//! Candle: the fundamental market data unit.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candle for a single symbol and interval.
///
/// `time` is the candle open time in epoch milliseconds. Every source converts
/// to this unit before the engine sees the data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Returns true if any price field is non-finite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: high >= low, open/close inside the range, prices positive.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
            && self.volume >= 0.0
    }

    /// Candle open time as a UTC timestamp.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.time).single()
    }
}

/// Format an epoch-millisecond timestamp as RFC 3339, or the raw number if out of range.
pub fn format_time(time: i64) -> String {
    match Utc.timestamp_millis_opt(time).single() {
        Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        None => time.to_string(),
    }
}

/// Extract the close series.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// One-minute candles built from a close series, for tests.
///
/// open = previous close (or close for the first candle),
/// high/low = max/min(open, close) -/+ 0.1, spaced 60s apart.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                time: 1_700_000_000_000 + i as i64 * 60_000,
                open,
                high: open.max(close) + 0.1,
                low: open.min(close) - 0.1,
                close,
                volume: 10.0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle() -> Candle {
        Candle {
            time: 1_700_000_000_000,
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 5.0,
        }
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample_candle().is_sane());
    }

    #[test]
    fn candle_detects_void() {
        let mut c = sample_candle();
        c.close = f64::NAN;
        assert!(c.is_void());
        assert!(!c.is_sane());
    }

    #[test]
    fn candle_detects_inverted_range() {
        let mut c = sample_candle();
        c.high = 97.0;
        assert!(!c.is_sane());
    }

    #[test]
    fn format_time_is_rfc3339() {
        assert_eq!(format_time(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_time(60_000), "1970-01-01T00:01:00Z");
    }

    #[test]
    fn make_candles_spacing() {
        let candles = make_candles(&[1.0, 2.0, 3.0]);
        assert_eq!(candles[1].time - candles[0].time, 60_000);
        assert_eq!(candles[2].open, 2.0);
        assert!(candles.iter().all(Candle::is_sane));
    }
}
