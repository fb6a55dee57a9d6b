//! Sort, dedupe and validate a candle series before the engine sees it.

use tracing::debug;

use super::DataError;
use crate::domain::Candle;

/// Canonical candles plus what had to change to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct Canonicalized {
    pub candles: Vec<Candle>,
    /// Candles discarded because a later one had the same timestamp.
    pub duplicates_dropped: usize,
    /// True if the input was not already in ascending time order.
    pub reordered: bool,
}

/// Stable sort by time, keep the last candle for each timestamp, then reject
/// anything that is not a sane OHLC bar.
pub fn canonicalize(candles: &[Candle]) -> Result<Canonicalized, DataError> {
    let reordered = candles.windows(2).any(|w| w[1].time < w[0].time);
    let mut sorted = candles.to_vec();
    if reordered {
        sorted.sort_by_key(|c| c.time);
    }

    let mut out: Vec<Candle> = Vec::with_capacity(sorted.len());
    let mut duplicates_dropped = 0;
    for candle in sorted {
        match out.last_mut() {
            Some(last) if last.time == candle.time => {
                *last = candle;
                duplicates_dropped += 1;
            }
            _ => out.push(candle),
        }
    }

    for (index, candle) in out.iter().enumerate() {
        if !candle.is_sane() {
            return Err(DataError::InvalidCandle {
                index,
                time: candle.time,
                reason: describe_insanity(candle),
            });
        }
    }
    ensure_monotonic(&out)?;

    if reordered || duplicates_dropped > 0 {
        debug!(
            reordered,
            duplicates_dropped,
            kept = out.len(),
            "candles canonicalized"
        );
    }
    Ok(Canonicalized {
        candles: out,
        duplicates_dropped,
        reordered,
    })
}

/// Fail on the first timestamp that does not strictly increase.
pub fn ensure_monotonic(candles: &[Candle]) -> Result<(), DataError> {
    for (i, w) in candles.windows(2).enumerate() {
        if w[1].time <= w[0].time {
            return Err(DataError::NonMonotonic {
                index: i + 1,
                prev: w[0].time,
                time: w[1].time,
            });
        }
    }
    Ok(())
}

fn describe_insanity(c: &Candle) -> String {
    if c.is_void() {
        "non-finite price".into()
    } else if c.low <= 0.0 {
        format!("non-positive low {}", c.low)
    } else if c.high < c.low {
        format!("high {} below low {}", c.high, c.low)
    } else if c.volume < 0.0 || c.volume.is_nan() {
        format!("negative volume {}", c.volume)
    } else {
        format!(
            "open {} / close {} outside [{}, {}]",
            c.open, c.close, c.low, c.high
        )
    }
}
