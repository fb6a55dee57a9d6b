//! Candle hygiene: ordering, duplicates and price sanity.

pub mod canonicalize;

pub use canonicalize::{canonicalize, ensure_monotonic, Canonicalized};

use thiserror::Error;

/// Candle data the engine cannot use.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("invalid candle #{index} at {time}: {reason}")]
    InvalidCandle {
        index: usize,
        time: i64,
        reason: String,
    },

    #[error("timestamps not strictly increasing at #{index}: {prev} then {time}")]
    NonMonotonic { index: usize, prev: i64, time: i64 },
}
