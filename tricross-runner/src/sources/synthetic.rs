//! Seeded random walk for development and tests.
//!
//! The seed is the BLAKE3 hash of the symbol, so the same symbol always gets
//! the same candles.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tricross_core::domain::Candle;

use super::{timeframe_millis, CandleSource, SourceError};

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    /// Open time of the oldest candle, epoch ms.
    pub start_time: i64,
    pub start_price: f64,
    /// Largest per-bar return, as a fraction.
    pub max_step: f64,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self {
            start_time: 1_700_000_000_000,
            start_price: 100.0,
            max_step: 0.004,
        }
    }
}

impl SyntheticSource {
    pub fn generate(&self, symbol: &str, bar_ms: i64, count: usize) -> Vec<Candle> {
        let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);

        let mut candles = Vec::with_capacity(count);
        let mut price = self.start_price;
        for i in 0..count {
            let step: f64 = rng.gen_range(-self.max_step..self.max_step);
            let open = price;
            let close = price * (1.0 + step);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..self.max_step / 2.0));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..self.max_step / 2.0));
            candles.push(Candle {
                time: self.start_time + i as i64 * bar_ms,
                open,
                high,
                low,
                close,
                volume: rng.gen_range(1.0..100.0),
            });
            price = close;
        }
        candles
    }
}

impl CandleSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        let bar_ms = timeframe_millis(timeframe)
            .ok_or_else(|| SourceError::UnsupportedTimeframe(timeframe.to_string()))?;
        Ok(self.generate(symbol, bar_ms, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_symbol_same_walk() {
        let source = SyntheticSource::default();
        let a = source.fetch_candles("ETHUSDT", "1m", 300).unwrap();
        let b = source.fetch_candles("ETHUSDT", "1m", 300).unwrap();
        let c = source.fetch_candles("BTCUSDT", "1m", 300).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn candles_are_sane_and_spaced() {
        let candles = SyntheticSource::default()
            .fetch_candles("SOLUSDT", "5m", 200)
            .unwrap();
        assert_eq!(candles.len(), 200);
        assert!(candles.iter().all(|c| c.is_sane()));
        for pair in candles.windows(2) {
            assert_eq!(pair[1].time - pair[0].time, 300_000);
            assert_eq!(pair[1].open, pair[0].close);
        }
    }
}
