//! Candle loading for the runner.
//!
//! Picks the source named by the `[market]` section, fetches, canonicalises
//! (sort, dedupe, sanity check) and hashes the result so every run can name
//! exactly which data it saw.

use thiserror::Error;

use tricross_core::data::{canonicalize, DataError};
use tricross_core::domain::Candle;
use tricross_core::fingerprint::dataset_hash;

use crate::config::{Exchange, MarketSection};
use crate::sources::{normalize_symbol, source_for, CandleSource, SourceError};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("fetch failed: {0}")]
    Source(#[from] SourceError),

    #[error("unusable candles: {0}")]
    Data(#[from] DataError),

    #[error("no candles for '{symbol}'")]
    Empty { symbol: String },
}

/// Canonical candles plus provenance.
#[derive(Debug, Clone)]
pub struct LoadedCandles {
    pub symbol: String,
    pub source: String,
    pub candles: Vec<Candle>,
    /// BLAKE3 over the canonical candles.
    pub dataset_hash: String,
    pub duplicates_dropped: usize,
    pub reordered: bool,
}

/// Load candles for the market described by `market`.
pub fn load_candles(market: &MarketSection) -> Result<LoadedCandles, LoadError> {
    let source = source_for(market)?;
    let symbol = match market.exchange {
        Exchange::Csv => market.symbol.clone(),
        _ => normalize_symbol(&market.symbol),
    };
    load_from(source.as_ref(), &symbol, &market.timeframe, market.limit)
}

/// Load from an explicit source. Used by the monitor and by tests.
pub fn load_from(
    source: &dyn CandleSource,
    symbol: &str,
    timeframe: &str,
    limit: usize,
) -> Result<LoadedCandles, LoadError> {
    let raw = source.fetch_candles(symbol, timeframe, limit)?;
    if raw.is_empty() {
        return Err(LoadError::Empty {
            symbol: symbol.to_string(),
        });
    }

    let canonical = canonicalize(&raw)?;
    if canonical.duplicates_dropped > 0 || canonical.reordered {
        tracing::warn!(
            symbol,
            duplicates = canonical.duplicates_dropped,
            reordered = canonical.reordered,
            "candles needed canonicalising"
        );
    }
    tracing::info!(
        symbol,
        source = source.name(),
        candles = canonical.candles.len(),
        "loaded candles"
    );

    Ok(LoadedCandles {
        symbol: symbol.to_string(),
        source: source.name().to_string(),
        dataset_hash: dataset_hash(&canonical.candles),
        candles: canonical.candles,
        duplicates_dropped: canonical.duplicates_dropped,
        reordered: canonical.reordered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketKind;
    use crate::sources::SyntheticSource;

    struct FixedSource(Vec<Candle>);

    impl CandleSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch_candles(&self, _: &str, _: &str, _: usize) -> Result<Vec<Candle>, SourceError> {
            Ok(self.0.clone())
        }
    }

    fn candle(time: i64, close: f64) -> Candle {
        Candle {
            time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn synthetic_market_loads_and_hashes() {
        let market = MarketSection {
            exchange: Exchange::Synthetic,
            market: MarketKind::Spot,
            symbol: "eth".into(),
            limit: 250,
            ..Default::default()
        };
        let a = load_candles(&market).unwrap();
        let b = load_candles(&market).unwrap();
        assert_eq!(a.symbol, "ETHUSDT");
        assert_eq!(a.source, "synthetic");
        assert_eq!(a.candles.len(), 250);
        assert_eq!(a.dataset_hash, b.dataset_hash);
        assert_eq!(a.dataset_hash.len(), 64);
    }

    #[test]
    fn out_of_order_input_is_canonicalised() {
        let source = FixedSource(vec![candle(2, 10.0), candle(1, 10.0), candle(2, 11.0)]);
        let loaded = load_from(&source, "X", "1m", 10).unwrap();
        assert!(loaded.reordered);
        assert_eq!(loaded.duplicates_dropped, 1);
        assert_eq!(loaded.candles.len(), 2);
        assert_eq!(loaded.candles[1].close, 11.0);
    }

    #[test]
    fn empty_and_insane_data_rejected() {
        assert!(matches!(
            load_from(&FixedSource(vec![]), "X", "1m", 10),
            Err(LoadError::Empty { .. })
        ));
        let mut broken = candle(1, 10.0);
        broken.low = 20.0;
        assert!(matches!(
            load_from(&FixedSource(vec![broken]), "X", "1m", 10),
            Err(LoadError::Data(DataError::InvalidCandle { .. }))
        ));
    }

    #[test]
    fn synthetic_source_respects_limit() {
        let loaded = load_from(&SyntheticSource::default(), "BTCUSDT", "1m", 40).unwrap();
        assert_eq!(loaded.candles.len(), 40);
    }
}
