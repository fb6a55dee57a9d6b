//! Binance klines, spot (`/api/v3/klines`) or USDⓈ-M futures (`/fapi/v1/klines`).
//!
//! The API returns at most 1000 rows per call, oldest first. Longer histories
//! are fetched by paging backwards with `endTime`.

use tricross_core::domain::Candle;

use super::{get_json, http_client, newest, parse_ohlcv_row, CandleSource, SourceError};
use crate::config::MarketKind;

const SPOT_URL: &str = "https://api.binance.com/api/v3/klines";
const FUTURES_URL: &str = "https://fapi.binance.com/fapi/v1/klines";
const MAX_BATCH: usize = 1000;

const INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
];

pub struct BinanceSource {
    client: reqwest::blocking::Client,
    base_url: &'static str,
}

impl BinanceSource {
    pub fn new(market: MarketKind) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client()?,
            base_url: match market {
                MarketKind::Spot => SPOT_URL,
                MarketKind::Perp => FUTURES_URL,
            },
        })
    }

    fn klines_url(&self, symbol: &str, interval: &str, limit: usize, end_time: Option<i64>) -> String {
        let mut url = format!(
            "{}?symbol={symbol}&interval={interval}&limit={limit}",
            self.base_url
        );
        if let Some(end) = end_time {
            url.push_str(&format!("&endTime={end}"));
        }
        url
    }

    /// Parse one klines page.
    fn parse_page(rows: &[Vec<serde_json::Value>]) -> Result<Vec<Candle>, SourceError> {
        rows.iter().map(|row| parse_ohlcv_row(row)).collect()
    }
}

impl CandleSource for BinanceSource {
    fn name(&self) -> &str {
        "binance"
    }

    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        if !INTERVALS.contains(&timeframe) {
            return Err(SourceError::UnsupportedTimeframe(timeframe.to_string()));
        }

        let mut collected: Vec<Candle> = Vec::with_capacity(limit);
        let mut end_time = None;

        while collected.len() < limit {
            let batch = (limit - collected.len()).min(MAX_BATCH);
            let url = self.klines_url(symbol, timeframe, batch, end_time);
            let rows: Vec<Vec<serde_json::Value>> = get_json(&self.client, &url, symbol)?;
            let page = Self::parse_page(&rows)?;

            let Some(earliest) = page.iter().map(|c| c.time).min() else {
                break;
            };
            tracing::debug!(symbol, rows = page.len(), earliest, "binance page");
            let short_page = page.len() < batch;
            collected.extend(page);
            if short_page {
                break;
            }
            end_time = Some(earliest - 1);
        }

        if collected.is_empty() {
            return Err(SourceError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(newest(collected, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"[
        [1700000000000, "100.0", "101.0", "99.0", "100.5", "10.0", 1700000059999, "1000", 5, "5", "500", "0"],
        [1700000060000, "100.5", "102.0", "100.0", "101.5", "12.0", 1700000119999, "1200", 6, "6", "600", "0"]
    ]"#;

    #[test]
    fn parses_kline_page() {
        let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(PAGE).unwrap();
        let candles = BinanceSource::parse_page(&rows).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].time, 1_700_000_000_000);
        assert_eq!(candles[1].close, 101.5);
        assert_eq!(candles[1].volume, 12.0);
    }

    #[test]
    fn url_switches_host_by_market() {
        let spot = BinanceSource::new(MarketKind::Spot).unwrap();
        let perp = BinanceSource::new(MarketKind::Perp).unwrap();
        assert_eq!(
            spot.klines_url("ETHUSDT", "1m", 1000, None),
            "https://api.binance.com/api/v3/klines?symbol=ETHUSDT&interval=1m&limit=1000"
        );
        assert_eq!(
            perp.klines_url("ETHUSDT", "1m", 200, Some(42)),
            "https://fapi.binance.com/fapi/v1/klines?symbol=ETHUSDT&interval=1m&limit=200&endTime=42"
        );
    }

    #[test]
    fn unknown_interval_rejected_before_any_request() {
        let source = BinanceSource::new(MarketKind::Spot).unwrap();
        assert!(matches!(
            source.fetch_candles("ETHUSDT", "7m", 10),
            Err(SourceError::UnsupportedTimeframe(_))
        ));
    }
}
