//! Bybit v5 klines (`/v5/market/kline`), category `spot` or `linear`.
//!
//! Pages hold at most 200 rows, newest first. Paging walks backwards with `end`.

use serde::Deserialize;

use tricross_core::domain::Candle;

use super::{get_json, http_client, newest, parse_ohlcv_row, CandleSource, SourceError};
use crate::config::MarketKind;

const KLINE_URL: &str = "https://api.bybit.com/v5/market/kline";
const MAX_BATCH: usize = 200;

#[derive(Debug, Deserialize)]
struct KlineResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    result: Option<KlineResult>,
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    #[serde(default)]
    list: Vec<Vec<serde_json::Value>>,
}

/// Bybit interval code for a timeframe.
fn interval_code(timeframe: &str) -> Option<&'static str> {
    Some(match timeframe {
        "1m" => "1",
        "3m" => "3",
        "5m" => "5",
        "15m" => "15",
        "30m" => "30",
        "1h" => "60",
        "2h" => "120",
        "4h" => "240",
        "6h" => "360",
        "12h" => "720",
        "1d" => "D",
        "1w" => "W",
        _ => return None,
    })
}

pub struct BybitSource {
    client: reqwest::blocking::Client,
    category: &'static str,
}

impl BybitSource {
    pub fn new(market: MarketKind) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client()?,
            category: match market {
                MarketKind::Spot => "spot",
                MarketKind::Perp => "linear",
            },
        })
    }

    fn kline_url(&self, symbol: &str, interval: &str, limit: usize, end: Option<i64>) -> String {
        let mut url = format!(
            "{KLINE_URL}?category={}&symbol={symbol}&interval={interval}&limit={limit}",
            self.category
        );
        if let Some(end) = end {
            url.push_str(&format!("&end={end}"));
        }
        url
    }

    fn parse_response(symbol: &str, resp: KlineResponse) -> Result<Vec<Candle>, SourceError> {
        if resp.ret_code != 0 {
            // 10001: parameter error, which is what an unknown symbol returns.
            if resp.ret_code == 10001 {
                return Err(SourceError::SymbolNotFound {
                    symbol: symbol.to_string(),
                });
            }
            return Err(SourceError::Exchange {
                code: resp.ret_code,
                message: resp.ret_msg,
            });
        }
        let result = resp
            .result
            .ok_or_else(|| SourceError::ResponseFormatChanged("missing result".into()))?;
        result.list.iter().map(|row| parse_ohlcv_row(row)).collect()
    }
}

impl CandleSource for BybitSource {
    fn name(&self) -> &str {
        "bybit"
    }

    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        let interval = interval_code(timeframe)
            .ok_or_else(|| SourceError::UnsupportedTimeframe(timeframe.to_string()))?;

        let mut collected: Vec<Candle> = Vec::with_capacity(limit);
        let mut end = None;

        while collected.len() < limit {
            let batch = (limit - collected.len()).min(MAX_BATCH);
            let url = self.kline_url(symbol, interval, batch, end);
            let resp: KlineResponse = get_json(&self.client, &url, symbol)?;
            let page = Self::parse_response(symbol, resp)?;

            let Some(earliest) = page.iter().map(|c| c.time).min() else {
                break;
            };
            tracing::debug!(symbol, rows = page.len(), earliest, "bybit page");
            let short_page = page.len() < batch;
            collected.extend(page);
            if short_page {
                break;
            }
            end = Some(earliest - 1);
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

    #[test]
    fn parses_newest_first_list() {
        let text = r#"{
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "spot",
                "symbol": "ETHUSDT",
                "list": [
                    ["1700000060000", "100.5", "102.0", "100.0", "101.5", "12.0", "1200"],
                    ["1700000000000", "100.0", "101.0", "99.0", "100.5", "10.0", "1000"]
                ]
            }
        }"#;
        let resp: KlineResponse = serde_json::from_str(text).unwrap();
        let page = BybitSource::parse_response("ETHUSDT", resp).unwrap();
        assert_eq!(page[0].time, 1_700_000_060_000);
        let ordered = newest(page, 10);
        assert_eq!(ordered[0].time, 1_700_000_000_000);
        assert_eq!(ordered[1].close, 101.5);
    }

    #[test]
    fn error_codes_map_to_errors() {
        let resp: KlineResponse =
            serde_json::from_str(r#"{"retCode": 10001, "retMsg": "Not supported symbols"}"#)
                .unwrap();
        assert!(matches!(
            BybitSource::parse_response("NOPEUSDT", resp),
            Err(SourceError::SymbolNotFound { .. })
        ));

        let resp: KlineResponse =
            serde_json::from_str(r#"{"retCode": 10006, "retMsg": "Too many visits"}"#).unwrap();
        assert!(matches!(
            BybitSource::parse_response("ETHUSDT", resp),
            Err(SourceError::Exchange { code: 10006, .. })
        ));
    }

    #[test]
    fn url_uses_linear_category_for_perp() {
        let source = BybitSource::new(MarketKind::Perp).unwrap();
        assert_eq!(
            source.kline_url("BTCUSDT", "1", 200, Some(99)),
            "https://api.bybit.com/v5/market/kline?category=linear&symbol=BTCUSDT&interval=1&limit=200&end=99"
        );
        assert_eq!(interval_code("1h"), Some("60"));
        assert_eq!(interval_code("7m"), None);
    }
}
