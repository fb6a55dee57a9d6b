//! Deterministic identification of runs: what data, what configuration, which engine.

use serde::{Deserialize, Serialize};

use crate::domain::Candle;
use crate::engine::BacktestConfig;

/// BLAKE3 over every candle field, in order.
///
/// Two series hash equal only if they hold the same candles in the same order.
pub fn dataset_hash(candles: &[Candle]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in candles {
        hasher.update(&c.time.to_le_bytes());
        hasher.update(&c.open.to_le_bytes());
        hasher.update(&c.high.to_le_bytes());
        hasher.update(&c.low.to_le_bytes());
        hasher.update(&c.close.to_le_bytes());
        hasher.update(&c.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// BLAKE3 over the JSON form of any serializable configuration.
pub fn json_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

/// Identity of one backtest: engine version plus data and configuration hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFingerprint {
    pub engine_version: String,
    pub dataset_hash: String,
    pub config_hash: String,
    pub candle_count: usize,
}

impl RunFingerprint {
    pub fn new(candles: &[Candle], config: &BacktestConfig) -> Result<Self, serde_json::Error> {
        Ok(Self {
            engine_version: crate::ENGINE_VERSION.to_string(),
            dataset_hash: dataset_hash(candles),
            config_hash: json_hash(config)?,
            candle_count: candles.len(),
        })
    }

    /// First 12 hex characters of the config hash, for log lines and filenames.
    pub fn short_config(&self) -> &str {
        &self.config_hash[..self.config_hash.len().min(12)]
    }
}
