//! Backtest runner: load candles, replay them, package the report.
//!
//! Two entry points:
//! - `run_backtest()`: fetches through the configured source. Used by the CLI.
//! - `run_on_candles()`: takes pre-loaded candles, no I/O. Used by tests and
//!   anything that already holds data.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tricross_core::engine::{BacktestConfig, BacktestResult, Backtester, EngineError};
use tricross_core::fingerprint::RunFingerprint;

use crate::config::{RunConfig, RunConfigError, RunId};
use crate::data_loader::{load_candles, LoadError, LoadedCandles};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] RunConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("cannot hash configuration: {0}")]
    Hash(#[from] serde_json::Error),
}

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

/// Default schema version for reports written before the field existed.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Complete record of one backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub fingerprint: RunFingerprint,
    pub symbol: String,
    pub exchange: String,
    pub market: String,
    pub timeframe: String,
    pub source: String,
    /// The engine configuration exactly as replayed.
    pub config: BacktestConfig,
    pub result: BacktestResult,
}

impl RunReport {
    pub fn warmup_bars(&self) -> usize {
        self.config.periods.warmup()
    }
}

/// Fetch candles for `config.market` and run.
pub fn run_backtest(config: &RunConfig) -> Result<RunReport, RunError> {
    let loaded = load_candles(&config.market)?;
    run_on_candles(config, &loaded)
}

/// Run on candles that are already loaded.
pub fn run_on_candles(config: &RunConfig, loaded: &LoadedCandles) -> Result<RunReport, RunError> {
    let engine_config = config.backtest_config();
    let backtester = Backtester::new(engine_config).map_err(EngineError::from)?;
    let run_id = config.run_id()?;

    let result = backtester.run(&loaded.candles)?;
    let fingerprint = RunFingerprint::new(&result.candles, backtester.config())?;

    match &result.skipped {
        Some(note) => tracing::warn!(symbol = %loaded.symbol, %note, "backtest skipped"),
        None => tracing::info!(
            symbol = %loaded.symbol,
            run_id = %short_id(&run_id),
            config = %fingerprint.short_config(),
            trades = result.stats.trade_count,
            final_equity = result.stats.final_equity,
            "backtest complete"
        ),
    }

    Ok(RunReport {
        schema_version: SCHEMA_VERSION,
        run_id,
        fingerprint,
        symbol: loaded.symbol.clone(),
        exchange: config.market.exchange.label().to_string(),
        market: config.market.market.label().to_string(),
        timeframe: config.market.timeframe.clone(),
        source: loaded.source.clone(),
        config: backtester.config().clone(),
        result,
    })
}

/// Leading 12 characters of a run id, for logs and summaries.
pub fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}
