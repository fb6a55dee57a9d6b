//! Tricross Runner: everything around the engine that touches the outside world.
//!
//! This crate builds on `tricross-core` to provide:
//! - TOML run configuration and deterministic run ids
//! - Candle sources: Binance, Bybit, local CSV, synthetic
//! - Loading with canonicalisation and dataset hashing
//! - Row export (per trade or per bar) and JSON reports
//! - Parallel multi-symbol live monitoring with persisted state

pub mod config;
pub mod data_loader;
pub mod export;
pub mod monitor;
pub mod runner;
pub mod sources;

pub use config::{
    Exchange, MarketKind, PolicyKind, RowMode, RunConfig, RunConfigError, RunId, SizingMode,
    TakeProfitMode,
};
pub use data_loader::{load_candles, load_from, LoadError, LoadedCandles};
pub use export::{CsvFileSink, ExportTable, RowSink, CROSS_DIST_COLUMN};
pub use monitor::{monitor_symbols, MonitorBook, SymbolUpdate};
pub use runner::{
    run_backtest, run_on_candles, short_id, RunError, RunReport, SCHEMA_VERSION,
};
pub use sources::{normalize_symbol, source_for, CandleSource, SourceError};
