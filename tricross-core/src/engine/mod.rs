//! Backtesting engine: bar-by-bar replay of one symbol.
//!
//! - `config`: `BacktestConfig` and its validation
//! - `accounting`: the equity ledger (sizing, fees, slippage, liquidation floor)
//! - `simulator`: the replay loop that drives the position manager

pub mod accounting;
pub mod config;
pub mod simulator;

pub use accounting::EquityLedger;
pub use config::{BacktestConfig, ConfigError, ExecutionTiming, PositionSizing};
pub use simulator::{run, BacktestResult, Backtester, EngineError};
