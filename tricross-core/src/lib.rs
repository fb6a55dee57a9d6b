//! Tricross Core: moving-average crossover signals and a leveraged backtester.
//!
//! This crate contains the engine and nothing that touches the network or disk:
//! - Domain types (candles, positions, trades)
//! - Fast EMA, slow EMA and mid SMA
//! - Cross detection: single-cross, dual-cross window, second evidence, live proximity
//! - Position management with stop-loss, take-profit and an armed trailing stop
//! - Bar-by-bar simulator with compounding equity, fees and a liquidation floor
//! - Run statistics and the two-decimal truncation output policy

pub mod data;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod format;
pub mod indicators;
pub mod metrics;
pub mod position_management;
pub mod signals;

/// Version stamped into every export.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
