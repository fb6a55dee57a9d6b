//! Backtest configuration and its validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indicators::IndicatorPeriods;
use crate::position_management::{RiskConfig, SideFilter};
use crate::signals::DetectorPolicy;

/// Invalid configuration, reported at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid period `{name}`: {reason}")]
    InvalidPeriod { name: &'static str, reason: String },

    #[error("`{name}` = {value} is out of range, expected {expected}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// When a signal on bar `i` is filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTiming {
    /// Open of bar `i + 1`.
    #[default]
    NextBar,
    /// Close of bar `i`.
    Close,
}

impl ExecutionTiming {
    pub fn label(self) -> &'static str {
        match self {
            ExecutionTiming::NextBar => "next_bar",
            ExecutionTiming::Close => "close",
        }
    }
}

/// How the equity committed to a new position is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "units", rename_all = "snake_case")]
pub enum PositionSizing {
    /// Current equity × fraction, recomputed at every entry.
    #[default]
    Compounding,
    /// Start equity × fraction, fixed for the whole run.
    FixedEquity,
    /// A fixed quantity of the instrument; committed equity is `units × entry price`.
    FixedUnits(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub leverage: f64,
    /// Charged once per round trip on the notional.
    pub fee_bps_round_trip: f64,
    /// Adverse price offset applied to every fill.
    pub slippage_bps: f64,
    pub start_equity: f64,
    /// In (0, 1].
    pub position_fraction: f64,
    pub sizing: PositionSizing,
    /// Fewer candles than this skips the run.
    pub min_bars: usize,
    pub allow_liquidation: bool,
    pub execution: ExecutionTiming,
    pub side_filter: SideFilter,
    pub periods: IndicatorPeriods,
    pub policy: DetectorPolicy,
    pub risk: RiskConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            leverage: 5.0,
            fee_bps_round_trip: 12.0,
            slippage_bps: 0.0,
            start_equity: 100.0,
            position_fraction: 1.0,
            sizing: PositionSizing::Compounding,
            min_bars: 30,
            allow_liquidation: false,
            execution: ExecutionTiming::NextBar,
            side_filter: SideFilter::Both,
            periods: IndicatorPeriods::default(),
            policy: DetectorPolicy::default(),
            risk: RiskConfig::default(),
        }
    }
}

fn require(name: &'static str, value: f64, ok: bool, expected: &'static str) -> Result<(), ConfigError> {
    if value.is_finite() && ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            expected,
        })
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("leverage", self.leverage, self.leverage > 0.0, "> 0")?;
        require(
            "fee_bps_round_trip",
            self.fee_bps_round_trip,
            self.fee_bps_round_trip >= 0.0,
            ">= 0",
        )?;
        require(
            "slippage_bps",
            self.slippage_bps,
            (0.0..10_000.0).contains(&self.slippage_bps),
            "in [0, 10000)",
        )?;
        require(
            "start_equity",
            self.start_equity,
            self.start_equity > 0.0,
            "> 0",
        )?;
        require(
            "position_fraction",
            self.position_fraction,
            self.position_fraction > 0.0 && self.position_fraction <= 1.0,
            "in (0, 1]",
        )?;
        if let PositionSizing::FixedUnits(units) = self.sizing {
            require("units", units, units > 0.0, "> 0")?;
        }
        self.periods.validate()?;
        self.policy.validate()?;
        self.risk.validate()?;
        Ok(())
    }
}
