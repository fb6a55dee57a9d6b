//! TOML run configuration.
//!
//! A run file has six sections; every key is optional and falls back to the
//! defaults below:
//!
//! ```toml
//! [market]
//! exchange = "binance"     # binance | bybit | csv | synthetic
//! market = "spot"          # spot | perp
//! symbol = "ETH"
//! limit = 1200
//!
//! [strategy]
//! policy = "dual_cross"    # single_cross | dual_cross | second_evidence | live_proximity
//! open_window = 5
//!
//! [backtest]
//! cap = 100.0
//! alloc_pct = 100.0
//! leverage = 5.0
//!
//! [risk]
//! sl_pct = 0.5
//! trail_step_pct = 0.3
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tricross_core::engine::{BacktestConfig, ConfigError, ExecutionTiming, PositionSizing};
use tricross_core::fingerprint::json_hash;
use tricross_core::indicators::IndicatorPeriods;
use tricross_core::position_management::{RiskConfig, SideFilter};
use tricross_core::signals::{DetectorPolicy, LiveConfig};

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    #[default]
    Binance,
    Bybit,
    /// Local file, see `MarketSection::csv_path`.
    Csv,
    /// Seeded random walk, for development.
    Synthetic,
}

impl Exchange {
    pub fn label(self) -> &'static str {
        match self {
            Exchange::Binance => "binance",
            Exchange::Bybit => "bybit",
            Exchange::Csv => "csv",
            Exchange::Synthetic => "synthetic",
        }
    }
}

impl std::str::FromStr for Exchange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Exchange::Binance),
            "bybit" => Ok(Exchange::Bybit),
            "csv" | "local" => Ok(Exchange::Csv),
            "synthetic" => Ok(Exchange::Synthetic),
            other => Err(format!("unknown exchange '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    #[default]
    Spot,
    /// Linear perpetual futures.
    Perp,
}

impl MarketKind {
    pub fn label(self) -> &'static str {
        match self {
            MarketKind::Spot => "spot",
            MarketKind::Perp => "perp",
        }
    }
}

impl std::str::FromStr for MarketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spot" => Ok(MarketKind::Spot),
            "perp" | "perps" | "futures" | "linear" => Ok(MarketKind::Perp),
            other => Err(format!("unknown market '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSection {
    pub exchange: Exchange,
    pub market: MarketKind,
    pub symbol: String,
    /// Candle interval; only `1m` is fetched by the network sources.
    pub timeframe: String,
    /// Number of most recent candles.
    pub limit: usize,
    pub csv_path: Option<PathBuf>,
}

impl Default for MarketSection {
    fn default() -> Self {
        Self {
            exchange: Exchange::Binance,
            market: MarketKind::Spot,
            symbol: "BTCUSDT".into(),
            timeframe: "1m".into(),
            limit: 1200,
            csv_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    SingleCross,
    #[default]
    DualCross,
    SecondEvidence,
    LiveProximity,
}

impl std::str::FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "single_cross" | "single" | "onecross" => Ok(PolicyKind::SingleCross),
            "dual_cross" | "dual" | "dualcross" => Ok(PolicyKind::DualCross),
            "second_evidence" | "second" => Ok(PolicyKind::SecondEvidence),
            "live_proximity" | "live" => Ok(PolicyKind::LiveProximity),
            other => Err(format!("unknown policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySection {
    pub policy: PolicyKind,
    /// Dual-cross window in bars; 0 requires the same bar.
    pub open_window: usize,
    pub fast: usize,
    pub slow: usize,
    pub mid: usize,
}

impl Default for StrategySection {
    fn default() -> Self {
        let periods = IndicatorPeriods::default();
        Self {
            policy: PolicyKind::DualCross,
            open_window: 5,
            fast: periods.fast,
            slow: periods.slow,
            mid: periods.mid,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMode {
    #[default]
    Compounding,
    FixedEquity,
    FixedUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    /// Starting capital.
    pub cap: f64,
    /// Position fraction, in percent of equity.
    pub alloc_pct: f64,
    pub leverage: f64,
    pub fee_bps: f64,
    pub slippage_bps: f64,
    pub sizing: SizingMode,
    /// Units per trade for `fixed_units`.
    pub qty: f64,
    pub min_bars: usize,
    pub allow_liquidation: bool,
    pub execution: ExecutionTiming,
    pub side: SideFilter,
}

impl Default for BacktestSection {
    fn default() -> Self {
        let engine = BacktestConfig::default();
        Self {
            cap: engine.start_equity,
            alloc_pct: engine.position_fraction * 100.0,
            leverage: engine.leverage,
            fee_bps: engine.fee_bps_round_trip,
            slippage_bps: engine.slippage_bps,
            sizing: SizingMode::Compounding,
            qty: 0.0,
            min_bars: engine.min_bars,
            allow_liquidation: engine.allow_liquidation,
            execution: engine.execution,
            side: engine.side_filter,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TakeProfitMode {
    /// Percent move of price.
    #[default]
    Price,
    /// Percent move of leveraged equity.
    Equity,
}

/// Flag-style risk settings; 0 disables a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    pub sl_pct: f64,
    pub tp_pct: f64,
    pub tp_mode: TakeProfitMode,
    pub trail_arm_pct: f64,
    pub trail_arm_px: f64,
    pub trail_step_pct: f64,
}

impl RiskSection {
    pub fn to_risk_config(&self) -> RiskConfig {
        RiskConfig::from_flags(
            self.sl_pct,
            self.tp_pct,
            self.tp_mode == TakeProfitMode::Equity,
            self.trail_arm_pct,
            self.trail_arm_px,
            self.trail_step_pct,
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowMode {
    /// One row per closed trade.
    #[default]
    Trades,
    /// One row per candle.
    Bars,
}

impl std::str::FromStr for RowMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trades" | "trade" => Ok(RowMode::Trades),
            "bars" | "bar" => Ok(RowMode::Bars),
            other => Err(format!("unknown row mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// CSV export path.
    pub outfile: Option<PathBuf>,
    /// JSON report path.
    pub json: Option<PathBuf>,
    pub rows: RowMode,
}

/// Complete, file-backed run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub market: MarketSection,
    pub strategy: StrategySection,
    pub backtest: BacktestSection,
    pub risk: RiskSection,
    pub monitor: LiveConfig,
    pub output: OutputSection,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, RunConfigError> {
        let config: RunConfig = toml::from_str(text)?;
        config.backtest_config().validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, RunConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| RunConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn periods(&self) -> IndicatorPeriods {
        IndicatorPeriods {
            fast: self.strategy.fast,
            slow: self.strategy.slow,
            mid: self.strategy.mid,
        }
    }

    pub fn policy(&self) -> DetectorPolicy {
        match self.strategy.policy {
            PolicyKind::SingleCross => DetectorPolicy::SingleCross,
            PolicyKind::DualCross => DetectorPolicy::DualCross {
                open_window: self.strategy.open_window,
            },
            PolicyKind::SecondEvidence => DetectorPolicy::SecondEvidence,
            PolicyKind::LiveProximity => DetectorPolicy::LiveProximity(self.monitor.clone()),
        }
    }

    /// The engine configuration this file resolves to. Not yet validated.
    pub fn backtest_config(&self) -> BacktestConfig {
        let b = &self.backtest;
        let sizing = match b.sizing {
            SizingMode::Compounding => PositionSizing::Compounding,
            SizingMode::FixedEquity => PositionSizing::FixedEquity,
            SizingMode::FixedUnits => PositionSizing::FixedUnits(b.qty),
        };
        BacktestConfig {
            leverage: b.leverage,
            fee_bps_round_trip: b.fee_bps,
            slippage_bps: b.slippage_bps,
            start_equity: b.cap,
            position_fraction: b.alloc_pct / 100.0,
            sizing,
            min_bars: b.min_bars,
            allow_liquidation: b.allow_liquidation,
            execution: b.execution,
            side_filter: b.side,
            periods: self.periods(),
            policy: self.policy(),
            risk: self.risk.to_risk_config(),
        }
    }

    /// Deterministic hash of what determines the result: market selection and
    /// the resolved engine configuration. Output paths do not count.
    pub fn run_id(&self) -> Result<RunId, serde_json::Error> {
        json_hash(&(&self.market, self.backtest_config()))
    }
}
