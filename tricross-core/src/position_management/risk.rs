//! Stop-loss, take-profit and armed trailing stop.
//!
//! Intrabar order for a bar after the entry bar:
//! 1. effective stop (fixed or trailing, as of the bar open) against high/low
//! 2. take-profit against high/low
//! 3. trailing arm/anchor update from the bar's extremes, effective next bar

use serde::{Deserialize, Serialize};

use super::ratchet::RatchetState;
use crate::domain::{Candle, ExitReason, Position, Side};
use crate::engine::config::ConfigError;

/// Take-profit threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TakeProfit {
    /// Favourable price move, in percent.
    PricePct(f64),
    /// Leveraged equity move, in percent: hit when `priceMovePct × leverage >= pct`.
    EquityPct(f64),
}

/// Condition that arms a trailing stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailArm {
    /// Favourable move from entry, in percent.
    Pct(f64),
    /// Absolute price level.
    Price(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingConfig {
    /// `None` arms at entry.
    pub arm: Option<TrailArm>,
    /// Distance of the stop from the best price since arming, in percent.
    pub step_pct: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub stop_loss_pct: Option<f64>,
    pub take_profit: Option<TakeProfit>,
    pub trailing: Option<TrailingConfig>,
}

fn check_pct(name: &'static str, value: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value < max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            expected: "a positive percentage",
        })
    }
}

impl RiskConfig {
    /// Build from flag-style percentages where 0 disables a rule.
    pub fn from_flags(
        stop_loss_pct: f64,
        take_profit_pct: f64,
        take_profit_on_equity: bool,
        trail_arm_pct: f64,
        trail_arm_price: f64,
        trail_step_pct: f64,
    ) -> Self {
        let enabled = |v: f64| (v != 0.0).then_some(v);
        let take_profit = enabled(take_profit_pct).map(|pct| {
            if take_profit_on_equity {
                TakeProfit::EquityPct(pct)
            } else {
                TakeProfit::PricePct(pct)
            }
        });
        let arm = match (enabled(trail_arm_price), enabled(trail_arm_pct)) {
            (Some(px), _) => Some(TrailArm::Price(px)),
            (None, Some(pct)) => Some(TrailArm::Pct(pct)),
            (None, None) => None,
        };
        let trailing = enabled(trail_step_pct).map(|step_pct| TrailingConfig { arm, step_pct });
        Self {
            stop_loss_pct: enabled(stop_loss_pct),
            take_profit,
            trailing,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(sl) = self.stop_loss_pct {
            check_pct("stop_loss_pct", sl, 100.0)?;
        }
        match self.take_profit {
            Some(TakeProfit::PricePct(p)) => check_pct("take_profit_pct", p, f64::INFINITY)?,
            Some(TakeProfit::EquityPct(p)) => check_pct("take_profit_equity_pct", p, f64::INFINITY)?,
            None => {}
        }
        if let Some(trailing) = &self.trailing {
            check_pct("trail_step_pct", trailing.step_pct, 100.0)?;
            match trailing.arm {
                Some(TrailArm::Pct(p)) => check_pct("trail_arm_pct", p, f64::INFINITY)?,
                Some(TrailArm::Price(px)) => check_pct("trail_arm_price", px, f64::INFINITY)?,
                None => {}
            }
        }
        Ok(())
    }

    /// Fixed stop level for a new position.
    pub fn stop_price(&self, side: Side, entry_price: f64) -> Option<f64> {
        self.stop_loss_pct
            .map(|pct| entry_price * (1.0 - side.sign() * pct / 100.0))
    }

    /// Take-profit level for a new position.
    pub fn take_profit_price(&self, side: Side, entry_price: f64, leverage: f64) -> Option<f64> {
        let move_pct = match self.take_profit? {
            TakeProfit::PricePct(pct) => pct,
            TakeProfit::EquityPct(pct) if leverage > 0.0 => pct / leverage,
            TakeProfit::EquityPct(_) => return None,
        };
        Some(entry_price * (1.0 + side.sign() * move_pct / 100.0))
    }

    pub fn trailing_stop(&self, side: Side, entry_price: f64) -> Option<TrailingStop> {
        self.trailing
            .as_ref()
            .map(|cfg| TrailingStop::new(cfg, side, entry_price))
    }
}

/// Trailing stop state for one open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    side: Side,
    /// Price that arms the trail; `None` once armed or when armed at entry.
    arm_level: Option<f64>,
    step_pct: f64,
    armed: bool,
    /// Best favourable price seen since arming.
    anchor: Option<f64>,
    ratchet: RatchetState,
}

impl TrailingStop {
    pub fn new(config: &TrailingConfig, side: Side, entry_price: f64) -> Self {
        let arm_level = config.arm.map(|arm| match arm {
            TrailArm::Pct(pct) => entry_price * (1.0 + side.sign() * pct / 100.0),
            TrailArm::Price(px) => px,
        });
        let mut trail = Self {
            side,
            arm_level,
            step_pct: config.step_pct,
            armed: false,
            anchor: None,
            ratchet: RatchetState::new(side),
        };
        if arm_level.is_none() {
            trail.arm_at(entry_price);
        }
        trail
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn arm_level(&self) -> Option<f64> {
        self.arm_level
    }

    pub fn step_pct(&self) -> f64 {
        self.step_pct
    }

    pub fn anchor(&self) -> Option<f64> {
        self.anchor
    }

    /// Current stop, once armed.
    pub fn current_stop(&self) -> Option<f64> {
        if self.armed {
            self.ratchet.current_level()
        } else {
            None
        }
    }

    /// Fold a candle's favourable extreme into the trail.
    pub fn observe(&mut self, candle: &Candle) {
        let favourable = match self.side {
            Side::Long => candle.high,
            Side::Short => candle.low,
        };
        if !self.armed {
            let reached = match (self.arm_level, self.side) {
                (Some(level), Side::Long) => favourable >= level,
                (Some(level), Side::Short) => favourable <= level,
                (None, _) => true,
            };
            if !reached {
                return;
            }
        }
        self.arm_at(favourable);
    }

    fn arm_at(&mut self, price: f64) {
        self.armed = true;
        let anchor = match (self.anchor, self.side) {
            (None, _) => price,
            (Some(a), Side::Long) => a.max(price),
            (Some(a), Side::Short) => a.min(price),
        };
        self.anchor = Some(anchor);
        let proposed = anchor * (1.0 - self.side.sign() * self.step_pct / 100.0);
        self.ratchet.apply(proposed);
    }
}

/// A stop or target hit inside a bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskExit {
    pub price: f64,
    pub reason: ExitReason,
}

/// Stop first, then target. Fills at the level, or at the open when the bar gapped through it.
pub fn check_exit(position: &Position, candle: &Candle) -> Option<RiskExit> {
    if let Some(stop) = position.effective_stop() {
        let hit = match position.side {
            Side::Long => candle.low <= stop,
            Side::Short => candle.high >= stop,
        };
        if hit {
            let price = match position.side {
                Side::Long => candle.open.min(stop),
                Side::Short => candle.open.max(stop),
            };
            let reason = if position.trailing_stop() == Some(stop) {
                ExitReason::TrailingStop
            } else {
                ExitReason::StopLoss
            };
            return Some(RiskExit { price, reason });
        }
    }

    if let Some(target) = position.take_profit_price {
        let hit = match position.side {
            Side::Long => candle.high >= target,
            Side::Short => candle.low <= target,
        };
        if hit {
            let price = match position.side {
                Side::Long => candle.open.max(target),
                Side::Short => candle.open.min(target),
            };
            return Some(RiskExit {
                price,
                reason: ExitReason::TakeProfit,
            });
        }
    }

    None
}
