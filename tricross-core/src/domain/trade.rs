//! Trade: a completed round trip with signal traceability.

use serde::{Deserialize, Serialize};

use super::position::Side;
use crate::signals::EntrySignal;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// A single contrary cross with no full opposite signal on that bar.
    Signal,
    /// A contrary cross that coincided with a full opposite signal; the position reversed.
    Flip,
    StopLoss,
    TrailingStop,
    TakeProfit,
}

impl ExitReason {
    pub fn label(self) -> &'static str {
        match self {
            ExitReason::Signal => "signal",
            ExitReason::Flip => "flip",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::TakeProfit => "take_profit",
        }
    }
}

/// Immutable record of a closed position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    // ── Entry ──
    pub side: Side,
    pub entry_index: usize,
    pub entry_time: i64,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_index: usize,
    pub exit_time: i64,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── Size ──
    pub size_equity: f64,
    pub notional: f64,

    // ── PnL ──
    pub gross_return: f64,
    pub pnl_before_fees: f64,
    /// Round-trip fee, charged once.
    pub fees: f64,
    pub pnl_net: f64,
    pub equity_after: f64,

    // ── Signal traceability ──
    pub signal: EntrySignal,
    /// Latest fast/slow cross at or before the exit bar.
    pub last_fast_slow_cross: Option<usize>,
    /// Latest fast/mid cross at or before the exit bar.
    pub last_fast_mid_cross: Option<usize>,
}

impl Trade {
    pub fn bars_held(&self) -> usize {
        self.exit_index.saturating_sub(self.entry_index)
    }

    pub fn is_winner(&self) -> bool {
        self.pnl_net > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.pnl_net < 0.0
    }

    /// Bars between the first cross evidence and the confirming cross.
    pub fn cross_dist_bars(&self) -> usize {
        self.signal.cross_dist_bars()
    }
}
