use serde::{Deserialize, Serialize};

use crate::position_management::risk::TrailingStop;
use crate::signals::{BarSignal, EntrySignal};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// An open position. Exists only while a trade is open and is owned by the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_index: usize,
    pub entry_time: i64,
    pub entry_price: f64,
    /// Equity committed at entry (before leverage).
    pub size_equity: f64,
    /// Leveraged exposure: `size_equity × leverage`.
    pub notional: f64,
    /// Fixed stop-loss level, if configured.
    pub stop_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub trailing: Option<TrailingStop>,
    /// The signal that opened this position.
    pub signal: EntrySignal,
    /// Mirrors the detector: a contrary cross is waiting for confirmation.
    /// Read-only for the position manager.
    #[serde(default)]
    pub pending_opposite: bool,
}

impl Position {
    /// Unrealized pnl at `price`, before fees.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.notional * self.gross_return(price)
    }

    /// `(price / entry − 1) × direction`.
    pub fn gross_return(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price / self.entry_price - 1.0) * self.side.sign()
    }

    /// Armed trailing stop level, if any.
    pub fn trailing_stop(&self) -> Option<f64> {
        self.trailing.as_ref().and_then(TrailingStop::current_stop)
    }

    /// Copy the detector's view of this bar onto the position.
    pub fn observe_signal(&mut self, signal: &BarSignal) {
        self.pending_opposite = signal.pending_opposite;
    }

    /// The tighter of the fixed stop and the armed trailing stop.
    pub fn effective_stop(&self) -> Option<f64> {
        match (self.stop_price, self.trailing_stop()) {
            (Some(fixed), Some(trail)) => Some(match self.side {
                Side::Long => fixed.max(trail),
                Side::Short => fixed.min(trail),
            }),
            (fixed, trail) => fixed.or(trail),
        }
    }
}
