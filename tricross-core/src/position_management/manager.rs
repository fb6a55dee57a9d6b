//! Per-bar position decisions.
//!
//! The manager never touches equity. It returns what should happen on a bar
//! (exit, entry, or both for a flip) and the simulator settles it.

use serde::{Deserialize, Serialize};

use super::risk::{check_exit, RiskConfig};
use crate::domain::{Candle, ExitReason, Position, Side};
use crate::signals::{BarSignal, EntrySignal};

/// Which directions may be opened. Exits are never filtered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideFilter {
    #[default]
    Both,
    LongOnly,
    ShortOnly,
}

impl SideFilter {
    pub fn allows(self, side: Side) -> bool {
        match self {
            SideFilter::Both => true,
            SideFilter::LongOnly => side == Side::Long,
            SideFilter::ShortOnly => side == Side::Short,
        }
    }
}

/// Where a signal on this bar would fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionFill {
    pub index: usize,
    pub time: i64,
    pub price: f64,
}

/// Inputs for one bar.
#[derive(Debug, Clone, Copy)]
pub struct BarInput<'a> {
    pub index: usize,
    pub candle: &'a Candle,
    /// `None` when the execution bar lies beyond the data.
    pub execution: Option<ExecutionFill>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitOrder {
    pub fill: ExecutionFill,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryOrder {
    pub fill: ExecutionFill,
    pub signal: EntrySignal,
}

/// What to do on a bar. Exit and entry together is a flip.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BarDecision {
    pub exit: Option<ExitOrder>,
    pub entry: Option<EntryOrder>,
}

impl BarDecision {
    pub fn is_empty(&self) -> bool {
        self.exit.is_none() && self.entry.is_none()
    }
}

/// Entry, exit and flip rules shared by every detector policy.
#[derive(Debug, Clone)]
pub struct PositionManager {
    risk: RiskConfig,
    side_filter: SideFilter,
    leverage: f64,
}

impl PositionManager {
    pub fn new(risk: RiskConfig, side_filter: SideFilter, leverage: f64) -> Self {
        Self {
            risk,
            side_filter,
            leverage,
        }
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    /// Build the position for a filled entry.
    pub fn open(&self, order: &EntryOrder, entry_price: f64, size_equity: f64) -> Position {
        let side = order.signal.side;
        Position {
            side,
            entry_index: order.fill.index,
            entry_time: order.fill.time,
            entry_price,
            size_equity,
            notional: size_equity * self.leverage,
            stop_price: self.risk.stop_price(side, entry_price),
            take_profit_price: self.risk.take_profit_price(side, entry_price, self.leverage),
            trailing: self.risk.trailing_stop(side, entry_price),
            signal: order.signal,
            pending_opposite: false,
        }
    }

    /// Decide the bar.
    ///
    /// Stops and targets are checked first, on bars after the entry bar, and
    /// block any entry on the same bar. Then any single contrary cross closes
    /// the position; it reverses only when a full opposite signal is present.
    pub fn on_bar(
        &self,
        position: Option<&mut Position>,
        bar: &BarInput<'_>,
        signal: &BarSignal,
    ) -> BarDecision {
        let Some(pos) = position else {
            let entry = self.allowed_entry(signal).zip(bar.execution);
            return BarDecision {
                exit: None,
                entry: entry.map(|(signal, fill)| EntryOrder { fill, signal }),
            };
        };

        if bar.index > pos.entry_index {
            if let Some(hit) = check_exit(pos, bar.candle) {
                return BarDecision {
                    exit: Some(ExitOrder {
                        fill: ExecutionFill {
                            index: bar.index,
                            time: bar.candle.time,
                            price: hit.price,
                        },
                        reason: hit.reason,
                    }),
                    entry: None,
                };
            }
            if let Some(trail) = pos.trailing.as_mut() {
                trail.observe(bar.candle);
            }
        }

        let Some(fill) = bar.execution else {
            return BarDecision::default();
        };
        if !signal.crosses.contrary_to(pos.side) {
            return BarDecision::default();
        }

        let reverse = self
            .allowed_entry(signal)
            .filter(|entry| entry.side == pos.side.opposite());
        BarDecision {
            exit: Some(ExitOrder {
                fill,
                reason: if reverse.is_some() {
                    ExitReason::Flip
                } else {
                    ExitReason::Signal
                },
            }),
            entry: reverse.map(|signal| EntryOrder { fill, signal }),
        }
    }

    fn allowed_entry(&self, signal: &BarSignal) -> Option<EntrySignal> {
        signal.entry.filter(|e| self.side_filter.allows(e.side))
    }
}
