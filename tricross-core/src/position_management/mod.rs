//! Position and risk management.
//!
//! - `risk`: stop-loss, take-profit and armed trailing stop levels
//! - `ratchet`: stops tighten, never loosen
//! - `manager`: per-bar entry/exit/flip decisions
pub mod manager;
pub mod ratchet;
pub mod risk;

pub use manager::{
    BarDecision, BarInput, EntryOrder, ExecutionFill, ExitOrder, PositionManager, SideFilter,
};
pub use ratchet::RatchetState;
pub use risk::{check_exit, RiskConfig, RiskExit, TakeProfit, TrailArm, TrailingConfig, TrailingStop};
