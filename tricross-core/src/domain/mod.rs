//! Domain types: candles, positions, trades.

pub mod candle;
pub mod position;
pub mod trade;

pub use candle::{closes, format_time, Candle};
pub use position::{Position, Side};
pub use trade::{ExitReason, Trade};
