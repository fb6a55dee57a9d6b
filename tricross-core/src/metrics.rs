//! Run statistics: pure functions over the trade list and equity curve.

use serde::{Deserialize, Serialize};

use crate::domain::{Side, Trade};

/// Summary of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestStats {
    pub trade_count: usize,
    /// Trades with `pnl_net > 0`.
    pub win_count: usize,
    /// Trades with `pnl_net < 0`. Breakeven trades count as neither.
    pub loss_count: usize,
    pub long_count: usize,
    pub short_count: usize,
    pub win_rate_pct: f64,
    pub avg_trade_pnl: f64,
    pub total_pnl: f64,
    pub total_fees: f64,
    /// Largest peak-to-trough drop of the equity curve, in currency.
    pub max_drawdown: f64,
    /// The same drop as a percentage of its peak.
    pub max_drawdown_pct: f64,
    pub total_return_pct: f64,
    pub start_equity: f64,
    pub final_equity: f64,
    pub avg_bars_held: f64,
    /// Gross profit / gross loss; `None` without losing trades.
    pub profit_factor: Option<f64>,
}

impl BacktestStats {
    pub fn compute(trades: &[Trade], equity_curve: &[f64], start_equity: f64) -> Self {
        let final_equity = equity_curve.last().copied().unwrap_or(start_equity);
        let (max_drawdown, max_drawdown_pct) = max_drawdown(equity_curve);
        Self {
            trade_count: trades.len(),
            win_count: trades.iter().filter(|t| t.is_winner()).count(),
            loss_count: trades.iter().filter(|t| t.is_loser()).count(),
            long_count: trades.iter().filter(|t| t.side == Side::Long).count(),
            short_count: trades.iter().filter(|t| t.side == Side::Short).count(),
            win_rate_pct: win_rate_pct(trades),
            avg_trade_pnl: avg_trade_pnl(trades),
            total_pnl: total_pnl(trades),
            total_fees: trades.iter().map(|t| t.fees).sum(),
            max_drawdown,
            max_drawdown_pct,
            total_return_pct: total_return_pct(start_equity, final_equity),
            start_equity,
            final_equity,
            avg_bars_held: avg_bars_held(trades),
            profit_factor: profit_factor(trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

pub fn total_pnl(trades: &[Trade]) -> f64 {
    trades.iter().map(|t| t.pnl_net).sum()
}

pub fn avg_trade_pnl(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    total_pnl(trades) / trades.len() as f64
}

/// Winners as a percentage of all trades.
pub fn win_rate_pct(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades.iter().filter(|t| t.is_winner()).count();
    wins as f64 / trades.len() as f64 * 100.0
}

/// Change from start to final equity, in percent of start.
pub fn total_return_pct(start_equity: f64, final_equity: f64) -> f64 {
    if start_equity <= 0.0 {
        return 0.0;
    }
    (final_equity - start_equity) / start_equity * 100.0
}

/// Maximum drawdown as `(amount, percent of peak)`, both non-negative.
///
/// The amount and the percentage are tracked independently, so each is the
/// worst of its own kind.
pub fn max_drawdown(equity_curve: &[f64]) -> (f64, f64) {
    let Some(&first) = equity_curve.first() else {
        return (0.0, 0.0);
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_dd_pct = 0.0_f64;

    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        let dd = peak - eq;
        max_dd = max_dd.max(dd);
        if peak > 0.0 {
            max_dd_pct = max_dd_pct.max(dd / peak * 100.0);
        }
    }
    (max_dd, max_dd_pct)
}

pub fn avg_bars_held(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.bars_held() as f64).sum::<f64>() / trades.len() as f64
}

/// Gross profit divided by gross loss.
pub fn profit_factor(trades: &[Trade]) -> Option<f64> {
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.pnl_net > 0.0)
        .map(|t| t.pnl_net)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.pnl_net < 0.0)
        .map(|t| t.pnl_net.abs())
        .sum();

    if gross_loss <= 0.0 {
        return None;
    }
    Some(gross_profit / gross_loss)
}
