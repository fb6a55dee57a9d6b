//! Equity ledger: sizing, fills with slippage, fees and the liquidation floor.

use tracing::trace;

use super::config::{BacktestConfig, PositionSizing};
use crate::domain::{ExitReason, Position, Side, Trade};

/// Account equity for a single symbol run.
#[derive(Debug, Clone)]
pub struct EquityLedger {
    start_equity: f64,
    equity: f64,
    fraction: f64,
    sizing: PositionSizing,
    fee_bps_round_trip: f64,
    slippage_bps: f64,
    allow_liquidation: bool,
    fees_paid: f64,
}

impl EquityLedger {
    pub fn new(config: &BacktestConfig) -> Self {
        Self {
            start_equity: config.start_equity,
            equity: config.start_equity,
            fraction: config.position_fraction,
            sizing: config.sizing,
            fee_bps_round_trip: config.fee_bps_round_trip,
            slippage_bps: config.slippage_bps,
            allow_liquidation: config.allow_liquidation,
            fees_paid: 0.0,
        }
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn fees_paid(&self) -> f64 {
        self.fees_paid
    }

    /// Equity committed to a new position at `entry_price`. Zero or less means skip.
    pub fn size_for_entry(&self, entry_price: f64) -> f64 {
        let size = match self.sizing {
            PositionSizing::Compounding => self.equity * self.fraction,
            PositionSizing::FixedEquity => self.start_equity * self.fraction,
            PositionSizing::FixedUnits(units) => units * entry_price,
        };
        if size.is_finite() {
            size.max(0.0)
        } else {
            0.0
        }
    }

    /// Entry fill: the raw price moved against the new position.
    pub fn entry_price(&self, side: Side, raw: f64) -> f64 {
        raw * (1.0 + side.sign() * self.slippage_bps / 10_000.0)
    }

    /// Exit fill: the raw price moved against the closing position.
    pub fn exit_price(&self, side: Side, raw: f64) -> f64 {
        raw * (1.0 - side.sign() * self.slippage_bps / 10_000.0)
    }

    /// Close `position` at `exit_price` (already slipped) and book the trade.
    ///
    /// The round-trip fee is charged once, here, on the notional.
    pub fn settle(
        &mut self,
        position: &Position,
        exit_index: usize,
        exit_time: i64,
        exit_price: f64,
        exit_reason: ExitReason,
        last_crosses: (Option<usize>, Option<usize>),
    ) -> Trade {
        let gross_return = position.gross_return(exit_price);
        let pnl_before_fees = position.notional * gross_return;
        let fees = position.notional * self.fee_bps_round_trip / 10_000.0;
        let mut pnl_net = pnl_before_fees - fees;
        if !self.allow_liquidation && self.equity + pnl_net < 0.0 {
            trace!(equity = self.equity, pnl_net, "loss clamped at liquidation");
            pnl_net = -self.equity;
        }
        self.equity += pnl_net;
        self.fees_paid += fees;

        Trade {
            side: position.side,
            entry_index: position.entry_index,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            exit_index,
            exit_time,
            exit_price,
            exit_reason,
            size_equity: position.size_equity,
            notional: position.notional,
            gross_return,
            pnl_before_fees,
            fees,
            pnl_net,
            equity_after: self.equity,
            signal: position.signal,
            last_fast_slow_cross: last_crosses.0,
            last_fast_mid_cross: last_crosses.1,
        }
    }

    /// Equity-curve value for bar `index` closing at `close`.
    ///
    /// An open position is marked to market only from its entry bar on; no
    /// exit fee is charged.
    pub fn mark(&self, position: Option<&Position>, index: usize, close: f64) -> f64 {
        let value = match position {
            Some(pos) if pos.entry_index <= index => self.equity + pos.unrealized_pnl(close),
            _ => self.equity,
        };
        if self.allow_liquidation {
            value
        } else {
            value.max(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;
    use crate::signals::{CrossPair, EntrySignal};

    fn position(side: Side, entry_price: f64, size_equity: f64, leverage: f64) -> Position {
        Position {
            side,
            entry_index: 2,
            entry_time: 0,
            entry_price,
            size_equity,
            notional: size_equity * leverage,
            stop_price: None,
            take_profit_price: None,
            trailing: None,
            signal: EntrySignal::single(side, CrossPair::FastSlow, 1, 0),
            pending_opposite: false,
        }
    }

    #[test]
    fn fee_charged_once_on_notional() {
        let mut ledger = EquityLedger::new(&BacktestConfig::default());
        let pos = position(Side::Long, 100.0, 100.0, 5.0);
        let trade = ledger.settle(&pos, 9, 0, 110.0, ExitReason::Signal, (None, None));
        assert_approx(trade.gross_return, 0.1, 1e-12);
        assert_approx(trade.pnl_before_fees, 50.0, 1e-9);
        assert_approx(trade.fees, 0.6, 1e-12);
        assert_approx(trade.pnl_net, 49.4, 1e-9);
        assert_approx(ledger.equity(), 149.4, 1e-9);
        assert_approx(trade.equity_after, 149.4, 1e-9);
    }

    #[test]
    fn loss_clamped_to_zero_equity() {
        let mut ledger = EquityLedger::new(&BacktestConfig::default());
        let pos = position(Side::Long, 100.0, 100.0, 5.0);
        // -30% price move at 5x wipes 150 from 100 equity
        let trade = ledger.settle(&pos, 9, 0, 70.0, ExitReason::StopLoss, (None, None));
        assert_approx(trade.pnl_net, -100.0, 1e-12);
        assert_eq!(ledger.equity(), 0.0);
    }

    #[test]
    fn liquidation_allowed_goes_negative() {
        let config = BacktestConfig {
            allow_liquidation: true,
            ..Default::default()
        };
        let mut ledger = EquityLedger::new(&config);
        let pos = position(Side::Long, 100.0, 100.0, 5.0);
        ledger.settle(&pos, 9, 0, 70.0, ExitReason::StopLoss, (None, None));
        assert!(ledger.equity() < 0.0);
        assert!(ledger.mark(None, 10, 70.0) < 0.0);
    }

    #[test]
    fn sizing_modes() {
        let mut ledger = EquityLedger::new(&BacktestConfig {
            position_fraction: 0.5,
            ..Default::default()
        });
        assert_approx(ledger.size_for_entry(100.0), 50.0, 1e-12);
        let pos = position(Side::Long, 100.0, 50.0, 5.0);
        ledger.settle(&pos, 9, 0, 120.0, ExitReason::Signal, (None, None));
        // 50*5*0.2 - 250*0.0012 = 49.7
        assert_approx(ledger.size_for_entry(100.0), 74.85, 1e-9);

        let fixed = EquityLedger::new(&BacktestConfig {
            position_fraction: 0.5,
            sizing: PositionSizing::FixedEquity,
            ..Default::default()
        });
        assert_approx(fixed.size_for_entry(100.0), 50.0, 1e-12);

        let units = EquityLedger::new(&BacktestConfig {
            sizing: PositionSizing::FixedUnits(0.25),
            ..Default::default()
        });
        assert_approx(units.size_for_entry(80.0), 20.0, 1e-12);
    }

    #[test]
    fn slippage_is_adverse_both_ways() {
        let ledger = EquityLedger::new(&BacktestConfig {
            slippage_bps: 10.0,
            ..Default::default()
        });
        assert_approx(ledger.entry_price(Side::Long, 100.0), 100.1, 1e-9);
        assert_approx(ledger.exit_price(Side::Long, 100.0), 99.9, 1e-9);
        assert_approx(ledger.entry_price(Side::Short, 100.0), 99.9, 1e-9);
        assert_approx(ledger.exit_price(Side::Short, 100.0), 100.1, 1e-9);
    }

    #[test]
    fn mark_ignores_position_before_entry_bar() {
        let ledger = EquityLedger::new(&BacktestConfig::default());
        let pos = position(Side::Short, 100.0, 100.0, 5.0);
        assert_eq!(ledger.mark(Some(&pos), 1, 90.0), 100.0);
        assert_approx(ledger.mark(Some(&pos), 2, 90.0), 150.0, 1e-9);
        // Mark-to-market floors at zero
        assert_eq!(ledger.mark(Some(&pos), 3, 200.0), 0.0);
    }
}
