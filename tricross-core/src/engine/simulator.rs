//! Bar-by-bar replay of one symbol.
//!
//! Per bar:
//! 1. Fill whatever the previous bar queued for this bar's open
//! 2. Record the bar's crosses
//! 3. Ask the position manager for a decision (after warm-up)
//! 4. Fill it now if it executes on this bar, otherwise queue it
//! 5. Mark equity at the close

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::accounting::EquityLedger;
use super::config::{BacktestConfig, ConfigError, ExecutionTiming};
use crate::data::{canonicalize, DataError};
use crate::domain::{closes, Candle, Position, Trade};
use crate::indicators::{compute_indicators, IndicatorSample};
use crate::metrics::BacktestStats;
use crate::position_management::{BarDecision, BarInput, ExecutionFill, PositionManager};
use crate::signals::{BarSignal, CrossDetector};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("inconsistent candle data: {0}")]
    Data(#[from] DataError),
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    /// One value per canonical candle.
    pub equity_curve: Vec<f64>,
    pub stats: BacktestStats,
    pub samples: Vec<IndicatorSample>,
    /// Empty when the run was skipped.
    pub signals: Vec<BarSignal>,
    /// The canonical candles the run used.
    pub candles: Vec<Candle>,
    /// Still open after the last bar; marked to market, never closed.
    pub open_position: Option<Position>,
    pub duplicates_dropped: usize,
    /// Why no simulation happened, if it did not.
    pub skipped: Option<String>,
}

/// Validated configuration ready to replay candles.
#[derive(Debug, Clone)]
pub struct Backtester {
    config: BacktestConfig,
    manager: PositionManager,
}

impl Backtester {
    pub fn new(config: BacktestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let manager = PositionManager::new(config.risk, config.side_filter, config.leverage);
        Ok(Self { config, manager })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn run(&self, candles: &[Candle]) -> Result<BacktestResult, EngineError> {
        let canonical = canonicalize(candles)?;
        let candles = canonical.candles;
        let n = candles.len();
        let periods = &self.config.periods;
        let samples = compute_indicators(&closes(&candles), periods);

        if n < self.config.min_bars {
            let note = format!(
                "insufficient data: {n} candles, at least {} required",
                self.config.min_bars
            );
            debug!(candles = n, min_bars = self.config.min_bars, "backtest skipped");
            let equity_curve = vec![self.config.start_equity; n];
            let stats = BacktestStats::compute(&[], &equity_curve, self.config.start_equity);
            return Ok(BacktestResult {
                trades: Vec::new(),
                equity_curve,
                stats,
                samples,
                signals: Vec::new(),
                candles,
                open_position: None,
                duplicates_dropped: canonical.duplicates_dropped,
                skipped: Some(note),
            });
        }

        let signals = self.config.policy.detect(&samples, &candles, periods);
        let warmup = periods.warmup();

        let mut ledger = EquityLedger::new(&self.config);
        let mut position: Option<Position> = None;
        let mut queued: Option<BarDecision> = None;
        let mut trades = Vec::new();
        let mut equity_curve = Vec::with_capacity(n);
        let mut last_crosses: (Option<usize>, Option<usize>) = (None, None);

        for (i, candle) in candles.iter().enumerate() {
            if let Some(decision) = queued.take() {
                self.apply(decision, &mut position, &mut ledger, &mut trades, last_crosses);
            }

            let signal = &signals[i];
            if let Some(open) = position.as_mut() {
                open.observe_signal(signal);
            }
            if signal.crosses.fast_slow.is_some() {
                last_crosses.0 = Some(i);
            }
            if signal.crosses.fast_mid.is_some() {
                last_crosses.1 = Some(i);
            }

            if i >= warmup {
                let input = BarInput {
                    index: i,
                    candle,
                    execution: self.execution_fill(&candles, i),
                };
                let decision = self.manager.on_bar(position.as_mut(), &input, signal);
                match fill_index(&decision) {
                    Some(at) if at == i => {
                        self.apply(decision, &mut position, &mut ledger, &mut trades, last_crosses)
                    }
                    Some(_) => queued = Some(decision),
                    None => {}
                }
            }

            equity_curve.push(ledger.mark(position.as_ref(), i, candle.close));
        }

        let stats = BacktestStats::compute(&trades, &equity_curve, self.config.start_equity);
        debug!(
            trades = stats.trade_count,
            final_equity = stats.final_equity,
            open = position.is_some(),
            "backtest finished"
        );
        Ok(BacktestResult {
            trades,
            equity_curve,
            stats,
            samples,
            signals,
            candles,
            open_position: position,
            duplicates_dropped: canonical.duplicates_dropped,
            skipped: None,
        })
    }

    /// Where a decision taken on bar `i` fills.
    fn execution_fill(&self, candles: &[Candle], i: usize) -> Option<ExecutionFill> {
        match self.config.execution {
            ExecutionTiming::NextBar => candles.get(i + 1).map(|next| ExecutionFill {
                index: i + 1,
                time: next.time,
                price: next.open,
            }),
            ExecutionTiming::Close => Some(ExecutionFill {
                index: i,
                time: candles[i].time,
                price: candles[i].close,
            }),
        }
    }

    fn apply(
        &self,
        decision: BarDecision,
        position: &mut Option<Position>,
        ledger: &mut EquityLedger,
        trades: &mut Vec<Trade>,
        last_crosses: (Option<usize>, Option<usize>),
    ) {
        if let (Some(exit), Some(open)) = (decision.exit, position.take()) {
            let price = ledger.exit_price(open.side, exit.fill.price);
            let trade = ledger.settle(
                &open,
                exit.fill.index,
                exit.fill.time,
                price,
                exit.reason,
                last_crosses,
            );
            debug!(
                side = trade.side.label(),
                entry = trade.entry_index,
                exit = trade.exit_index,
                reason = trade.exit_reason.label(),
                pnl_net = trade.pnl_net,
                equity = trade.equity_after,
                "position closed"
            );
            trades.push(trade);
        }

        let Some(entry) = decision.entry else {
            return;
        };
        if position.is_some() {
            return;
        }
        let price = ledger.entry_price(entry.signal.side, entry.fill.price);
        let size = ledger.size_for_entry(price);
        if size <= 0.0 {
            debug!(index = entry.fill.index, equity = ledger.equity(), "entry skipped: no size");
            return;
        }
        let opened = self.manager.open(&entry, price, size);
        debug!(
            side = opened.side.label(),
            index = opened.entry_index,
            price = opened.entry_price,
            notional = opened.notional,
            cross_dist_bars = entry.signal.cross_dist_bars(),
            "position opened"
        );
        *position = Some(opened);
    }
}

fn fill_index(decision: &BarDecision) -> Option<usize> {
    decision
        .exit
        .map(|e| e.fill.index)
        .or(decision.entry.map(|e| e.fill.index))
}

/// Validate `config` and replay `candles` once.
pub fn run(candles: &[Candle], config: &BacktestConfig) -> Result<BacktestResult, EngineError> {
    Backtester::new(config.clone())?.run(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::make_candles;
    use crate::domain::{ExitReason, Side};
    use crate::indicators::assert_approx;
    use crate::position_management::RiskConfig;
    use crate::signals::DetectorPolicy;

    fn single_cross() -> BacktestConfig {
        BacktestConfig {
            policy: DetectorPolicy::SingleCross,
            ..Default::default()
        }
    }

    /// 30 flat bars, a climb, then a slide.
    fn up_then_down() -> Vec<f64> {
        let mut closes = vec![100.0; 30];
        closes.extend((1..=30).map(|k| 100.0 + k as f64));
        closes.extend((1..=40).map(|k| 130.0 - k as f64));
        closes
    }

    #[test]
    fn short_input_is_skipped_flat() {
        let candles = make_candles(&[100.0; 10]);
        let result = run(&candles, &BacktestConfig::default()).unwrap();
        assert!(result.skipped.is_some());
        assert!(result.trades.is_empty());
        assert_eq!(result.equity_curve, vec![100.0; 10]);
    }

    #[test]
    fn invalid_config_fails_before_running() {
        let config = BacktestConfig {
            leverage: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            run(&make_candles(&[1.0; 40]), &config),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn bad_candle_is_a_data_error() {
        let mut candles = make_candles(&[100.0; 40]);
        candles[5].low = -1.0;
        assert!(matches!(
            run(&candles, &BacktestConfig::default()),
            Err(EngineError::Data(DataError::InvalidCandle { index: 5, .. }))
        ));
    }

    #[test]
    fn equity_curve_has_one_point_per_candle() {
        let candles = make_candles(&up_then_down());
        let result = run(&candles, &single_cross()).unwrap();
        assert_eq!(result.equity_curve.len(), candles.len());
        assert_eq!(result.signals.len(), candles.len());
        assert!(result.skipped.is_none());
    }

    #[test]
    fn next_bar_entry_fills_at_following_open() {
        let candles = make_candles(&up_then_down());
        let result = run(&candles, &single_cross()).unwrap();
        let first = result.trades.first().expect("a trade");
        assert_eq!(first.side, Side::Long);
        assert_eq!(first.signal.confirm_index + 1, first.entry_index);
        assert_eq!(first.entry_price, candles[first.entry_index].open);
        assert!(first.exit_index > first.entry_index);
    }

    #[test]
    fn close_execution_fills_on_signal_bar() {
        let candles = make_candles(&up_then_down());
        let config = BacktestConfig {
            execution: ExecutionTiming::Close,
            ..single_cross()
        };
        let result = run(&candles, &config).unwrap();
        let first = result.trades.first().expect("a trade");
        assert_eq!(first.signal.confirm_index, first.entry_index);
        assert_eq!(first.entry_price, candles[first.entry_index].close);
    }

    #[test]
    fn flat_equity_before_first_entry() {
        let candles = make_candles(&up_then_down());
        let result = run(&candles, &single_cross()).unwrap();
        let entry = result.trades[0].entry_index;
        assert!(result.equity_curve[..entry].iter().all(|&e| e == 100.0));
    }

    #[test]
    fn contrary_cross_flips_into_open_short() {
        let candles = make_candles(&up_then_down());
        let result = run(&candles, &single_cross()).unwrap();
        assert_eq!(result.trades[0].exit_reason, ExitReason::Flip);
        let open = result.open_position.as_ref().expect("short stays open");
        assert_eq!(open.side, Side::Short);
        assert_eq!(open.entry_index, result.trades[0].exit_index);
    }

    #[test]
    fn stop_loss_exits_at_level() {
        // Up-cross, then a 3% drop bar
        let mut closes = vec![100.0; 30];
        closes.extend([101.0, 102.0, 103.0, 99.0, 99.0, 99.0]);
        let candles = make_candles(&closes);
        let config = BacktestConfig {
            risk: RiskConfig::from_flags(1.0, 0.0, false, 0.0, 0.0, 0.0),
            ..single_cross()
        };
        let result = run(&candles, &config).unwrap();
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        let level = trade.entry_price * 0.99;
        let bar = &candles[trade.exit_index];
        let expected = if bar.open < level { bar.open } else { level };
        assert_approx(trade.exit_price, expected, 1e-9);
    }

    #[test]
    fn open_position_mirrors_pending_reversal() {
        let config = BacktestConfig {
            policy: DetectorPolicy::SecondEvidence,
            ..Default::default()
        };
        let mut ended_open = 0;
        for len in 80..160 {
            let closes: Vec<f64> = (0..len)
                .map(|i| 100.0 + (i as f64 / 6.0).sin() * 4.0 + (i as f64 / 2.5).cos())
                .collect();
            let result = run(&make_candles(&closes), &config).unwrap();
            if let Some(open) = &result.open_position {
                ended_open += 1;
                let last = result.signals.last().unwrap();
                assert_eq!(open.pending_opposite, last.pending_opposite, "len {len}");
            }
        }
        assert!(ended_open > 0);
    }

    #[test]
    fn duplicates_are_counted() {
        let mut candles = make_candles(&[100.0; 40]);
        let dup = candles[10];
        candles.insert(11, dup);
        let result = run(&candles, &BacktestConfig::default()).unwrap();
        assert_eq!(result.duplicates_dropped, 1);
        assert_eq!(result.equity_curve.len(), 40);
    }
}
