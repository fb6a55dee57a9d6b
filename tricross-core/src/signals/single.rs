//! Single-cross policy: either pair crossing is a full signal.

use super::{BarCrosses, BarSignal, CrossDetector, CrossPair, EntrySignal};
use crate::domain::Candle;
use crate::indicators::{IndicatorPeriods, IndicatorSample};

/// Fires on the bar either pair crosses. When both cross on the same bar the
/// fast/slow pair decides the direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleCross;

impl SingleCross {
    pub fn entry_for(crosses: &BarCrosses, index: usize, time: i64) -> Option<EntrySignal> {
        let (pair, direction) = match (crosses.fast_slow, crosses.fast_mid) {
            (Some(dir), _) => (CrossPair::FastSlow, dir),
            (None, Some(dir)) => (CrossPair::FastMid, dir),
            (None, None) => return None,
        };
        Some(EntrySignal::single(direction.side(), pair, index, time))
    }
}

impl CrossDetector for SingleCross {
    fn name(&self) -> &str {
        "single_cross"
    }

    fn detect(
        &self,
        samples: &[IndicatorSample],
        candles: &[Candle],
        periods: &IndicatorPeriods,
    ) -> Vec<BarSignal> {
        let warmup = periods.warmup();
        super::bar_signals(samples, candles, warmup, |i, time, crosses| {
            Self::entry_for(crosses, i, time)
        })
    }
}
