//! Sign-change detection on the fast/slow and fast/mid spreads.

use serde::{Deserialize, Serialize};

use super::{CrossDirection, CrossEvent, CrossPair};
use crate::domain::{Candle, Side};
use crate::indicators::IndicatorSample;

/// Classify a spread transition. Zero counts as "not yet crossed" on either side.
pub fn classify(prev: f64, cur: f64) -> Option<CrossDirection> {
    if prev <= 0.0 && cur > 0.0 {
        Some(CrossDirection::Up)
    } else if prev >= 0.0 && cur < 0.0 {
        Some(CrossDirection::Down)
    } else {
        None
    }
}

/// Cross of `pair` at bar `i`, comparing only finite samples at `i-1` and `i`.
pub fn cross_at(samples: &[IndicatorSample], i: usize, pair: CrossPair) -> Option<CrossDirection> {
    if i == 0 || i >= samples.len() {
        return None;
    }
    let prev = samples[i - 1].spread(pair)?;
    let cur = samples[i].spread(pair)?;
    classify(prev, cur)
}

/// Crosses observed on one bar, per pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarCrosses {
    pub fast_slow: Option<CrossDirection>,
    pub fast_mid: Option<CrossDirection>,
}

impl BarCrosses {
    pub fn at(samples: &[IndicatorSample], i: usize) -> Self {
        Self {
            fast_slow: cross_at(samples, i, CrossPair::FastSlow),
            fast_mid: cross_at(samples, i, CrossPair::FastMid),
        }
    }

    pub fn get(&self, pair: CrossPair) -> Option<CrossDirection> {
        match pair {
            CrossPair::FastSlow => self.fast_slow,
            CrossPair::FastMid => self.fast_mid,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fast_slow.is_none() && self.fast_mid.is_none()
    }

    /// True if either pair crossed against a position on `side`.
    pub fn contrary_to(&self, side: Side) -> bool {
        let against = CrossDirection::from_side(side.opposite());
        self.fast_slow == Some(against) || self.fast_mid == Some(against)
    }

    /// Both pairs crossed in `direction` on this bar.
    pub fn both(&self, direction: CrossDirection) -> bool {
        self.fast_slow == Some(direction) && self.fast_mid == Some(direction)
    }

    /// Crosses as events, fast/slow first.
    pub fn events(&self, bar_index: usize, time: i64) -> impl Iterator<Item = CrossEvent> {
        [
            (CrossPair::FastSlow, self.fast_slow),
            (CrossPair::FastMid, self.fast_mid),
        ]
        .into_iter()
        .filter_map(move |(pair, dir)| {
            dir.map(|direction| CrossEvent {
                pair,
                direction,
                bar_index,
                time,
            })
        })
    }
}

/// Every cross event in the series, in bar order.
pub fn detect_crosses(samples: &[IndicatorSample], candles: &[Candle]) -> Vec<CrossEvent> {
    let n = samples.len().min(candles.len());
    (1..n)
        .flat_map(|i| BarCrosses::at(samples, i).events(i, candles[i].time))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::make_candles;
    use crate::indicators::{compute_indicators, IndicatorPeriods};

    fn sample(fast: f64, slow: f64, mid: f64) -> IndicatorSample {
        IndicatorSample {
            ema_fast: fast,
            ema_slow: slow,
            sma_mid: mid,
        }
    }

    #[test]
    fn classify_treats_touch_as_uncrossed() {
        assert_eq!(classify(-1.0, 1.0), Some(CrossDirection::Up));
        assert_eq!(classify(0.0, 1.0), Some(CrossDirection::Up));
        assert_eq!(classify(-1.0, 0.0), None);
        assert_eq!(classify(0.0, -0.5), Some(CrossDirection::Down));
        assert_eq!(classify(0.0, 0.0), None);
    }

    #[test]
    fn nan_samples_never_cross() {
        let samples = [sample(1.0, 2.0, f64::NAN), sample(3.0, 2.0, 2.0)];
        assert_eq!(cross_at(&samples, 1, CrossPair::FastSlow), Some(CrossDirection::Up));
        assert_eq!(cross_at(&samples, 1, CrossPair::FastMid), None);
    }

    #[test]
    fn first_bar_has_no_cross() {
        let samples = [sample(3.0, 2.0, 2.0)];
        assert!(BarCrosses::at(&samples, 0).is_empty());
    }

    #[test]
    fn contrary_and_both() {
        let crosses = BarCrosses {
            fast_slow: Some(CrossDirection::Down),
            fast_mid: None,
        };
        assert!(crosses.contrary_to(Side::Long));
        assert!(!crosses.contrary_to(Side::Short));
        assert!(!crosses.both(CrossDirection::Down));
    }

    #[test]
    fn constant_series_has_no_events() {
        let closes = vec![50.0; 80];
        let candles = make_candles(&closes);
        let samples = compute_indicators(&closes, &IndicatorPeriods::default());
        assert!(detect_crosses(&samples, &candles).is_empty());
    }

    #[test]
    fn rising_series_crosses_fast_slow_once_at_bar_one() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.25).collect();
        let candles = make_candles(&closes);
        let samples = compute_indicators(&closes, &IndicatorPeriods::default());
        let fast_slow: Vec<_> = detect_crosses(&samples, &candles)
            .into_iter()
            .filter(|e| e.pair == CrossPair::FastSlow)
            .collect();
        assert_eq!(fast_slow.len(), 1);
        assert_eq!(fast_slow[0].bar_index, 1);
        assert_eq!(fast_slow[0].direction, CrossDirection::Up);
        assert_eq!(fast_slow[0].time, candles[1].time);
    }
}
