use crate::game::types::{Candle, DisplayCandle};
use std::collections::HashMap;

/// Display shadow of a real value: `current` chases `target`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedQuantity {
    pub current: f64,
    pub target: f64,
}

impl SmoothedQuantity {
    pub fn seeded(value: f64) -> Self {
        Self {
            current: value,
            target: value,
        }
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// One frame of `current += (target - current) / k`. `k <= 1` snaps.
    pub fn step(&mut self, k: f64) -> f64 {
        if k <= 1.0 {
            self.snap();
        } else {
            self.current += (self.target - self.current) / k;
        }
        self.current
    }

    pub fn snap(&mut self) -> f64 {
        self.current = self.target;
        self.current
    }

    pub fn distance(&self) -> f64 {
        (self.target - self.current).abs()
    }
}

#[derive(Debug, Clone, Copy)]
struct CandleShadow {
    open: SmoothedQuantity,
    close: SmoothedQuantity,
    high: SmoothedQuantity,
    low: SmoothedQuantity,
}

impl CandleShadow {
    fn seeded(candle: &Candle) -> Self {
        Self {
            open: SmoothedQuantity::seeded(candle.open),
            close: SmoothedQuantity::seeded(candle.display_close()),
            high: SmoothedQuantity::seeded(candle.high),
            low: SmoothedQuantity::seeded(candle.low),
        }
    }

    fn retarget(&mut self, candle: &Candle) {
        self.open.set_target(candle.open);
        self.close.set_target(candle.display_close());
        self.high.set_target(candle.high);
        self.low.set_target(candle.low);
    }

    fn quantities(&mut self) -> [&mut SmoothedQuantity; 4] {
        [
            &mut self.open,
            &mut self.close,
            &mut self.high,
            &mut self.low,
        ]
    }

    fn display(&self, candle: &Candle) -> DisplayCandle {
        DisplayCandle {
            id: candle.id,
            open: self.open.current,
            close: self.close.current,
            high: self.high.current,
            low: self.low.current,
            is_complete: candle.is_complete,
            kind: candle.kind,
        }
    }
}

/// Per-candle display values keyed by candle id.
#[derive(Debug, Clone, Default)]
pub struct CandleSmoother {
    shadows: HashMap<u64, CandleShadow>,
}

impl CandleSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.shadows.clear();
    }

    pub fn len(&self) -> usize {
        self.shadows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shadows.is_empty()
    }

    /// Advances every shadow by one frame and returns displayed OHLC in
    /// series order.
    ///
    /// Unseen candles are seeded at their target, complete candles snap, and
    /// the open candle converges with factor `k`. Shadows for candles absent
    /// from `candles` are dropped.
    pub fn step<'a, I>(&mut self, candles: I, k: f64) -> Vec<DisplayCandle>
    where
        I: IntoIterator<Item = &'a Candle>,
    {
        let mut next = HashMap::with_capacity(self.shadows.len() + 1);
        let mut displayed = Vec::with_capacity(self.shadows.len() + 1);

        for candle in candles {
            let shadow = match self.shadows.remove(&candle.id) {
                Some(mut shadow) => {
                    shadow.retarget(candle);
                    for quantity in shadow.quantities() {
                        if candle.is_complete {
                            quantity.snap();
                        } else {
                            quantity.step(k);
                        }
                    }
                    shadow
                }
                None => CandleShadow::seeded(candle),
            };
            displayed.push(shadow.display(candle));
            next.insert(candle.id, shadow);
        }

        self.shadows = next;
        displayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_geometrically_toward_fixed_target() {
        let mut quantity = SmoothedQuantity::seeded(1.0);
        quantity.set_target(2.0);

        let mut previous = quantity.distance();
        for _ in 0..500 {
            quantity.step(120.0);
            let distance = quantity.distance();
            assert!(distance < previous, "distance should strictly decrease");
            previous = distance;
        }
        assert!(previous < 0.02);
    }

    #[test]
    fn factor_of_one_snaps_immediately() {
        let mut quantity = SmoothedQuantity::seeded(1.0);
        quantity.set_target(1.7);
        assert_eq!(quantity.step(1.0), 1.7);
    }

    #[test]
    fn seeds_new_candle_at_target() {
        let mut smoother = CandleSmoother::new();
        let candle = Candle::from_sample(1, 1.3, 0, 50);

        let displayed = smoother.step([&candle], 120.0);
        assert_eq!(displayed.len(), 1);
        assert_eq!(displayed[0].open, 1.3);
        assert_eq!(displayed[0].close, 1.3);
        assert_eq!(displayed[0].high, 1.3);
        assert_eq!(displayed[0].low, 1.3);
    }

    #[test]
    fn animates_open_candle_without_overshoot() {
        let mut smoother = CandleSmoother::new();
        let mut candle = Candle::from_sample(1, 1.0, 0, 50);
        smoother.step([&candle], 120.0);

        candle.push_sample(2.2, 50);
        let displayed = smoother.step([&candle], 120.0);
        let close = displayed[0].close;
        assert!(close > 1.0 && close < 2.2, "close {close} should be between");
        assert!((close - 1.01).abs() < 1e-12);
        assert_eq!(displayed[0].open, 1.0);
    }

    #[test]
    fn snaps_completed_candle_on_completion() {
        let mut smoother = CandleSmoother::new();
        let mut candle = Candle::from_sample(1, 1.0, 0, 50);
        smoother.step([&candle], 120.0);
        candle.push_sample(1.5, 50);
        smoother.step([&candle], 120.0);

        candle.push_sample(1.8, 50);
        candle.finalize();
        let displayed = smoother.step([&candle], 120.0);
        assert_eq!(displayed[0].close, 1.8);
        assert_eq!(displayed[0].high, 1.8);
        assert!(displayed[0].is_complete);
    }

    #[test]
    fn purges_shadows_for_vanished_candles() {
        let mut smoother = CandleSmoother::new();
        let first = Candle::from_sample(1, 1.0, 0, 50);
        let second = Candle::from_sample(2, 1.1, 0, 50);
        smoother.step([&first, &second], 120.0);
        assert_eq!(smoother.len(), 2);

        let displayed = smoother.step([&second], 120.0);
        assert_eq!(smoother.len(), 1);
        assert_eq!(displayed[0].id, 2);

        smoother.step(std::iter::empty(), 120.0);
        assert!(smoother.is_empty());
    }
}
