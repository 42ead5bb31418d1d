use crate::game::types::{Candle, EngineConfig, ViewRange};

/// Keeps the value axis wide enough for every visible candle.
///
/// The range only grows between resets. Expansion is pre-emptive: once the
/// data comes within `expand_threshold` of an edge, that edge moves out to
/// `expand_fraction` of the current span beyond the data.
#[derive(Debug, Clone)]
pub struct AxisController {
    range: ViewRange,
    band_fraction: f64,
    expand_threshold: f64,
    expand_fraction: f64,
    min_range_span: f64,
}

impl AxisController {
    pub fn new(config: &EngineConfig) -> Self {
        let mut controller = Self {
            range: ViewRange { min: 0.0, max: 1.0 },
            band_fraction: config.default_band_fraction,
            expand_threshold: config.expand_threshold,
            expand_fraction: config.expand_fraction,
            min_range_span: config.min_range_span,
        };
        controller.reset(config.baseline_value);
        controller
    }

    pub fn range(&self) -> ViewRange {
        self.range
    }

    pub fn default_band(&self, baseline: f64) -> ViewRange {
        let half_width = baseline * self.band_fraction;
        let band = ViewRange {
            min: (baseline - half_width).max(0.0),
            max: baseline + half_width,
        };
        self.guard_degenerate(band)
    }

    pub fn reset(&mut self, baseline: f64) {
        self.range = self.default_band(baseline);
    }

    /// Widens the range to cover `[low, high]`. Returns whether it moved.
    pub fn expand(&mut self, low: f64, high: f64) -> bool {
        let current = self.range;
        let span = current.span();
        let mut next = current;

        if high >= current.max - self.expand_threshold * span {
            next.max = current.max.max(high + self.expand_fraction * span);
        }
        if low <= current.min + self.expand_threshold * span {
            next.min = current
                .min
                .min(low - self.expand_fraction * span)
                .max(0.0);
        }

        let next = self.guard_degenerate(next);
        if next == current {
            return false;
        }
        self.range = next;
        true
    }

    fn guard_degenerate(&self, range: ViewRange) -> ViewRange {
        if range.span() >= self.min_range_span {
            return range;
        }

        let center = (range.min + range.max) / 2.0;
        let min = (center - self.min_range_span / 2.0).max(0.0);
        ViewRange {
            min,
            max: min + self.min_range_span,
        }
    }
}

/// Lowest low and highest high over `candles` and the optional live value.
pub fn data_extent<'a, I>(candles: I, live_value: Option<f64>) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = &'a Candle>,
{
    candles
        .into_iter()
        .map(|candle| (candle.low, candle.high))
        .chain(live_value.map(|value| (value, value)))
        .reduce(|(low, high), (next_low, next_high)| (low.min(next_low), high.max(next_high)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> AxisController {
        AxisController::new(&EngineConfig::default())
    }

    #[test]
    fn starts_at_default_band_around_baseline() {
        let axis = controller();
        assert_eq!(axis.range(), ViewRange { min: 0.5, max: 1.5 });
    }

    #[test]
    fn leaves_range_alone_when_data_sits_inside() {
        let mut axis = controller();
        assert!(!axis.expand(1.0, 1.2));
        assert_eq!(axis.range(), ViewRange { min: 0.5, max: 1.5 });
    }

    #[test]
    fn expands_max_preemptively_near_edge() {
        let mut axis = controller();
        assert!(axis.expand(1.0, 1.4));

        let range = axis.range();
        assert!((range.max - 1.6).abs() < 1e-12);
        assert_eq!(range.min, 0.5);
        assert!(range.contains(1.0, 1.4));
    }

    #[test]
    fn never_expands_min_below_zero() {
        let mut axis = controller();
        axis.expand(0.0, 1.0);

        let range = axis.range();
        assert_eq!(range.min, 0.0);
        assert!(range.contains(0.0, 1.0));
    }

    #[test]
    fn range_is_monotonic_while_growing() {
        let mut axis = controller();
        let mut previous = axis.range();
        let mut high = 1.0_f64;
        for step in 0..200 {
            high += 0.05;
            let low = if step % 3 == 0 { 0.9 } else { 1.0 };
            axis.expand(low, high);
            let range = axis.range();
            assert!(range.max >= previous.max);
            assert!(range.min <= previous.min);
            assert!(range.contains(low, high));
            previous = range;
        }
    }

    #[test]
    fn reset_restores_default_band_after_extreme_round() {
        let mut axis = controller();
        axis.expand(0.0, 250.0);
        assert!(axis.range().max > 250.0);

        axis.reset(1.0);
        assert_eq!(axis.range(), axis.default_band(1.0));
    }

    #[test]
    fn guards_degenerate_band() {
        let axis = controller();
        let band = axis.default_band(0.0);
        assert_eq!(band.min, 0.0);
        assert!((band.span() - 0.4).abs() < 1e-12);

        let narrow = axis.default_band(0.2);
        assert!(narrow.span() >= 0.4 - 1e-12);
        assert!(narrow.min >= 0.0);
    }

    #[test]
    fn extent_covers_candles_and_live_value() {
        let mut first = Candle::from_sample(1, 1.0, 0, 50);
        first.push_sample(1.4, 50);
        let second = Candle::from_sample(2, 0.8, 0, 50);

        assert_eq!(data_extent([&first, &second], Some(2.0)), Some((0.8, 2.0)));
        assert_eq!(data_extent(std::iter::empty(), None), None);
    }
}
