use crate::game::types::{Candle, CandleKind};

/// Clamps non-finite and negative inputs to the domain floor.
pub fn sanitize_value(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickApplyOutcome {
    Opened { id: u64 },
    Extended { id: u64 },
    Completed { id: u64 },
    RoundClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundCloseOutcome {
    pub finalized: Option<u64>,
    pub absorbed: Option<u64>,
    pub crash_candle: Option<u64>,
}

/// Groups a stream of scalar samples into fixed-capacity candles.
///
/// Holds every completed candle of the active round plus at most one open
/// candle. Candle ids keep increasing across rounds so display state keyed
/// by id never aliases a candle from an earlier round.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    capacity: usize,
    tick_interval_ms: u64,
    next_id: u64,
    completed: Vec<Candle>,
    current: Option<Candle>,
    last_value: Option<f64>,
    round_closed: bool,
}

impl CandleAggregator {
    pub fn new(capacity: usize, tick_interval_ms: u64) -> Self {
        Self {
            capacity: capacity.max(1),
            tick_interval_ms,
            next_id: 1,
            completed: Vec::new(),
            current: None,
            last_value: None,
            round_closed: false,
        }
    }

    pub fn reset(&mut self) {
        self.completed.clear();
        self.current = None;
        self.last_value = None;
        self.round_closed = false;
    }

    pub fn completed(&self) -> &[Candle] {
        &self.completed
    }

    pub fn current(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    pub fn len(&self) -> usize {
        self.completed.len() + usize::from(self.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completed candles in order, followed by the open candle if any.
    pub fn candles(&self) -> impl Iterator<Item = &Candle> {
        self.completed.iter().chain(self.current.iter())
    }

    /// The trailing `max_visible` candles of [`CandleAggregator::candles`].
    pub fn visible(&self, max_visible: usize) -> impl Iterator<Item = &Candle> {
        let skip = self.len().saturating_sub(max_visible);
        self.candles().skip(skip)
    }

    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles().cloned().collect()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    pub fn apply_tick(&mut self, value: f64, now_ms: i64) -> TickApplyOutcome {
        if self.round_closed {
            return TickApplyOutcome::RoundClosed;
        }

        let value = sanitize_value(value);
        self.last_value = Some(value);

        let outcome = match self.current.as_mut() {
            Some(current) => {
                current.push_sample(value, self.tick_interval_ms);
                TickApplyOutcome::Extended { id: current.id }
            }
            None => {
                let id = self.allocate_id();
                self.current = Some(Candle::from_sample(
                    id,
                    value,
                    now_ms,
                    self.tick_interval_ms,
                ));
                TickApplyOutcome::Opened { id }
            }
        };

        let reached_capacity = self
            .current
            .as_ref()
            .map(|current| current.sample_count() >= self.capacity)
            .unwrap_or(false);
        if reached_capacity {
            if let Some(mut full) = self.current.take() {
                full.finalize();
                let id = full.id;
                self.completed.push(full);
                return TickApplyOutcome::Completed { id };
            }
        }

        outcome
    }

    /// Freezes the round.
    ///
    /// With `crash` set, a crash candle from the last known value down to
    /// zero is appended. A single-sample open candle carries nothing beyond
    /// that last known value and is folded into the crash candle; longer
    /// open candles are finalized first. Repeated calls are no-ops.
    pub fn close_round(
        &mut self,
        crash: bool,
        fallback_value: f64,
        now_ms: i64,
    ) -> RoundCloseOutcome {
        let mut outcome = RoundCloseOutcome::default();
        if self.round_closed {
            return outcome;
        }
        self.round_closed = true;

        let open_candle = self.current.take();
        if !crash {
            if let Some(mut candle) = open_candle {
                candle.finalize();
                outcome.finalized = Some(candle.id);
                self.completed.push(candle);
            }
            return outcome;
        }

        match open_candle {
            Some(candle) if candle.sample_count() < 2 => {
                outcome.absorbed = Some(candle.id);
            }
            Some(mut candle) => {
                candle.finalize();
                outcome.finalized = Some(candle.id);
                self.completed.push(candle);
            }
            None => {}
        }

        let last_known = self
            .last_value
            .unwrap_or_else(|| sanitize_value(fallback_value));
        if last_known > 0.0 {
            let id = self.allocate_id();
            self.completed.push(Candle::crash(id, last_known, now_ms));
            outcome.crash_candle = Some(id);
        }

        outcome
    }
}

/// Halves the candle count by merging adjacent pairs until at most
/// `target_count` remain. An odd trailing candle is carried through.
pub fn merge_for_history(candles: &[Candle], target_count: usize) -> Vec<Candle> {
    let target_count = target_count.max(1);
    let mut merged = candles.to_vec();

    while merged.len() > target_count {
        let mut next = Vec::with_capacity(merged.len().div_ceil(2));
        let mut pairs = merged.chunks_exact(2);
        for pair in pairs.by_ref() {
            let (first, second) = (&pair[0], &pair[1]);
            next.push(Candle {
                id: first.id,
                open: first.open,
                close: Some(second.display_close()),
                high: first.high.max(second.high),
                low: first.low.min(second.low),
                sample_values: Vec::new(),
                start_time_ms: first.start_time_ms,
                duration_ms: first.duration_ms.saturating_add(second.duration_ms),
                is_complete: true,
                kind: if second.kind == CandleKind::Crash {
                    CandleKind::Crash
                } else {
                    CandleKind::Regular
                },
            });
        }
        next.extend(pairs.remainder().iter().cloned());
        merged = next;
    }

    merged
}
