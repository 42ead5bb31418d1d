use crate::game::axis::{data_extent, AxisController};
use crate::game::candles::{sanitize_value, CandleAggregator, RoundCloseOutcome, TickApplyOutcome};
use crate::game::lifecycle::{RoundLifecycle, TickGate};
use crate::game::protocol::GameEvent;
use crate::game::smoothing::{CandleSmoother, SmoothedQuantity};
use crate::game::types::{
    Candle, EngineConfig, EngineSnapshot, FrameSnapshot, RoundPhase, RoundState, ViewRange,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    RoundReset { previous: RoundPhase },
    CountdownUpdated,
    TickApplied(TickApplyOutcome),
    TerminalTickRecorded,
    RoundClosed(RoundCloseOutcome),
    Ignored(&'static str),
}

impl ApplyOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored(_))
    }
}

/// One chart instance: lifecycle, candles, display smoothing and axis.
///
/// Network events are pushed through [`ChartEngine::apply_event`]; the
/// frame clock pulls through [`ChartEngine::step_frame`]. Instances share
/// nothing, so one engine per room is safe.
#[derive(Debug, Clone)]
pub struct ChartEngine {
    config: EngineConfig,
    lifecycle: RoundLifecycle,
    aggregator: CandleAggregator,
    smoother: CandleSmoother,
    axis: AxisController,
    live_value: SmoothedQuantity,
}

impl ChartEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            lifecycle: RoundLifecycle::new(config.baseline_value),
            aggregator: CandleAggregator::new(config.candle_capacity, config.tick_interval_ms),
            smoother: CandleSmoother::new(),
            axis: AxisController::new(&config),
            live_value: SmoothedQuantity::seeded(config.baseline_value),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn round_state(&self) -> &RoundState {
        self.lifecycle.state()
    }

    pub fn view_range(&self) -> ViewRange {
        self.axis.range()
    }

    pub fn candle_series(&self) -> Vec<Candle> {
        self.aggregator.to_vec()
    }

    pub fn current_candle(&self) -> Option<&Candle> {
        self.aggregator.current()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            round: self.lifecycle.state().clone(),
            view_range: self.axis.range(),
            candles: self.aggregator.to_vec(),
        }
    }

    pub fn apply_event(&mut self, event: GameEvent, now_ms: i64) -> ApplyOutcome {
        match event {
            GameEvent::RoundStarted {
                round_id,
                baseline_value,
            } => {
                let baseline = baseline_value
                    .map(sanitize_value)
                    .unwrap_or(self.config.baseline_value);
                let previous = self.lifecycle.begin_round(round_id, baseline);
                self.reset_series(baseline);
                tracing::info!(
                    round_id = self.lifecycle.state().round_id.as_deref().unwrap_or(""),
                    baseline,
                    previous = previous.as_str(),
                    "round started"
                );
                ApplyOutcome::RoundReset { previous }
            }
            GameEvent::CountdownTick { seconds_remaining } => {
                if self
                    .lifecycle
                    .update_countdown(sanitize_value(seconds_remaining))
                {
                    ApplyOutcome::CountdownUpdated
                } else {
                    self.ignored("countdown outside countdown phase")
                }
            }
            GameEvent::PriceTick {
                value,
                round_id,
                round_ended,
            } => self.apply_tick(sanitize_value(value), round_id.as_deref(), round_ended, now_ms),
            GameEvent::RoundEnded {
                peak_value,
                abnormal_termination,
                round_id,
            } => self.close_round(
                sanitize_value(peak_value),
                abnormal_termination,
                round_id.as_deref(),
                now_ms,
            ),
        }
    }

    fn apply_tick(
        &mut self,
        value: f64,
        round_id: Option<&str>,
        round_ended: bool,
        now_ms: i64,
    ) -> ApplyOutcome {
        if round_ended && value == 0.0 {
            if self.lifecycle.phase() != RoundPhase::Running {
                return self.ignored("terminal tick outside running phase");
            }
            self.lifecycle.record_terminal(value);
            tracing::debug!("terminal zero tick recorded");
            return ApplyOutcome::TerminalTickRecorded;
        }

        let gate = self.lifecycle.gate_tick(round_id);
        match gate {
            TickGate::Rejected => return self.ignored("tick after round crashed"),
            TickGate::Joined => {
                let baseline = self.lifecycle.state().baseline_value;
                self.reset_series(baseline);
                tracing::info!(
                    round_id = round_id.unwrap_or(""),
                    "joined round in progress"
                );
            }
            TickGate::Started => {
                tracing::info!(
                    round_id = self.lifecycle.state().round_id.as_deref().unwrap_or(""),
                    "round running"
                );
            }
            TickGate::Accept => {}
        }

        let outcome = self.aggregator.apply_tick(value, now_ms);
        if round_ended {
            self.lifecycle.record_terminal(value);
        }
        self.live_value.set_target(value);
        self.expand_range();
        tracing::trace!(value, ?outcome, "tick applied");
        ApplyOutcome::TickApplied(outcome)
    }

    fn close_round(
        &mut self,
        peak_value: f64,
        abnormal_termination: bool,
        round_id: Option<&str>,
        now_ms: i64,
    ) -> ApplyOutcome {
        if !matches!(
            self.lifecycle.phase(),
            RoundPhase::Countdown | RoundPhase::Running
        ) {
            return self.ignored("round end outside countdown or running phase");
        }

        let terminal = self.lifecycle.state().terminal_value.unwrap_or(0.0);
        let crash = abnormal_termination && terminal == 0.0;
        let baseline = self.lifecycle.state().baseline_value;
        let outcome = self.aggregator.close_round(crash, baseline, now_ms);

        // Last fit runs before the phase flips so the crash candle stays on-chart.
        self.fit_range();
        self.lifecycle
            .end_round(peak_value, abnormal_termination, round_id);
        if crash {
            self.live_value = SmoothedQuantity::seeded(0.0);
        }

        tracing::info!(
            round_id = self.lifecycle.state().round_id.as_deref().unwrap_or(""),
            peak_value,
            abnormal_termination,
            candles = self.aggregator.len(),
            "round ended"
        );
        ApplyOutcome::RoundClosed(outcome)
    }

    /// Transport lost: back to `connecting` with a clean chart.
    pub fn disconnect(&mut self) {
        let baseline = self.config.baseline_value;
        let previous = self.lifecycle.disconnect(baseline);
        self.reset_series(baseline);
        if previous != RoundPhase::Connecting {
            tracing::info!(previous = previous.as_str(), "feed disconnected");
        }
    }

    /// Advances display smoothing by one frame and returns what to draw.
    pub fn step_frame(&mut self) -> FrameSnapshot {
        let k = self.config.smoothing_factor;
        let candles = self
            .smoother
            .step(self.aggregator.visible(self.config.max_visible_candles), k);

        self.live_value.step(k);
        if self.live_value.distance() <= self.config.live_snap_epsilon {
            self.live_value.snap();
        }

        let round = self.lifecycle.state();
        FrameSnapshot {
            candles,
            view_range: self.axis.range(),
            phase: round.phase,
            round_id: round.round_id.clone(),
            live_value: self.live_value.current,
            countdown_remaining: round.countdown_remaining,
            abnormal_termination: round.abnormal_termination,
        }
    }

    fn reset_series(&mut self, baseline: f64) {
        self.aggregator.reset();
        self.smoother.clear();
        self.axis.reset(baseline);
        self.live_value = SmoothedQuantity::seeded(baseline);
    }

    fn expand_range(&mut self) {
        if self.lifecycle.phase() == RoundPhase::Running {
            self.fit_range();
        }
    }

    fn fit_range(&mut self) {
        let extent = data_extent(
            self.aggregator.visible(self.config.max_visible_candles),
            self.aggregator.last_value(),
        );
        if let Some((low, high)) = extent {
            if self.axis.expand(low, high) {
                let range = self.axis.range();
                tracing::debug!(min = range.min, max = range.max, "view range expanded");
            }
        }
    }

    fn ignored(&self, reason: &'static str) -> ApplyOutcome {
        tracing::debug!(phase = self.lifecycle.phase().as_str(), reason, "event ignored");
        ApplyOutcome::Ignored(reason)
    }
}
