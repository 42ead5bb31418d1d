use crate::game::types::{RoundPhase, RoundState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickGate {
    /// Tick belongs to the running round.
    Accept,
    /// First tick after countdown; the round is now running.
    Started,
    /// Tick seen before any round start; joined a round already in progress.
    Joined,
    Rejected,
}

/// Round phase tracker.
///
/// `connecting -> countdown -> running -> crashed -> countdown -> ...`,
/// with disconnect forcing `connecting` from anywhere. Leaving `crashed`
/// only happens through [`RoundLifecycle::begin_round`].
#[derive(Debug, Clone)]
pub struct RoundLifecycle {
    state: RoundState,
}

impl RoundLifecycle {
    pub fn new(baseline_value: f64) -> Self {
        Self {
            state: RoundState::connecting(baseline_value),
        }
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    pub fn phase(&self) -> RoundPhase {
        self.state.phase
    }

    /// Unconditionally replaces the round. Returns the phase that was left.
    pub fn begin_round(&mut self, round_id: String, baseline_value: f64) -> RoundPhase {
        let previous = self.state.phase;
        self.state = RoundState {
            phase: RoundPhase::Countdown,
            round_id: Some(round_id).filter(|id| !id.is_empty()),
            baseline_value,
            countdown_remaining: None,
            terminal_value: None,
            peak_value: None,
            abnormal_termination: false,
        };
        previous
    }

    pub fn update_countdown(&mut self, seconds_remaining: f64) -> bool {
        match self.state.phase {
            RoundPhase::Connecting | RoundPhase::Countdown => {
                self.state.phase = RoundPhase::Countdown;
                self.state.countdown_remaining = Some(seconds_remaining);
                true
            }
            RoundPhase::Running | RoundPhase::Crashed => false,
        }
    }

    pub fn gate_tick(&mut self, round_id: Option<&str>) -> TickGate {
        let gate = match self.state.phase {
            RoundPhase::Running => TickGate::Accept,
            RoundPhase::Countdown => TickGate::Started,
            RoundPhase::Connecting => TickGate::Joined,
            RoundPhase::Crashed => return TickGate::Rejected,
        };

        if gate != TickGate::Accept {
            self.state.phase = RoundPhase::Running;
            self.state.countdown_remaining = None;
        }
        if self.state.round_id.is_none() {
            self.state.round_id = round_id
                .filter(|id| !id.is_empty())
                .map(str::to_string);
        }
        gate
    }

    pub fn record_terminal(&mut self, value: f64) {
        self.state.terminal_value = Some(value);
    }

    pub fn end_round(
        &mut self,
        peak_value: f64,
        abnormal_termination: bool,
        round_id: Option<&str>,
    ) -> bool {
        if !matches!(self.state.phase, RoundPhase::Countdown | RoundPhase::Running) {
            return false;
        }

        self.state.phase = RoundPhase::Crashed;
        self.state.countdown_remaining = None;
        self.state.peak_value = Some(peak_value);
        self.state.abnormal_termination = abnormal_termination;
        if self.state.round_id.is_none() {
            self.state.round_id = round_id
                .filter(|id| !id.is_empty())
                .map(str::to_string);
        }
        true
    }

    pub fn disconnect(&mut self, baseline_value: f64) -> RoundPhase {
        let previous = self.state.phase;
        self.state = RoundState::connecting(baseline_value);
        previous
    }
}
