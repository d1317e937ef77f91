use std::ops::Range;

use tracing::debug;

use crate::events::{Tick, TICKS_PER_QUARTER, TimeSignature};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Started,
    Paused,
}

impl PlaybackState {
    pub fn is_started(&self) -> bool {
        matches!(self, PlaybackState::Started)
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState::Stopped
    }
}

/// Read-only view of the transport, published for render-rate polling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSnapshot {
    pub state: PlaybackState,
    pub tick: Tick,
    pub bpm: f64,
    pub signature: TimeSignature,
}

/// The shared transport. The sole source of "now" for every scheduler; only
/// the playback-state transition handler may start, pause, or stop it.
#[derive(Debug)]
pub struct Clock {
    state: PlaybackState,
    ticks: Tick,
    /// Fractional tick carry between driver steps.
    tick_frac: f64,
    bpm: f64,
    signature: TimeSignature,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Stopped,
            ticks: 0,
            tick_frac: 0.0,
            bpm: 120.0,
            signature: TimeSignature::four_four(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_tick(&self) -> Tick {
        self.ticks
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm;
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.signature
    }

    pub fn set_time_signature(&mut self, signature: TimeSignature) {
        self.signature = signature;
    }

    /// Starting an already-started clock leaves position and state untouched.
    pub fn start(&mut self) {
        if self.state == PlaybackState::Started {
            return;
        }
        self.state = PlaybackState::Started;
    }

    /// Pause is only valid from `Started`; anywhere else it is a logged no-op.
    pub fn pause(&mut self) {
        if self.state != PlaybackState::Started {
            debug!(state = ?self.state, "ignoring pause outside of started");
            return;
        }
        self.state = PlaybackState::Paused;
    }

    /// Stop resets the position to zero.
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.ticks = 0;
        self.tick_frac = 0.0;
    }

    /// Advance by wall-clock seconds, converting with the bpm current at the
    /// start of the step. Returns the half-open tick span that became due.
    pub fn advance_seconds(&mut self, dt: f64) -> Range<Tick> {
        if self.state != PlaybackState::Started || dt <= 0.0 {
            return self.ticks..self.ticks;
        }
        let ticks_per_second = TICKS_PER_QUARTER as f64 * self.bpm / 60.0;
        let exact = dt * ticks_per_second + self.tick_frac;
        let whole = exact.floor();
        self.tick_frac = exact - whole;
        self.advance_ticks(whole as Tick)
    }

    /// Advance by a whole number of ticks.
    pub fn advance_ticks(&mut self, delta: Tick) -> Range<Tick> {
        if self.state != PlaybackState::Started {
            return self.ticks..self.ticks;
        }
        let start = self.ticks;
        self.ticks += delta;
        start..self.ticks
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            state: self.state,
            tick: self.ticks,
            bpm: self.bpm,
            signature: self.signature,
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
