use std::ops::Range;

use tracing::debug;

use crate::events::{TempoEvent, Tick, TimeSignature, TimeSignatureEvent};
use crate::timing::clock::{Clock, PlaybackState};
use crate::timing::part::{Part, Reconcile, SCHEDULE_OFFSET};

/// A due automation change, ready to push onto the clock.
#[derive(Debug, Clone, PartialEq)]
pub enum AutomationChange {
    Tempo(f64),
    Signature(TimeSignature),
}

impl AutomationChange {
    pub fn apply(&self, clock: &mut Clock) {
        match self {
            AutomationChange::Tempo(bpm) => clock.set_bpm(*bpm),
            AutomationChange::Signature(signature) => clock.set_time_signature(*signature),
        }
    }
}

/// Schedules tempo and time-signature automation against the clock and keeps
/// the parts reconciled with the externally supplied lists.
pub struct AutomationScheduler {
    tempos: Vec<TempoEvent>,
    time_signatures: Vec<TimeSignatureEvent>,
    tempo_part: Option<Part<TempoEvent>>,
    signature_part: Option<Part<TimeSignatureEvent>>,
}

impl AutomationScheduler {
    pub fn new() -> Self {
        Self {
            tempos: Vec::new(),
            time_signatures: Vec::new(),
            tempo_part: None,
            signature_part: None,
        }
    }

    /// Every transition into `Started` rebuilds both parts from the current
    /// lists; `Stopped` disposes them; `Paused` leaves them scheduled.
    pub fn on_playback_state_change(&mut self, state: PlaybackState) {
        match state {
            PlaybackState::Started => {
                let mut tempo_part = Part::new(&self.tempos);
                tempo_part.start(SCHEDULE_OFFSET);
                self.tempo_part = Some(tempo_part);

                let mut signature_part = Part::new(&self.time_signatures);
                signature_part.start(SCHEDULE_OFFSET);
                self.signature_part = Some(signature_part);
            }
            PlaybackState::Stopped => {
                self.tempo_part = None;
                self.signature_part = None;
            }
            PlaybackState::Paused => {}
        }
    }

    /// Replace the tempo list. A value scheduled for an already-passed tick
    /// will not fire again, so the active tempo is corrected here instead of
    /// waiting on the scheduled path.
    pub fn set_tempos(&mut self, tempos: Vec<TempoEvent>, clock: &mut Clock) -> Option<Reconcile> {
        let outcome = self
            .tempo_part
            .as_mut()
            .map(|part| part.reconcile(&tempos));

        self.tempos = tempos;

        if outcome.is_some() {
            if let Some(event) = active_entry(&self.tempos, clock.current_tick(), |t| t.tick) {
                debug!(bpm = event.bpm, "correcting active tempo");
                clock.set_bpm(event.bpm);
            }
        }
        outcome
    }

    /// Replace the time-signature list; same correction rule as tempos.
    pub fn set_time_signatures(
        &mut self,
        time_signatures: Vec<TimeSignatureEvent>,
        clock: &mut Clock,
    ) -> Option<Reconcile> {
        let outcome = self
            .signature_part
            .as_mut()
            .map(|part| part.reconcile(&time_signatures));

        self.time_signatures = time_signatures;

        if outcome.is_some() {
            if let Some(event) =
                active_entry(&self.time_signatures, clock.current_tick(), |t| t.tick)
            {
                debug!(signature = %event.signature, "correcting active time signature");
                clock.set_time_signature(event.signature);
            }
        }
        outcome
    }

    /// Changes due within `span`, ordered by tick. The two categories affect
    /// disjoint clock fields, so their relative order at equal ticks is
    /// unspecified.
    pub fn collect_due(&self, span: &Range<Tick>) -> Vec<(Tick, AutomationChange)> {
        let mut due: Vec<(Tick, AutomationChange)> = Vec::new();
        if let Some(part) = &self.tempo_part {
            due.extend(
                part.collect_due(span)
                    .into_iter()
                    .map(|d| (d.tick, AutomationChange::Tempo(d.event.bpm))),
            );
        }
        if let Some(part) = &self.signature_part {
            due.extend(
                part.collect_due(span)
                    .into_iter()
                    .map(|d| (d.tick, AutomationChange::Signature(d.event.signature))),
            );
        }
        due.sort_by_key(|(tick, _)| *tick);
        due
    }

    pub fn tempos(&self) -> &[TempoEvent] {
        &self.tempos
    }

    pub fn time_signatures(&self) -> &[TimeSignatureEvent] {
        &self.time_signatures
    }

    pub fn is_scheduled(&self) -> bool {
        self.tempo_part.is_some()
    }
}

impl Default for AutomationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// The entry whose tick is the greatest tick at or before `now`, found by a
/// right bisection over the sorted tick list. Falls back to the first entry
/// when every tick is still ahead; `None` only for an empty list.
fn active_entry<T>(list: &[T], now: Tick, tick_of: impl Fn(&T) -> Tick) -> Option<&T> {
    if list.is_empty() {
        return None;
    }
    let i = list.partition_point(|event| tick_of(event) <= now);
    Some(&list[i.saturating_sub(1)])
}
