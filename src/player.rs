use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::{ActiveNote, Track};
use crate::events::{NoteEvent, StepEvent, TempoEvent, Tick, TimeSignatureEvent};
use crate::timing::{
    AutomationChange, AutomationScheduler, Clock, ClockSnapshot, PlaybackState, Reconcile,
};

/// Master output stage settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Decibels relative to unity.
    pub volume: f32,
    pub muted: bool,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            volume: 0.0,
            muted: false,
        }
    }
}

enum DueKind {
    Automation(AutomationChange),
    Note { track_index: usize, note: NoteEvent },
}

/// The top of the composition: owns the clock, the automation scheduler,
/// and every track. The playback-state transition is the single driver that
/// starts and stops all of them together.
pub struct Player {
    clock: Clock,
    automation: AutomationScheduler,
    tracks: Vec<Track>,
    master: MasterConfig,
}

impl Player {
    pub fn new() -> Self {
        Self {
            clock: Clock::new(),
            automation: AutomationScheduler::new(),
            tracks: Vec::new(),
            master: MasterConfig::default(),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        self.clock.snapshot()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.clock.state()
    }

    pub fn master(&self) -> MasterConfig {
        self.master
    }

    pub fn set_master(&mut self, master: MasterConfig) {
        self.master = master;
    }

    pub fn add_track(&mut self, name: impl Into<String>) -> usize {
        let id = self.tracks.len();
        self.tracks.push(Track::new(id, name));
        id
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_mut(&mut self, id: usize) -> Option<&mut Track> {
        self.tracks.get_mut(id)
    }

    /// Drives the whole transport through a state change. Schedulers are
    /// transitioned before the clock starts, and after it stops or pauses,
    /// mirroring the order the parts need to observe.
    pub fn set_playback_state(&mut self, next: PlaybackState) {
        let prev = self.clock.state();
        match next {
            PlaybackState::Started => {
                self.automation.on_playback_state_change(next);
                for track in &mut self.tracks {
                    track.on_playback_state_change(prev, next);
                }
                self.clock.start();
            }
            PlaybackState::Paused => {
                self.clock.pause();
                self.automation.on_playback_state_change(next);
                for track in &mut self.tracks {
                    track.on_playback_state_change(prev, next);
                }
            }
            PlaybackState::Stopped => {
                self.clock.stop();
                self.automation.on_playback_state_change(next);
                for track in &mut self.tracks {
                    track.on_playback_state_change(prev, next);
                }
            }
        }
    }

    pub fn replace_tempos(&mut self, tempos: Vec<TempoEvent>) -> Option<Reconcile> {
        self.automation.set_tempos(tempos, &mut self.clock)
    }

    pub fn replace_time_signatures(
        &mut self,
        time_signatures: Vec<TimeSignatureEvent>,
    ) -> Option<Reconcile> {
        self.automation
            .set_time_signatures(time_signatures, &mut self.clock)
    }

    pub fn replace_notes(&mut self, track_id: usize, notes: Vec<NoteEvent>) -> Option<Reconcile> {
        match self.tracks.get_mut(track_id) {
            Some(track) => track.set_notes(notes),
            None => {
                warn!(track_id, "replace_notes for an unknown track");
                None
            }
        }
    }

    pub fn set_active_notes(&mut self, track_id: usize, notes: &[ActiveNote]) {
        match self.tracks.get_mut(track_id) {
            Some(track) => track.set_active_notes(notes),
            None => warn!(track_id, "active notes for an unknown track"),
        }
    }

    /// One driver step, in wall-clock time. Conversion to ticks uses the
    /// bpm current at the start of the step.
    pub fn drive_seconds(&mut self, dt: f64) -> Vec<StepEvent> {
        let span = self.clock.advance_seconds(dt);
        self.drive_span(span)
    }

    /// One driver step, in ticks.
    pub fn drive_ticks(&mut self, delta: Tick) -> Vec<StepEvent> {
        let span = self.clock.advance_ticks(delta);
        self.drive_span(span)
    }

    /// Fires everything due in `span` in tick order. At equal ticks,
    /// automation is applied before any note fires, so a note scheduled at
    /// the same instant as a tempo change observes the new tempo;
    /// simultaneous notes keep track-registration order.
    fn drive_span(&mut self, span: Range<Tick>) -> Vec<StepEvent> {
        if span.is_empty() {
            return Vec::new();
        }

        let mut queue: Vec<(Tick, u8, DueKind)> = Vec::new();
        for (tick, change) in self.automation.collect_due(&span) {
            queue.push((tick, 0, DueKind::Automation(change)));
        }
        for (track_index, track) in self.tracks.iter().enumerate() {
            for due in track.collect_due(&span) {
                queue.push((
                    due.tick,
                    1,
                    DueKind::Note {
                        track_index,
                        note: due.event,
                    },
                ));
            }
        }
        queue.sort_by_key(|(tick, rank, _)| (*tick, *rank));

        let mut steps = Vec::new();
        for (tick, _, due) in queue {
            match due {
                DueKind::Automation(change) => change.apply(&mut self.clock),
                DueKind::Note { track_index, note } => {
                    let track = &mut self.tracks[track_index];
                    track.dispatch(tick, &note);
                    steps.push(StepEvent {
                        track_id: track.id,
                        tick,
                        note,
                    });
                }
            }
        }
        steps
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::{RecordingVoice, VoiceCommand};
    use crate::audio::{InstrumentKind, Pitch, SynthModel};
    use crate::events::{TICKS_PER_QUARTER, TimeSignature};
    use crate::timing::SCHEDULE_OFFSET;

    use parking_lot::Mutex;
    use std::sync::Arc;

    const C4: Pitch = Pitch(60);
    const E4: Pitch = Pitch(64);

    fn note(tick: Tick, duration: Option<Tick>, pitch: Pitch) -> NoteEvent {
        NoteEvent::new(tick, duration, pitch, 0.8)
    }

    fn tempo(tick: Tick, bpm: f64) -> TempoEvent {
        TempoEvent { tick, bpm }
    }

    fn player_with_recorder() -> (Player, Arc<Mutex<RecordingVoice>>) {
        let mut player = Player::new();
        let track_id = player.add_track("lead");
        let recorder = RecordingVoice::shared();
        player
            .track_mut(track_id)
            .unwrap()
            .add_instrument_with_voice(
                InstrumentKind::synth(SynthModel::Simple, 8),
                recorder.clone(),
            );
        (player, recorder)
    }

    #[test]
    fn scheduled_notes_fire_in_order_with_offset() {
        let (mut player, recorder) = player_with_recorder();
        player.replace_notes(0, vec![note(0, Some(48), C4), note(96, Some(48), E4)]);

        player.set_playback_state(PlaybackState::Started);
        let steps = player.drive_ticks(200);

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].tick, SCHEDULE_OFFSET);
        assert_eq!(steps[0].note.pitch, C4);
        assert_eq!(steps[1].tick, 96 + SCHEDULE_OFFSET);
        assert_eq!(steps[1].note.pitch, E4);

        let recorder = recorder.lock();
        assert_eq!(recorder.attacks(), 2);
    }

    #[test]
    fn tempo_automation_applies_during_playback() {
        let (mut player, _) = player_with_recorder();
        player.replace_tempos(vec![tempo(0, 120.0), tempo(96, 150.0)]);

        player.set_playback_state(PlaybackState::Started);
        player.drive_ticks(200);

        assert_eq!(player.clock().bpm(), 150.0);
    }

    #[test]
    fn note_at_a_tempo_change_tick_sees_the_new_tempo() {
        // Both events land on the same absolute tick; automation must win
        // the tie so the fired note observes 150 bpm.
        let (mut player, _) = player_with_recorder();
        player.replace_tempos(vec![tempo(10, 150.0)]);
        player.replace_notes(0, vec![note(10, Some(48), C4)]);
        player.set_playback_state(PlaybackState::Started);

        // Drive up to just before the shared fire tick, then step across it.
        player.drive_ticks(11);
        assert_eq!(player.clock().bpm(), 120.0);

        let steps = player.drive_ticks(1);
        assert_eq!(steps.len(), 1);
        assert_eq!(player.clock().bpm(), 150.0);
    }

    #[test]
    fn past_tempo_edit_corrects_immediately() {
        let (mut player, _) = player_with_recorder();
        let tempos = vec![tempo(0, 120.0), tempo(960, 150.0)];
        player.replace_tempos(tempos.clone());
        player.set_playback_state(PlaybackState::Started);
        player.drive_ticks(1200);

        player.replace_tempos(tempos);
        assert_eq!(player.clock().bpm(), 150.0);
    }

    #[test]
    fn time_signature_automation_applies() {
        let (mut player, _) = player_with_recorder();
        player.replace_time_signatures(vec![TimeSignatureEvent {
            tick: 0,
            signature: TimeSignature::new(5, 4),
        }]);
        player.set_playback_state(PlaybackState::Started);
        player.drive_ticks(10);

        assert_eq!(player.clock().time_signature(), TimeSignature::new(5, 4));
    }

    #[test]
    fn stop_resets_and_replays_from_the_top() {
        let (mut player, recorder) = player_with_recorder();
        player.replace_notes(0, vec![note(0, Some(48), C4)]);

        player.set_playback_state(PlaybackState::Started);
        assert_eq!(player.drive_ticks(50).len(), 1);

        player.set_playback_state(PlaybackState::Stopped);
        assert_eq!(player.clock().current_tick(), 0);
        assert!(player.drive_ticks(50).is_empty());

        player.set_playback_state(PlaybackState::Started);
        assert_eq!(player.drive_ticks(50).len(), 1);

        // Two runs: two attacks, plus the forced release at stop.
        let recorder = recorder.lock();
        assert_eq!(recorder.attacks(), 2);
        assert!(recorder.commands.contains(&VoiceCommand::ReleaseAll));
    }

    #[test]
    fn pause_resumes_without_refiring() {
        let (mut player, recorder) = player_with_recorder();
        player.replace_notes(0, vec![note(0, Some(48), C4), note(300, Some(48), E4)]);

        player.set_playback_state(PlaybackState::Started);
        player.drive_ticks(100);
        player.set_playback_state(PlaybackState::Paused);
        assert_eq!(player.clock().current_tick(), 100);

        player.set_playback_state(PlaybackState::Started);
        let steps = player.drive_ticks(250);

        // Only the second note fires after the resume.
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].note.pitch, E4);
        assert_eq!(recorder.lock().attacks(), 2);
    }

    #[test]
    fn drive_while_stopped_is_silent() {
        let (mut player, _) = player_with_recorder();
        player.replace_notes(0, vec![note(0, Some(48), C4)]);
        assert!(player.drive_ticks(100).is_empty());
        assert!(player.drive_seconds(1.0).is_empty());
    }

    #[test]
    fn seconds_drive_follows_tempo() {
        let (mut player, _) = player_with_recorder();
        player.set_playback_state(PlaybackState::Started);

        player.drive_seconds(1.0);
        assert_eq!(player.clock().current_tick(), 2 * TICKS_PER_QUARTER as Tick);
    }

    #[test]
    fn unknown_track_edits_are_ignored() {
        let mut player = Player::new();
        assert!(player.replace_notes(7, vec![]).is_none());
        player.set_active_notes(7, &[]);
    }

    #[test]
    fn master_settings_are_stored() {
        let mut player = Player::new();
        player.set_master(MasterConfig {
            volume: -18.0,
            muted: true,
        });
        assert_eq!(player.master().volume, -18.0);
        assert!(player.master().muted);
    }
}
