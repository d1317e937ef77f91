use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use crate::audio::Pitch;
use crate::events::Tick;

/// Synthesis-layer fault while releasing. Isolated per instrument: callers
/// log it and keep the transport running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("voice failed to release: {0}")]
pub struct VoiceError(pub String);

/// Commands the scheduler issues to a sound-producing voice. The synthesis
/// behind them lives outside this crate.
pub trait VoiceTrigger: Send {
    /// Bounded note: attack at `at` (or immediately) and release after
    /// `duration` ticks.
    fn trigger_attack_release(
        &mut self,
        pitch: Pitch,
        duration: Tick,
        at: Option<Tick>,
        velocity: f32,
    );

    /// Open-ended note: attack only, released by a later explicit call.
    fn trigger_attack(&mut self, pitch: Pitch, velocity: f32);

    fn trigger_release(&mut self, pitch: Pitch);

    /// Hard all-notes-off.
    fn release_all(&mut self) -> Result<(), VoiceError>;
}

pub type VoiceHandle = Arc<Mutex<dyn VoiceTrigger>>;

/// A note currently considered sounding, as derived externally. Identity is
/// the `(pitch, key)` pair; `key` disambiguates simultaneous equal pitches.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveNote {
    pub pitch: Pitch,
    pub key: u32,
    pub duration: Option<Tick>,
    pub velocity: f32,
}

impl ActiveNote {
    pub fn new(pitch: Pitch, key: u32, duration: Option<Tick>, velocity: f32) -> Self {
        Self {
            pitch,
            key,
            duration,
            velocity,
        }
    }
}

/// Attack/release delta between the previous and the next active set.
///
/// A note is attacked only if its `(pitch, key)` pair was absent before, so
/// no pitch ever receives two attacks without an intervening release. Notes
/// that left the set are released by pitch alone.
pub fn diff_active_notes(prev: &[ActiveNote], next: &[ActiveNote], voice: &mut dyn VoiceTrigger) {
    for note in next {
        let already_playing = prev
            .iter()
            .any(|p| p.pitch == note.pitch && p.key == note.key);
        if already_playing {
            continue;
        }
        match note.duration {
            Some(duration) => voice.trigger_attack_release(note.pitch, duration, None, note.velocity),
            None => voice.trigger_attack(note.pitch, note.velocity),
        }
    }

    for note in prev {
        let still_playing = next.iter().any(|n| n.pitch == note.pitch);
        if !still_playing {
            voice.trigger_release(note.pitch);
        }
    }
}

/// Drives one voice from successive active-note sets. Strictly event-driven:
/// `update_active_notes` runs on data change, never on a timer.
pub struct VoiceManager {
    voice: VoiceHandle,
    active: Vec<ActiveNote>,
}

impl VoiceManager {
    pub fn new(voice: VoiceHandle) -> Self {
        Self {
            voice,
            active: Vec::new(),
        }
    }

    pub fn voice(&self) -> VoiceHandle {
        Arc::clone(&self.voice)
    }

    pub fn active_notes(&self) -> &[ActiveNote] {
        &self.active
    }

    pub fn update_active_notes(&mut self, next: &[ActiveNote]) {
        diff_active_notes(&self.active, next, &mut *self.voice.lock());
        self.active = next.to_vec();
    }

    /// Force-releases everything, including notes with unexpired durations.
    /// A voice that fails to release is logged, never propagated.
    pub fn release_all(&mut self) {
        self.active.clear();
        if let Err(err) = self.voice.lock().release_all() {
            warn!(%err, "force release failed");
        }
    }
}

/// Bookkeeping polyphonic voice: tracks held notes against a polyphony
/// bound, stealing the oldest held note when the bound is hit. No DSP.
pub struct PolyVoice {
    max_polyphony: usize,
    serial: u64,
    held: Vec<(Pitch, u64)>,
}

impl PolyVoice {
    pub fn new(max_polyphony: usize) -> Self {
        Self {
            max_polyphony: max_polyphony.max(1),
            serial: 0,
            held: Vec::new(),
        }
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    pub fn is_holding(&self, pitch: Pitch) -> bool {
        self.held.iter().any(|(p, _)| *p == pitch)
    }

    fn allocate(&mut self, pitch: Pitch) {
        if self.held.len() >= self.max_polyphony {
            // Steal the oldest held note.
            let oldest = self
                .held
                .iter()
                .enumerate()
                .min_by_key(|(_, (_, serial))| *serial)
                .map(|(i, _)| i);
            if let Some(i) = oldest {
                let (stolen, _) = self.held.remove(i);
                warn!(%stolen, polyphony = self.max_polyphony, "voice stealing");
            }
        }
        self.held.push((pitch, self.serial));
        self.serial += 1;
    }
}

impl VoiceTrigger for PolyVoice {
    fn trigger_attack_release(
        &mut self,
        _pitch: Pitch,
        _duration: Tick,
        _at: Option<Tick>,
        _velocity: f32,
    ) {
        // Bounded notes release themselves downstream after their duration;
        // only open-ended notes occupy a held slot.
        self.serial += 1;
    }

    fn trigger_attack(&mut self, pitch: Pitch, _velocity: f32) {
        self.allocate(pitch);
    }

    fn trigger_release(&mut self, pitch: Pitch) {
        match self.held.iter().position(|(p, _)| *p == pitch) {
            Some(i) => {
                self.held.remove(i);
            }
            None => warn!(%pitch, "release for a pitch that is not held"),
        }
    }

    fn release_all(&mut self) -> Result<(), VoiceError> {
        self.held.clear();
        Ok(())
    }
}
