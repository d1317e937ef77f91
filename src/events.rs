use serde::{Deserialize, Serialize};

use crate::audio::Pitch;
use crate::timing::PartEvent;

/// Absolute musical time. Every scheduled event is keyed by a tick position.
pub type Tick = u64;

/// Transport resolution, in ticks per quarter note.
pub const TICKS_PER_QUARTER: u32 = 192;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEvent {
    pub tick: Tick,
    pub bpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats_per_bar: u8,
    pub beat_unit: u8,
}

impl TimeSignature {
    pub fn new(beats_per_bar: u8, beat_unit: u8) -> Self {
        Self {
            beats_per_bar,
            beat_unit,
        }
    }

    pub fn four_four() -> Self {
        Self::new(4, 4)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.beats_per_bar, self.beat_unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignatureEvent {
    pub tick: Tick,
    pub signature: TimeSignature,
}

/// One note in a track's list. `duration: None` is an open-ended note: the
/// voice is attacked and stays sounding until an explicit later release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub tick: Tick,
    pub duration: Option<Tick>,
    pub pitch: Pitch,
    /// Normalized 0.0..=1.0
    pub velocity: f32,
}

impl NoteEvent {
    pub fn new(tick: Tick, duration: Option<Tick>, pitch: Pitch, velocity: f32) -> Self {
        Self {
            tick,
            duration,
            pitch,
            velocity,
        }
    }
}

/// A fired note, as streamed to observers outside the engine.
#[derive(Debug, Clone)]
pub struct StepEvent {
    pub track_id: usize,
    pub tick: Tick,
    pub note: NoteEvent,
}

impl PartEvent for TempoEvent {
    fn tick(&self) -> Tick {
        self.tick
    }
}

impl PartEvent for TimeSignatureEvent {
    fn tick(&self) -> Tick {
        self.tick
    }
}

impl PartEvent for NoteEvent {
    fn tick(&self) -> Tick {
        self.tick
    }
}
