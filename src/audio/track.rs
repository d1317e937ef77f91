use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::audio::effects::{Effect, EffectsChain};
use crate::audio::instrument::{Instrument, InstrumentKind, SampleBatchReport, SampleLoader};
use crate::audio::voice::{ActiveNote, VoiceHandle};
use crate::events::{NoteEvent, Tick};
use crate::timing::{Due, Part, PlaybackState, Reconcile, SCHEDULE_OFFSET};

/// Track-level channel strip settings. Passed to instruments at
/// construction and pushed through explicit setters afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Decibels relative to unity.
    pub volume: f32,
    /// -1.0 (left) ..= 1.0 (right)
    pub pan: f32,
    pub muted: bool,
    pub soloed: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            volume: 0.0,
            pan: 0.0,
            muted: false,
            soloed: false,
        }
    }
}

type StepObserver = Box<dyn FnMut(Tick, &NoteEvent) + Send>;

/// One sequencer track: the note list, its scheduled part, the channel
/// strip, the effects chain, and every attached instrument.
pub struct Track {
    pub id: usize,
    pub name: String,
    channel: ChannelConfig,
    notes: Vec<NoteEvent>,
    part: Option<Part<NoteEvent>>,
    chain: EffectsChain,
    instruments: Vec<Instrument>,
    on_step_play: Option<StepObserver>,
}

impl Track {
    pub fn new(id: usize, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            channel: ChannelConfig::default(),
            notes: Vec::new(),
            part: None,
            chain: EffectsChain::new(),
            instruments: Vec::new(),
            on_step_play: None,
        }
    }

    pub fn channel(&self) -> ChannelConfig {
        self.channel
    }

    pub fn set_channel(&mut self, channel: ChannelConfig) {
        self.channel = channel;
        for instrument in &mut self.instruments {
            instrument.set_channel(channel);
        }
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn instrument_mut(&mut self, index: usize) -> Option<&mut Instrument> {
        self.instruments.get_mut(index)
    }

    pub fn effects(&self) -> &EffectsChain {
        &self.chain
    }

    pub fn set_on_step_play(&mut self, observer: StepObserver) {
        self.on_step_play = Some(observer);
    }

    pub fn add_instrument(
        &mut self,
        kind: InstrumentKind,
        loader: &dyn SampleLoader,
    ) -> Option<SampleBatchReport> {
        let (instrument, report) = Instrument::new(kind, self.channel, &self.chain, loader);
        self.instruments.push(instrument);
        report
    }

    /// Attach an instrument whose voice lives in the external synthesis
    /// layer.
    pub fn add_instrument_with_voice(&mut self, kind: InstrumentKind, voice: VoiceHandle) {
        self.instruments
            .push(Instrument::with_voice(kind, voice, self.channel, &self.chain));
    }

    pub fn set_instrument_kind(
        &mut self,
        index: usize,
        kind: InstrumentKind,
        loader: &dyn SampleLoader,
    ) -> Option<SampleBatchReport> {
        let chain = &self.chain;
        self.instruments
            .get_mut(index)
            .and_then(|instrument| instrument.set_kind(kind, chain, loader))
    }

    /// Chain mutations rebuild every attached instrument's routing whole.
    pub fn add_effect(&mut self, effect: Effect) {
        self.chain.add_effect(effect);
        self.reconnect_all();
    }

    pub fn remove_effect(&mut self, id: &str) {
        self.chain.remove_effect(id);
        self.reconnect_all();
    }

    fn reconnect_all(&mut self) {
        for instrument in &mut self.instruments {
            instrument.reconnect(&self.chain);
        }
    }

    /// Replace the note list, reconciling the scheduled part when one
    /// exists.
    pub fn set_notes(&mut self, notes: Vec<NoteEvent>) -> Option<Reconcile> {
        let outcome = self.part.as_mut().map(|part| part.reconcile(&notes));
        self.notes = notes;
        outcome
    }

    /// The note part is created only on `stopped -> started` and stopped
    /// (not disposed) on `stopped`; disposal happens when the track is
    /// dropped. Every transition away from `started` force-releases all
    /// attached voices, whatever their scheduled durations.
    pub fn on_playback_state_change(&mut self, prev: PlaybackState, next: PlaybackState) {
        if prev == PlaybackState::Stopped && next == PlaybackState::Started {
            let mut part = Part::new(&self.notes);
            part.start(SCHEDULE_OFFSET);
            self.part = Some(part);
        } else if next == PlaybackState::Stopped {
            if let Some(part) = &mut self.part {
                part.stop();
            }
        }

        if next != PlaybackState::Started {
            for instrument in &mut self.instruments {
                instrument.release_all();
            }
        }
    }

    /// Live input path: the externally derived active-note set, fanned to
    /// every attached instrument's voice manager.
    pub fn set_active_notes(&mut self, notes: &[ActiveNote]) {
        for instrument in &mut self.instruments {
            instrument.update_active_notes(notes);
        }
    }

    pub fn collect_due(&self, span: &Range<Tick>) -> Vec<Due<NoteEvent>> {
        match &self.part {
            Some(part) => part.collect_due(span),
            None => Vec::new(),
        }
    }

    /// Fire one scheduled note: every attached voice receives it, then the
    /// step observer runs.
    pub fn dispatch(&mut self, tick: Tick, note: &NoteEvent) {
        if let Some(part) = &self.part {
            part.begin_dispatch();
        }

        for instrument in &mut self.instruments {
            let voice = instrument.voice();
            let mut voice = voice.lock();
            match note.duration {
                Some(duration) => {
                    voice.trigger_attack_release(note.pitch, duration, Some(tick), note.velocity)
                }
                None => voice.trigger_attack(note.pitch, note.velocity),
            }
        }

        if let Some(observer) = &mut self.on_step_play {
            observer(tick, note);
        }

        if let Some(part) = &self.part {
            part.end_dispatch();
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.part.as_ref().is_some_and(|part| part.is_started())
    }
}
