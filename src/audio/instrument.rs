use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::audio::effects::{EffectsChain, RoutingNode, build_routing};
use crate::audio::track::ChannelConfig;
use crate::audio::voice::{
    ActiveNote, PolyVoice, VoiceError, VoiceHandle, VoiceManager, VoiceTrigger,
};
use crate::audio::Pitch;
use crate::events::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SynthModel {
    Simple,
    Am,
    Fm,
    Mono,
    Duo,
    Membrane,
    Metal,
    Noise,
    Pluck,
}

/// What an instrument sounds like. All synth models are polyphonic; a
/// sampler maps pitches to externally stored sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstrumentKind {
    Synth {
        model: SynthModel,
        polyphony: usize,
    },
    Sampler {
        samples: BTreeMap<Pitch, String>,
    },
}

impl InstrumentKind {
    pub fn synth(model: SynthModel, polyphony: usize) -> Self {
        InstrumentKind::Synth { model, polyphony }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleLoadError {
    #[error("sample source not found: {0}")]
    NotFound(String),
    #[error("sample decode failed: {0}")]
    Decode(String),
}

/// Resolves a sample source for one pitch. The store behind it (filesystem,
/// network, test fixture) is external to the crate.
pub trait SampleLoader: Send {
    fn load(&self, pitch: Pitch, source: &str) -> Result<(), SampleLoadError>;
}

/// A loader that resolves every source immediately; stands in for the
/// external store in demos.
pub struct ReadySampleLoader;

impl SampleLoader for ReadySampleLoader {
    fn load(&self, _pitch: Pitch, _source: &str) -> Result<(), SampleLoadError> {
        Ok(())
    }
}

/// Aggregated outcome of one sample-loading batch. A failed key never
/// aborts the batch; it is reported here instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBatchReport {
    pub loaded: Vec<Pitch>,
    pub failed: Vec<(Pitch, SampleLoadError)>,
}

impl SampleBatchReport {
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Bookkeeping sampler voice: tracks which pitches have a loaded sample and
/// which open-ended notes are held. No DSP.
#[derive(Default)]
pub struct SamplerVoice {
    loaded: BTreeSet<Pitch>,
    held: Vec<Pitch>,
}

impl SamplerVoice {
    pub fn mark_loaded(&mut self, pitch: Pitch) {
        self.loaded.insert(pitch);
    }

    pub fn is_loaded(&self, pitch: Pitch) -> bool {
        self.loaded.contains(&pitch)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    fn playable(&self, pitch: Pitch) -> bool {
        if self.loaded.is_empty() {
            warn!(%pitch, "sampler has no loaded samples");
            return false;
        }
        if !self.loaded.contains(&pitch) {
            // Repitched from the nearest loaded sample downstream.
            debug!(%pitch, "no exact sample, repitching");
        }
        true
    }
}

impl VoiceTrigger for SamplerVoice {
    fn trigger_attack_release(
        &mut self,
        pitch: Pitch,
        _duration: Tick,
        _at: Option<Tick>,
        _velocity: f32,
    ) {
        self.playable(pitch);
    }

    fn trigger_attack(&mut self, pitch: Pitch, _velocity: f32) {
        if self.playable(pitch) {
            self.held.push(pitch);
        }
    }

    fn trigger_release(&mut self, pitch: Pitch) {
        if let Some(i) = self.held.iter().position(|p| *p == pitch) {
            self.held.remove(i);
        }
    }

    fn release_all(&mut self) -> Result<(), VoiceError> {
        self.held.clear();
        Ok(())
    }
}

enum VoiceBackend {
    Poly(Arc<Mutex<PolyVoice>>),
    Sampler(Arc<Mutex<SamplerVoice>>),
    /// A voice supplied by the embedding synthesis layer.
    External(VoiceHandle),
}

impl VoiceBackend {
    fn for_kind(kind: &InstrumentKind) -> Self {
        match kind {
            InstrumentKind::Synth { polyphony, .. } => {
                VoiceBackend::Poly(Arc::new(Mutex::new(PolyVoice::new(*polyphony))))
            }
            InstrumentKind::Sampler { .. } => {
                VoiceBackend::Sampler(Arc::new(Mutex::new(SamplerVoice::default())))
            }
        }
    }

    fn handle(&self) -> VoiceHandle {
        match self {
            VoiceBackend::Poly(voice) => voice.clone(),
            VoiceBackend::Sampler(voice) => voice.clone(),
            VoiceBackend::External(voice) => voice.clone(),
        }
    }
}

/// One instrument on a track: owns exactly one voice, the channel settings
/// it was constructed with, and its rebuilt signal routing.
pub struct Instrument {
    kind: InstrumentKind,
    backend: VoiceBackend,
    manager: VoiceManager,
    channel: ChannelConfig,
    routing: Vec<RoutingNode>,
    reconnects: u64,
}

impl Instrument {
    pub fn new(
        kind: InstrumentKind,
        channel: ChannelConfig,
        chain: &EffectsChain,
        loader: &dyn SampleLoader,
    ) -> (Self, Option<SampleBatchReport>) {
        let backend = VoiceBackend::for_kind(&kind);
        let manager = VoiceManager::new(backend.handle());
        let mut instrument = Self {
            kind,
            backend,
            manager,
            channel,
            routing: build_routing(chain),
            reconnects: 0,
        };
        let report = instrument.load_initial_samples(loader);
        (instrument, report)
    }

    /// Builds an instrument around a voice owned by the external synthesis
    /// layer. A later [`Instrument::set_kind`] replaces it with a built-in
    /// voice like any other kind change.
    pub fn with_voice(
        kind: InstrumentKind,
        voice: VoiceHandle,
        channel: ChannelConfig,
        chain: &EffectsChain,
    ) -> Self {
        let backend = VoiceBackend::External(voice);
        let manager = VoiceManager::new(backend.handle());
        Self {
            kind,
            backend,
            manager,
            channel,
            routing: build_routing(chain),
            reconnects: 0,
        }
    }

    pub fn kind(&self) -> &InstrumentKind {
        &self.kind
    }

    pub fn channel(&self) -> &ChannelConfig {
        &self.channel
    }

    pub fn set_channel(&mut self, channel: ChannelConfig) {
        self.channel = channel;
    }

    pub fn voice(&self) -> VoiceHandle {
        self.manager.voice()
    }

    pub fn routing(&self) -> &[RoutingNode] {
        &self.routing
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Full disconnect and reconnect through the current chain into the
    /// track channel and master output.
    pub fn reconnect(&mut self, chain: &EffectsChain) {
        self.routing.clear();
        self.routing = build_routing(chain);
        self.reconnects += 1;
    }

    /// Changing the kind disposes the voice and builds a fresh one.
    /// Mid-flight notes do not survive the boundary; that is logged, not an
    /// error.
    pub fn set_kind(
        &mut self,
        kind: InstrumentKind,
        chain: &EffectsChain,
        loader: &dyn SampleLoader,
    ) -> Option<SampleBatchReport> {
        if kind == self.kind {
            return None;
        }
        if !self.manager.active_notes().is_empty() {
            debug!(
                notes = self.manager.active_notes().len(),
                "instrument change drops mid-flight notes"
            );
        }
        self.manager.release_all();

        self.kind = kind;
        self.backend = VoiceBackend::for_kind(&self.kind);
        self.manager = VoiceManager::new(self.backend.handle());
        self.reconnect(chain);
        self.load_initial_samples(loader)
    }

    /// Replace the sampler's source map. Only newly added keys are loaded;
    /// unchanged keys are never reloaded. Returns one aggregated report for
    /// the batch, `None` when nothing needed loading.
    pub fn set_samples(
        &mut self,
        samples: BTreeMap<Pitch, String>,
        loader: &dyn SampleLoader,
    ) -> Option<SampleBatchReport> {
        let InstrumentKind::Sampler { samples: current } = &mut self.kind else {
            warn!("set_samples on a synth instrument");
            return None;
        };

        let added: Vec<(Pitch, String)> = samples
            .iter()
            .filter(|(pitch, _)| !current.contains_key(pitch))
            .map(|(pitch, source)| (*pitch, source.clone()))
            .collect();
        *current = samples;

        if added.is_empty() {
            return None;
        }
        Some(self.load_batch(&added, loader))
    }

    pub fn update_active_notes(&mut self, next: &[ActiveNote]) {
        self.manager.update_active_notes(next);
    }

    pub fn release_all(&mut self) {
        self.manager.release_all();
    }

    fn load_initial_samples(&mut self, loader: &dyn SampleLoader) -> Option<SampleBatchReport> {
        let InstrumentKind::Sampler { samples } = &self.kind else {
            return None;
        };
        if samples.is_empty() {
            return None;
        }
        let batch: Vec<(Pitch, String)> = samples
            .iter()
            .map(|(pitch, source)| (*pitch, source.clone()))
            .collect();
        Some(self.load_batch(&batch, loader))
    }

    fn load_batch(
        &mut self,
        batch: &[(Pitch, String)],
        loader: &dyn SampleLoader,
    ) -> SampleBatchReport {
        let mut report = SampleBatchReport::default();
        for (pitch, source) in batch {
            match loader.load(*pitch, source) {
                Ok(()) => {
                    if let VoiceBackend::Sampler(voice) = &self.backend {
                        voice.lock().mark_loaded(*pitch);
                    }
                    report.loaded.push(*pitch);
                }
                Err(err) => {
                    warn!(pitch = %pitch, %err, "sample failed to load");
                    report.failed.push((*pitch, err));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const C4: Pitch = Pitch(60);
    const E4: Pitch = Pitch(64);

    struct CountingLoader {
        calls: RefCell<Vec<Pitch>>,
        fail_sources: Vec<String>,
    }

    impl CountingLoader {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail_sources: Vec::new(),
            }
        }

        fn failing_on(source: &str) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail_sources: vec![source.to_string()],
            }
        }
    }

    impl SampleLoader for CountingLoader {
        fn load(&self, pitch: Pitch, source: &str) -> Result<(), SampleLoadError> {
            self.calls.borrow_mut().push(pitch);
            if self.fail_sources.iter().any(|s| s == source) {
                Err(SampleLoadError::NotFound(source.to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn sampler_kind(entries: &[(Pitch, &str)]) -> InstrumentKind {
        InstrumentKind::Sampler {
            samples: entries
                .iter()
                .map(|(p, s)| (*p, s.to_string()))
                .collect(),
        }
    }

    fn synth() -> InstrumentKind {
        InstrumentKind::synth(SynthModel::Simple, 8)
    }

    #[test]
    fn sampler_loads_all_samples_at_construction() {
        let loader = CountingLoader::new();
        let (_instrument, report) = Instrument::new(
            sampler_kind(&[(C4, "c4.wav"), (E4, "e4.wav")]),
            ChannelConfig::default(),
            &EffectsChain::new(),
            &loader,
        );

        let report = report.expect("sampler reports its initial batch");
        assert_eq!(report.loaded, vec![C4, E4]);
        assert!(report.all_ok());
    }

    #[test]
    fn only_new_keys_are_loaded_incrementally() {
        let loader = CountingLoader::new();
        let (mut instrument, _) = Instrument::new(
            sampler_kind(&[(C4, "c4.wav")]),
            ChannelConfig::default(),
            &EffectsChain::new(),
            &loader,
        );

        let next: BTreeMap<Pitch, String> = [(C4, "c4.wav"), (E4, "e4.wav")]
            .into_iter()
            .map(|(p, s)| (p, s.to_string()))
            .collect();
        let report = instrument.set_samples(next, &loader).unwrap();

        assert_eq!(report.loaded, vec![E4]);
        // C4 once at construction, E4 once now.
        assert_eq!(*loader.calls.borrow(), vec![C4, E4]);
    }

    #[test]
    fn unchanged_map_loads_nothing() {
        let loader = CountingLoader::new();
        let (mut instrument, _) = Instrument::new(
            sampler_kind(&[(C4, "c4.wav")]),
            ChannelConfig::default(),
            &EffectsChain::new(),
            &loader,
        );

        let same: BTreeMap<Pitch, String> =
            [(C4, "c4.wav")].into_iter().map(|(p, s)| (p, s.to_string())).collect();
        assert!(instrument.set_samples(same, &loader).is_none());
        assert_eq!(loader.calls.borrow().len(), 1);
    }

    #[test]
    fn one_bad_sample_does_not_abort_the_batch() {
        let loader = CountingLoader::failing_on("missing.wav");
        let (_instrument, report) = Instrument::new(
            sampler_kind(&[(C4, "missing.wav"), (E4, "e4.wav")]),
            ChannelConfig::default(),
            &EffectsChain::new(),
            &loader,
        );

        let report = report.unwrap();
        assert_eq!(report.loaded, vec![E4]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, C4);
    }

    #[test]
    fn kind_change_recreates_the_voice() {
        let loader = CountingLoader::new();
        let (mut instrument, _) = Instrument::new(
            synth(),
            ChannelConfig::default(),
            &EffectsChain::new(),
            &loader,
        );
        let old_voice = instrument.voice();

        instrument.update_active_notes(&[ActiveNote::new(C4, 0, None, 1.0)]);
        instrument.set_kind(
            sampler_kind(&[(C4, "c4.wav")]),
            &EffectsChain::new(),
            &loader,
        );

        assert!(!Arc::ptr_eq(&old_voice, &instrument.voice()));
        assert!(instrument.manager.active_notes().is_empty());
    }

    #[test]
    fn setting_the_same_kind_keeps_the_voice() {
        let loader = CountingLoader::new();
        let (mut instrument, _) = Instrument::new(
            synth(),
            ChannelConfig::default(),
            &EffectsChain::new(),
            &loader,
        );
        let voice = instrument.voice();

        assert!(instrument.set_kind(synth(), &EffectsChain::new(), &loader).is_none());
        assert!(Arc::ptr_eq(&voice, &instrument.voice()));
    }

    #[test]
    fn chain_mutation_reconnects_fully() {
        let loader = CountingLoader::new();
        let mut chain = EffectsChain::new();
        let (mut instrument, _) = Instrument::new(
            synth(),
            ChannelConfig::default(),
            &chain,
            &loader,
        );
        assert_eq!(instrument.reconnects(), 0);

        chain.add_effect(crate::audio::effects::Effect::new(
            "delay",
            crate::audio::effects::EffectKind::FeedbackDelay,
        ));
        instrument.reconnect(&chain);

        assert_eq!(instrument.reconnects(), 1);
        assert_eq!(instrument.routing().len(), 4);
        assert_eq!(instrument.routing()[0], RoutingNode::Voice);
        assert_eq!(instrument.routing()[3], RoutingNode::Master);
    }

    #[test]
    fn set_samples_on_a_synth_is_refused() {
        let loader = CountingLoader::new();
        let (mut instrument, _) = Instrument::new(
            synth(),
            ChannelConfig::default(),
            &EffectsChain::new(),
            &loader,
        );
        assert!(instrument.set_samples(BTreeMap::new(), &loader).is_none());
    }
}
