mod effects;
mod instrument;
mod pitch;
mod track;
mod voice;

pub use effects::{Effect, EffectKind, EffectsChain, RoutingNode, build_routing};
pub use instrument::{
    Instrument, InstrumentKind, ReadySampleLoader, SampleBatchReport, SampleLoadError,
    SampleLoader, SamplerVoice, SynthModel,
};
pub use pitch::{Pitch, PitchError};
pub use track::{ChannelConfig, Track};
pub use voice::{
    ActiveNote, PolyVoice, VoiceError, VoiceHandle, VoiceManager, VoiceTrigger,
    diff_active_notes,
};

#[cfg(test)]
pub(crate) use voice::test_support;
