pub mod audio;
pub mod engine;
pub mod events;
pub mod player;
pub mod project;
pub mod timing;

pub use engine::{EngineCommand, EngineHandle, EngineUpdate, spawn_engine, spawn_engine_with_loader};
pub use events::{
    NoteEvent, StepEvent, TICKS_PER_QUARTER, TempoEvent, Tick, TimeSignature, TimeSignatureEvent,
};
pub use player::{MasterConfig, Player};
pub use project::{Song, SongError, TrackData};
pub use timing::{Clock, ClockSnapshot, PlaybackState};
