use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::audio::{ChannelConfig, InstrumentKind};
use crate::events::{NoteEvent, TempoEvent, TimeSignatureEvent};
use crate::player::MasterConfig;

#[derive(Debug, Error)]
pub enum SongError {
    #[error("song io: {0}")]
    Io(#[from] std::io::Error),
    #[error("song decode: {0}")]
    Decode(#[from] ron::error::SpannedError),
    #[error("song encode: {0}")]
    Encode(#[from] ron::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackData {
    pub name: String,
    pub channel: ChannelConfig,
    pub instrument: InstrumentKind,
    pub notes: Vec<NoteEvent>,
}

/// Everything replaceable the player consumes, in one saveable unit. The
/// note, tempo and time-signature lists stay plain ordered lists; an editor
/// re-supplies them wholesale on every change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub name: String,
    pub master: MasterConfig,
    pub tempos: Vec<TempoEvent>,
    pub time_signatures: Vec<TimeSignatureEvent>,
    pub tracks: Vec<TrackData>,
}

impl Song {
    pub fn save(&self, path: &Path) -> Result<(), SongError> {
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SongError> {
        let ron_string = fs::read_to_string(path)?;
        Ok(ron::from_str(&ron_string)?)
    }
}
