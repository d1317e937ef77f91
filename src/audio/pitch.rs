use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PitchError {
    #[error("unrecognized pitch name: {0:?}")]
    Unrecognized(String),
    #[error("pitch outside the MIDI range: {0:?}")]
    OutOfRange(String),
}

/// A pitch, stored as its MIDI note number and written in name form
/// ("C4", "A#5", "Bb2"). Middle C is 60.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pitch(pub u8);

impl Pitch {
    pub fn midi(&self) -> u8 {
        self.0
    }

    pub fn pitch_class(&self) -> &'static str {
        NOTE_NAMES[(self.0 % 12) as usize]
    }

    pub fn octave(&self) -> i32 {
        (self.0 / 12) as i32 - 1
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class(), self.octave())
    }
}

impl FromStr for Pitch {
    type Err = PitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unrecognized = || PitchError::Unrecognized(s.to_string());

        let mut chars = s.chars();
        let letter = chars.next().ok_or_else(unrecognized)?;
        let class: i32 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(unrecognized()),
        };

        let rest = chars.as_str();
        let (accidental, octave_str) = if let Some(r) = rest.strip_prefix("bb") {
            (-2, r)
        } else if let Some(r) = rest.strip_prefix('b') {
            (-1, r)
        } else if let Some(r) = rest.strip_prefix('#') {
            (1, r)
        } else if let Some(r) = rest.strip_prefix('x') {
            (2, r)
        } else {
            (0, rest)
        };

        let octave: i32 = octave_str.parse().map_err(|_| unrecognized())?;
        let midi = class + accidental + (octave + 1) * 12;
        u8::try_from(midi)
            .ok()
            .filter(|&m| m <= 127)
            .map(Pitch)
            .ok_or_else(|| PitchError::OutOfRange(s.to_string()))
    }
}

impl Serialize for Pitch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pitch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}
