// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The sound definition model.
//!
//! A [`Sound`] is the unit games author: a synthesized tone, a file
//! reference, or a melody, plus shared volume/loop metadata. The source is a
//! real tagged union, so "exactly one of tone/src/melody" holds by
//! construction; the YAML authoring layer in [`crate::config`] enforces it
//! while converting.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::music::duration::DurationError;
use crate::music::melody::MelodyError;
use crate::music::note::NoteError;
use crate::music::{Envelope, Melody, Note, NoteDuration};

#[derive(Debug, thiserror::Error)]
pub enum SoundError {
    #[error("{0}")]
    Note(#[from] NoteError),

    #[error("{0}")]
    Duration(#[from] DurationError),

    #[error("{0}")]
    Melody(#[from] MelodyError),

    #[error("volume {0} is outside [0, 1]")]
    VolumeOutOfRange(f64),

    #[error("frequency {0} Hz is not positive")]
    InvalidFrequency(f64),

    #[error("filter cutoff {0} Hz is not positive")]
    InvalidFilterCutoff(f64),
}

/// The waveform shapes the synthesis backend can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
    Noise,
}

impl Default for Waveform {
    fn default() -> Waveform {
        Waveform::Sine
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    LowPass,
    HighPass,
}

/// An optional filter applied to a rendered tone.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Filter {
    #[serde(rename = "type")]
    pub kind: FilterKind,
    pub cutoff_hz: f64,
}

/// How a tone's pitch is given: a symbolic note or a raw frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pitch {
    Note(Note),
    Hz(f64),
}

impl Pitch {
    /// Resolves to a frequency in Hz.
    pub fn frequency(&self) -> f64 {
        match self {
            Pitch::Note(note) => note.frequency(),
            Pitch::Hz(hz) => *hz,
        }
    }
}

/// A single synthesized sound.
#[derive(Debug, Clone, PartialEq)]
pub struct Tone {
    pub waveform: Waveform,
    pub pitch: Pitch,
    pub duration: NoteDuration,
    pub envelope: Option<Envelope>,
    pub filter: Option<Filter>,
}

impl Tone {
    pub fn new(waveform: Waveform, pitch: Pitch, duration: NoteDuration) -> Tone {
        Tone {
            waveform,
            pitch,
            duration,
            envelope: None,
            filter: None,
        }
    }

    fn validate(&self) -> Result<(), SoundError> {
        if let Pitch::Hz(hz) = self.pitch {
            if hz <= 0.0 || !hz.is_finite() {
                return Err(SoundError::InvalidFrequency(hz));
            }
        }
        if let NoteDuration::Seconds(secs) = self.duration {
            if secs <= 0.0 || !secs.is_finite() {
                return Err(SoundError::Duration(DurationError::NonPositive(secs)));
            }
        }
        if let Some(filter) = &self.filter {
            if filter.cutoff_hz <= 0.0 || !filter.cutoff_hz.is_finite() {
                return Err(SoundError::InvalidFilterCutoff(filter.cutoff_hz));
            }
        }
        Ok(())
    }
}

/// What a sound actually is. Exactly one variant holds by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum SoundSource {
    Tone(Tone),
    File(PathBuf),
    Melody(Melody),
}

/// A playable sound definition plus shared metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Sound {
    pub source: SoundSource,
    /// Definition-level gain fraction, merged multiplicatively at play time.
    pub volume: f64,
    pub looped: bool,
    pub tags: Vec<String>,
}

impl Sound {
    pub fn new(source: SoundSource) -> Sound {
        Sound {
            source,
            volume: 1.0,
            looped: false,
            tags: Vec::new(),
        }
    }

    /// Validates the definition. Definition errors are an authoring concern;
    /// they fail here, synchronously, not during playback.
    pub fn validate(&self) -> Result<(), SoundError> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(SoundError::VolumeOutOfRange(self.volume));
        }
        match &self.source {
            SoundSource::Tone(tone) => tone.validate(),
            SoundSource::File(_) => Ok(()),
            SoundSource::Melody(melody) => Ok(melody.validate()?),
        }
    }
}

/// A per-game named collection of sound definitions.
pub type SoundMap = HashMap<String, Sound>;

/// Per-call playback options, merged over the definition.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayOptions {
    /// Extra gain fraction, multiplied with the definition and master volume.
    pub volume: Option<f64>,
    /// Overrides the definition's loop flag.
    pub looped: Option<bool>,
    /// Schedules playback this far in the future on the engine clock.
    pub when: Option<Duration>,
}

impl PlayOptions {
    /// Playback volume for this call only (1.0 when unset).
    pub fn volume_or_default(&self) -> f64 {
        self.volume.unwrap_or(1.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::music::Bpm;

    fn click() -> Sound {
        Sound::new(SoundSource::Tone(Tone::new(
            Waveform::Square,
            Pitch::Note("C6".parse().unwrap()),
            "16n".parse().unwrap(),
        )))
    }

    #[test]
    fn test_valid_tone() {
        assert!(click().validate().is_ok());
    }

    #[test]
    fn test_volume_bounds() {
        let mut sound = click();
        sound.volume = 1.2;
        assert!(matches!(
            sound.validate(),
            Err(SoundError::VolumeOutOfRange(_))
        ));
    }

    #[test]
    fn test_invalid_frequency() {
        let sound = Sound::new(SoundSource::Tone(Tone::new(
            Waveform::Sine,
            Pitch::Hz(-100.0),
            NoteDuration::Seconds(0.5),
        )));
        assert!(matches!(
            sound.validate(),
            Err(SoundError::InvalidFrequency(_))
        ));
    }

    #[test]
    fn test_invalid_filter_cutoff() {
        let mut tone = Tone::new(
            Waveform::Sine,
            Pitch::Hz(440.0),
            NoteDuration::Seconds(0.5),
        );
        tone.filter = Some(Filter {
            kind: FilterKind::LowPass,
            cutoff_hz: 0.0,
        });
        let sound = Sound::new(SoundSource::Tone(tone));
        assert!(matches!(
            sound.validate(),
            Err(SoundError::InvalidFilterCutoff(_))
        ));
    }

    #[test]
    fn test_melody_validation_flows_through() {
        let sound = Sound::new(SoundSource::Melody(Melody {
            notes: vec![],
            bpm: Some(Bpm::default()),
            ..Default::default()
        }));
        assert!(matches!(sound.validate(), Err(SoundError::Melody(_))));
    }
}
