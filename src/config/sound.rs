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
use std::error::Error;
use std::path::PathBuf;

use serde::Deserialize;

use super::error::ConfigError;
use crate::music::{Bpm, Envelope, Melody, MelodyNote, NoteDuration};
use crate::sound::{Filter, Pitch, SoundSource, Waveform};

/// A duration is either a named code ("4n", "8n") or literal seconds.
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum DurationValue {
    Named(String),
    Seconds(f64),
}

impl DurationValue {
    fn to_duration(&self) -> Result<NoteDuration, Box<dyn Error>> {
        match self {
            DurationValue::Named(code) => Ok(code.parse()?),
            DurationValue::Seconds(secs) => Ok(NoteDuration::from_seconds(*secs)?),
        }
    }
}

/// A YAML representation of a tone.
#[derive(Deserialize, Clone)]
pub struct Tone {
    waveform: Option<Waveform>,
    /// Symbolic pitch, e.g. "C#4". Mutually exclusive with `frequency`.
    note: Option<String>,
    /// Pitch in Hz. Mutually exclusive with `note`.
    frequency: Option<f64>,
    duration: DurationValue,
    envelope: Option<Envelope>,
    filter: Option<Filter>,
}

impl Tone {
    fn to_tone(&self) -> Result<crate::sound::Tone, Box<dyn Error>> {
        let pitch = match (&self.note, self.frequency) {
            (Some(note), None) => Pitch::Note(note.parse()?),
            (None, Some(hz)) => Pitch::Hz(hz),
            _ => return Err("a tone takes exactly one of note or frequency".into()),
        };
        Ok(crate::sound::Tone {
            waveform: self.waveform.unwrap_or_default(),
            pitch,
            duration: self.duration.to_duration()?,
            envelope: self.envelope,
            filter: self.filter,
        })
    }
}

/// A YAML representation of one melody entry.
#[derive(Deserialize, Clone)]
pub struct MelodyEntry {
    /// A note name or the literal "rest".
    note: String,
    duration: DurationValue,
    velocity: Option<f64>,
}

/// A YAML representation of a melody.
#[derive(Deserialize, Clone)]
pub struct MelodyConfig {
    notes: Vec<MelodyEntry>,
    bpm: Option<u16>,
    waveform: Option<Waveform>,
    envelope: Option<Envelope>,
}

impl MelodyConfig {
    fn to_melody(&self) -> Result<Melody, Box<dyn Error>> {
        let mut notes = Vec::with_capacity(self.notes.len());
        for (index, entry) in self.notes.iter().enumerate() {
            let pitch = entry
                .note
                .parse()
                .map_err(|e| format!("note {index}: {e}"))?;
            let duration = entry
                .duration
                .to_duration()
                .map_err(|e| format!("note {index}: {e}"))?;
            notes.push(MelodyNote {
                pitch,
                duration,
                velocity: entry.velocity,
            });
        }
        Ok(Melody {
            notes,
            bpm: self.bpm.map(Bpm::new).transpose()?,
            waveform: self.waveform,
            envelope: self.envelope,
        })
    }
}

/// A YAML representation of a sound definition.
#[derive(Deserialize, Clone)]
pub struct Sound {
    tone: Option<Tone>,
    src: Option<PathBuf>,
    melody: Option<MelodyConfig>,
    volume: Option<f64>,
    #[serde(rename = "loop")]
    looped: Option<bool>,
    tags: Option<Vec<String>>,
}

impl Sound {
    /// Converts the raw definition into its validated domain form.
    pub fn to_sound(&self, name: &str) -> Result<crate::sound::Sound, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidSound {
            name: name.to_string(),
            reason,
        };

        let source = match (&self.tone, &self.src, &self.melody) {
            (Some(tone), None, None) => {
                SoundSource::Tone(tone.to_tone().map_err(|e| invalid(e.to_string()))?)
            }
            (None, Some(src), None) => SoundSource::File(src.clone()),
            (None, None, Some(melody)) => {
                SoundSource::Melody(melody.to_melody().map_err(|e| invalid(e.to_string()))?)
            }
            _ => {
                return Err(invalid(
                    "exactly one of tone, src, or melody must be set".to_string(),
                ))
            }
        };

        let sound = crate::sound::Sound {
            source,
            volume: self.volume.unwrap_or(1.0),
            looped: self.looped.unwrap_or(false),
            tags: self.tags.clone().unwrap_or_default(),
        };
        sound.validate().map_err(|e| invalid(e.to_string()))?;
        Ok(sound)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::music::MelodyPitch;

    fn parse(yaml: &str) -> Sound {
        serde_yml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_tone_with_note() {
        let sound = parse(
            r#"
tone:
  waveform: square
  note: C4
  duration: 8n
volume: 0.5
"#,
        )
        .to_sound("click")
        .unwrap();
        assert_eq!(sound.volume, 0.5);
        let SoundSource::Tone(tone) = sound.source else {
            panic!("expected a tone");
        };
        assert_eq!(tone.waveform, Waveform::Square);
        assert_eq!(tone.duration, NoteDuration::Eighth);
    }

    #[test]
    fn test_tone_with_frequency_and_filter() {
        let sound = parse(
            r#"
tone:
  frequency: 880.0
  duration: 0.25
  filter:
    type: lowpass
    cutoff_hz: 2000.0
"#,
        )
        .to_sound("beep")
        .unwrap();
        let SoundSource::Tone(tone) = sound.source else {
            panic!("expected a tone");
        };
        assert_eq!(tone.pitch, Pitch::Hz(880.0));
        assert!(tone.filter.is_some());
    }

    #[test]
    fn test_tone_requires_exactly_one_pitch() {
        let err = parse(
            r#"
tone:
  note: C4
  frequency: 440.0
  duration: 4n
"#,
        )
        .to_sound("bad")
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSound { .. }));
    }

    #[test]
    fn test_melody_with_rest() {
        let sound = parse(
            r#"
melody:
  bpm: 150
  notes:
    - { note: C4, duration: 8n }
    - { note: rest, duration: 8n }
    - { note: E4, duration: 8n, velocity: 0.8 }
"#,
        )
        .to_sound("jingle")
        .unwrap();
        let SoundSource::Melody(melody) = sound.source else {
            panic!("expected a melody");
        };
        assert_eq!(melody.bpm().get(), 150);
        assert_eq!(melody.notes.len(), 3);
        assert_eq!(melody.notes[1].pitch, MelodyPitch::Rest);
        assert_eq!(melody.notes[2].velocity, Some(0.8));
    }

    #[test]
    fn test_file_source() {
        let sound = parse("src: sounds/win.ogg\nloop: true")
            .to_sound("win")
            .unwrap();
        assert!(sound.looped);
        assert_eq!(
            sound.source,
            SoundSource::File(PathBuf::from("sounds/win.ogg"))
        );
    }

    #[test]
    fn test_multiple_sources_rejected() {
        let err = parse(
            r#"
src: a.ogg
tone:
  note: C4
  duration: 4n
"#,
        )
        .to_sound("bad")
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSound { .. }));
    }

    #[test]
    fn test_out_of_range_volume_rejected() {
        let err = parse("src: a.ogg\nvolume: 1.5").to_sound("loud").unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn test_bad_bpm_rejected() {
        let err = parse(
            r#"
melody:
  bpm: 10
  notes:
    - { note: C4, duration: 4n }
"#,
        )
        .to_sound("slow")
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSound { .. }));
    }
}
