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

//! Ordered note sequences with tempo.
//!
//! A melody is scheduled up front: every note gets an absolute offset from
//! the melody start before any playback happens, so sequencing does not
//! depend on the order asynchronous play calls land in.

use std::str::FromStr;

use super::duration::{Bpm, DurationError, NoteDuration};
use super::envelope::Envelope;
use super::note::{Note, NoteError};
use crate::sound::Waveform;

#[derive(Debug, thiserror::Error)]
pub enum MelodyError {
    #[error("melody has no notes")]
    Empty,

    #[error("note {index}: {source}")]
    Note {
        index: usize,
        #[source]
        source: NoteError,
    },

    #[error("note {index}: {source}")]
    Duration {
        index: usize,
        #[source]
        source: DurationError,
    },

    #[error("note {index}: velocity {velocity} is outside [0, 1]")]
    Velocity { index: usize, velocity: f64 },

    #[error("{0}")]
    Bpm(#[from] DurationError),

    #[error("note {index}: transposing {note} by {semitones} semitones leaves the supported range")]
    TransposeOutOfRange {
        index: usize,
        note: Note,
        semitones: i32,
    },
}

/// Either a pitched note or a rest. Rests produce no sound but consume time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MelodyPitch {
    Pitch(Note),
    Rest,
}

impl FromStr for MelodyPitch {
    type Err = NoteError;

    fn from_str(s: &str) -> Result<MelodyPitch, NoteError> {
        if s == "rest" {
            return Ok(MelodyPitch::Rest);
        }
        Ok(MelodyPitch::Pitch(s.parse()?))
    }
}

/// One entry in a melody.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MelodyNote {
    pub pitch: MelodyPitch,
    pub duration: NoteDuration,
    /// Per-note gain fraction; defaults to full gain.
    pub velocity: Option<f64>,
}

impl MelodyNote {
    pub fn new(pitch: MelodyPitch, duration: NoteDuration) -> MelodyNote {
        MelodyNote {
            pitch,
            duration,
            velocity: None,
        }
    }
}

/// An ordered sequence of notes and rests played at a tempo. Sequence order
/// is playback order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Melody {
    pub notes: Vec<MelodyNote>,
    pub bpm: Option<Bpm>,
    pub waveform: Option<Waveform>,
    pub envelope: Option<Envelope>,
}

impl Melody {
    /// The tempo this melody plays at.
    pub fn bpm(&self) -> Bpm {
        self.bpm.unwrap_or_default()
    }

    /// Checks the melody against the authoring contract: at least one note,
    /// velocities within [0, 1], positive literal durations.
    ///
    /// Note strings and bpm are already well-formed by construction; the
    /// authoring (YAML) layer re-validates those while converting.
    pub fn validate(&self) -> Result<(), MelodyError> {
        if self.notes.is_empty() {
            return Err(MelodyError::Empty);
        }
        for (index, note) in self.notes.iter().enumerate() {
            if let NoteDuration::Seconds(secs) = note.duration {
                if secs <= 0.0 || !secs.is_finite() {
                    return Err(MelodyError::Duration {
                        index,
                        source: DurationError::NonPositive(secs),
                    });
                }
            }
            if let Some(velocity) = note.velocity {
                if !(0.0..=1.0).contains(&velocity) {
                    return Err(MelodyError::Velocity { index, velocity });
                }
            }
        }
        Ok(())
    }

    /// Total real-time length in seconds. Rests consume time like notes.
    pub fn duration_seconds(&self) -> f64 {
        let bpm = self.bpm();
        self.notes
            .iter()
            .map(|note| note.duration.seconds(bpm))
            .sum()
    }

    /// Computes the absolute start offset of every note, in order. Offsets
    /// are cumulative sums of the preceding durations, fixed before any note
    /// is scheduled on a backend.
    pub fn schedule(&self) -> Vec<(f64, MelodyNote)> {
        let bpm = self.bpm();
        let mut offset = 0.0;
        self.notes
            .iter()
            .map(|note| {
                let at = offset;
                offset += note.duration.seconds(bpm);
                (at, *note)
            })
            .collect()
    }

    /// Shifts every pitched note by the given number of semitones. Rests are
    /// untouched. Fails when any note would leave the supported octave range;
    /// a melody that cannot be transposed cleanly is an authoring error, not
    /// something to pass through unchanged.
    pub fn transpose(&self, semitones: i32) -> Result<Melody, MelodyError> {
        let mut notes = Vec::with_capacity(self.notes.len());
        for (index, note) in self.notes.iter().enumerate() {
            let pitch = match note.pitch {
                MelodyPitch::Rest => MelodyPitch::Rest,
                MelodyPitch::Pitch(n) => MelodyPitch::Pitch(n.transpose(semitones).ok_or(
                    MelodyError::TransposeOutOfRange {
                        index,
                        note: n,
                        semitones,
                    },
                )?),
            };
            notes.push(MelodyNote { pitch, ..*note });
        }
        Ok(Melody {
            notes,
            ..self.clone()
        })
    }
}
