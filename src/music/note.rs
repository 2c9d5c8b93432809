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

//! Symbolic note names and their resolution to frequencies.
//!
//! Notes live in a bounded octave range (3-6), which covers everything the
//! game sound maps author. Frequencies use equal temperament referenced to
//! A4 = 440 Hz.

use std::fmt;
use std::str::FromStr;

/// The lowest octave a note may use.
pub const MIN_OCTAVE: i8 = 3;
/// The highest octave a note may use.
pub const MAX_OCTAVE: i8 = 6;

/// Errors produced when resolving symbolic notes.
#[derive(Debug, thiserror::Error)]
pub enum NoteError {
    #[error("invalid note format: {0:?} (expected <A-G>[#]<3-6>)")]
    InvalidFormat(String),

    #[error("octave {0} is outside the supported range ({MIN_OCTAVE}-{MAX_OCTAVE})")]
    OctaveOutOfRange(i8),
}

/// The twelve chromatic pitch classes, sharps only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteName {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl NoteName {
    /// Semitone offset within the octave, C = 0.
    fn semitone(&self) -> i32 {
        match self {
            NoteName::C => 0,
            NoteName::CSharp => 1,
            NoteName::D => 2,
            NoteName::DSharp => 3,
            NoteName::E => 4,
            NoteName::F => 5,
            NoteName::FSharp => 6,
            NoteName::G => 7,
            NoteName::GSharp => 8,
            NoteName::A => 9,
            NoteName::ASharp => 10,
            NoteName::B => 11,
        }
    }

    fn from_semitone(semitone: i32) -> NoteName {
        match semitone.rem_euclid(12) {
            0 => NoteName::C,
            1 => NoteName::CSharp,
            2 => NoteName::D,
            3 => NoteName::DSharp,
            4 => NoteName::E,
            5 => NoteName::F,
            6 => NoteName::FSharp,
            7 => NoteName::G,
            8 => NoteName::GSharp,
            9 => NoteName::A,
            10 => NoteName::ASharp,
            _ => NoteName::B,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::CSharp => "C#",
            NoteName::D => "D",
            NoteName::DSharp => "D#",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::FSharp => "F#",
            NoteName::G => "G",
            NoteName::GSharp => "G#",
            NoteName::A => "A",
            NoteName::ASharp => "A#",
            NoteName::B => "B",
        }
    }
}

/// A note: pitch class plus octave. Immutable value type that round-trips
/// losslessly through its canonical string form, e.g. `"C#4"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note {
    name: NoteName,
    octave: i8,
}

impl Note {
    /// Creates a note, rejecting octaves outside the supported range.
    pub fn new(name: NoteName, octave: i8) -> Result<Note, NoteError> {
        if !(MIN_OCTAVE..=MAX_OCTAVE).contains(&octave) {
            return Err(NoteError::OctaveOutOfRange(octave));
        }
        Ok(Note { name, octave })
    }

    /// Returns the pitch class.
    pub fn name(&self) -> NoteName {
        self.name
    }

    /// Returns the octave.
    pub fn octave(&self) -> i8 {
        self.octave
    }

    /// The frequency of this note in Hz using equal temperament (A4 = 440 Hz).
    pub fn frequency(&self) -> f64 {
        // A4 sits at semitone 9 of octave 4.
        let semitones_from_a4 =
            (self.octave as i32 - 4) * 12 + self.name.semitone() - NoteName::A.semitone();
        440.0 * 2.0_f64.powf(semitones_from_a4 as f64 / 12.0)
    }

    /// Shifts the note by the given number of semitones. Returns None when the
    /// result would leave the supported octave range.
    pub fn transpose(&self, semitones: i32) -> Option<Note> {
        let absolute = self.octave as i32 * 12 + self.name.semitone() + semitones;
        let octave = absolute.div_euclid(12);
        if octave < MIN_OCTAVE as i32 || octave > MAX_OCTAVE as i32 {
            return None;
        }
        Some(Note {
            name: NoteName::from_semitone(absolute),
            octave: octave as i8,
        })
    }
}

impl FromStr for Note {
    type Err = NoteError;

    /// Parses the canonical form `<A-G>[#]<octave>`.
    fn from_str(s: &str) -> Result<Note, NoteError> {
        let invalid = || NoteError::InvalidFormat(s.to_string());

        let mut chars = s.chars();
        let letter = chars.next().ok_or_else(invalid)?;
        let rest = chars.as_str();
        let (sharp, octave_str) = match rest.strip_prefix('#') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };

        let name = match (letter, sharp) {
            ('C', false) => NoteName::C,
            ('C', true) => NoteName::CSharp,
            ('D', false) => NoteName::D,
            ('D', true) => NoteName::DSharp,
            ('E', false) => NoteName::E,
            ('F', false) => NoteName::F,
            ('F', true) => NoteName::FSharp,
            ('G', false) => NoteName::G,
            ('G', true) => NoteName::GSharp,
            ('A', false) => NoteName::A,
            ('A', true) => NoteName::ASharp,
            ('B', false) => NoteName::B,
            _ => return Err(invalid()),
        };

        let octave: i8 = octave_str.parse().map_err(|_| invalid())?;
        Note::new(name, octave).map_err(|_| invalid())
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name.as_str(), self.octave)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for name in ["C3", "C#4", "A4", "A#5", "G#6", "B3", "F#5", "E6"] {
            let note: Note = name.parse().expect(name);
            assert_eq!(note.to_string(), name);
        }
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for bad in ["", "H4", "C", "C10", "Cb4", "c4", "C#", "C#7", "A2", "4C"] {
            assert!(bad.parse::<Note>().is_err(), "{} should not parse", bad);
        }
    }

    #[test]
    fn test_frequency_reference_points() {
        let a4: Note = "A4".parse().unwrap();
        assert_eq!(a4.frequency(), 440.0);

        let a5: Note = "A5".parse().unwrap();
        assert_eq!(a5.frequency(), 880.0);

        let a3: Note = "A3".parse().unwrap();
        assert_eq!(a3.frequency(), 220.0);

        let c4: Note = "C4".parse().unwrap();
        assert!((c4.frequency() - 261.63).abs() < 0.01);
    }

    #[test]
    fn test_transpose() {
        let c4: Note = "C4".parse().unwrap();
        assert_eq!(c4.transpose(12).unwrap().to_string(), "C5");
        assert_eq!(c4.transpose(1).unwrap().to_string(), "C#4");
        assert_eq!(c4.transpose(-1).unwrap().to_string(), "B3");

        // Octave-preserving round trip for full-octave shifts.
        let e4: Note = "E4".parse().unwrap();
        assert_eq!(e4.transpose(12).unwrap().transpose(-12).unwrap(), e4);

        // Out of range.
        let b6: Note = "B6".parse().unwrap();
        assert!(b6.transpose(1).is_none());
        let c3: Note = "C3".parse().unwrap();
        assert!(c3.transpose(-1).is_none());
    }

    #[test]
    fn test_octave_bounds() {
        assert!(Note::new(NoteName::C, 2).is_err());
        assert!(Note::new(NoteName::C, 7).is_err());
        assert!(Note::new(NoteName::C, 3).is_ok());
        assert!(Note::new(NoteName::B, 6).is_ok());
    }
}
