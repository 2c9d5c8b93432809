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

//! Note duration codes and tempo.

use std::str::FromStr;

/// The lowest tempo a melody may use.
pub const MIN_BPM: u16 = 60;
/// The highest tempo a melody may use.
pub const MAX_BPM: u16 = 200;
/// Tempo used when a melody does not specify one.
pub const DEFAULT_BPM: u16 = 120;

#[derive(Debug, thiserror::Error)]
pub enum DurationError {
    #[error("unrecognized duration: {0:?} (expected 1n-32n or seconds)")]
    Unrecognized(String),

    #[error("duration must be a positive number of seconds, got {0}")]
    NonPositive(f64),

    #[error("bpm {0} is outside the supported range ({MIN_BPM}-{MAX_BPM})")]
    BpmOutOfRange(u16),
}

/// Beats per minute. Bounded so that authored melodies stay within musically
/// sensible real-time lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bpm(u16);

impl Bpm {
    pub fn new(bpm: u16) -> Result<Bpm, DurationError> {
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(DurationError::BpmOutOfRange(bpm));
        }
        Ok(Bpm(bpm))
    }

    pub fn get(&self) -> u16 {
        self.0
    }

    /// The real-time length of one beat at this tempo.
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.0 as f64
    }
}

impl Default for Bpm {
    fn default() -> Bpm {
        Bpm(DEFAULT_BPM)
    }
}

/// A note duration: either a named fraction of a whole note or a literal
/// number of seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteDuration {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    /// Raw seconds, passed through unchanged regardless of tempo.
    Seconds(f64),
}

impl NoteDuration {
    /// The number of beats this duration spans (a quarter note is one beat).
    fn beats(&self) -> Option<f64> {
        match self {
            NoteDuration::Whole => Some(4.0),
            NoteDuration::Half => Some(2.0),
            NoteDuration::Quarter => Some(1.0),
            NoteDuration::Eighth => Some(0.5),
            NoteDuration::Sixteenth => Some(0.25),
            NoteDuration::ThirtySecond => Some(0.125),
            NoteDuration::Seconds(_) => None,
        }
    }

    /// Resolves this duration to real-time seconds at the given tempo.
    pub fn seconds(&self, bpm: Bpm) -> f64 {
        match self {
            NoteDuration::Seconds(secs) => *secs,
            named => named.beats().unwrap_or_default() * bpm.seconds_per_beat(),
        }
    }

    /// Builds a duration from a literal number of seconds.
    pub fn from_seconds(secs: f64) -> Result<NoteDuration, DurationError> {
        if secs <= 0.0 || !secs.is_finite() {
            return Err(DurationError::NonPositive(secs));
        }
        Ok(NoteDuration::Seconds(secs))
    }
}

impl FromStr for NoteDuration {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<NoteDuration, DurationError> {
        match s {
            "1n" => Ok(NoteDuration::Whole),
            "2n" => Ok(NoteDuration::Half),
            "4n" => Ok(NoteDuration::Quarter),
            "8n" => Ok(NoteDuration::Eighth),
            "16n" => Ok(NoteDuration::Sixteenth),
            "32n" => Ok(NoteDuration::ThirtySecond),
            other => match other.parse::<f64>() {
                Ok(secs) => NoteDuration::from_seconds(secs),
                Err(_) => Err(DurationError::Unrecognized(other.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_named_durations_at_120_bpm() {
        let bpm = Bpm::default();
        assert_eq!(NoteDuration::Whole.seconds(bpm), 2.0);
        assert_eq!(NoteDuration::Half.seconds(bpm), 1.0);
        assert_eq!(NoteDuration::Quarter.seconds(bpm), 0.5);
        assert_eq!(NoteDuration::Eighth.seconds(bpm), 0.25);
        assert_eq!(NoteDuration::Sixteenth.seconds(bpm), 0.125);
        assert_eq!(NoteDuration::ThirtySecond.seconds(bpm), 0.0625);
    }

    #[test]
    fn test_raw_seconds_ignore_tempo() {
        let duration = NoteDuration::Seconds(0.75);
        assert_eq!(duration.seconds(Bpm::new(60).unwrap()), 0.75);
        assert_eq!(duration.seconds(Bpm::new(200).unwrap()), 0.75);
    }

    #[test]
    fn test_durations_positive_for_all_valid_bpm() {
        for bpm in MIN_BPM..=MAX_BPM {
            let bpm = Bpm::new(bpm).unwrap();
            for named in [
                NoteDuration::Whole,
                NoteDuration::Half,
                NoteDuration::Quarter,
                NoteDuration::Eighth,
                NoteDuration::Sixteenth,
                NoteDuration::ThirtySecond,
            ] {
                assert!(named.seconds(bpm) > 0.0);
            }
        }
    }

    #[test]
    fn test_bpm_bounds() {
        assert!(Bpm::new(59).is_err());
        assert!(Bpm::new(201).is_err());
        assert!(Bpm::new(60).is_ok());
        assert!(Bpm::new(200).is_ok());
    }

    #[test]
    fn test_parse() {
        assert_eq!("4n".parse::<NoteDuration>().unwrap(), NoteDuration::Quarter);
        assert_eq!(
            "0.5".parse::<NoteDuration>().unwrap(),
            NoteDuration::Seconds(0.5)
        );
        assert!("3n".parse::<NoteDuration>().is_err());
        assert!("-1".parse::<NoteDuration>().is_err());
        assert!("0".parse::<NoteDuration>().is_err());
    }
}
