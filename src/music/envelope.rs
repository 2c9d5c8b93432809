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

//! ADSR amplitude envelopes.
//!
//! An envelope is resolved into (time, gain) control points for a concrete
//! note duration. Backends apply the control points to whatever gain
//! primitive they have; the shape itself is backend-agnostic.

use serde::Deserialize;

/// An attack/decay/sustain/release amplitude shape. Times are in seconds;
/// sustain is a gain fraction.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub attack: f64,
    #[serde(default)]
    pub decay: f64,
    #[serde(default = "default_sustain")]
    pub sustain: f64,
    #[serde(default)]
    pub release: f64,
}

fn default_sustain() -> f64 {
    1.0
}

impl Default for Envelope {
    fn default() -> Envelope {
        // A short fade in and out to avoid clicks on plain tones.
        Envelope {
            attack: 0.01,
            decay: 0.0,
            sustain: 1.0,
            release: 0.05,
        }
    }
}

impl Envelope {
    /// Clamps the envelope into its valid domain: non-negative times, sustain
    /// in [0, 1].
    fn normalized(&self) -> Envelope {
        Envelope {
            attack: self.attack.max(0.0),
            decay: self.decay.max(0.0),
            sustain: self.sustain.clamp(0.0, 1.0),
            release: self.release.max(0.0),
        }
    }

    /// Computes the gain control points for a note of the given total
    /// duration: 0 at t=0, 1 after the attack, sustain after the decay, held
    /// until `total - release`, then 0 at `total`.
    ///
    /// When attack+decay+release exceed the total duration the three phases
    /// are compressed proportionally so the hold time is exactly zero; the
    /// hold never goes negative.
    pub fn segments(&self, total: f64) -> Vec<(f64, f64)> {
        let env = self.normalized();
        let total = total.max(0.0);

        let mut attack = env.attack;
        let mut decay = env.decay;
        let mut release = env.release;

        let phases = attack + decay + release;
        if phases > total && phases > 0.0 {
            let scale = total / phases;
            attack *= scale;
            decay *= scale;
            release *= scale;
        }

        let hold_end = total - release;
        vec![
            (0.0, 0.0),
            (attack, 1.0),
            (attack + decay, env.sustain),
            (hold_end, env.sustain),
            (total, 0.0),
        ]
    }

    /// Linear interpolation over control points produced by [`segments`].
    ///
    /// [`segments`]: Envelope::segments
    pub fn gain_at(segments: &[(f64, f64)], t: f64) -> f64 {
        let mut prev = match segments.first() {
            Some(first) => *first,
            None => return 0.0,
        };
        if t <= prev.0 {
            return prev.1;
        }
        for &(time, gain) in &segments[1..] {
            if t <= time {
                let span = time - prev.0;
                if span <= 0.0 {
                    return gain;
                }
                let frac = (t - prev.0) / span;
                return prev.1 + (gain - prev.1) * frac;
            }
            prev = (time, gain);
        }
        prev.1
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_segments_basic_shape() {
        let env = Envelope {
            attack: 0.1,
            decay: 0.1,
            sustain: 0.5,
            release: 0.2,
        };
        let segments = env.segments(1.0);
        assert_eq!(
            segments,
            vec![
                (0.0, 0.0),
                (0.1, 1.0),
                (0.2, 0.5),
                (0.8, 0.5),
                (1.0, 0.0),
            ]
        );
    }

    #[test]
    fn test_segments_compress_to_fit() {
        // attack+decay+release = 0.8 against a 0.4s note: everything halves
        // and the hold span collapses to zero.
        let env = Envelope {
            attack: 0.4,
            decay: 0.2,
            sustain: 0.5,
            release: 0.2,
        };
        let segments = env.segments(0.4);
        assert!((segments[1].0 - 0.2).abs() < 1e-9);
        assert!((segments[2].0 - 0.3).abs() < 1e-9);
        // Hold start equals hold end; the span is never negative.
        assert!(segments[3].0 >= segments[2].0 - 1e-9);
        assert!((segments[4].0 - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_segments_monotonic_times() {
        let cases = [
            (0.5, 0.3, 0.4, 0.01),
            (0.0, 0.0, 0.0, 1.0),
            (1.0, 1.0, 1.0, 0.1),
        ];
        for (attack, decay, release, total) in cases {
            let env = Envelope {
                attack,
                decay,
                sustain: 0.7,
                release,
            };
            let segments = env.segments(total);
            for pair in segments.windows(2) {
                assert!(
                    pair[1].0 >= pair[0].0 - 1e-9,
                    "non-monotonic segments: {:?}",
                    segments
                );
            }
        }
    }

    #[test]
    fn test_gain_interpolation() {
        let env = Envelope {
            attack: 0.1,
            decay: 0.1,
            sustain: 0.5,
            release: 0.2,
        };
        let segments = env.segments(1.0);
        assert_eq!(Envelope::gain_at(&segments, 0.0), 0.0);
        assert!((Envelope::gain_at(&segments, 0.05) - 0.5).abs() < 1e-9);
        assert!((Envelope::gain_at(&segments, 0.1) - 1.0).abs() < 1e-9);
        assert!((Envelope::gain_at(&segments, 0.5) - 0.5).abs() < 1e-9);
        assert!((Envelope::gain_at(&segments, 1.0)).abs() < 1e-9);
        // Past the final point the envelope stays closed.
        assert_eq!(Envelope::gain_at(&segments, 2.0), 0.0);
    }

    #[test]
    fn test_sustain_clamped() {
        let env = Envelope {
            attack: 0.0,
            decay: 0.0,
            sustain: 3.0,
            release: 0.0,
        };
        let segments = env.segments(1.0);
        assert!(segments.iter().all(|(_, gain)| *gain <= 1.0));
    }
}
