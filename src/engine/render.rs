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

//! Offline tone rendering.
//!
//! Tones and melody notes are rendered into mono f32 buffers before playback:
//! a phase-accumulator oscillator, the envelope's gain curve applied per
//! sample, and an optional biquad filter. Rendering is pure computation and
//! cheap relative to the note lengths games use, so there is no streaming
//! synthesis path.

use std::f64::consts::PI;

use rand::Rng;

use crate::music::{Bpm, Envelope, Melody, MelodyPitch};
use crate::sound::{Filter, FilterKind, Tone, Waveform};

/// A phase-accumulator waveform generator. Phase stays in [0, 1).
struct Oscillator {
    waveform: Waveform,
    phase: f64,
    phase_increment: f64,
}

impl Oscillator {
    fn new(waveform: Waveform, frequency: f64, sample_rate: u32) -> Oscillator {
        Oscillator {
            waveform,
            phase: 0.0,
            phase_increment: frequency / sample_rate as f64,
        }
    }

    fn next_sample<R: Rng>(&mut self, rng: &mut R) -> f64 {
        let sample = match self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * self.phase - 1.0,
            Waveform::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
            Waveform::Noise => rng.gen_range(-1.0..1.0),
        };
        self.phase += self.phase_increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        sample
    }
}

/// A second-order IIR filter using the Audio EQ Cookbook low/high-pass
/// coefficients with a fixed Butterworth Q.
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    const Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

    fn new(kind: FilterKind, cutoff_hz: f64, sample_rate: u32) -> Biquad {
        let sample_rate = sample_rate as f64;
        let freq = cutoff_hz.clamp(1.0, sample_rate * 0.49);
        let omega = 2.0 * PI * freq / sample_rate;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * Self::Q);

        let (b0, b1, b2) = match kind {
            FilterKind::LowPass => {
                let b1 = 1.0 - cos_omega;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterKind::HighPass => {
                let b1 = -(1.0 + cos_omega);
                (-b1 / 2.0, b1, -b1 / 2.0)
            }
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Biquad {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// Renders a single pitched (or noise) note into a mono buffer.
pub fn render_note(
    waveform: Waveform,
    frequency: f64,
    duration_secs: f64,
    envelope: &Envelope,
    filter: Option<&Filter>,
    sample_rate: u32,
) -> Vec<f32> {
    let frames = (duration_secs.max(0.0) * sample_rate as f64).round() as usize;
    let segments = envelope.segments(duration_secs);
    let mut oscillator = Oscillator::new(waveform, frequency, sample_rate);
    let mut biquad = filter.map(|f| Biquad::new(f.kind, f.cutoff_hz, sample_rate));
    let mut rng = rand::thread_rng();

    let mut buffer = Vec::with_capacity(frames);
    for frame in 0..frames {
        let t = frame as f64 / sample_rate as f64;
        let mut sample = oscillator.next_sample(&mut rng);
        if let Some(biquad) = biquad.as_mut() {
            sample = biquad.process(sample);
        }
        buffer.push((sample * Envelope::gain_at(&segments, t)) as f32);
    }
    buffer
}

/// Renders a [`Tone`] definition at the given tempo.
///
/// The tempo only matters when the tone's duration is a named code.
pub fn render_tone(tone: &Tone, bpm: Bpm, sample_rate: u32) -> Vec<f32> {
    let duration = tone.duration.seconds(bpm);
    let envelope = tone.envelope.unwrap_or_default();
    render_note(
        tone.waveform,
        tone.pitch.frequency(),
        duration,
        &envelope,
        tone.filter.as_ref(),
        sample_rate,
    )
}

/// Renders a whole melody into a single mono buffer: each pitched note is
/// rendered at its scheduled offset with its velocity folded in, rests leave
/// silence. Used where per-note scheduling is unavailable or unwanted (the
/// high-level backend, looped melodies).
pub fn render_melody(melody: &Melody, sample_rate: u32) -> Vec<f32> {
    let bpm = melody.bpm();
    let waveform = melody.waveform.unwrap_or_default();
    let envelope = melody.envelope.unwrap_or_default();

    let total = melody.duration_seconds();
    let mut buffer = vec![0.0f32; (total * sample_rate as f64).round() as usize];
    for (offset, note) in melody.schedule() {
        let MelodyPitch::Pitch(pitch) = note.pitch else {
            continue;
        };
        let rendered = render_note(
            waveform,
            pitch.frequency(),
            note.duration.seconds(bpm),
            &envelope,
            None,
            sample_rate,
        );
        let velocity = note.velocity.unwrap_or(1.0) as f32;
        let start = (offset * sample_rate as f64).round() as usize;
        for (i, sample) in rendered.iter().enumerate() {
            if let Some(slot) = buffer.get_mut(start + i) {
                *slot += sample * velocity;
            }
        }
    }
    buffer
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sound::Pitch;

    const RATE: u32 = 44100;

    fn flat_envelope() -> Envelope {
        Envelope {
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.0,
        }
    }

    #[test]
    fn test_render_length_matches_duration() {
        let buffer = render_note(Waveform::Sine, 440.0, 0.5, &flat_envelope(), None, RATE);
        assert_eq!(buffer.len(), 22050);
    }

    #[test]
    fn test_render_melody_rests_leave_silence() {
        use crate::music::{MelodyNote, NoteDuration};

        let melody = Melody {
            notes: vec![
                MelodyNote::new(
                    MelodyPitch::Pitch("C4".parse().unwrap()),
                    NoteDuration::Seconds(0.1),
                ),
                MelodyNote::new(MelodyPitch::Rest, NoteDuration::Seconds(0.1)),
                MelodyNote::new(
                    MelodyPitch::Pitch("E4".parse().unwrap()),
                    NoteDuration::Seconds(0.1),
                ),
            ],
            envelope: Some(flat_envelope()),
            ..Melody::default()
        };
        let buffer = render_melody(&melody, RATE);
        assert_eq!(buffer.len(), (0.3 * RATE as f64).round() as usize);

        // Middle of the rest is silent, middle of each note is not.
        let at = |secs: f64| buffer[(secs * RATE as f64) as usize];
        assert!(at(0.05).abs() > 0.0 || at(0.051).abs() > 0.0);
        assert_eq!(at(0.15), 0.0);
        assert!(at(0.25).abs() > 0.0 || at(0.251).abs() > 0.0);
    }

    #[test]
    fn test_sine_starts_at_zero_crossing() {
        let buffer = render_note(Waveform::Sine, 440.0, 0.1, &flat_envelope(), None, RATE);
        assert!(buffer[0].abs() < 1e-6);
        // The wave actually moves.
        assert!(buffer.iter().any(|s| s.abs() > 0.5));
    }

    #[test]
    fn test_square_is_two_valued() {
        let buffer = render_note(Waveform::Square, 100.0, 0.1, &flat_envelope(), None, RATE);
        assert!(buffer.iter().all(|s| *s == 1.0 || *s == -1.0));
    }

    #[test]
    fn test_all_waveforms_stay_in_range() {
        for waveform in [
            Waveform::Sine,
            Waveform::Square,
            Waveform::Sawtooth,
            Waveform::Triangle,
            Waveform::Noise,
        ] {
            let buffer = render_note(waveform, 440.0, 0.05, &flat_envelope(), None, RATE);
            assert!(
                buffer.iter().all(|s| (-1.0..=1.0).contains(s)),
                "{:?} out of range",
                waveform
            );
        }
    }

    #[test]
    fn test_envelope_shapes_amplitude() {
        let envelope = Envelope {
            attack: 0.05,
            decay: 0.0,
            sustain: 1.0,
            release: 0.05,
        };
        let buffer = render_note(Waveform::Square, 1000.0, 0.2, &envelope, None, RATE);
        // Quiet at the edges, loud in the middle.
        assert!(buffer[10].abs() < 0.1);
        assert!(buffer[buffer.len() / 2].abs() > 0.9);
        assert!(buffer[buffer.len() - 10].abs() < 0.1);
    }

    #[test]
    fn test_lowpass_attenuates_high_frequency() {
        let filter = Filter {
            kind: FilterKind::LowPass,
            cutoff_hz: 200.0,
        };
        let unfiltered = render_note(Waveform::Sine, 8000.0, 0.1, &flat_envelope(), None, RATE);
        let filtered = render_note(
            Waveform::Sine,
            8000.0,
            0.1,
            &flat_envelope(),
            Some(&filter),
            RATE,
        );
        let rms = |buf: &[f32]| {
            (buf.iter().map(|s| (*s as f64).powi(2)).sum::<f64>() / buf.len() as f64).sqrt()
        };
        assert!(rms(&filtered) < rms(&unfiltered) * 0.2);
    }

    #[test]
    fn test_render_tone_uses_tempo_for_named_durations() {
        let tone = Tone::new(
            Waveform::Sine,
            Pitch::Hz(440.0),
            "4n".parse().unwrap(),
        );
        // One quarter note at 120 bpm is half a second.
        let buffer = render_tone(&tone, Bpm::default(), RATE);
        assert_eq!(buffer.len(), 22050);
    }
}
