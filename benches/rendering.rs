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
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tonebox::engine::render::{render_melody, render_note};
use tonebox::music::{Envelope, Melody, MelodyNote, MelodyPitch, NoteDuration};
use tonebox::sound::{Filter, FilterKind, Waveform};

const RATE: u32 = 44100;

fn benchmark_render_note(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_note");
    let envelope = Envelope::default();

    for waveform in [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
        Waveform::Noise,
    ] {
        group.bench_function(format!("{waveform:?}_1s"), |b| {
            b.iter(|| {
                black_box(render_note(
                    waveform,
                    black_box(440.0),
                    1.0,
                    &envelope,
                    None,
                    RATE,
                ))
            })
        });
    }

    let filter = Filter {
        kind: FilterKind::LowPass,
        cutoff_hz: 2000.0,
    };
    group.bench_function("Sawtooth_1s_lowpass", |b| {
        b.iter(|| {
            black_box(render_note(
                Waveform::Sawtooth,
                black_box(440.0),
                1.0,
                &envelope,
                Some(&filter),
                RATE,
            ))
        })
    });

    group.finish();
}

fn benchmark_render_melody(c: &mut Criterion) {
    // An eight-note run, roughly what a win jingle looks like.
    let melody = Melody {
        notes: ["C4", "D4", "E4", "F4", "G4", "A4", "B4", "C5"]
            .iter()
            .map(|name| {
                MelodyNote::new(MelodyPitch::Pitch(name.parse().unwrap()), NoteDuration::Eighth)
            })
            .collect(),
        ..Melody::default()
    };

    c.bench_function("render_melody_8_notes", |b| {
        b.iter(|| black_box(render_melody(black_box(&melody), RATE)))
    });
}

criterion_group!(benches, benchmark_render_note, benchmark_render_melody);
criterion_main!(benches);
