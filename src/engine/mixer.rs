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

//! Voice mixing on a sample-accurate clock.
//!
//! The mixer owns the engine's scheduling clock: a monotonically increasing
//! frame counter advanced by whoever drains it (the output stream, or tests).
//! Voices carry absolute start/stop frames, so melody sequencing is fixed the
//! moment voices are added, independent of call order.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};

use parking_lot::RwLock;

/// A cancellation flag shared between a voice and the engine that created it.
/// Cancelling an already finished voice is a no-op.
#[derive(Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> CancelHandle {
        CancelHandle::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// One playing (or scheduled) buffer.
pub struct Voice {
    /// The sound this voice belongs to, for stop-by-id.
    pub sound_id: u64,
    /// Mono sample data, shared with the engine's prepared-sound cache.
    pub buffer: Arc<Vec<f32>>,
    /// Per-voice gain (definition volume x call volume x note velocity).
    pub gain: f32,
    /// Loops the buffer until stopped.
    pub looped: bool,
    /// Absolute frame at which the first sample plays.
    pub start_at: u64,
    /// Scheduled stop frame; 0 means no scheduled stop.
    pub stop_at: Arc<AtomicU64>,
    /// Immediate cancellation.
    pub cancel_handle: CancelHandle,
    /// Set once the voice has played out or was cancelled.
    pub finished: Arc<AtomicBool>,
}

impl Voice {
    /// Samples this voice contributes at the given absolute frame, or None
    /// once it is done.
    fn sample_at(&self, frame: u64) -> Option<f32> {
        if frame < self.start_at {
            return Some(0.0);
        }
        let stop_at = self.stop_at.load(Ordering::Relaxed);
        if stop_at != 0 && frame >= stop_at {
            return None;
        }
        let index = (frame - self.start_at) as usize;
        if self.looped {
            if self.buffer.is_empty() {
                return None;
            }
            Some(self.buffer[index % self.buffer.len()] * self.gain)
        } else {
            self.buffer.get(index).map(|s| s * self.gain)
        }
    }
}

/// Mixes voices into interleaved f32 output frames.
pub struct Mixer {
    voices: RwLock<Vec<Voice>>,
    sample_rate: u32,
    channels: u16,
    /// The engine clock, in frames.
    position: AtomicU64,
    /// Master gain, stored as f32 bits.
    master_gain: AtomicU32,
    enabled: AtomicBool,
}

impl Mixer {
    pub fn new(sample_rate: u32, channels: u16) -> Mixer {
        Mixer {
            voices: RwLock::new(Vec::new()),
            sample_rate,
            channels,
            position: AtomicU64::new(0),
            master_gain: AtomicU32::new(1.0_f32.to_bits()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Current position of the engine clock, in frames.
    pub fn current_frame(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Converts seconds into a frame count on this mixer's clock.
    pub fn frames_for(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    pub fn set_master_gain(&self, gain: f32) {
        self.master_gain
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn master_gain(&self) -> f32 {
        f32::from_bits(self.master_gain.load(Ordering::Relaxed))
    }

    /// Disabling silences output and drops every active voice.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            self.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn add_voice(&self, voice: Voice) {
        self.voices.write().push(voice);
    }

    /// Number of voices currently held (scheduled or playing).
    pub fn active_voices(&self) -> usize {
        self.voices.read().len()
    }

    /// Drops all voices immediately.
    pub fn clear(&self) {
        let mut voices = self.voices.write();
        for voice in voices.iter() {
            voice.finished.store(true, Ordering::Relaxed);
        }
        voices.clear();
    }

    /// Mixes `frames` frames of interleaved output into `out` and advances
    /// the clock. `out` must hold `frames * channels` samples.
    pub fn process_into(&self, out: &mut [f32], frames: usize) {
        let channels = self.channels as usize;
        for sample in out.iter_mut().take(frames * channels) {
            *sample = 0.0;
        }

        let start = self.position.load(Ordering::Acquire);
        if self.is_enabled() {
            let master = self.master_gain();
            let mut voices = self.voices.write();
            voices.retain_mut(|voice| {
                if voice.cancel_handle.is_cancelled() {
                    voice.finished.store(true, Ordering::Relaxed);
                    return false;
                }
                let mut alive = true;
                for frame in 0..frames {
                    match voice.sample_at(start + frame as u64) {
                        Some(sample) => {
                            let value = sample * master;
                            // Mono voices fan out to every output channel.
                            for ch in 0..channels {
                                out[frame * channels + ch] += value;
                            }
                        }
                        None => {
                            alive = false;
                            break;
                        }
                    }
                }
                if !alive {
                    voice.finished.store(true, Ordering::Relaxed);
                }
                alive
            });
        }

        // Soft clip to [-1, 1]; simultaneous sounds may overlap freely.
        for sample in out.iter_mut().take(frames * channels) {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.position
            .store(start + frames as u64, Ordering::Release);
    }
}
