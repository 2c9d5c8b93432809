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

//! The high-level engine, backed by rodio. Definitions are still rendered
//! and decoded by this crate; rodio owns the device, mixing, and looping.
//!
//! rodio's `OutputStream` is not `Send`, so one worker thread owns it and
//! everything else talks to that thread over a channel.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::{Mutex, RwLock};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink, Source};
use tracing::{debug, warn};

use crate::config;
use crate::engine::output;
use crate::engine::render;
use crate::engine::{next_sound_id, Engine, EngineError, SoundId};
use crate::music::Bpm;
use crate::sound::{PlayOptions, Sound, SoundSource};

pub(crate) const NAME: &str = "rodio";

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

enum Command {
    Play {
        id: u64,
        samples: Vec<f32>,
        rate: u32,
        volume: f32,
        looped: bool,
        delay: Duration,
    },
    Stop {
        id: u64,
    },
    StopAll,
    SetVolume(f32),
    Shutdown,
}

/// A rendered or decoded definition, kept at its native rate; rodio
/// resamples on playback.
struct PreparedSound {
    samples: Arc<Vec<f32>>,
    rate: u32,
    gain: f32,
    looped: bool,
}

enum WorkerState {
    Idle,
    Running {
        commands: Sender<Command>,
        join: Option<thread::JoinHandle<()>>,
    },
    Failed(String),
}

pub struct HighLevelEngine {
    sample_rate: u32,
    worker: Mutex<WorkerState>,
    prepared: RwLock<HashMap<u64, Arc<PreparedSound>>>,
    /// When each played sound's audio is over; `None` while it loops.
    expires: Mutex<HashMap<u64, Option<Instant>>>,
    enabled: std::sync::atomic::AtomicBool,
    volume: Mutex<f64>,
}

impl HighLevelEngine {
    pub fn new(config: &config::Audio) -> HighLevelEngine {
        HighLevelEngine {
            sample_rate: config.sample_rate(),
            worker: Mutex::new(WorkerState::Idle),
            prepared: RwLock::new(HashMap::new()),
            expires: Mutex::new(HashMap::new()),
            enabled: std::sync::atomic::AtomicBool::new(true),
            volume: Mutex::new(1.0),
        }
    }

    fn prepare(&self, sound: &Sound, options: &PlayOptions) -> Result<PreparedSound, EngineError> {
        let looped = options.looped.unwrap_or(sound.looped);
        let (samples, rate) = match &sound.source {
            SoundSource::Tone(tone) => (
                render::render_tone(tone, Bpm::default(), self.sample_rate),
                self.sample_rate,
            ),
            SoundSource::Melody(melody) => {
                (render::render_melody(melody, self.sample_rate), self.sample_rate)
            }
            SoundSource::File(path) => super::file::decode_file(path)?,
        };
        Ok(PreparedSound {
            samples: Arc::new(samples),
            rate,
            gain: sound.volume as f32,
            looped,
        })
    }

    /// Drops prepared entries whose playback window has passed, keeping the
    /// one being played right now. Looping sounds stay until stopped.
    fn collect_expired(&self, playing: u64) {
        let now = Instant::now();
        let mut expires = self.expires.lock();
        let mut prepared = self.prepared.write();
        expires.retain(|sound_id, deadline| {
            let keep = *sound_id == playing || deadline.map_or(true, |deadline| deadline > now);
            if !keep {
                prepared.remove(sound_id);
            }
            keep
        });
    }

    fn send(&self, command: Command) {
        let worker = self.worker.lock();
        if let WorkerState::Running { commands, .. } = &*worker {
            if commands.send(command).is_err() {
                warn!(engine = NAME, "Playback worker is gone");
            }
        }
    }
}

impl fmt::Display for HighLevelEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "high-level engine (rodio)")
    }
}

impl Engine for HighLevelEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_supported(&self) -> bool {
        output::probe()
    }

    fn initialize(&self) -> Result<(), EngineError> {
        let mut worker = self.worker.lock();
        match &*worker {
            WorkerState::Running { .. } => Ok(()),
            WorkerState::Failed(reason) => Err(EngineError::Initialization(reason.clone())),
            WorkerState::Idle => {
                let (command_tx, command_rx) = unbounded();
                let (status_tx, status_rx) = bounded(1);
                let join = thread::Builder::new()
                    .name("tonebox-rodio".to_string())
                    .spawn(move || run_worker(command_rx, status_tx))
                    .map_err(|e| EngineError::Initialization(e.to_string()))?;

                match status_rx.recv_timeout(STARTUP_TIMEOUT) {
                    Ok(Ok(())) => {
                        debug!(engine = NAME, "Playback worker started");
                        *worker = WorkerState::Running {
                            commands: command_tx,
                            join: Some(join),
                        };
                        Ok(())
                    }
                    Ok(Err(reason)) => {
                        warn!(engine = NAME, err = %reason, "Output stream failed");
                        *worker = WorkerState::Failed(reason.clone());
                        Err(EngineError::Initialization(reason))
                    }
                    Err(_) => {
                        let reason = "timed out waiting for the output stream".to_string();
                        *worker = WorkerState::Failed(reason.clone());
                        Err(EngineError::Initialization(reason))
                    }
                }
            }
        }
    }

    fn create_sound(&self, sound: &Sound, options: &PlayOptions) -> Result<SoundId, EngineError> {
        sound.validate()?;
        let prepared = self.prepare(sound, options)?;
        let id = next_sound_id();
        self.prepared.write().insert(id.raw(), Arc::new(prepared));
        Ok(id)
    }

    fn play_sound(&self, id: SoundId, options: &PlayOptions) -> Result<(), EngineError> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.collect_expired(id.raw());
        let prepared = self
            .prepared
            .read()
            .get(&id.raw())
            .cloned()
            .ok_or(EngineError::UnknownSound(id))?;

        let looped = options.looped.unwrap_or(prepared.looped);
        let delay = options.when.unwrap_or(Duration::ZERO);
        let deadline = if looped {
            None
        } else {
            let clip = Duration::from_secs_f64(prepared.samples.len() as f64 / prepared.rate as f64);
            Some(Instant::now() + delay + clip)
        };
        self.expires.lock().insert(id.raw(), deadline);

        self.send(Command::Play {
            id: id.raw(),
            samples: prepared.samples.as_ref().clone(),
            rate: prepared.rate,
            volume: prepared.gain * options.volume_or_default() as f32,
            looped,
            delay,
        });
        Ok(())
    }

    fn stop_sound(&self, id: SoundId, when: Option<Duration>) {
        match when {
            None => {
                self.send(Command::Stop { id: id.raw() });
                self.expires.lock().remove(&id.raw());
                self.prepared.write().remove(&id.raw());
            }
            Some(delay) => {
                self.expires
                    .lock()
                    .insert(id.raw(), Some(Instant::now() + delay));
                // rodio has no scheduled stop; defer the command instead.
                let commands = {
                    let worker = self.worker.lock();
                    match &*worker {
                        WorkerState::Running { commands, .. } => Some(commands.clone()),
                        _ => None,
                    }
                };
                if let Some(commands) = commands {
                    thread::spawn(move || {
                        thread::sleep(delay);
                        let _ = commands.send(Command::Stop { id: id.raw() });
                    });
                }
            }
        }
    }

    fn stop_all(&self) {
        self.send(Command::StopAll);
        let now = Instant::now();
        for deadline in self.expires.lock().values_mut() {
            *deadline = Some(now);
        }
    }

    fn set_volume(&self, volume: f64) {
        *self.volume.lock() = volume;
        self.send(Command::SetVolume(volume as f32));
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled
            .store(enabled, std::sync::atomic::Ordering::Relaxed);
        if !enabled {
            self.stop_all();
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn dispose(&self) {
        self.prepared.write().clear();
        self.expires.lock().clear();
        let mut worker = self.worker.lock();
        if let WorkerState::Running { commands, join } = &mut *worker {
            let _ = commands.send(Command::Shutdown);
            if let Some(join) = join.take() {
                let _ = join.join();
            }
        }
        *worker = WorkerState::Idle;
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::MockEngine>, Box<dyn std::error::Error>> {
        Err("high-level engine is not a mock".into())
    }
}

/// Owns the rodio output stream and the live sinks.
fn run_worker(
    command_rx: crossbeam_channel::Receiver<Command>,
    status_tx: Sender<Result<(), String>>,
) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(v) => v,
        Err(e) => {
            let _ = status_tx.send(Err(e.to_string()));
            return;
        }
    };
    let _ = status_tx.send(Ok(()));

    // Sink plus its pre-master volume, so master changes can be reapplied.
    let mut sinks: HashMap<u64, Vec<(Sink, f32)>> = HashMap::new();
    let mut master = 1.0f32;

    while let Ok(command) = command_rx.recv() {
        match command {
            Command::Play {
                id,
                samples,
                rate,
                volume,
                looped,
                delay,
            } => {
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        warn!(engine = NAME, err = %e, "Failed to create sink");
                        continue;
                    }
                };
                sink.set_volume(volume * master);
                let source = SamplesBuffer::new(1, rate, samples);
                if looped {
                    sink.append(source.repeat_infinite().delay(delay));
                } else {
                    sink.append(source.delay(delay));
                }
                let entry = sinks.entry(id).or_default();
                entry.retain(|(sink, _)| !sink.empty());
                entry.push((sink, volume));
            }
            Command::Stop { id } => {
                if let Some(entries) = sinks.remove(&id) {
                    for (sink, _) in entries {
                        sink.stop();
                    }
                }
            }
            Command::StopAll => {
                for (_, entries) in sinks.drain() {
                    for (sink, _) in entries {
                        sink.stop();
                    }
                }
            }
            Command::SetVolume(volume) => {
                master = volume;
                for entries in sinks.values() {
                    for (sink, base) in entries {
                        sink.set_volume(base * master);
                    }
                }
            }
            Command::Shutdown => break,
        }
    }
}
