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

//! The synthesis engine: renders tone and melody definitions into buffers up
//! front and schedules them on the mixer clock, one voice per note. This is
//! the default backend wherever an output device exists.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config;
use crate::engine::mixer::{CancelHandle, Mixer, Voice};
use crate::engine::output::{self, AudioOutput};
use crate::engine::render;
use crate::engine::voices::{VoiceControl, VoiceSet};
use crate::engine::{next_sound_id, Engine, EngineError, SoundId};
use crate::music::{Bpm, Melody, MelodyPitch};
use crate::sound::{PlayOptions, Sound, SoundSource};

pub(crate) const NAME: &str = "synth";

/// One pre-rendered buffer and where it sits in its sound.
struct PreparedNote {
    /// Offset from the sound's start, in seconds.
    offset_secs: f64,
    buffer: Arc<Vec<f32>>,
    /// Definition volume times note velocity. The per-call volume is folded
    /// in when the voice is scheduled.
    gain: f32,
}

/// A fully rendered sound, ready to schedule.
struct PreparedSound {
    notes: Vec<PreparedNote>,
    looped: bool,
}

enum OutputState {
    Idle,
    Running(AudioOutput),
    Failed(String),
}

pub struct SynthEngine {
    mixer: Arc<Mixer>,
    output: Mutex<OutputState>,
    prepared: RwLock<HashMap<u64, Arc<PreparedSound>>>,
    voices: VoiceSet,
    /// Lead time added to every schedule so voices never start in the past
    /// relative to the device callback.
    slack: Duration,
}

impl SynthEngine {
    pub fn new(config: &config::Audio) -> SynthEngine {
        SynthEngine {
            mixer: Arc::new(Mixer::new(config.sample_rate(), config.channels())),
            output: Mutex::new(OutputState::Idle),
            prepared: RwLock::new(HashMap::new()),
            voices: VoiceSet::default(),
            slack: Duration::from_secs_f64(config.scheduling_slack()),
        }
    }

    /// Drops the rendered buffers of sounds whose voices have all finished,
    /// keeping the one being played right now.
    fn collect_finished(&self, playing: u64) {
        let done = self.voices.prune();
        if !done.is_empty() {
            let mut prepared = self.prepared.write();
            for sound_id in done {
                if sound_id != playing {
                    prepared.remove(&sound_id);
                }
            }
        }
    }

    /// Renders a definition into its prepared form.
    fn prepare(&self, sound: &Sound, options: &PlayOptions) -> Result<PreparedSound, EngineError> {
        let rate = self.mixer.sample_rate();
        let looped = options.looped.unwrap_or(sound.looped);
        match &sound.source {
            SoundSource::Tone(tone) => {
                let buffer = render::render_tone(tone, Bpm::default(), rate);
                Ok(PreparedSound {
                    notes: vec![PreparedNote {
                        offset_secs: 0.0,
                        buffer: Arc::new(buffer),
                        gain: sound.volume as f32,
                    }],
                    looped,
                })
            }
            SoundSource::Melody(melody) => Ok(self.prepare_melody(melody, sound.volume, looped)),
            SoundSource::File(_) => Err(EngineError::UnsupportedDefinition {
                engine: NAME,
                reason: "file sources require the file engine".to_string(),
            }),
        }
    }

    /// Melodies normally become one voice per pitched note so each note gets
    /// a sample-accurate start. A looped melody is instead flattened into a
    /// single buffer, since the loop point is the whole sequence.
    fn prepare_melody(&self, melody: &Melody, volume: f64, looped: bool) -> PreparedSound {
        let rate = self.mixer.sample_rate();
        let bpm = melody.bpm();
        let waveform = melody.waveform.unwrap_or_default();
        let envelope = melody.envelope.unwrap_or_default();

        if looped {
            return PreparedSound {
                notes: vec![PreparedNote {
                    offset_secs: 0.0,
                    buffer: Arc::new(render::render_melody(melody, rate)),
                    gain: volume as f32,
                }],
                looped: true,
            };
        }

        let mut notes = Vec::new();
        for (offset, note) in melody.schedule() {
            let MelodyPitch::Pitch(pitch) = note.pitch else {
                continue;
            };
            let rendered = render::render_note(
                waveform,
                pitch.frequency(),
                note.duration.seconds(bpm),
                &envelope,
                None,
                rate,
            );
            notes.push(PreparedNote {
                offset_secs: offset,
                buffer: Arc::new(rendered),
                gain: (volume * note.velocity.unwrap_or(1.0)) as f32,
            });
        }
        PreparedSound {
            notes,
            looped: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    #[cfg(test)]
    pub(crate) fn prepared_count(&self) -> usize {
        self.prepared.read().len()
    }
}

impl fmt::Display for SynthEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "synth engine ({} Hz, {} channels)",
            self.mixer.sample_rate(),
            self.mixer.channels()
        )
    }
}

impl Engine for SynthEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_supported(&self) -> bool {
        output::probe()
    }

    fn initialize(&self) -> Result<(), EngineError> {
        let mut state = self.output.lock();
        match &*state {
            OutputState::Running(_) => Ok(()),
            OutputState::Failed(reason) => Err(EngineError::Initialization(reason.clone())),
            OutputState::Idle => match AudioOutput::start(self.mixer.clone()) {
                Ok(output) => {
                    debug!(engine = NAME, "Audio output started");
                    *state = OutputState::Running(output);
                    Ok(())
                }
                Err(e) => {
                    let reason = e.to_string();
                    warn!(engine = NAME, err = %e, "Audio output failed to start");
                    *state = OutputState::Failed(reason.clone());
                    Err(EngineError::Initialization(reason))
                }
            },
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
        self.collect_finished(id.raw());
        let prepared = self
            .prepared
            .read()
            .get(&id.raw())
            .cloned()
            .ok_or(EngineError::UnknownSound(id))?;

        let when = options.when.unwrap_or(Duration::ZERO);
        let base = self.mixer.current_frame()
            + self.mixer.frames_for(self.slack.as_secs_f64())
            + self.mixer.frames_for(when.as_secs_f64());
        let looped = options.looped.unwrap_or(prepared.looped);
        let call_gain = options.volume_or_default() as f32;

        for note in &prepared.notes {
            let cancel_handle = CancelHandle::new();
            let stop_at = Arc::new(AtomicU64::new(0));
            let finished = Arc::new(AtomicBool::new(false));
            self.voices.track(
                id.raw(),
                VoiceControl::new(cancel_handle.clone(), stop_at.clone(), finished.clone()),
            );
            self.mixer.add_voice(Voice {
                sound_id: id.raw(),
                buffer: note.buffer.clone(),
                gain: note.gain * call_gain,
                // Only single-buffer sounds loop; melody notes are a sequence.
                looped: looped && prepared.notes.len() == 1,
                start_at: base + self.mixer.frames_for(note.offset_secs),
                stop_at,
                cancel_handle,
                finished,
            });
        }
        Ok(())
    }

    fn stop_sound(&self, id: SoundId, when: Option<Duration>) {
        match when {
            None => {
                self.voices.stop(id.raw(), None);
                self.prepared.write().remove(&id.raw());
            }
            Some(delay) => {
                let frame =
                    self.mixer.current_frame() + self.mixer.frames_for(delay.as_secs_f64());
                self.voices.stop(id.raw(), Some(frame));
            }
        }
    }

    fn stop_all(&self) {
        self.voices.stop_all();
    }

    fn set_volume(&self, volume: f64) {
        self.mixer.set_master_gain(volume as f32);
    }

    fn set_enabled(&self, enabled: bool) {
        if !enabled {
            self.voices.stop_all();
        }
        self.mixer.set_enabled(enabled);
    }

    fn is_enabled(&self) -> bool {
        self.mixer.is_enabled()
    }

    fn dispose(&self) {
        self.voices.stop_all();
        self.prepared.write().clear();
        let mut state = self.output.lock();
        if let OutputState::Running(mut output) =
            std::mem::replace(&mut *state, OutputState::Idle)
        {
            output.stop();
        }
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::MockEngine>, Box<dyn std::error::Error>> {
        Err("synth engine is not a mock".into())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::music::{MelodyNote, Note, NoteDuration};
    use crate::sound::{Pitch, Tone, Waveform};

    fn engine() -> SynthEngine {
        SynthEngine::new(&config::Audio::default())
    }

    fn click() -> Sound {
        Sound::new(SoundSource::Tone(Tone::new(
            Waveform::Square,
            Pitch::Hz(1000.0),
            NoteDuration::Seconds(0.05),
        )))
    }

    fn arpeggio() -> Sound {
        let melody = Melody {
            notes: vec![
                MelodyNote::new(
                    MelodyPitch::Pitch("C4".parse::<Note>().unwrap()),
                    NoteDuration::Eighth,
                ),
                MelodyNote::new(MelodyPitch::Rest, NoteDuration::Eighth),
                MelodyNote::new(
                    MelodyPitch::Pitch("E4".parse::<Note>().unwrap()),
                    NoteDuration::Eighth,
                ),
            ],
            ..Melody::default()
        };
        Sound::new(SoundSource::Melody(melody))
    }

    #[test]
    fn test_tone_plays_one_voice() {
        let engine = engine();
        let id = engine
            .create_sound(&click(), &PlayOptions::default())
            .unwrap();
        engine.play_sound(id, &PlayOptions::default()).unwrap();
        assert_eq!(engine.mixer().active_voices(), 1);
    }

    #[test]
    fn test_melody_plays_one_voice_per_pitched_note() {
        let engine = engine();
        let id = engine
            .create_sound(&arpeggio(), &PlayOptions::default())
            .unwrap();
        engine.play_sound(id, &PlayOptions::default()).unwrap();
        // The rest consumes time but produces no voice.
        assert_eq!(engine.mixer().active_voices(), 2);
    }

    #[test]
    fn test_looped_melody_flattens_to_single_voice() {
        let engine = engine();
        let options = PlayOptions {
            looped: Some(true),
            ..PlayOptions::default()
        };
        let id = engine.create_sound(&arpeggio(), &options).unwrap();
        engine.play_sound(id, &options).unwrap();
        assert_eq!(engine.mixer().active_voices(), 1);
    }

    #[test]
    fn test_file_source_unsupported() {
        let engine = engine();
        let sound = Sound::new(SoundSource::File("click.ogg".into()));
        assert!(matches!(
            engine.create_sound(&sound, &PlayOptions::default()),
            Err(EngineError::UnsupportedDefinition { .. })
        ));
    }

    #[test]
    fn test_play_unknown_sound_fails() {
        let engine = engine();
        let id = next_sound_id();
        assert!(matches!(
            engine.play_sound(id, &PlayOptions::default()),
            Err(EngineError::UnknownSound(_))
        ));
    }

    #[test]
    fn test_stop_sound_removes_voices() {
        let engine = engine();
        let id = engine
            .create_sound(&click(), &PlayOptions::default())
            .unwrap();
        engine.play_sound(id, &PlayOptions::default()).unwrap();
        engine.stop_sound(id, None);

        // Cancelled voices are dropped by the next mix pass.
        let mut out = vec![0.0f32; 64 * engine.mixer().channels() as usize];
        engine.mixer().process_into(&mut out, 64);
        assert_eq!(engine.mixer().active_voices(), 0);
    }

    #[test]
    fn test_finished_sounds_release_prepared_buffers() {
        let engine = engine();
        let id = engine
            .create_sound(&click(), &PlayOptions::default())
            .unwrap();
        engine.play_sound(id, &PlayOptions::default()).unwrap();
        assert_eq!(engine.prepared_count(), 1);

        // Mix past the scheduling slack plus the click so the voice runs
        // to completion.
        let frames = 4096;
        let mut out = vec![0.0f32; frames * engine.mixer().channels() as usize];
        engine.mixer().process_into(&mut out, frames);
        assert_eq!(engine.mixer().active_voices(), 0);

        // The next play collects the finished sound's buffer.
        let next = engine
            .create_sound(&click(), &PlayOptions::default())
            .unwrap();
        engine.play_sound(next, &PlayOptions::default()).unwrap();
        assert_eq!(engine.prepared_count(), 1);
    }

    #[test]
    fn test_stop_sound_releases_prepared_buffer() {
        let engine = engine();
        let id = engine
            .create_sound(&click(), &PlayOptions::default())
            .unwrap();
        engine.play_sound(id, &PlayOptions::default()).unwrap();

        engine.stop_sound(id, None);
        assert_eq!(engine.prepared_count(), 0);
    }

    #[test]
    fn test_disable_silences_everything() {
        let engine = engine();
        let id = engine
            .create_sound(&click(), &PlayOptions::default())
            .unwrap();
        engine.play_sound(id, &PlayOptions::default()).unwrap();

        engine.set_enabled(false);
        assert!(!engine.is_enabled());
        assert_eq!(engine.mixer().active_voices(), 0);
    }

    #[test]
    fn test_scheduled_start_respects_when() {
        let engine = engine();
        let id = engine
            .create_sound(&click(), &PlayOptions::default())
            .unwrap();
        let options = PlayOptions {
            when: Some(Duration::from_secs(1)),
            ..PlayOptions::default()
        };
        engine.play_sound(id, &options).unwrap();

        // Pull a short buffer: the voice exists but contributes silence
        // until its start frame a second from now.
        let frames = 256;
        let mut out = vec![0.0f32; frames * engine.mixer().channels() as usize];
        engine.mixer().process_into(&mut out, frames);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(engine.mixer().active_voices(), 1);
    }
}
