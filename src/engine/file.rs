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

//! The file engine: decodes audio files (WAV, MP3, FLAC, OGG) into mono
//! buffers, resampled to the mixer rate, and plays them through the same
//! mixer as the synthesis engine. Decoded files are cached by path so
//! repeated plays of the same effect decode once.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use crate::config;
use crate::engine::mixer::{CancelHandle, Mixer, Voice};
use crate::engine::output::{self, AudioOutput};
use crate::engine::voices::{VoiceControl, VoiceSet};
use crate::engine::{next_sound_id, Engine, EngineError, SoundId};
use crate::sound::{PlayOptions, Sound, SoundSource};

pub(crate) const NAME: &str = "file";

const RESAMPLE_BLOCK: usize = 1024;

/// A decoded file bound to a sound handle.
struct PreparedFile {
    buffer: Arc<Vec<f32>>,
    gain: f32,
    looped: bool,
}

enum OutputState {
    Idle,
    Running(AudioOutput),
    Failed(String),
}

pub struct FileEngine {
    mixer: Arc<Mixer>,
    output: Mutex<OutputState>,
    cache: RwLock<HashMap<PathBuf, Arc<Vec<f32>>>>,
    prepared: RwLock<HashMap<u64, Arc<PreparedFile>>>,
    voices: VoiceSet,
    slack: Duration,
}

impl FileEngine {
    pub fn new(config: &config::Audio) -> FileEngine {
        FileEngine {
            mixer: Arc::new(Mixer::new(config.sample_rate(), config.channels())),
            output: Mutex::new(OutputState::Idle),
            cache: RwLock::new(HashMap::new()),
            prepared: RwLock::new(HashMap::new()),
            voices: VoiceSet::default(),
            slack: Duration::from_secs_f64(config.scheduling_slack()),
        }
    }

    /// Loads a file through the cache.
    fn load(&self, path: &Path) -> Result<Arc<Vec<f32>>, EngineError> {
        if let Some(buffer) = self.cache.read().get(path) {
            return Ok(buffer.clone());
        }

        let (samples, source_rate) = decode_file(path)?;
        let resampled = resample(samples, source_rate, self.mixer.sample_rate())?;
        debug!(path = %path.display(), frames = resampled.len(), "Decoded audio file");

        let buffer = Arc::new(resampled);
        self.cache
            .write()
            .insert(path.to_path_buf(), buffer.clone());
        Ok(buffer)
    }

    /// Drops the prepared entries of sounds whose voices have all finished,
    /// keeping the one being played right now. The decoded-file cache is
    /// untouched so replays of the same path stay cheap.
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

    #[cfg(test)]
    pub(crate) fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    #[cfg(test)]
    pub(crate) fn prepared_count(&self) -> usize {
        self.prepared.read().len()
    }
}

impl fmt::Display for FileEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file engine ({} Hz, {} channels)",
            self.mixer.sample_rate(),
            self.mixer.channels()
        )
    }
}

impl Engine for FileEngine {
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
        let SoundSource::File(path) = &sound.source else {
            return Err(EngineError::UnsupportedDefinition {
                engine: NAME,
                reason: "only file sources are supported".to_string(),
            });
        };

        let buffer = self.load(path)?;
        let id = next_sound_id();
        self.prepared.write().insert(
            id.raw(),
            Arc::new(PreparedFile {
                buffer,
                gain: sound.volume as f32,
                looped: options.looped.unwrap_or(sound.looped),
            }),
        );
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
        let start_at = self.mixer.current_frame()
            + self.mixer.frames_for(self.slack.as_secs_f64())
            + self.mixer.frames_for(when.as_secs_f64());

        let cancel_handle = CancelHandle::new();
        let stop_at = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        self.voices.track(
            id.raw(),
            VoiceControl::new(cancel_handle.clone(), stop_at.clone(), finished.clone()),
        );
        self.mixer.add_voice(Voice {
            sound_id: id.raw(),
            buffer: prepared.buffer.clone(),
            gain: prepared.gain * options.volume_or_default() as f32,
            looped: options.looped.unwrap_or(prepared.looped),
            start_at,
            stop_at,
            cancel_handle,
            finished,
        });
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
        self.cache.write().clear();
        let mut state = self.output.lock();
        if let OutputState::Running(mut output) =
            std::mem::replace(&mut *state, OutputState::Idle)
        {
            output.stop();
        }
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::MockEngine>, Box<dyn std::error::Error>> {
        Err("file engine is not a mock".into())
    }
}

/// Decodes a whole file to mono samples at its native rate. Multi-channel
/// sources are downmixed by averaging.
pub(crate) fn decode_file(path: &Path) -> Result<(Vec<f32>, u32), EngineError> {
    let decode_err = |reason: String| EngineError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| decode_err(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_err(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_err("no audio track found".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| decode_err("sample rate not specified".to_string()))?;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(e.to_string()))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            // Some decoders signal EOF with a decode error instead.
            Err(SymphoniaError::DecodeError(_)) => break,
            Err(e) => return Err(decode_err(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(decode_err(e.to_string())),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 {
            continue;
        }
        let mut interleaved = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        interleaved.copy_interleaved_ref(decoded);
        for frame in interleaved.samples().chunks_exact(channels) {
            mono.push(frame.iter().sum::<f32>() / channels as f32);
        }
    }

    if mono.is_empty() {
        return Err(decode_err("no audio data".to_string()));
    }
    Ok((mono, sample_rate))
}

/// Resamples a mono buffer between rates with a windowed-sinc resampler.
pub(crate) fn resample(input: Vec<f32>, from: u32, to: u32) -> Result<Vec<f32>, EngineError> {
    if from == to {
        return Ok(input);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(to as f64 / from as f64, 1.0, params, RESAMPLE_BLOCK, 1)
            .map_err(|e| EngineError::Playback(format!("resampler setup: {e}")))?;

    let mut out = Vec::with_capacity((input.len() as f64 * to as f64 / from as f64) as usize);
    let mut pos = 0;
    loop {
        let needed = resampler.input_frames_next();
        if input.len() - pos < needed {
            break;
        }
        let block = vec![input[pos..pos + needed].to_vec()];
        let mut frames = resampler
            .process(&block, None)
            .map_err(|e| EngineError::Playback(format!("resampling: {e}")))?;
        out.append(&mut frames[0]);
        pos += needed;
    }
    if pos < input.len() {
        let tail = vec![input[pos..].to_vec()];
        let mut frames = resampler
            .process_partial(Some(&tail), None)
            .map_err(|e| EngineError::Playback(format!("resampling: {e}")))?;
        out.append(&mut frames[0]);
    }
    Ok(out)
}
