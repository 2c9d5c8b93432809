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

//! The sound manager, the facade games talk to.
//!
//! Playback is fire-and-forget: a failed play never propagates into game
//! logic as a panic, it comes back as an error the caller is free to ignore,
//! already logged. The enabled flag and master volume persist across runs
//! through a [`SettingsStore`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task;
use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineContext, EngineError};
use crate::music::{Melody, MelodyError, NoteDuration};
use crate::settings::{SettingsStore, KEY_SOUND_ENABLED, KEY_SOUND_VOLUME};
use crate::sound::{Pitch, PlayOptions, Sound, SoundError, SoundMap, SoundSource, Tone, Waveform};

#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    #[error("no sound named {0:?}")]
    SoundNotFound(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    InvalidDefinition(#[from] SoundError),

    #[error(transparent)]
    InvalidMelody(#[from] MelodyError),

    #[error("playback task failed: {0}")]
    Task(String),
}

/// What a play call did. Playing while sound is disabled is not an error,
/// it is a skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Started,
    Skipped,
}

pub struct SoundManager {
    context: Arc<EngineContext>,
    settings: Arc<dyn SettingsStore>,
    sounds: RwLock<SoundMap>,
    melodies: RwLock<HashMap<String, Melody>>,
    enabled: AtomicBool,
    /// Persisted master volume, applied to the engine on first use.
    volume: Mutex<f64>,
    /// Instance-wide multiplier folded into every call's volume. Lets one
    /// part of a game run quieter than another against the same engine.
    base_volume: f64,
}

impl SoundManager {
    /// Creates a manager, restoring the enabled flag and master volume from
    /// the settings store. No engine is touched until the first play.
    pub fn new(context: Arc<EngineContext>, settings: Arc<dyn SettingsStore>) -> SoundManager {
        let enabled = read_setting(settings.as_ref(), KEY_SOUND_ENABLED, Value::as_bool, true);
        let volume = read_setting(settings.as_ref(), KEY_SOUND_VOLUME, Value::as_f64, 1.0)
            .clamp(0.0, 1.0);
        debug!(enabled, volume, "Sound manager created");
        SoundManager {
            context,
            settings,
            sounds: RwLock::new(SoundMap::new()),
            melodies: RwLock::new(HashMap::new()),
            enabled: AtomicBool::new(enabled),
            volume: Mutex::new(volume),
            base_volume: 1.0,
        }
    }

    /// Sets the instance-wide volume multiplier.
    pub fn with_base_volume(mut self, base_volume: f64) -> SoundManager {
        self.base_volume = base_volume.clamp(0.0, 1.0);
        self
    }

    /// Adds definitions to the manager's sound map. Existing names are
    /// replaced.
    pub fn load_map(&self, map: SoundMap) {
        self.sounds.write().extend(map);
    }

    /// Registers a melody under a name for later playback. Last write wins.
    pub fn register_melody(&self, name: &str, melody: Melody) -> Result<(), MelodyError> {
        melody.validate()?;
        self.melodies.write().insert(name.to_string(), melody);
        Ok(())
    }

    /// Plays a named sound from the manager's map.
    pub async fn play(&self, name: &str) -> Result<Playback, PlayError> {
        self.play_with(name, PlayOptions::default()).await
    }

    pub async fn play_with(&self, name: &str, options: PlayOptions) -> Result<Playback, PlayError> {
        let sound = self.sounds.read().get(name).cloned();
        match sound {
            Some(sound) => self.dispatch(name, sound, options).await,
            None => {
                let err = PlayError::SoundNotFound(name.to_string());
                warn!(sound = name, "Playback failed: unknown sound");
                Err(err)
            }
        }
    }

    /// Plays a named sound out of a caller-supplied map, bypassing the
    /// manager's own map.
    pub async fn play_from(
        &self,
        map: &SoundMap,
        name: &str,
        options: PlayOptions,
    ) -> Result<Playback, PlayError> {
        match map.get(name) {
            Some(sound) => self.dispatch(name, sound.clone(), options).await,
            None => {
                warn!(sound = name, "Playback failed: unknown sound");
                Err(PlayError::SoundNotFound(name.to_string()))
            }
        }
    }

    /// Plays a melody directly, without registering it.
    pub async fn play_melody(
        &self,
        melody: &Melody,
        options: PlayOptions,
    ) -> Result<Playback, PlayError> {
        melody.validate().map_err(|e| {
            warn!(err = %e, "Playback failed: invalid melody");
            e
        })?;
        self.dispatch(
            "<melody>",
            Sound::new(SoundSource::Melody(melody.clone())),
            options,
        )
        .await
    }

    /// Plays a previously registered melody.
    pub async fn play_registered(
        &self,
        name: &str,
        options: PlayOptions,
    ) -> Result<Playback, PlayError> {
        let melody = self.melodies.read().get(name).cloned();
        match melody {
            Some(melody) => {
                self.dispatch(name, Sound::new(SoundSource::Melody(melody)), options)
                    .await
            }
            None => {
                warn!(melody = name, "Playback failed: unknown melody");
                Err(PlayError::SoundNotFound(name.to_string()))
            }
        }
    }

    /// Plays a plain sine tone at a raw frequency.
    pub async fn play_tone(
        &self,
        frequency: f64,
        seconds: f64,
        options: PlayOptions,
    ) -> Result<Playback, PlayError> {
        let tone = Tone::new(
            Waveform::Sine,
            Pitch::Hz(frequency),
            NoteDuration::Seconds(seconds),
        );
        self.dispatch("<tone>", Sound::new(SoundSource::Tone(tone)), options)
            .await
    }

    /// Stops everything the active engine is playing. A no-op when no engine
    /// has been selected yet.
    pub fn stop_all_sounds(&self) {
        if let Some(engine) = self.context.active() {
            engine.stop_all();
        }
    }

    /// Flips the enabled flag, persists it, and returns the new state.
    pub fn toggle_sound(&self) -> bool {
        let enabled = !self.enabled.fetch_xor(true, Ordering::Relaxed);
        info!(enabled, "Sound toggled");
        self.persist(KEY_SOUND_ENABLED, Value::Bool(enabled));
        if let Some(engine) = self.context.active() {
            engine.set_enabled(enabled);
        }
        enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        self.persist(KEY_SOUND_ENABLED, Value::Bool(enabled));
        if let Some(engine) = self.context.active() {
            engine.set_enabled(enabled);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Sets and persists the master volume, clamped into [0, 1].
    pub fn set_volume(&self, volume: f64) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 1.0 };
        *self.volume.lock() = volume;
        self.persist(KEY_SOUND_VOLUME, Value::from(volume));
        if let Some(engine) = self.context.active() {
            engine.set_volume(volume);
        }
    }

    pub fn volume(&self) -> f64 {
        *self.volume.lock()
    }

    /// The engine context this manager plays through.
    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// The shared playback path: skip when disabled, validate, lazily bring
    /// up the engine, create off the async runtime, then schedule.
    async fn dispatch(
        &self,
        name: &str,
        sound: Sound,
        options: PlayOptions,
    ) -> Result<Playback, PlayError> {
        if !self.is_enabled() {
            debug!(sound = name, "Sound is disabled, skipping playback");
            return Ok(Playback::Skipped);
        }

        let result = self.dispatch_inner(sound, options).await;
        if let Err(e) = &result {
            warn!(sound = name, err = %e, "Playback failed");
        }
        result
    }

    async fn dispatch_inner(
        &self,
        sound: Sound,
        options: PlayOptions,
    ) -> Result<Playback, PlayError> {
        sound.validate()?;
        let engine = self.ensure_engine()?;

        let mut options = options;
        options.volume = Some(options.volume_or_default() * self.base_volume);

        // File decoding and melody rendering are blocking work.
        let create_engine = engine.clone();
        let create_options = options;
        let id = task::spawn_blocking(move || create_engine.create_sound(&sound, &create_options))
            .await
            .map_err(|e| PlayError::Task(e.to_string()))??;

        engine.play_sound(id, &options)?;
        Ok(Playback::Started)
    }

    /// Selects and initializes the engine on first use and pushes the
    /// persisted state down to it.
    fn ensure_engine(&self) -> Result<Arc<dyn Engine>, PlayError> {
        let engine = self.context.current()?;
        engine.initialize()?;
        engine.set_volume(*self.volume.lock());
        Ok(engine)
    }

    fn persist(&self, key: &str, value: Value) {
        if let Err(e) = self.settings.set(key, value) {
            warn!(key, err = %e, "Failed to persist setting");
        }
    }
}

fn read_setting<T, F>(store: &dyn SettingsStore, key: &str, convert: F, default: T) -> T
where
    F: Fn(&Value) -> Option<T>,
{
    match store.get(key) {
        Ok(Some(value)) => convert(&value).unwrap_or(default),
        Ok(None) => default,
        Err(e) => {
            warn!(key, err = %e, "Failed to read setting");
            default
        }
    }
}
