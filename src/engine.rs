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

//! Audio engines and engine selection.
//!
//! An [`Engine`] is one playback backend. Which backend actually runs is
//! decided once per [`EngineContext`] by capability probing in priority
//! order; the context owns that choice explicitly instead of hiding it in
//! process-wide state, so tests and embedders can hold several contexts with
//! different configurations.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config;
use crate::sound::{PlayOptions, Sound, SoundError};

pub mod file;
#[cfg(feature = "rodio")]
pub mod highlevel;
pub mod mixer;
pub mod mock;
pub mod output;
pub mod render;
pub mod synth;
mod voices;

/// Opaque handle for a created sound, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundId(u64);

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

static NEXT_SOUND_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the next sound ID.
pub(crate) fn next_sound_id() -> SoundId {
    SoundId(NEXT_SOUND_ID.fetch_add(1, Ordering::Relaxed))
}

impl SoundId {
    pub(crate) fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine {0:?} is unavailable")]
    Unavailable(String),

    #[error("no supported audio engines")]
    NoSupportedEngine,

    #[error("the {engine} engine does not support this definition: {reason}")]
    UnsupportedDefinition {
        engine: &'static str,
        reason: String,
    },

    #[error("unknown sound {0}")]
    UnknownSound(SoundId),

    #[error("engine initialization failed: {0}")]
    Initialization(String),

    #[error("{0}")]
    InvalidDefinition(#[from] SoundError),

    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("playback failed: {0}")]
    Playback(String),
}

/// A playback backend.
///
/// Implementations are synchronous and fast: creating a sound prepares
/// buffers, playing it schedules them. Anything long-running (decoding,
/// streams) either happens on the backend's own threads or is pushed behind
/// `spawn_blocking` by the manager.
pub trait Engine: Send + Sync + fmt::Display {
    /// A short stable name used for configuration and switching.
    fn name(&self) -> &'static str;

    /// Capability probe. Must be side-effect free and safe to call before
    /// [`initialize`](Engine::initialize).
    fn is_supported(&self) -> bool;

    /// Prepares backend resources. Idempotent: repeated calls return the
    /// outcome of the first attempt.
    fn initialize(&self) -> Result<(), EngineError>;

    /// Prepares a definition for playback and returns its handle.
    fn create_sound(&self, sound: &Sound, options: &PlayOptions) -> Result<SoundId, EngineError>;

    /// Schedules playback of a previously created sound. `options.when`
    /// delays the start on the engine clock.
    fn play_sound(&self, id: SoundId, options: &PlayOptions) -> Result<(), EngineError>;

    /// Stops a sound immediately or at the given delay. Unknown or finished
    /// ids are a no-op.
    fn stop_sound(&self, id: SoundId, when: Option<Duration>);

    /// Stops everything currently playing or scheduled.
    fn stop_all(&self);

    /// Sets the engine-wide gain fraction.
    fn set_volume(&self, volume: f64);

    /// Disabling stops all active sounds and silences future ones until
    /// re-enabled.
    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Releases backend resources. The engine must not be used afterwards.
    fn dispose(&self);

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::MockEngine>, Box<dyn std::error::Error>>;
}

/// Builds one kind of engine. Factories are cheap; expensive setup belongs in
/// [`Engine::initialize`].
pub trait EngineFactory: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, config: &config::Audio) -> Result<Arc<dyn Engine>, EngineError>;
}

struct SynthFactory;

impl EngineFactory for SynthFactory {
    fn name(&self) -> &str {
        synth::NAME
    }

    fn build(&self, config: &config::Audio) -> Result<Arc<dyn Engine>, EngineError> {
        Ok(Arc::new(synth::SynthEngine::new(config)))
    }
}

struct FileFactory;

impl EngineFactory for FileFactory {
    fn name(&self) -> &str {
        file::NAME
    }

    fn build(&self, config: &config::Audio) -> Result<Arc<dyn Engine>, EngineError> {
        Ok(Arc::new(file::FileEngine::new(config)))
    }
}

#[cfg(feature = "rodio")]
struct HighLevelFactory;

#[cfg(feature = "rodio")]
impl EngineFactory for HighLevelFactory {
    fn name(&self) -> &str {
        highlevel::NAME
    }

    fn build(&self, config: &config::Audio) -> Result<Arc<dyn Engine>, EngineError> {
        Ok(Arc::new(highlevel::HighLevelEngine::new(config)))
    }
}

/// The built-in factories in priority order, highest first. The high-level
/// backend only exists when its dependency was compiled in.
fn builtin_factories() -> Vec<Arc<dyn EngineFactory>> {
    vec![
        #[cfg(feature = "rodio")]
        Arc::new(HighLevelFactory),
        Arc::new(SynthFactory),
        Arc::new(FileFactory),
    ]
}

/// Owns the engine choice for one embedding of the library.
///
/// Selection happens lazily on the first [`current`](EngineContext::current)
/// call and is memoized until the configuration changes or an explicit
/// switch happens.
pub struct EngineContext {
    config: RwLock<config::Audio>,
    factories: RwLock<FactorySet>,
    active: Mutex<Option<Arc<dyn Engine>>>,
}

/// Factories in two priority tiers. Custom registrations always outrank the
/// built-ins; within each tier, list order decides.
struct FactorySet {
    custom: Vec<Arc<dyn EngineFactory>>,
    builtin: Vec<Arc<dyn EngineFactory>>,
}

impl FactorySet {
    fn find(&self, name: &str) -> Option<Arc<dyn EngineFactory>> {
        self.custom
            .iter()
            .chain(self.builtin.iter())
            .find(|f| f.name() == name)
            .cloned()
    }
}

impl EngineContext {
    pub fn new(config: config::Audio) -> EngineContext {
        EngineContext {
            config: RwLock::new(config),
            factories: RwLock::new(FactorySet {
                custom: Vec::new(),
                builtin: builtin_factories(),
            }),
            active: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn with_builtins(
        config: config::Audio,
        builtin: Vec<Arc<dyn EngineFactory>>,
    ) -> EngineContext {
        EngineContext {
            config: RwLock::new(config),
            factories: RwLock::new(FactorySet {
                custom: Vec::new(),
                builtin,
            }),
            active: Mutex::new(None),
        }
    }

    /// Registers a custom factory at the top of the priority order and
    /// re-runs selection on the next use.
    pub fn register(&self, factory: Arc<dyn EngineFactory>) {
        self.factories.write().custom.insert(0, factory);
        self.invalidate();
    }

    /// Returns the active engine, selecting one on first use.
    pub fn current(&self) -> Result<Arc<dyn Engine>, EngineError> {
        let mut active = self.active.lock();
        if let Some(engine) = active.as_ref() {
            return Ok(engine.clone());
        }
        let engine = self.select()?;
        info!(engine = engine.name(), "Selected audio engine");
        *active = Some(engine.clone());
        Ok(engine)
    }

    /// Probes factories in priority order: custom registrations first, then
    /// built-ins with the configured preferred engine promoted to the front
    /// of that tier. Unsupported engines are skipped.
    fn select(&self) -> Result<Arc<dyn Engine>, EngineError> {
        let config = self.config.read().clone();
        let (mut ordered, mut builtin) = {
            let set = self.factories.read();
            (set.custom.clone(), set.builtin.clone())
        };

        if let Some(preferred) = config.preferred_engine() {
            if let Some(pos) = builtin.iter().position(|f| f.name() == preferred) {
                let factory = builtin.remove(pos);
                builtin.insert(0, factory);
            } else if !ordered.iter().any(|f| f.name() == preferred) {
                warn!(engine = preferred, "Preferred engine is not registered");
            }
        }
        ordered.extend(builtin);

        for factory in ordered {
            match factory.build(&config) {
                Ok(engine) => {
                    if engine.is_supported() {
                        return Ok(engine);
                    }
                    info!(engine = engine.name(), "Engine not supported, skipping");
                }
                Err(e) => {
                    warn!(engine = factory.name(), err = %e, "Engine factory failed");
                }
            }
        }

        Err(EngineError::NoSupportedEngine)
    }

    /// Returns the active engine without triggering selection.
    pub fn active(&self) -> Option<Arc<dyn Engine>> {
        self.active.lock().clone()
    }

    /// Replaces the configuration, disposing the previously active engine.
    pub fn set_config(&self, config: config::Audio) {
        *self.config.write() = config;
        self.invalidate();
    }

    /// Forces the named engine regardless of priority order. Fails when the
    /// engine is not registered or not supported, leaving the current
    /// selection untouched.
    pub fn switch_engine(&self, name: &str) -> Result<Arc<dyn Engine>, EngineError> {
        let config = self.config.read().clone();
        let factory = self
            .factories
            .read()
            .find(name)
            .ok_or_else(|| EngineError::Unavailable(name.to_string()))?;

        let engine = factory.build(&config)?;
        if !engine.is_supported() {
            return Err(EngineError::Unavailable(name.to_string()));
        }

        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            previous.dispose();
        }
        info!(engine = engine.name(), "Switched audio engine");
        *active = Some(engine.clone());
        Ok(engine)
    }

    /// Drops the memoized engine, disposing it if present.
    fn invalidate(&self) {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            previous.dispose();
        }
    }
}
