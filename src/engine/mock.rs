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

//! A mock engine that records every call so tests can assert on what the
//! selection logic and the manager asked a backend to do. Support and
//! failure modes are controllable per instance.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config;
use crate::engine::{next_sound_id, Engine, EngineError, EngineFactory, SoundId};
use crate::sound::{PlayOptions, Sound};

/// One recorded backend call.
#[derive(Debug, Clone)]
pub enum Event {
    Created {
        id: SoundId,
        sound: Sound,
        options: PlayOptions,
    },
    Played {
        id: SoundId,
        options: PlayOptions,
    },
    Stopped {
        id: SoundId,
        when: Option<Duration>,
    },
    StoppedAll,
}

struct Inner {
    name: &'static str,
    supported: AtomicBool,
    enabled: AtomicBool,
    initialized: AtomicBool,
    disposed: AtomicBool,
    fail_initialize: AtomicBool,
    fail_create: AtomicBool,
    built: AtomicUsize,
    volume: Mutex<f64>,
    known: Mutex<HashSet<u64>>,
    events: Mutex<Vec<Event>>,
}

/// Clones share state, so a test can hold one handle while the context or
/// manager holds another.
#[derive(Clone)]
pub struct MockEngine {
    inner: Arc<Inner>,
}

impl MockEngine {
    pub fn new() -> MockEngine {
        MockEngine::named("mock")
    }

    pub fn named(name: &'static str) -> MockEngine {
        MockEngine {
            inner: Arc::new(Inner {
                name,
                supported: AtomicBool::new(true),
                enabled: AtomicBool::new(true),
                initialized: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                fail_initialize: AtomicBool::new(false),
                fail_create: AtomicBool::new(false),
                built: AtomicUsize::new(0),
                volume: Mutex::new(1.0),
                known: Mutex::new(HashSet::new()),
                events: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn set_supported(&self, supported: bool) {
        self.inner.supported.store(supported, Ordering::Relaxed);
    }

    pub fn set_fail_initialize(&self, fail: bool) {
        self.inner.fail_initialize.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.inner.fail_create.store(fail, Ordering::Relaxed);
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.events.lock().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Relaxed)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Relaxed)
    }

    pub fn volume(&self) -> f64 {
        *self.inner.volume.lock()
    }

    /// How many times a factory built this engine.
    pub fn build_count(&self) -> usize {
        self.inner.built.load(Ordering::Relaxed)
    }

    pub fn play_count(&self) -> usize {
        self.inner
            .events
            .lock()
            .iter()
            .filter(|event| matches!(event, Event::Played { .. }))
            .count()
    }
}

impl Default for MockEngine {
    fn default() -> MockEngine {
        MockEngine::new()
    }
}

impl fmt::Display for MockEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mock engine {}", self.inner.name)
    }
}

impl Engine for MockEngine {
    fn name(&self) -> &'static str {
        self.inner.name
    }

    fn is_supported(&self) -> bool {
        self.inner.supported.load(Ordering::Relaxed)
    }

    fn initialize(&self) -> Result<(), EngineError> {
        if self.inner.fail_initialize.load(Ordering::Relaxed) {
            return Err(EngineError::Initialization(
                "mock initialization failure".to_string(),
            ));
        }
        self.inner.initialized.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn create_sound(&self, sound: &Sound, options: &PlayOptions) -> Result<SoundId, EngineError> {
        sound.validate()?;
        if self.inner.fail_create.load(Ordering::Relaxed) {
            return Err(EngineError::Playback("mock create failure".to_string()));
        }
        let id = next_sound_id();
        self.inner.known.lock().insert(id.raw());
        self.inner.events.lock().push(Event::Created {
            id,
            sound: sound.clone(),
            options: *options,
        });
        Ok(id)
    }

    fn play_sound(&self, id: SoundId, options: &PlayOptions) -> Result<(), EngineError> {
        if !self.inner.known.lock().contains(&id.raw()) {
            return Err(EngineError::UnknownSound(id));
        }
        self.inner.events.lock().push(Event::Played {
            id,
            options: *options,
        });
        Ok(())
    }

    fn stop_sound(&self, id: SoundId, when: Option<Duration>) {
        self.inner.events.lock().push(Event::Stopped { id, when });
    }

    fn stop_all(&self) {
        self.inner.events.lock().push(Event::StoppedAll);
    }

    fn set_volume(&self, volume: f64) {
        *self.inner.volume.lock() = volume;
    }

    fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::Relaxed);
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<MockEngine>, Box<dyn std::error::Error>> {
        Ok(Arc::new(self.clone()))
    }
}

/// Builds clones of one shared mock; tests keep their own handle to assert
/// on the calls the built engine receives.
pub struct MockFactory {
    engine: Arc<MockEngine>,
}

impl MockFactory {
    pub fn new(engine: Arc<MockEngine>) -> MockFactory {
        MockFactory { engine }
    }
}

impl EngineFactory for MockFactory {
    fn name(&self) -> &str {
        self.engine.name()
    }

    fn build(&self, _config: &config::Audio) -> Result<Arc<dyn Engine>, EngineError> {
        self.engine.inner.built.fetch_add(1, Ordering::Relaxed);
        Ok(self.engine.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::music::NoteDuration;
    use crate::sound::{Pitch, SoundSource, Tone, Waveform};

    fn click() -> Sound {
        Sound::new(SoundSource::Tone(Tone::new(
            Waveform::Sine,
            Pitch::Hz(440.0),
            NoteDuration::Seconds(0.1),
        )))
    }

    #[test]
    fn test_records_lifecycle() {
        let mock = MockEngine::new();
        mock.initialize().unwrap();
        assert!(mock.is_initialized());

        let id = mock.create_sound(&click(), &PlayOptions::default()).unwrap();
        mock.play_sound(id, &PlayOptions::default()).unwrap();
        mock.stop_sound(id, None);
        mock.stop_all();

        let events = mock.events();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], Event::Created { .. }));
        assert!(matches!(events[3], Event::StoppedAll));
    }

    #[test]
    fn test_unknown_sound_rejected() {
        let mock = MockEngine::new();
        let id = next_sound_id();
        assert!(matches!(
            mock.play_sound(id, &PlayOptions::default()),
            Err(EngineError::UnknownSound(_))
        ));
    }

    #[test]
    fn test_failure_modes() {
        let mock = MockEngine::new();
        mock.set_fail_initialize(true);
        assert!(mock.initialize().is_err());

        mock.set_fail_create(true);
        assert!(mock.create_sound(&click(), &PlayOptions::default()).is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let mock = MockEngine::new();
        let clone = mock.clone();
        clone.set_volume(0.25);
        assert_eq!(mock.volume(), 0.25);
    }
}
