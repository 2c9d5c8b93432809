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

//! Tracks the mixer voices belonging to each playing sound so stops can be
//! targeted at a sound handle rather than individual voices.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::mixer::CancelHandle;

/// The control surface of one mixer voice.
pub(crate) struct VoiceControl {
    cancel: CancelHandle,
    stop_at: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
}

impl VoiceControl {
    pub(crate) fn new(
        cancel: CancelHandle,
        stop_at: Arc<AtomicU64>,
        finished: Arc<AtomicBool>,
    ) -> VoiceControl {
        VoiceControl {
            cancel,
            stop_at,
            finished,
        }
    }
}

/// Voice controls grouped by sound handle.
#[derive(Default)]
pub(crate) struct VoiceSet {
    by_sound: RwLock<HashMap<u64, Vec<VoiceControl>>>,
}

impl VoiceSet {
    /// Starts tracking a voice under the given sound handle.
    pub(crate) fn track(&self, sound_id: u64, control: VoiceControl) {
        self.by_sound
            .write()
            .entry(sound_id)
            .or_default()
            .push(control);
    }

    /// Stops every voice of a sound, immediately when `at_frame` is `None`
    /// or at the given mixer frame otherwise. Unknown handles are a no-op.
    pub(crate) fn stop(&self, sound_id: u64, at_frame: Option<u64>) {
        let mut by_sound = self.by_sound.write();
        match at_frame {
            None => {
                if let Some(controls) = by_sound.remove(&sound_id) {
                    for control in controls {
                        control.cancel.cancel();
                    }
                }
            }
            Some(frame) => {
                if let Some(controls) = by_sound.get(&sound_id) {
                    for control in controls {
                        control.stop_at.store(frame.max(1), Ordering::Relaxed);
                    }
                }
            }
        }
    }

    /// Cancels everything tracked. Entries stay until the mixer flags the
    /// cancelled voices finished and a later [`prune`](VoiceSet::prune)
    /// collects them.
    pub(crate) fn stop_all(&self) {
        let by_sound = self.by_sound.read();
        for controls in by_sound.values() {
            for control in controls {
                control.cancel.cancel();
            }
        }
    }

    /// Drops sounds whose voices have all finished and returns their
    /// handles so callers can release per-sound state along with them.
    /// Called opportunistically from the playback path to keep the maps
    /// from growing unbounded.
    pub(crate) fn prune(&self) -> Vec<u64> {
        let mut done = Vec::new();
        self.by_sound.write().retain(|sound_id, controls| {
            let live = controls
                .iter()
                .any(|control| !control.finished.load(Ordering::Relaxed));
            if !live {
                done.push(*sound_id);
            }
            live
        });
        done
    }

    #[cfg(test)]
    pub(crate) fn tracked_sounds(&self) -> usize {
        self.by_sound.read().len()
    }
}
