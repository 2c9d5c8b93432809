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

//! tonebox is a procedural tone, melody, and sound effect engine for small
//! games.
//!
//! Sounds are authored symbolically (note names, tempo-relative durations,
//! envelopes) in YAML or built in code, then played through pluggable
//! backends: an offline-rendering synthesis engine, a file-decoding engine,
//! and optionally rodio. The [`manager::SoundManager`] is the intended entry
//! point; engine selection, persisted enable/volume state, and failure
//! logging all live behind it.

pub mod config;
pub mod engine;
pub mod manager;
pub mod music;
pub mod settings;
pub mod sound;

pub use manager::{PlayError, Playback, SoundManager};
pub use sound::{PlayOptions, Sound, SoundMap, SoundSource};
