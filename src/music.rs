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

//! Pure music math: notes, durations, envelopes, and melodies.
//!
//! Nothing here touches an audio backend; these types resolve symbolic
//! authoring forms ("C#4", "8n") into frequencies and seconds.

pub mod duration;
pub mod envelope;
pub mod melody;
pub mod note;

pub use duration::{Bpm, NoteDuration};
pub use envelope::Envelope;
pub use melody::{Melody, MelodyError, MelodyNote, MelodyPitch};
pub use note::{Note, NoteError, NoteName};
