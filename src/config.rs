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

//! YAML configuration.
//!
//! Raw serde structs live here; they convert into the validated domain types
//! with defaults applied. Authoring mistakes surface at load time with the
//! offending sound's name, never during playback.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::sound::SoundMap;

mod audio;
mod error;
mod sound;

pub use audio::Audio;
pub use error::ConfigError;

/// Parses a sound map from a YAML file.
pub fn load_sound_map(file: &Path) -> Result<SoundMap, ConfigError> {
    let content = fs::read_to_string(file).map_err(|e| ConfigError::Io {
        path: file.to_path_buf(),
        source: e,
    })?;
    parse_sound_map(&content)
}

/// Parses a sound map from a YAML string: a mapping of sound names to
/// definitions.
pub fn parse_sound_map(content: &str) -> Result<SoundMap, ConfigError> {
    let raw: HashMap<String, sound::Sound> = serde_yml::from_str(content)?;
    raw.iter()
        .map(|(name, sound)| Ok((name.clone(), sound.to_sound(name)?)))
        .collect()
}

/// Parses the audio configuration from a YAML file.
pub fn load_audio(file: &Path) -> Result<Audio, ConfigError> {
    let content = fs::read_to_string(file).map_err(|e| ConfigError::Io {
        path: file.to_path_buf(),
        source: e,
    })?;
    Ok(serde_yml::from_str(&content)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    const SOUND_MAP: &str = r#"
click:
  tone:
    waveform: square
    frequency: 800.0
    duration: 0.03
  volume: 0.4
win:
  melody:
    bpm: 180
    notes:
      - { note: C4, duration: 8n }
      - { note: E4, duration: 8n }
      - { note: G4, duration: 4n }
applause:
  src: sounds/applause.ogg
  tags: [celebration]
"#;

    #[test]
    fn test_parse_sound_map() {
        let sounds = parse_sound_map(SOUND_MAP).unwrap();
        assert_eq!(sounds.len(), 3);
        assert!(sounds.contains_key("click"));
        assert_eq!(sounds["applause"].tags, vec!["celebration".to_string()]);
    }

    #[test]
    fn test_parse_reports_offending_sound() {
        let err = parse_sound_map("bad:\n  volume: 0.5\n").unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_load_sound_map_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SOUND_MAP.as_bytes()).unwrap();
        let sounds = load_sound_map(file.path()).unwrap();
        assert_eq!(sounds.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_sound_map(Path::new("/nonexistent/sounds.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_audio() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"engine: rodio\nsample_rate: 22050\n").unwrap();
        let audio = load_audio(file.path()).unwrap();
        assert_eq!(audio.preferred_engine(), Some("rodio"));
        assert_eq!(audio.sample_rate(), 22050);
    }
}
