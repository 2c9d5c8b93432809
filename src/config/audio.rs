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
use serde::Deserialize;

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_SCHEDULING_SLACK: f64 = 0.02;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// Forces a specific engine instead of priority-order probing.
    engine: Option<String>,

    /// Output sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// Output channel count (default: 2).
    channels: Option<u16>,

    /// Lead time in seconds added when scheduling voices, so starts never
    /// land behind the device clock (default: 0.02).
    scheduling_slack: Option<f64>,
}

impl Audio {
    /// Returns the preferred engine name, if one was configured.
    pub fn preferred_engine(&self) -> Option<&str> {
        self.engine.as_deref()
    }

    pub fn set_preferred_engine(&mut self, name: &str) {
        self.engine = Some(name.to_string());
    }

    /// Returns the output sample rate (default: 44100).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output channel count (default: 2).
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS).max(1)
    }

    /// Returns the scheduling slack in seconds (default: 0.02).
    pub fn scheduling_slack(&self) -> f64 {
        self.scheduling_slack
            .filter(|slack| slack.is_finite() && *slack >= 0.0)
            .unwrap_or(DEFAULT_SCHEDULING_SLACK)
    }
}
