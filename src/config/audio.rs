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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_BUFFER_SIZE: usize = 1024;
const DEFAULT_VOLUME: f32 = 0.3;
const DEFAULT_VOLUME_RAMP: Duration = Duration::from_millis(100);

/// A YAML representation of the audio output configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device. "default" picks the host default, names starting with
    /// "mock" pick the mock output.
    device: String,

    /// Preferred sample rate in Hz, used when the device allows it (default: 44100).
    sample_rate: Option<u32>,

    /// Frames per render callback (default: 1024).
    buffer_size: Option<usize>,

    /// Initial output gain (default: 0.3).
    volume: Option<f32>,

    /// How long a volume change takes to settle (default: 100ms).
    volume_ramp: Option<String>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            buffer_size: None,
            volume: None,
            volume_ramp: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the preferred sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the number of frames per render callback.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE).max(1)
    }

    /// Returns the initial output gain.
    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(DEFAULT_VOLUME)
    }

    /// Returns the volume ramp duration.
    pub fn volume_ramp(&self) -> Result<Duration, ConfigError> {
        match &self.volume_ramp {
            Some(volume_ramp) => Ok(DurationString::from_string(volume_ramp.clone())
                .map_err(|e| ConfigError::Invalid(format!("volume_ramp: {}", e)))?
                .into()),
            None => Ok(DEFAULT_VOLUME_RAMP),
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == Some(0) {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.volume.is_some_and(|volume| !volume.is_finite()) {
            return Err(ConfigError::Invalid("volume must be a number".into()));
        }
        self.volume_ramp()?;
        Ok(())
    }
}
