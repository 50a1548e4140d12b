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

use crate::voice::Parameter;

use super::error::ConfigError;

const DEFAULT_BACKEND: &str = "midir";
const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(1);

/// A YAML representation of the MIDI configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Midi {
    /// The host MIDI backend: "midir" or "mock".
    backend: Option<String>,

    /// How often the port list is polled for hot-plug changes.
    rescan_interval: Option<String>,

    /// Incoming control change numbers mapped to control surface parameters.
    controls: Option<Vec<Control>>,
}

impl Midi {
    /// New will create a new MIDI configuration.
    pub fn new(backend: &str) -> Midi {
        Midi {
            backend: Some(backend.to_string()),
            rescan_interval: None,
            controls: None,
        }
    }

    /// Replaces the control change table.
    pub fn with_controls(mut self, controls: Vec<Control>) -> Midi {
        self.controls = Some(controls);
        self
    }

    /// Returns the backend from the configuration.
    pub fn backend(&self) -> &str {
        self.backend.as_deref().unwrap_or(DEFAULT_BACKEND)
    }

    /// Returns the hot-plug rescan interval.
    pub fn rescan_interval(&self) -> Result<Duration, ConfigError> {
        match &self.rescan_interval {
            Some(rescan_interval) => Ok(DurationString::from_string(rescan_interval.clone())
                .map_err(|e| ConfigError::Invalid(format!("rescan_interval: {}", e)))?
                .into()),
            None => Ok(DEFAULT_RESCAN_INTERVAL),
        }
    }

    /// Returns the control change table.
    pub fn controls(&self) -> Vec<Control> {
        self.controls.clone().unwrap_or_else(default_controls)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.rescan_interval()?.is_zero() {
            return Err(ConfigError::Invalid(
                "rescan_interval must be positive".into(),
            ));
        }
        for control in self.controls() {
            if control.controller > 127 {
                return Err(ConfigError::Invalid(format!(
                    "controller {} is not a MIDI controller number",
                    control.controller
                )));
            }
            control.parameter().map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }
}

/// Maps one incoming control change number to a control surface parameter.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Control {
    controller: u8,
    parameter: String,
}

impl Control {
    pub fn new(controller: u8, parameter: &str) -> Control {
        Control {
            controller,
            parameter: parameter.to_string(),
        }
    }

    /// The control change number.
    pub fn controller(&self) -> u8 {
        self.controller
    }

    /// The parameter the controller drives.
    pub fn parameter(&self) -> Result<Parameter, String> {
        self.parameter.parse()
    }
}

fn default_controls() -> Vec<Control> {
    vec![
        Control::new(7, "volume"),
        Control::new(74, "filter.cutoff"),
        Control::new(71, "filter.resonance"),
        Control::new(91, "delay.mix"),
        Control::new(93, "delay.feedback"),
        Control::new(94, "delay.time"),
    ]
}

#[cfg(test)]
mod test {
    use config::{Config, File, FileFormat};

    use super::*;

    #[test]
    fn test_defaults() {
        let midi = Midi::default();
        assert_eq!("midir", midi.backend());
        assert_eq!(Duration::from_secs(1), midi.rescan_interval().unwrap());
        assert_eq!(6, midi.controls().len());
        assert_eq!(Ok(Parameter::FilterCutoff), midi.controls()[1].parameter());
        assert!(midi.validate().is_ok());
    }

    #[test]
    fn test_deserialize_controls() {
        let yaml = r#"
            backend: mock
            rescan_interval: 250ms
            controls:
              - controller: 1
                parameter: voice.waveform
              - controller: 10
                parameter: delay.enabled
        "#;

        let midi: Midi = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!("mock", midi.backend());
        assert_eq!(Duration::from_millis(250), midi.rescan_interval().unwrap());
        assert_eq!(
            vec![
                Control::new(1, "voice.waveform"),
                Control::new(10, "delay.enabled")
            ],
            midi.controls()
        );
        assert!(midi.validate().is_ok());
    }

    #[test]
    fn test_invalid_controls() {
        let mut midi = Midi::new("mock");
        midi.controls = Some(vec![Control::new(74, "filter.q")]);
        assert!(matches!(midi.validate(), Err(ConfigError::Invalid(_))));

        midi.controls = Some(vec![Control::new(200, "volume")]);
        assert!(matches!(midi.validate(), Err(ConfigError::Invalid(_))));
    }
}
