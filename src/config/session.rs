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
use std::path::Path;

use config::{Config, File};
use serde::Deserialize;

use crate::voice::CartridgeIdentity;

use super::{audio::Audio, error::ConfigError, keyboard::Keyboard, midi::Midi};

/// The configuration for a cartridge session.
#[derive(Deserialize, Clone, Debug)]
pub struct Session {
    /// The audio output.
    audio: Audio,

    /// Host MIDI access and control change routing.
    midi: Option<Midi>,

    /// The virtual keyboard.
    keyboard: Option<Keyboard>,

    /// The cartridge loaded when the session starts.
    cartridge: Option<CartridgeIdentity>,
}

impl Session {
    /// Creates a new session configuration.
    pub fn new(audio: Audio) -> Session {
        Session {
            audio,
            midi: None,
            keyboard: None,
            cartridge: None,
        }
    }

    /// Replaces the MIDI configuration.
    pub fn with_midi(mut self, midi: Midi) -> Session {
        self.midi = Some(midi);
        self
    }

    /// Replaces the startup cartridge.
    pub fn with_cartridge(mut self, cartridge: CartridgeIdentity) -> Session {
        self.cartridge = Some(cartridge);
        self
    }

    /// Parse a session from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Session, ConfigError> {
        let session = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Session>()?;
        session.validate()?;
        Ok(session)
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn midi(&self) -> Midi {
        self.midi.clone().unwrap_or_default()
    }

    pub fn keyboard(&self) -> Keyboard {
        self.keyboard.clone().unwrap_or_default()
    }

    pub fn cartridge(&self) -> CartridgeIdentity {
        self.cartridge.unwrap_or_default()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.audio.validate()?;
        self.midi().validate()
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, io::Write, time::Duration};

    use super::*;

    fn write_config(yaml: &str) -> Result<tempfile::NamedTempFile, Box<dyn Error>> {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
        file.write_all(yaml.as_bytes())?;
        Ok(file)
    }

    #[test]
    fn test_deserialize() -> Result<(), Box<dyn Error>> {
        let file = write_config(
            r#"
audio:
  device: mock-device
  volume: 0.5
midi:
  backend: mock
keyboard:
  base_note: 48
cartridge: synth_program
"#,
        )?;

        let session = Session::deserialize(file.path())?;
        assert_eq!("mock-device", session.audio().device());
        assert_eq!(0.5, session.audio().volume());
        assert_eq!("mock", session.midi().backend());
        assert_eq!(48, session.keyboard().base_note());
        assert_eq!(100, session.keyboard().velocity());
        assert_eq!(CartridgeIdentity::SynthProgram, session.cartridge());
        Ok(())
    }

    #[test]
    fn test_minimal() -> Result<(), Box<dyn Error>> {
        let file = write_config(
            r#"
audio:
  device: default
"#,
        )?;

        let session = Session::deserialize(file.path())?;
        assert_eq!(CartridgeIdentity::None, session.cartridge());
        assert_eq!("midir", session.midi().backend());
        assert_eq!(Duration::from_secs(1), session.midi().rescan_interval()?);
        assert_eq!(60, session.keyboard().base_note());
        Ok(())
    }

    #[test]
    fn test_invalid() -> Result<(), Box<dyn Error>> {
        let file = write_config(
            r#"
audio:
  device: default
midi:
  controls:
    - controller: 20
      parameter: reverb.size
"#,
        )?;
        assert!(matches!(
            Session::deserialize(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let missing = write_config("cartridge: none\n")?;
        assert!(matches!(
            Session::deserialize(missing.path()),
            Err(ConfigError::Load(_))
        ));
        Ok(())
    }
}
